use cucumber::given;
use storefront_payment_engine::test_utils::fakes::TestStore;

use crate::cucumber::StoreWorld;

#[given("a fresh store")]
async fn fresh_store(world: &mut StoreWorld) {
    world.store = Some(TestStore::new().await);
}
