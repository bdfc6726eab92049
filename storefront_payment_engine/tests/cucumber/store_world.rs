use std::fmt::Debug;

use cucumber::World;
use storefront_payment_engine::{
    checkout_objects::{CheckoutResult, WebhookOutcome},
    db_types::PaymentIntent,
    test_utils::fakes::TestStore,
    CheckoutError,
    WebhookError,
};

#[derive(Default, World)]
pub struct StoreWorld {
    pub store: Option<TestStore>,
    pub last_checkout: Option<Result<CheckoutResult, CheckoutError>>,
    pub last_webhook: Option<Result<WebhookOutcome, WebhookError>>,
    /// The body and signature of the last webhook that was sent
    pub last_delivery: Option<(Vec<u8>, Option<String>)>,
}

impl Debug for StoreWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let url = self.store.as_ref().map(|s| s.url.as_str()).unwrap_or("no store");
        write!(f, "StoreWorld ({url}, last checkout: {:?}, last webhook: {:?})", self.last_checkout, self.last_webhook)
    }
}

impl StoreWorld {
    pub fn store(&self) -> &TestStore {
        self.store.as_ref().expect("Store not initialised")
    }

    pub fn checkout(&self) -> &CheckoutResult {
        match &self.last_checkout {
            Some(Ok(result)) => result,
            Some(Err(e)) => panic!("The last checkout failed: {e}"),
            None => panic!("No checkout has been made"),
        }
    }

    pub fn payment(&self) -> &PaymentIntent {
        self.checkout().payment.as_ref().expect("The last checkout did not use a gateway")
    }
}
