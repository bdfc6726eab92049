//! In-memory stand-ins for the third parties, and a store wired up with them.
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
};

use async_trait::async_trait;
use serde_json::{json, Value};
use sfp_common::{Money, PaymentStatus};
use sfp_integrations::{
    signature::{SignatureScheme, WebhookVerifier},
    ChargeRequest,
    ChargeResponse,
    Credential,
    CredentialIssuer,
    GatewayContext,
    GatewayError,
    Notification,
    PaymentProcessor,
    ProcessorSettings,
    ProvisioningError,
    ProvisioningRequest,
    StatusMapping,
};

use crate::{
    db_types::{NewGatewayConfig, NewProduct},
    events::EventProducers,
    test_utils::prepare_env::{drop_database, prepare_test_env, random_db_path},
    AccountsApi,
    CatalogManagement,
    CheckoutApi,
    FulfillmentApi,
    GatewayRegistry,
    ReconcilerApi,
    SqliteDatabase,
};

pub const FAKE_ADAPTER: &str = "fake";
pub const FAKE_GATEWAY: &str = "fakepay";
pub const FAKE_WEBHOOK_SECRET: &str = "whsec_fake";
pub const FAKE_SIGNATURE_HEADER: &str = "X-Fake-Signature";

//-------------------------------------------   FakeProcessor  ---------------------------------------------------------
/// A payment processor that never leaves the process.
///
/// Charges get the external reference `fake_{order_ref}`. Webhooks look like `{"reference": .., "status": ..}` and are
/// signed with HMAC-SHA256 over the canonical JSON. Native statuses are `pending`, `confirming`, `paid`, `failed`,
/// `expired` and `refunded`.
pub struct FakeProcessor {
    verifier: WebhookVerifier,
    statuses: Mutex<HashMap<String, String>>,
    fail_charges: AtomicBool,
    charges: AtomicUsize,
}

impl Default for FakeProcessor {
    fn default() -> Self {
        Self {
            verifier: WebhookVerifier::new(SignatureScheme::HmacSha256Hex),
            statuses: Mutex::new(HashMap::new()),
            fail_charges: AtomicBool::new(false),
            charges: AtomicUsize::new(0),
        }
    }
}

impl FakeProcessor {
    /// Makes every subsequent `create_charge` call fail with an upstream error.
    pub fn fail_charges(&self, fail: bool) {
        self.fail_charges.store(fail, Ordering::SeqCst);
    }

    pub fn charges_created(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }

    /// Sets the status that `get_status` reports for `external_reference`.
    pub fn set_status(&self, external_reference: &str, native_status: &str) {
        self.statuses.lock().unwrap().insert(external_reference.to_string(), native_status.to_string());
    }

    pub fn webhook_payload(external_reference: &str, native_status: &str) -> Value {
        json!({ "reference": external_reference, "status": native_status })
    }

    /// A webhook body and its valid signature.
    pub fn signed_webhook(&self, external_reference: &str, native_status: &str) -> (Vec<u8>, String) {
        let payload = Self::webhook_payload(external_reference, native_status);
        let signature = self.verifier.sign(FAKE_WEBHOOK_SECRET, &payload);
        (payload.to_string().into_bytes(), signature)
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    fn name(&self) -> &'static str {
        FAKE_ADAPTER
    }

    fn signature_header(&self) -> &'static str {
        FAKE_SIGNATURE_HEADER
    }

    fn initialize(&self, settings: &ProcessorSettings) -> Result<GatewayContext, GatewayError> {
        GatewayContext::from_settings(settings)
    }

    async fn create_charge(
        &self,
        ctx: &GatewayContext,
        request: ChargeRequest,
    ) -> Result<ChargeResponse, GatewayError> {
        ctx.check_amount(request.amount)?;
        if self.fail_charges.load(Ordering::SeqCst) {
            return Err(GatewayError::Upstream("fakepay is down".into()));
        }
        self.charges.fetch_add(1, Ordering::SeqCst);
        let external_reference = format!("fake_{}", request.order_ref);
        let checkout_url = ctx.url(&format!("/pay/{external_reference}"));
        self.set_status(&external_reference, "pending");
        Ok(ChargeResponse { external_reference, checkout_url })
    }

    async fn get_status(&self, _ctx: &GatewayContext, external_reference: &str) -> Result<String, GatewayError> {
        self.statuses
            .lock()
            .unwrap()
            .get(external_reference)
            .cloned()
            .ok_or_else(|| GatewayError::Upstream(format!("No such charge: {external_reference}")))
    }

    fn verify_signature(&self, ctx: &GatewayContext, raw_payload: &[u8], signature: &str) -> bool {
        self.verifier.verify(ctx, raw_payload, signature)
    }

    fn parse_notification(&self, payload: &Value) -> Result<Notification, GatewayError> {
        let field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .map(String::from)
                .ok_or_else(|| GatewayError::MalformedNotification(format!("'{name}' is missing")))
        };
        Ok(Notification { external_reference: field("reference")?, native_status: field("status")? })
    }

    fn map_status(&self, native_status: &str) -> StatusMapping {
        let payment = match native_status {
            "confirming" => PaymentStatus::Confirming,
            "paid" => PaymentStatus::Completed,
            "failed" => PaymentStatus::Failed,
            "expired" => PaymentStatus::Expired,
            "refunded" => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        };
        StatusMapping::for_payment(payment)
    }
}

//-------------------------------------------   FakeIssuer  ------------------------------------------------------------
/// A credential issuer that fails for a configurable set of products.
#[derive(Default)]
pub struct FakeIssuer {
    failing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
    issued: Mutex<Vec<String>>,
}

impl FakeIssuer {
    pub fn fail_for(&self, product_ref: &str) {
        self.failing.lock().unwrap().insert(product_ref.to_string());
    }

    pub fn heal(&self, product_ref: &str) {
        self.failing.lock().unwrap().remove(product_ref);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The idempotency keys of every successful issue, in order.
    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialIssuer for FakeIssuer {
    async fn issue(
        &self,
        order_number: &str,
        request: &ProvisioningRequest,
    ) -> Result<Vec<Credential>, ProvisioningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&request.product_ref) {
            return Err(ProvisioningError::Rejected { status: 503, message: "issuer is unavailable".into() });
        }
        let key = request.idempotency_key(order_number);
        self.issued.lock().unwrap().push(key.clone());
        Ok(vec![Credential { label: "licence_key".into(), value: format!("KEY-{key}") }])
    }
}

//-------------------------------------------   Seed data  -------------------------------------------------------------
pub fn test_products() -> Vec<NewProduct> {
    let product = |product_ref: &str, unit_price: i64, required: &[&str], is_active: bool| NewProduct {
        product_ref: product_ref.to_string(),
        name: product_ref.to_uppercase(),
        unit_price: Money::from(unit_price),
        currency: "USD".into(),
        required_options: required.iter().map(|s| s.to_string()).collect(),
        is_active,
    };
    vec![
        product("vpn", 1_000, &["region"], true),
        product("ebook", 500, &[], true),
        product("course", 2_500, &[], true),
        product("retired", 700, &[], false),
    ]
}

/// A 3% fee, with a 5% bonus on deposits from $50 and 10% from $100.
pub fn test_gateway_config(code: &str) -> NewGatewayConfig {
    serde_json::from_value(json!({
        "gateway_code": code,
        "adapter": FAKE_ADAPTER,
        "credentials": {
            "api_key": "sk_test",
            "webhook_secret": FAKE_WEBHOOK_SECRET,
            "base_url": "https://fakepay.test"
        },
        "min_amount": 100,
        "max_amount": 1_000_000,
        "fee_rule": { "type": "percentage", "bps": 300 },
        "bonus_rules": [
            { "min_amount": 5_000, "bps": 500 },
            { "min_amount": 10_000, "bps": 1_000 }
        ]
    }))
    .expect("valid gateway config")
}

//-------------------------------------------   TestStore  -------------------------------------------------------------
/// A migrated, seeded database with the engine APIs wired to the fakes.
pub struct TestStore {
    pub url: String,
    pub db: SqliteDatabase,
    pub processor: Arc<FakeProcessor>,
    pub issuer: Arc<FakeIssuer>,
    pub checkout: CheckoutApi<SqliteDatabase>,
    pub accounts: AccountsApi<SqliteDatabase>,
}

impl TestStore {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default(), 3).await
    }

    pub async fn with_producers(producers: EventProducers, max_attempts: i64) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 25).await.expect("Error creating database");
        for product in test_products() {
            db.upsert_product(product).await.expect("Error seeding product");
        }
        let config = db.upsert_gateway_config(test_gateway_config(FAKE_GATEWAY)).await.expect("Error seeding gateway");
        let processor = Arc::new(FakeProcessor::default());
        let mut registry = GatewayRegistry::default();
        registry.register(config, processor.clone()).expect("Error registering fake gateway");
        let issuer = Arc::new(FakeIssuer::default());
        let fulfillment = FulfillmentApi::new(db.clone(), issuer.clone(), max_attempts, producers.clone());
        let checkout = CheckoutApi::new(db.clone(), Arc::new(registry), fulfillment, producers);
        let accounts = AccountsApi::new(db.clone());
        Self { url, db, processor, issuer, checkout, accounts }
    }

    pub fn reconciler(&self) -> &ReconcilerApi<SqliteDatabase> {
        self.checkout.reconciler()
    }

    pub fn fulfillment(&self) -> &FulfillmentApi<SqliteDatabase> {
        self.checkout.fulfillment()
    }

    pub async fn teardown(self) {
        self.db.close().await;
        drop_database(&self.url).await;
    }
}
