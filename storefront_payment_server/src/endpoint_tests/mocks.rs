use async_trait::async_trait;
use mockall::mock;
use serde_json::Value;
use sfp_integrations::{
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
use storefront_payment_engine::{
    db_types::{
        BalanceEntry,
        LineItem,
        Order,
        OrderNumber,
        PaymentAuditEntry,
        PaymentIntent,
        ProvisioningResult,
        UserAccount,
        WebhookEvent,
    },
    AccountApiError,
    AccountManagement,
};

mock! {
    pub AccountManager {}
    impl AccountManagement for AccountManager {
        async fn fetch_user_account_for_customer_id(&self, customer_id: &str) -> Result<Option<UserAccount>, AccountApiError>;
        async fn fetch_balance_history(&self, customer_id: &str) -> Result<Vec<BalanceEntry>, AccountApiError>;
        async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, AccountApiError>;
        async fn fetch_orders_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, AccountApiError>;
        async fn fetch_line_items(&self, order_id: i64) -> Result<Vec<LineItem>, AccountApiError>;
        async fn fetch_provisioning_results(&self, order_id: i64) -> Result<Vec<ProvisioningResult>, AccountApiError>;
        async fn fetch_payment_intent(&self, intent_id: &str) -> Result<Option<PaymentIntent>, AccountApiError>;
        async fn fetch_orders_for_payment_intent(&self, intent_id: &str) -> Result<Vec<Order>, AccountApiError>;
        async fn fetch_payment_audit(&self, intent_id: &str) -> Result<Vec<PaymentAuditEntry>, AccountApiError>;
        async fn fetch_webhook_events(&self, gateway_code: &str, external_reference: &str) -> Result<Vec<WebhookEvent>, AccountApiError>;
    }
}

mock! {
    pub Issuer {}
    #[async_trait]
    impl CredentialIssuer for Issuer {
        async fn issue(&self, order_number: &str, request: &ProvisioningRequest) -> Result<Vec<Credential>, ProvisioningError>;
    }
}

mock! {
    pub Processor {}
    #[async_trait]
    impl PaymentProcessor for Processor {
        fn name(&self) -> &'static str;
        fn signature_header(&self) -> &'static str;
        fn initialize(&self, settings: &ProcessorSettings) -> Result<GatewayContext, GatewayError>;
        async fn create_charge(&self, ctx: &GatewayContext, request: ChargeRequest) -> Result<ChargeResponse, GatewayError>;
        async fn get_status(&self, ctx: &GatewayContext, external_reference: &str) -> Result<String, GatewayError>;
        fn verify_signature(&self, ctx: &GatewayContext, raw_payload: &[u8], signature: &str) -> bool;
        fn parse_notification(&self, payload: &Value) -> Result<Notification, GatewayError>;
        fn map_status(&self, native_status: &str) -> StatusMapping;
    }
}
