//! Applies payment processor status changes to payment intents and their orders.
//!
//! Status changes arrive from three places: webhooks, the background status poll, and local events such as a buyer
//! cancelling or a payment window expiring. All of them go through [`ReconcilerApi::apply_transition`], which enforces
//! the payment state machine and uses compare-and-set updates, so concurrent deliveries of the same change produce a
//! single transition.
use std::{fmt::Debug, sync::Arc};

use chrono::Duration;
use log::*;
use serde::Serialize;
use serde_json::Value;
use sfp_common::PaymentStatus;
use sfp_integrations::StatusMapping;

use crate::{
    db_types::{NewWebhookEvent, PaymentIntent, PaymentPurpose, TransitionSource},
    events::{EventProducers, PaymentStatusChangedEvent},
    gateways::GatewayRegistry,
    helpers::payload_hash,
    spe_api::{
        checkout_objects::{ReconcileOutcome, WebhookOutcome},
        errors::{ReconcileError, WebhookError},
        fulfillment_api::FulfillmentApi,
    },
    traits::{StorefrontDatabase, TransitionOutcome, TransitionRequest},
};

/// How many times a compare-and-set transition is retried after losing a race before giving up.
const MAX_TRANSITION_ATTEMPTS: usize = 3;
/// How long after a charge is created a webhook for an unknown reference is sent back for redelivery.
const UNATTACHED_CHARGE_WINDOW_SECS: i64 = 120;

/// A summary of one status poll run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollSummary {
    pub polled: usize,
    pub applied: usize,
    pub unchanged: usize,
    pub rejected: usize,
    pub errors: usize,
}

#[derive(Clone)]
pub struct ReconcilerApi<B> {
    db: B,
    registry: Arc<GatewayRegistry>,
    fulfillment: FulfillmentApi<B>,
    producers: EventProducers,
}

impl<B> Debug for ReconcilerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconcilerApi ({:?})", self.registry.codes())
    }
}

impl<B> ReconcilerApi<B> {
    pub fn new(
        db: B,
        registry: Arc<GatewayRegistry>,
        fulfillment: FulfillmentApi<B>,
        producers: EventProducers,
    ) -> Self {
        Self { db, registry, fulfillment, producers }
    }

    pub fn registry(&self) -> &GatewayRegistry {
        &self.registry
    }
}

impl<B> ReconcilerApi<B>
where B: StorefrontDatabase
{
    /// Moves `intent` to the payment status in `mapping`.
    ///
    /// * If the intent already has that status, nothing happens.
    /// * A `Pending` intent reported as `Completed` passes through `Confirming` first. Both hops are written to the
    ///   audit trail.
    /// * If the move is not an edge of the payment state machine, it is written to the audit trail as a rejected
    ///   transition and logged for manual review. The intent is left untouched.
    /// * Otherwise the transition is applied. If another writer got there first, the intent is re-read and the checks
    ///   are repeated.
    ///
    /// A checkout intent that reaches `Completed` has its orders provisioned before this call returns.
    pub async fn apply_transition(
        &self,
        intent: PaymentIntent,
        mapping: StatusMapping,
        source: TransitionSource,
        note: Option<String>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let target = mapping.payment;
        let mut current = intent;
        // Set once an intermediate hop has been applied
        let mut hopped_from = None;
        let mut stale_attempts = 0;
        while stale_attempts < MAX_TRANSITION_ATTEMPTS {
            let from = current.status;
            if from == target {
                // Also reached when another writer completed the final hop after ours
                trace!("🪝 Payment {} is already {target}", current.id);
                return Ok(ReconcileOutcome::Unchanged { status: from });
            }
            let step = match (from, target) {
                (PaymentStatus::Pending, PaymentStatus::Completed) => {
                    StatusMapping::for_payment(PaymentStatus::Confirming)
                },
                _ => mapping,
            };
            if !from.can_transition_to(step.payment) {
                warn!(
                    "🪝 IllegalTransition: payment {} cannot move from {from} to {target} (source: {source}). The \
                     change was not applied and needs manual review.",
                    current.id
                );
                let note = note.clone().unwrap_or_else(|| "illegal transition".to_string());
                self.db.record_rejected_transition(&current.id, from, target, source, &note).await?;
                return Ok(ReconcileOutcome::Rejected { from, to: target });
            }
            let request = TransitionRequest {
                intent_id: current.id.clone(),
                from,
                to: step.payment,
                order_status: step.order,
                source,
                note: note.clone(),
            };
            match self.db.transition_payment(request).await? {
                TransitionOutcome::Applied { intent, orders, credited } => {
                    info!("🪝 Payment {} moved from {from} to {} (source: {source})", intent.id, step.payment);
                    if let Some(amount) = credited {
                        info!("🪝 Deposit {} credited {amount} to customer {}", intent.id, intent.customer_id);
                    }
                    let completed_checkout =
                        intent.status == PaymentStatus::Completed && intent.purpose == PaymentPurpose::Checkout;
                    let event = PaymentStatusChangedEvent::new(intent.clone(), from, source);
                    self.producers.publish_payment_status_changed(event).await;
                    if step.payment != target {
                        hopped_from = Some(from);
                        current = intent;
                        continue;
                    }
                    if completed_checkout {
                        let reports = self.fulfillment.provision_orders(&orders).await;
                        debug!("🪝 Provisioning after payment completion: {reports:?}");
                    }
                    return Ok(ReconcileOutcome::Applied { from: hopped_from.unwrap_or(from), to: target });
                },
                TransitionOutcome::Stale { current: latest } => {
                    debug!(
                        "🪝 Payment {} changed from {from} to {} while a transition to {target} was being applied. \
                         Retrying.",
                        latest.id, latest.status
                    );
                    stale_attempts += 1;
                    current = latest;
                },
            }
        }
        Err(ReconcileError::DatabaseError(format!(
            "Payment {} kept changing while a transition to {target} was being applied",
            current.id
        )))
    }

    /// Handles a webhook delivery from the gateway registered as `gateway_code`.
    ///
    /// Returns an error only when the delivery should be retried by the processor: an unknown gateway, a bad
    /// signature, or a failure to persist the outcome. Everything else is acknowledged, including malformed payloads
    /// and notifications for payments we do not know about.
    ///
    /// A processor can notify us before `create_charge` has returned the reference. While a charge at this gateway
    /// from the last two minutes has no reference, an unknown reference fails with
    /// [`WebhookError::ReferenceNotYetAttached`] so the processor delivers it again.
    pub async fn process_webhook(
        &self,
        gateway_code: &str,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let gateway =
            self.registry.get(gateway_code).ok_or_else(|| WebhookError::UnknownGateway(gateway_code.to_string()))?;
        let payload = match serde_json::from_slice::<Value>(raw_payload) {
            Ok(v) => v,
            Err(e) => {
                warn!("🪝 MalformedWebhook from {gateway_code}: the body is not valid JSON. {e}");
                return Ok(WebhookOutcome::Malformed { reason: e.to_string() });
            },
        };
        let notification = match gateway.processor.parse_notification(&payload) {
            Ok(n) => n,
            Err(e) => {
                warn!("🪝 MalformedWebhook from {gateway_code}: {e}");
                return Ok(WebhookOutcome::Malformed { reason: e.to_string() });
            },
        };
        let signed = !gateway.context.credentials().webhook_secret.is_empty();
        if !gateway.processor.verify_signature(&gateway.context, raw_payload, signature.unwrap_or_default()) {
            warn!(
                "🪝 Webhook from {gateway_code} for {} failed signature verification. Ignoring it.",
                notification.external_reference
            );
            return Err(WebhookError::InvalidSignature);
        }
        let reference = notification.external_reference.as_str();
        let hash = payload_hash(raw_payload);
        if self.db.webhook_event_exists(gateway_code, reference, &hash).await? {
            info!("🪝 Duplicate webhook from {gateway_code} for {reference}. Already processed.");
            return Ok(WebhookOutcome::Duplicate);
        }
        let Some(intent) = self.db.fetch_payment_intent_by_reference(gateway_code, reference).await? else {
            let window = Duration::seconds(UNATTACHED_CHARGE_WINDOW_SECS);
            if self.db.has_unattached_charges(gateway_code, window).await? {
                info!(
                    "🪝 Webhook from {gateway_code} refers to unknown payment {reference} while a charge is still \
                     being created. Asking for redelivery."
                );
                return Err(WebhookError::ReferenceNotYetAttached {
                    gateway: gateway_code.to_string(),
                    reference: reference.to_string(),
                });
            }
            warn!("🪝 Webhook from {gateway_code} refers to unknown payment {reference}. Acknowledging and ignoring.");
            return Ok(WebhookOutcome::UnknownReference { external_reference: reference.to_string() });
        };
        let payment_id = intent.id.clone();
        let mapping = gateway.processor.map_status(&notification.native_status);
        debug!(
            "🪝 Webhook from {gateway_code}: payment {payment_id} reports '{}', which maps to {}",
            notification.native_status, mapping.payment
        );
        let note = format!("{gateway_code} reported '{}'", notification.native_status);
        let outcome = self
            .apply_transition(intent, mapping, TransitionSource::Webhook, Some(note))
            .await
            .map_err(|e| WebhookError::Persistence(e.to_string()))?;
        // Only recorded once the transition has been handled, so a crash before this point leads to a redelivery
        let event = NewWebhookEvent {
            gateway_code: gateway_code.to_string(),
            external_reference: reference.to_string(),
            payload_hash: hash,
            signature_valid: signed,
            outcome: outcome.to_string(),
        };
        if !self.db.record_webhook_event(event).await? {
            debug!("🪝 Webhook from {gateway_code} for {reference} was recorded concurrently by another delivery");
        }
        Ok(WebhookOutcome::Reconciled { payment_id, outcome })
    }

    /// Asks the processor for the current status of the payment and applies it.
    pub async fn poll_payment(&self, intent: PaymentIntent) -> Result<ReconcileOutcome, ReconcileError> {
        let gateway = self
            .registry
            .get(&intent.gateway_code)
            .ok_or_else(|| ReconcileError::UnknownGateway(intent.gateway_code.clone()))?;
        let Some(reference) = intent.external_reference.clone() else {
            debug!("🕰️ Payment {} has no external reference yet. Nothing to poll.", intent.id);
            return Ok(ReconcileOutcome::Unchanged { status: intent.status });
        };
        let native_status = gateway.processor.get_status(&gateway.context, &reference).await?;
        let mapping = gateway.processor.map_status(&native_status);
        let note = format!("{} poll returned '{native_status}'", intent.gateway_code);
        self.apply_transition(intent, mapping, TransitionSource::Poll, Some(note)).await
    }

    /// Polls every unsettled payment that has not changed for at least `min_age`. Individual failures are logged and
    /// counted; they do not stop the run.
    pub async fn poll_unsettled_payments(&self, min_age: Duration) -> Result<PollSummary, ReconcileError> {
        let intents = self.db.fetch_unsettled_intents(min_age).await?;
        let mut summary = PollSummary { polled: intents.len(), ..Default::default() };
        for intent in intents {
            let id = intent.id.clone();
            match self.poll_payment(intent).await {
                Ok(ReconcileOutcome::Applied { .. }) => summary.applied += 1,
                Ok(ReconcileOutcome::Unchanged { .. }) => summary.unchanged += 1,
                Ok(ReconcileOutcome::Rejected { .. }) => summary.rejected += 1,
                Err(e) => {
                    warn!("🕰️ Could not poll the status of payment {id}: {e}");
                    summary.errors += 1;
                },
            }
        }
        Ok(summary)
    }

    /// Expires every `Pending` payment created more than `older_than` ago. Returns the number of payments expired.
    pub async fn expire_stale_payments(&self, older_than: Duration) -> Result<usize, ReconcileError> {
        let intents = self.db.fetch_stale_pending_intents(older_than).await?;
        let mut expired = 0;
        for intent in intents {
            let mapping = StatusMapping::for_payment(PaymentStatus::Expired);
            let note = Some("payment window closed".to_string());
            let outcome = self.apply_transition(intent, mapping, TransitionSource::Expiry, note).await?;
            if matches!(outcome, ReconcileOutcome::Applied { .. }) {
                expired += 1;
            }
        }
        if expired > 0 {
            info!("🕰️ Expired {expired} stale payment(s)");
        }
        Ok(expired)
    }
}
