use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::order;
use crate::errors::ServiceError;

pub const NEW_ORDER_FOR_OPERATOR: &str = "new_order_for_operator";
pub const ORDER_STATUS_UPDATE_FOR_CUSTOMER: &str = "order_status_update_for_customer";
pub const CUSTOMER_CANCELLATION_REQUEST: &str = "customer_cancellation_request";

/// Push delivery to the live session(s) of a user.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn push(&self, user_id: Uuid, payload: Value) -> Result<(), ServiceError>;
}

/// Outbound email capability. Recipient resolution (user id to address) is
/// the channel provider's problem; from here it is fire-and-forget.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, recipient: Uuid, subject: &str, body: &str) -> Result<(), ServiceError>;
}

/// In-process session registry: each connected session holds an unbounded
/// receiver; pushes fan out to every live session of the user.
#[derive(Default)]
pub struct InProcessChannel {
    sessions: DashMap<Uuid, Vec<mpsc::UnboundedSender<Value>>>,
}

impl InProcessChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new live session for `user_id`.
    pub fn subscribe(&self, user_id: Uuid) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.entry(user_id).or_default().push(tx);
        rx
    }
}

#[async_trait]
impl RealtimeChannel for InProcessChannel {
    async fn push(&self, user_id: Uuid, payload: Value) -> Result<(), ServiceError> {
        if let Some(mut senders) = self.sessions.get_mut(&user_id) {
            senders.retain(|tx| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }
}

/// Email sender that logs instead of delivering; used in development and
/// tests, and as the fallback when no endpoint is configured.
pub struct NoopEmailSender;

#[async_trait]
impl EmailSender for NoopEmailSender {
    async fn send(&self, recipient: Uuid, subject: &str, _body: &str) -> Result<(), ServiceError> {
        debug!(%recipient, subject, "email suppressed (no delivery endpoint configured)");
        Ok(())
    }
}

/// Email sender that POSTs to a delivery endpoint.
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
    from: String,
}

impl HttpEmailSender {
    pub fn new(endpoint: String, from: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            endpoint,
            from,
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, recipient: Uuid, subject: &str, body: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "from": self.from,
                "recipient": recipient,
                "subject": subject,
                "body": body,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("email request: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "email endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

fn envelope(event: &str, data: Value) -> Value {
    json!({ "event": event, "data": data })
}

/// Post-commit fan-out. Every method here is best-effort: failures are
/// logged and never propagate into the already-committed transaction result.
#[derive(Clone)]
pub struct NotificationDispatcher {
    realtime: Arc<dyn RealtimeChannel>,
    email: Arc<dyn EmailSender>,
}

impl NotificationDispatcher {
    pub fn new(realtime: Arc<dyn RealtimeChannel>, email: Arc<dyn EmailSender>) -> Self {
        Self { realtime, email }
    }

    /// Tells the operator about a freshly committed order and mails the
    /// customer a confirmation.
    pub async fn order_placed(&self, order: &order::Model, operator_id: Uuid) {
        let payload = envelope(
            NEW_ORDER_FOR_OPERATOR,
            json!({
                "order_id": order.id,
                "order_number": order.order_number,
                "status": order.status.as_str(),
                "fulfillment_type": order.fulfillment_type.as_str(),
                "total_amount": order.total_amount,
                "order_time": order.order_time,
            }),
        );
        self.push_logged(operator_id, payload).await;

        self.email_logged(
            order.customer_id,
            &format!("Order {} received", order.order_number),
            &format!(
                "Thanks! Your order {} for {} {} is waiting for the truck to confirm.",
                order.order_number, order.total_amount, order.currency
            ),
        );
    }

    /// Tells the customer about a committed status change.
    pub async fn status_updated(&self, order: &order::Model) {
        let payload = envelope(
            ORDER_STATUS_UPDATE_FOR_CUSTOMER,
            json!({
                "order_id": order.id,
                "order_number": order.order_number,
                "new_status": order.status.as_str(),
                "reason": order.status_reason,
                "estimated_ready_time": order.estimated_ready_time,
                "estimated_delivery_time": order.estimated_delivery_time,
            }),
        );
        self.push_logged(order.customer_id, payload).await;

        self.email_logged(
            order.customer_id,
            &format!("Order {} is now {}", order.order_number, order.status.as_str()),
            &format!(
                "Your order {} moved to '{}'.",
                order.order_number,
                order.status.as_str()
            ),
        );
    }

    /// Tells the operator the customer wants out.
    pub async fn cancellation_requested(&self, order: &order::Model, operator_id: Uuid) {
        let payload = envelope(
            CUSTOMER_CANCELLATION_REQUEST,
            json!({
                "order_id": order.id,
                "order_number": order.order_number,
            }),
        );
        self.push_logged(operator_id, payload).await;
    }

    async fn push_logged(&self, user_id: Uuid, payload: Value) {
        if let Err(e) = self.realtime.push(user_id, payload).await {
            warn!(%user_id, error = %e, "realtime push failed");
        }
    }

    fn email_logged(&self, recipient: Uuid, subject: &str, body: &str) {
        let email = self.email.clone();
        let subject = subject.to_string();
        let body = body.to_string();
        tokio::spawn(async move {
            if let Err(e) = email.send(recipient, &subject, &body).await {
                warn!(%recipient, error = %e, "email send failed");
            }
        });
    }
}
