use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::entities::payment_instrument;
use crate::errors::ServiceError;

/// Gateway identifier of a captured charge. Required for refunds; stored on
/// the order exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeId(String);

impl ChargeId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Parses a stored charge reference. `None` or an empty/blank string
    /// means the order was never actually captured, which makes a refund
    /// impossible by definition.
    pub fn from_stored(raw: Option<&str>) -> Result<Self, ServiceError> {
        match raw.map(str::trim) {
            Some(s) if !s.is_empty() => Ok(Self(s.to_string())),
            _ => Err(ServiceError::RefundFailed(
                "Order has no usable charge reference".to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChargeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gateway identifier of a payment intent. Distinct from [`ChargeId`] —
/// the two are not interchangeable and refunds only accept the latter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Captured,
    Pending,
}

#[derive(Debug, Clone)]
pub struct ChargeOutcome {
    pub charge_id: ChargeId,
    pub intent_id: Option<PaymentIntentId>,
    pub status: ChargeStatus,
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund_id: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct AttachedInstrument {
    pub token: String,
    pub brand: Option<String>,
    pub last_four: Option<String>,
}

/// A charge request in gateway terms: minor currency units, an opaque
/// instrument token, and the client's idempotency key passed through
/// verbatim so retried checkouts cannot double-charge.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub instrument_token: String,
    pub customer_id: Uuid,
    pub idempotency_key: Option<String>,
}

/// Errors surfaced by a payment gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The gateway processed the request and said no (insufficient funds,
    /// additional authentication required, expired card, ...).
    #[error("declined: {reason}")]
    Declined { reason: String },

    /// The gateway could not be reached or returned garbage.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// The payment processor, seen from the core. Implemented over HTTP in
/// production and by mocks in tests.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError>;

    async fn refund(
        &self,
        charge_id: &ChargeId,
        amount_minor: Option<i64>,
    ) -> Result<RefundOutcome, GatewayError>;

    async fn attach_instrument(
        &self,
        customer_id: Uuid,
        token: &str,
    ) -> Result<AttachedInstrument, GatewayError>;

    async fn detach_instrument(&self, token: &str) -> Result<(), GatewayError>;
}

/// How the client wants to pay: a saved instrument or a fresh gateway token.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum PaymentMethodRequest {
    Saved {
        saved_instrument_id: Uuid,
    },
    Fresh {
        token: String,
        #[serde(default)]
        save_for_future: bool,
    },
}

#[derive(Debug, Clone)]
pub struct ResolvedInstrument {
    pub token: String,
    pub save_after_charge: bool,
}

/// Rounds a money amount to two decimal places.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts a decimal money amount to minor currency units (cents).
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    let cents = round_money(amount) * Decimal::ONE_HUNDRED;
    cents.to_i64().ok_or_else(|| {
        ServiceError::InternalError(format!("Amount {amount} out of range for minor units"))
    })
}

/// Resolves instruments, charges totals, and issues refunds against the
/// configured gateway.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentOrchestrator {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// Resolves the requested payment method to a chargeable token,
    /// enforcing that a saved instrument belongs to the caller.
    pub async fn resolve_instrument<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
        request: &PaymentMethodRequest,
    ) -> Result<ResolvedInstrument, ServiceError> {
        match request {
            PaymentMethodRequest::Saved {
                saved_instrument_id,
            } => {
                let saved = payment_instrument::Entity::find_by_id(*saved_instrument_id)
                    .one(conn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "Payment instrument {saved_instrument_id} not found"
                        ))
                    })?;

                if saved.customer_id != customer_id {
                    return Err(ServiceError::Forbidden(
                        "Payment instrument belongs to a different customer".to_string(),
                    ));
                }

                Ok(ResolvedInstrument {
                    token: saved.gateway_token,
                    save_after_charge: false,
                })
            }
            PaymentMethodRequest::Fresh {
                token,
                save_for_future,
            } => {
                if token.trim().is_empty() {
                    return Err(ServiceError::ValidationError(
                        "Payment token must not be empty".to_string(),
                    ));
                }
                Ok(ResolvedInstrument {
                    token: token.clone(),
                    save_after_charge: *save_for_future,
                })
            }
        }
    }

    /// Charges the order total. Declines become `PaymentDeclined`; transport
    /// failures become `ExternalServiceError`.
    #[instrument(skip(self, instrument), fields(customer_id = %customer_id, %total))]
    pub async fn charge_total(
        &self,
        customer_id: Uuid,
        total: Decimal,
        currency: &str,
        instrument: &ResolvedInstrument,
        idempotency_key: Option<&str>,
    ) -> Result<ChargeOutcome, ServiceError> {
        let request = ChargeRequest {
            amount_minor: to_minor_units(total)?,
            currency: currency.to_string(),
            instrument_token: instrument.token.clone(),
            customer_id,
            idempotency_key: idempotency_key.map(str::to_string),
        };

        self.gateway.charge(&request).await.map_err(|e| match e {
            GatewayError::Declined { reason } => ServiceError::PaymentDeclined(reason),
            GatewayError::Unavailable(msg) => ServiceError::ExternalServiceError(msg),
        })
    }

    /// Refunds a captured charge, in full unless a partial amount is given.
    /// Any gateway failure here is a `RefundFailed` so the caller can keep
    /// the status change and the refund atomic.
    #[instrument(skip(self))]
    pub async fn refund(
        &self,
        stored_charge_ref: Option<&str>,
        amount: Option<Decimal>,
    ) -> Result<RefundOutcome, ServiceError> {
        let charge_id = ChargeId::from_stored(stored_charge_ref)?;
        let amount_minor = amount.map(to_minor_units).transpose()?;

        self.gateway
            .refund(&charge_id, amount_minor)
            .await
            .map_err(|e| ServiceError::RefundFailed(e.to_string()))
    }

    /// Attaches the instrument to the customer's gateway profile and records
    /// the local reference. Runs only after a successful charge; failure is
    /// logged and swallowed because the order already stands.
    pub async fn save_instrument_best_effort<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
        token: &str,
    ) -> Option<payment_instrument::Model> {
        let attached = match self.gateway.attach_instrument(customer_id, token).await {
            Ok(attached) => attached,
            Err(e) => {
                warn!(%customer_id, error = %e, "Could not attach payment instrument; order stands");
                return None;
            }
        };

        let row = payment_instrument::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            gateway_token: Set(attached.token),
            brand: Set(attached.brand),
            last_four: Set(attached.last_four),
            created_at: Set(Utc::now()),
        };

        match row.insert(conn).await {
            Ok(model) => Some(model),
            Err(e) => {
                warn!(%customer_id, error = %e, "Could not persist payment instrument; order stands");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct GatewayChargeResponse {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    status: String,
    #[serde(default)]
    decline_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayRefundResponse {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct GatewayInstrumentResponse {
    token: String,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    last4: Option<String>,
}

/// HTTP implementation of [`PaymentGateway`].
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    secret: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .expect("reqwest client"),
            base_url,
            secret,
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.secret {
            Some(secret) => builder.bearer_auth(secret),
            None => builder,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
        let url = format!("{}/v1/charges", self.base_url);
        let mut builder = self.authorized(self.client.post(&url)).json(&serde_json::json!({
            "amount": request.amount_minor,
            "currency": request.currency,
            "source": request.instrument_token,
            "customer": request.customer_id,
        }));
        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::PAYMENT_REQUIRED {
            let body: GatewayChargeResponse = response
                .json()
                .await
                .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
            return Err(GatewayError::Declined {
                reason: body
                    .decline_reason
                    .unwrap_or_else(|| "Charge declined".to_string()),
            });
        }
        if !response.status().is_success() {
            return Err(GatewayError::Unavailable(format!(
                "charge endpoint returned {}",
                response.status()
            )));
        }

        let body: GatewayChargeResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        match body.status.as_str() {
            "succeeded" | "captured" => Ok(ChargeOutcome {
                charge_id: ChargeId::new(body.id),
                intent_id: body.payment_intent.map(PaymentIntentId),
                status: ChargeStatus::Captured,
            }),
            "pending" => Ok(ChargeOutcome {
                charge_id: ChargeId::new(body.id),
                intent_id: body.payment_intent.map(PaymentIntentId),
                status: ChargeStatus::Pending,
            }),
            other => Err(GatewayError::Declined {
                reason: body
                    .decline_reason
                    .unwrap_or_else(|| format!("Charge status: {other}")),
            }),
        }
    }

    async fn refund(
        &self,
        charge_id: &ChargeId,
        amount_minor: Option<i64>,
    ) -> Result<RefundOutcome, GatewayError> {
        let url = format!("{}/v1/refunds", self.base_url);
        let mut payload = serde_json::json!({ "charge": charge_id.as_str() });
        if let Some(amount) = amount_minor {
            payload["amount"] = serde_json::json!(amount);
        }

        let response = self
            .authorized(self.client.post(&url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Unavailable(format!(
                "refund endpoint returned {}",
                response.status()
            )));
        }

        let body: GatewayRefundResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(RefundOutcome {
            refund_id: body.id,
            status: body.status,
        })
    }

    async fn attach_instrument(
        &self,
        customer_id: Uuid,
        token: &str,
    ) -> Result<AttachedInstrument, GatewayError> {
        let url = format!("{}/v1/customers/{}/instruments", self.base_url, customer_id);
        let response = self
            .authorized(self.client.post(&url))
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Unavailable(format!(
                "attach endpoint returned {}",
                response.status()
            )));
        }

        let body: GatewayInstrumentResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(AttachedInstrument {
            token: body.token,
            brand: body.brand,
            last_four: body.last4,
        })
    }

    async fn detach_instrument(&self, token: &str) -> Result<(), GatewayError> {
        let url = format!("{}/v1/instruments/{}", self.base_url, token);
        let response = self
            .authorized(self.client.delete(&url))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Unavailable(format!(
                "detach endpoint returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
