//! Test harness: in-memory SQLite, real migrations, and mock external
//! collaborators (payment gateway, geocoder, notification channel).

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use chrono::Utc;
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;
use uuid::Uuid;

use streetbite_api::auth::{Role, USER_ID_HEADER, USER_ROLE_HEADER};
use streetbite_api::config::AppConfig;
use streetbite_api::db::{self, DbConfig};
use streetbite_api::entities::{
    customer_address, food_truck, food_truck::TruckStatus, menu_category, menu_item,
    menu_item_option, payment_instrument,
};
use streetbite_api::errors::ServiceError;
use streetbite_api::events::EventSender;
use streetbite_api::handlers::AppServices;
use streetbite_api::services::checkout::CheckoutSettings;
use streetbite_api::services::geocoding::{Coordinates, Geocoder, PostalAddress};
use streetbite_api::services::notifications::{InProcessChannel, NoopEmailSender};
use streetbite_api::services::payments::{
    AttachedInstrument, ChargeId, ChargeOutcome, ChargeRequest, ChargeStatus, GatewayError,
    PaymentGateway, PaymentIntentId, RefundOutcome,
};
use streetbite_api::{api_v1_routes, AppState};

pub type Sabotage = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Payment gateway double. Records every call; can decline the next charge,
/// fail refunds, or run a sabotage hook during `charge` to simulate state
/// changing while the gateway call is in flight.
#[derive(Default)]
pub struct MockGateway {
    pub charges: Mutex<Vec<ChargeRequest>>,
    pub refunds: Mutex<Vec<(String, Option<i64>)>>,
    pub attached: Mutex<Vec<(Uuid, String)>>,
    pub decline_next: AtomicBool,
    pub fail_refunds: AtomicBool,
    pub sabotage: Mutex<Option<Sabotage>>,
    counter: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn charge_count(&self) -> usize {
        self.charges.lock().unwrap().len()
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.lock().unwrap().len()
    }

    pub fn last_charge(&self) -> Option<ChargeRequest> {
        self.charges.lock().unwrap().last().cloned()
    }

    pub fn set_sabotage(&self, hook: Sabotage) {
        *self.sabotage.lock().unwrap() = Some(hook);
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
        if self.decline_next.swap(false, Ordering::SeqCst) {
            return Err(GatewayError::Declined {
                reason: "insufficient funds".to_string(),
            });
        }

        let hook = self.sabotage.lock().unwrap().take();
        if let Some(hook) = hook {
            hook().await;
        }

        self.charges.lock().unwrap().push(request.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(ChargeOutcome {
            charge_id: ChargeId::new(format!("ch_{n}")),
            intent_id: Some(PaymentIntentId(format!("pi_{n}"))),
            status: ChargeStatus::Captured,
        })
    }

    async fn refund(
        &self,
        charge_id: &ChargeId,
        amount_minor: Option<i64>,
    ) -> Result<RefundOutcome, GatewayError> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable(
                "refund endpoint timed out".to_string(),
            ));
        }

        self.refunds
            .lock()
            .unwrap()
            .push((charge_id.as_str().to_string(), amount_minor));
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(RefundOutcome {
            refund_id: format!("re_{n}"),
            status: "succeeded".to_string(),
        })
    }

    async fn attach_instrument(
        &self,
        customer_id: Uuid,
        token: &str,
    ) -> Result<AttachedInstrument, GatewayError> {
        self.attached
            .lock()
            .unwrap()
            .push((customer_id, token.to_string()));
        Ok(AttachedInstrument {
            token: token.to_string(),
            brand: Some("visa".to_string()),
            last_four: Some("4242".to_string()),
        })
    }

    async fn detach_instrument(&self, _token: &str) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Geocoder double returning a configurable fixed coordinate pair.
pub struct MockGeocoder {
    pub coords: Mutex<Coordinates>,
}

impl MockGeocoder {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            coords: Mutex::new(Coordinates {
                latitude,
                longitude,
            }),
        }
    }

    pub fn set_coords(&self, latitude: f64, longitude: f64) {
        *self.coords.lock().unwrap() = Coordinates {
            latitude,
            longitude,
        };
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn geocode(&self, _address: &PostalAddress) -> Result<Coordinates, ServiceError> {
        Ok(*self.coords.lock().unwrap())
    }

    async fn reverse_geocode(&self, _coords: &Coordinates) -> Result<PostalAddress, ServiceError> {
        Ok(sample_address())
    }
}

pub fn sample_address() -> PostalAddress {
    PostalAddress {
        street: "800 Valencia St".into(),
        unit: None,
        city: "San Francisco".into(),
        state: "CA".into(),
        postal_code: "94110".into(),
        country: "US".into(),
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        host: "127.0.0.1".into(),
        port: 18080,
        environment: "test".into(),
        log_level: "info".into(),
        log_json: false,
        auto_migrate: true,
        cors_allowed_origins: None,
        db_max_connections: 1,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        db_idle_timeout_secs: 60,
        db_acquire_timeout_secs: 5,
        currency: "USD".into(),
        tax_rate: 0.10,
        delivery_buffer_minutes: 15,
        payment_gateway_url: "http://gateway.invalid".into(),
        payment_gateway_secret: None,
        geocoder_url: "http://geocoder.invalid".into(),
        geocoder_user_agent: "streetbite-tests".into(),
        email_endpoint: None,
        email_from: "orders@test.invalid".into(),
        event_channel_capacity: 64,
    }
}

/// The application wired against mocks, with direct service access for
/// service-level tests and a router for HTTP-level tests.
pub struct TestApp {
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub services: AppServices,
    pub state: AppState,
    pub router: Router,
    pub gateway: Arc<MockGateway>,
    pub geocoder: Arc<MockGeocoder>,
    pub channel: Arc<InProcessChannel>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let cfg = test_config();

        // A single connection keeps every handle on the same in-memory DB.
        let db_cfg = DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&db_cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = tokio::sync::mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(streetbite_api::events::process_events(event_rx));

        let gateway = Arc::new(MockGateway::new());
        // Default destination ~1.5 km from the default truck location.
        let geocoder = Arc::new(MockGeocoder::new(37.7620, -122.4350));
        let channel = Arc::new(InProcessChannel::new());

        let settings = CheckoutSettings {
            currency: cfg.currency.clone(),
            tax_rate: dec!(0.10),
            delivery_buffer_minutes: cfg.delivery_buffer_minutes,
        };

        let services = AppServices::new(
            db.clone(),
            event_sender.clone(),
            gateway.clone(),
            geocoder.clone(),
            channel.clone(),
            Arc::new(NoopEmailSender),
            settings,
        );

        let state = AppState {
            db: db.clone(),
            config: cfg,
            event_sender,
            services: services.clone(),
        };

        let router = Router::new()
            .nest("/api/v1", api_v1_routes())
            .with_state(state.clone());

        Self {
            db,
            services,
            state,
            router,
            gateway,
            geocoder,
            channel,
            _event_task: event_task,
        }
    }

    pub fn subscribe(&self, user_id: Uuid) -> UnboundedReceiver<Value> {
        self.channel.subscribe(user_id)
    }

    // ---- seeding ----------------------------------------------------------

    /// Truck at 18th & Dolores, delivery within 5 km, $15 minimum.
    pub async fn seed_truck(&self, operator_id: Uuid, status: TruckStatus) -> food_truck::Model {
        let truck = food_truck::ActiveModel {
            id: Set(Uuid::new_v4()),
            operator_id: Set(operator_id),
            name: Set("El Fuego".into()),
            description: Set(Some("Wood-fired tacos".into())),
            current_status: Set(status),
            pickup_address: Set("3750 18th St, San Francisco, CA 94114, US".into()),
            latitude: Set(37.7614),
            longitude: Set(-122.4265),
            delivery_enabled: Set(true),
            delivery_fee: Set(dec!(3.50)),
            delivery_minimum: Set(dec!(15.00)),
            delivery_radius_km: Set(5.0),
            default_prep_minutes: Set(20),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };
        truck.insert(&*self.db).await.expect("seed truck")
    }

    pub async fn seed_category(
        &self,
        truck_id: Uuid,
        name: &str,
        is_available: bool,
    ) -> menu_category::Model {
        let category = menu_category::ActiveModel {
            id: Set(Uuid::new_v4()),
            food_truck_id: Set(truck_id),
            name: Set(name.into()),
            is_available: Set(is_available),
            position: Set(0),
        };
        category.insert(&*self.db).await.expect("seed category")
    }

    pub async fn seed_item(
        &self,
        truck_id: Uuid,
        category_id: Uuid,
        name: &str,
        price: Decimal,
        is_available: bool,
    ) -> menu_item::Model {
        let item = menu_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            food_truck_id: Set(truck_id),
            category_id: Set(category_id),
            name: Set(name.into()),
            description: Set(None),
            base_price: Set(price),
            is_available: Set(is_available),
        };
        item.insert(&*self.db).await.expect("seed item")
    }

    pub async fn seed_option(
        &self,
        menu_item_id: Uuid,
        name: &str,
        adjustment: Decimal,
    ) -> menu_item_option::Model {
        let option = menu_item_option::ActiveModel {
            id: Set(Uuid::new_v4()),
            menu_item_id: Set(menu_item_id),
            name: Set(name.into()),
            price_adjustment: Set(adjustment),
        };
        option.insert(&*self.db).await.expect("seed option")
    }

    pub async fn seed_saved_address(&self, customer_id: Uuid) -> customer_address::Model {
        let address = customer_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            label: Set(Some("home".into())),
            street: Set("800 Valencia St".into()),
            unit: Set(None),
            city: Set("San Francisco".into()),
            state: Set("CA".into()),
            postal_code: Set("94110".into()),
            country: Set("US".into()),
        };
        address.insert(&*self.db).await.expect("seed address")
    }

    pub async fn seed_instrument(&self, customer_id: Uuid) -> payment_instrument::Model {
        let instrument = payment_instrument::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            gateway_token: Set("tok_saved_visa".into()),
            brand: Set(Some("visa".into())),
            last_four: Set(Some("4242".into())),
            created_at: Set(Utc::now()),
        };
        instrument.insert(&*self.db).await.expect("seed instrument")
    }

    /// Seeds a truck with one category, two items, and one option on the
    /// first item. Returns (truck, item, other_item, option).
    pub async fn seed_standard_menu(
        &self,
        operator_id: Uuid,
    ) -> (
        food_truck::Model,
        menu_item::Model,
        menu_item::Model,
        menu_item_option::Model,
    ) {
        let truck = self.seed_truck(operator_id, TruckStatus::Online).await;
        let category = self.seed_category(truck.id, "Tacos", true).await;
        let item = self
            .seed_item(truck.id, category.id, "Carnitas Taco", dec!(6.50), true)
            .await;
        let other = self
            .seed_item(truck.id, category.id, "Veggie Taco", dec!(5.00), true)
            .await;
        let option = self.seed_option(item.id, "Extra salsa", dec!(0.75)).await;
        (truck, item, other, option)
    }

    // ---- HTTP helpers -----------------------------------------------------

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user: Option<(Uuid, Role)>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = user {
            builder = builder
                .header(USER_ID_HEADER, id.to_string())
                .header(USER_ROLE_HEADER, role.to_string());
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        self.router.clone().oneshot(request).await.expect("response")
    }
}

pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}
