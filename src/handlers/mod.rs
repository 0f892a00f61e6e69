pub mod operator_orders;
pub mod orders;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::events::EventSender;
use crate::services::checkout::{CheckoutService, CheckoutSettings};
use crate::services::delivery::DeliveryResolver;
use crate::services::geocoding::Geocoder;
use crate::services::notifications::{EmailSender, NotificationDispatcher, RealtimeChannel};
use crate::services::order_status::OrderStatusService;
use crate::services::orders::OrderQueryService;
use crate::services::payments::{PaymentGateway, PaymentOrchestrator};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<CheckoutService>,
    pub order_status: Arc<OrderStatusService>,
    pub order_queries: Arc<OrderQueryService>,
}

impl AppServices {
    /// Wires the service graph around the injected external collaborators.
    /// Tests pass mocks for the gateway, geocoder, and channels.
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
        geocoder: Arc<dyn Geocoder>,
        realtime: Arc<dyn RealtimeChannel>,
        email: Arc<dyn EmailSender>,
        settings: CheckoutSettings,
    ) -> Self {
        let payments = PaymentOrchestrator::new(gateway);
        let delivery = DeliveryResolver::new(geocoder);
        let dispatcher = NotificationDispatcher::new(realtime, email);

        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            delivery,
            payments.clone(),
            dispatcher.clone(),
            event_sender.clone(),
            settings,
        ));
        let order_status = Arc::new(OrderStatusService::new(
            db.clone(),
            payments,
            dispatcher,
            event_sender,
        ));
        let order_queries = Arc::new(OrderQueryService::new(db));

        Self {
            checkout,
            order_status,
            order_queries,
        }
    }
}
