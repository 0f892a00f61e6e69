use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::ErrorResponse;
use crate::handlers::orders::{OrderDetailResponse, OrderItemResponse, OrderResponse};
use crate::services::checkout::PlaceOrderRequest;
use crate::services::delivery::DeliveryAddress;
use crate::services::geocoding::PostalAddress;
use crate::services::order_status::UpdateStatusRequest;
use crate::services::payments::PaymentMethodRequest;
use crate::services::pricing::CartLine;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Streetbite API",
        description = "Order checkout and lifecycle management for the Streetbite food-truck marketplace"
    ),
    paths(
        crate::handlers::orders::place_order,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_my_order,
        crate::handlers::orders::request_cancellation,
        crate::handlers::operator_orders::list_operator_orders,
        crate::handlers::operator_orders::update_order_status,
    ),
    components(schemas(
        PlaceOrderRequest,
        UpdateStatusRequest,
        CartLine,
        DeliveryAddress,
        PostalAddress,
        PaymentMethodRequest,
        OrderResponse,
        OrderItemResponse,
        OrderDetailResponse,
        ErrorResponse,
    )),
    tags(
        (name = "orders", description = "Customer checkout and order tracking"),
        (name = "operator-orders", description = "Operator order fulfillment"),
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at `/docs`, serving the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
