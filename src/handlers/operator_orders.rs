use axum::{
    extract::{Path, State},
    response::Json,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::handlers::orders::{map_order, OrderResponse};
use crate::services::order_status::UpdateStatusRequest;
use crate::{ApiResponse, AppState};

/// List orders across all of the calling operator's trucks.
#[utoipa::path(
    get,
    path = "/api/v1/operators/me/orders",
    responses(
        (status = 200, description = "Orders for the operator's trucks", body = ApiResponse<Vec<OrderResponse>>),
    ),
    tag = "operator-orders"
)]
pub async fn list_operator_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    if !auth_user.is_operator() {
        return Err(ServiceError::Forbidden(
            "Only operators can list truck orders".to_string(),
        ));
    }

    let orders = state
        .services
        .order_queries
        .list_for_operator(auth_user.id)
        .await?;

    Ok(Json(ApiResponse::success(
        orders.iter().map(map_order).collect(),
    )))
}

/// Drive an order to its next lifecycle state. Transitions into `rejected`
/// or `cancelled` refund the captured charge atomically with the commit.
#[utoipa::path(
    put,
    path = "/api/v1/operators/me/orders/{order_id}/status",
    params(("order_id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Missing reason", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the truck's operator", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Illegal transition", body = crate::errors::ErrorResponse),
        (status = 502, description = "Refund failed; status unchanged", body = crate::errors::ErrorResponse),
    ),
    tag = "operator-orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    if !auth_user.is_operator() {
        return Err(ServiceError::Forbidden(
            "Only operators can update order status".to_string(),
        ));
    }

    let order = state
        .services
        .order_status
        .update_status(auth_user.id, order_id, request)
        .await?;

    Ok(Json(ApiResponse::success(map_order(&order))))
}
