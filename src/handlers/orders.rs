use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::services::checkout::PlaceOrderRequest;
use crate::{ApiResponse, AppState};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: String,
    pub fulfillment_type: String,
    pub currency: String,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub delivery_fee: Decimal,
    pub total_amount: Decimal,
    pub address_snapshot: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    pub refunded: bool,
    pub order_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_ready_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub menu_item_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
}

pub(crate) fn map_order(model: &order::Model) -> OrderResponse {
    OrderResponse {
        order_id: model.id,
        order_number: model.order_number.clone(),
        status: model.status.as_str().to_string(),
        fulfillment_type: model.fulfillment_type.as_str().to_string(),
        currency: model.currency.clone(),
        subtotal: model.subtotal,
        tax_amount: model.tax_amount,
        delivery_fee: model.delivery_fee,
        total_amount: model.total_amount,
        address_snapshot: model.address_snapshot.clone(),
        status_reason: model.status_reason.clone(),
        refunded: model.refunded,
        order_time: model.order_time,
        estimated_ready_time: model.estimated_ready_time,
        estimated_delivery_time: model.estimated_delivery_time,
        accepted_at: model.accepted_at,
        ready_at: model.ready_at,
        finalized_at: model.finalized_at,
    }
}

fn map_order_item(model: &order_item::Model) -> OrderItemResponse {
    OrderItemResponse {
        menu_item_id: model.menu_item_id,
        name: model.name.clone(),
        quantity: model.quantity,
        unit_price: model.unit_price,
        line_total: model.line_total,
    }
}

/// Place an order: validate, price, resolve delivery, charge, persist.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Malformed request", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment declined", body = crate::errors::ErrorResponse),
        (status = 404, description = "Truck, item, or address not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Availability, delivery, or truck-status conflict", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    if !auth_user.is_customer() {
        return Err(ServiceError::Forbidden(
            "Only customers can place orders".to_string(),
        ));
    }

    let order = state
        .services
        .checkout
        .place_order(auth_user.id, request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(map_order(&order))),
    ))
}

/// List the calling customer's orders, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/orders/me",
    responses(
        (status = 200, description = "Orders for the calling customer", body = ApiResponse<Vec<OrderResponse>>),
    ),
    tag = "orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    if !auth_user.is_customer() {
        return Err(ServiceError::Forbidden(
            "Only customers can list their orders".to_string(),
        ));
    }

    let orders = state
        .services
        .order_queries
        .list_for_customer(auth_user.id)
        .await?;

    Ok(Json(ApiResponse::success(
        orders.iter().map(map_order).collect(),
    )))
}

/// Fetch one of the calling customer's orders, including line snapshots.
#[utoipa::path(
    get,
    path = "/api/v1/orders/me/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order detail", body = ApiResponse<OrderDetailResponse>),
        (status = 403, description = "Not the caller's order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn get_my_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderDetailResponse>>, ServiceError> {
    let (order, items) = state
        .services
        .order_queries
        .get_for_customer(auth_user.id, order_id)
        .await?;

    Ok(Json(ApiResponse::success(OrderDetailResponse {
        order: map_order(&order),
        items: items.iter().map(map_order_item).collect(),
    })))
}

/// Ask the operator to cancel an accepted order.
#[utoipa::path(
    post,
    path = "/api/v1/orders/me/{order_id}/request_cancellation",
    params(("order_id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Cancellation requested", body = ApiResponse<OrderResponse>),
        (status = 409, description = "Order is not in the accepted state", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn request_cancellation(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    if !auth_user.is_customer() {
        return Err(ServiceError::Forbidden(
            "Only customers can request cancellation".to_string(),
        ));
    }

    let order = state
        .services
        .order_status
        .request_cancellation(auth_user.id, order_id)
        .await?;

    Ok(Json(ApiResponse::success(map_order(&order))))
}
