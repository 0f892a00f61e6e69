//! Order state machine tests: legal paths for pickup and delivery, refund
//! coupling on rejected/cancelled, and the customer cancellation handshake.

mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use sea_orm::EntityTrait;
use serde_json::json;
use uuid::Uuid;

use streetbite_api::auth::Role;
use streetbite_api::entities::order::{self, FulfillmentType, OrderStatus};
use streetbite_api::entities::Order;
use streetbite_api::errors::ServiceError;
use streetbite_api::services::checkout::PlaceOrderRequest;
use streetbite_api::services::delivery::DeliveryAddress;
use streetbite_api::services::notifications::{
    CUSTOMER_CANCELLATION_REQUEST, ORDER_STATUS_UPDATE_FOR_CUSTOMER,
};
use streetbite_api::services::order_status::UpdateStatusRequest;
use streetbite_api::services::payments::PaymentMethodRequest;
use streetbite_api::services::pricing::CartLine;

async fn place_order(
    app: &TestApp,
    customer: Uuid,
    truck_id: Uuid,
    item_id: Uuid,
    fulfillment: FulfillmentType,
) -> order::Model {
    let request = PlaceOrderRequest {
        food_truck_id: truck_id,
        fulfillment_type: fulfillment,
        delivery_address: match fulfillment {
            FulfillmentType::Delivery => {
                Some(DeliveryAddress::Inline(common::sample_address()))
            }
            FulfillmentType::Pickup => None,
        },
        payment_method: PaymentMethodRequest::Fresh {
            token: "tok_visa".into(),
            save_for_future: false,
        },
        idempotency_key: None,
        items: vec![CartLine {
            menu_item_id: item_id,
            quantity: 3,
            option_ids: vec![],
        }],
    };

    app.services
        .checkout
        .place_order(customer, request)
        .await
        .expect("order placement")
}

fn transition(new_status: OrderStatus) -> UpdateStatusRequest {
    UpdateStatusRequest {
        new_status,
        reason: None,
        updated_estimated_ready_time: None,
        updated_estimated_delivery_time: None,
    }
}

fn transition_with_reason(new_status: OrderStatus, reason: &str) -> UpdateStatusRequest {
    UpdateStatusRequest {
        new_status,
        reason: Some(reason.to_string()),
        updated_estimated_ready_time: None,
        updated_estimated_delivery_time: None,
    }
}

#[tokio::test]
async fn pickup_order_walks_the_full_happy_path() {
    let app = TestApp::new().await;
    let operator = Uuid::new_v4();
    let customer = Uuid::new_v4();
    let (truck, item, _, _) = app.seed_standard_menu(operator).await;
    let order = place_order(&app, customer, truck.id, item.id, FulfillmentType::Pickup).await;

    let mut customer_events = app.subscribe(customer);
    let status = &app.services.order_status;

    let order_after = status
        .update_status(operator, order.id, transition(OrderStatus::Accepted))
        .await
        .unwrap();
    assert_eq!(order_after.status, OrderStatus::Accepted);
    assert!(order_after.accepted_at.is_some());

    let order_after = status
        .update_status(operator, order.id, transition(OrderStatus::Preparing))
        .await
        .unwrap();
    assert_eq!(order_after.status, OrderStatus::Preparing);

    let order_after = status
        .update_status(operator, order.id, transition(OrderStatus::ReadyForPickup))
        .await
        .unwrap();
    assert_eq!(order_after.status, OrderStatus::ReadyForPickup);
    assert!(order_after.ready_at.is_some());

    let order_after = status
        .update_status(operator, order.id, transition(OrderStatus::Completed))
        .await
        .unwrap();
    assert_eq!(order_after.status, OrderStatus::Completed);
    assert!(order_after.finalized_at.is_some());
    assert!(!order_after.refunded);

    // Four status events reached the customer, in order.
    for expected in ["accepted", "preparing", "ready_for_pickup", "completed"] {
        let event = customer_events.recv().await.expect("status event");
        assert_eq!(event["event"], ORDER_STATUS_UPDATE_FOR_CUSTOMER);
        assert_eq!(event["data"]["new_status"], expected);
    }
}

#[tokio::test]
async fn delivery_order_uses_delivery_branch_of_the_table() {
    let app = TestApp::new().await;
    let operator = Uuid::new_v4();
    let customer = Uuid::new_v4();
    let (truck, item, _, _) = app.seed_standard_menu(operator).await;
    let order = place_order(&app, customer, truck.id, item.id, FulfillmentType::Delivery).await;

    let status = &app.services.order_status;

    status
        .update_status(operator, order.id, transition(OrderStatus::Accepted))
        .await
        .unwrap();
    status
        .update_status(operator, order.id, transition(OrderStatus::Preparing))
        .await
        .unwrap();

    // ready_for_pickup is the pickup branch; a delivery order must refuse it.
    let err = status
        .update_status(operator, order.id, transition(OrderStatus::ReadyForPickup))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });

    let order_after = status
        .update_status(operator, order.id, transition(OrderStatus::OutForDelivery))
        .await
        .unwrap();
    assert_eq!(order_after.status, OrderStatus::OutForDelivery);
    assert!(order_after.ready_at.is_some());

    let order_after = status
        .update_status(operator, order.id, transition(OrderStatus::Delivered))
        .await
        .unwrap();
    assert_eq!(order_after.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn rejecting_a_pending_order_refunds_the_full_capture() {
    let app = TestApp::new().await;
    let operator = Uuid::new_v4();
    let customer = Uuid::new_v4();
    let (truck, item, _, _) = app.seed_standard_menu(operator).await;
    let order = place_order(&app, customer, truck.id, item.id, FulfillmentType::Pickup).await;

    let mut customer_events = app.subscribe(customer);

    let rejected = app
        .services
        .order_status
        .update_status(
            operator,
            order.id,
            transition_with_reason(OrderStatus::Rejected, "sold out"),
        )
        .await
        .unwrap();

    assert_eq!(rejected.status, OrderStatus::Rejected);
    assert!(rejected.refunded);
    assert_eq!(rejected.status_reason.as_deref(), Some("sold out"));
    assert!(rejected.finalized_at.is_some());

    // Full-amount refund against the stored charge reference.
    let refunds = app.gateway.refunds.lock().unwrap().clone();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].0, order.charge_id.clone().unwrap());
    assert_eq!(refunds[0].1, None);

    let event = customer_events.recv().await.expect("status event");
    assert_eq!(event["event"], ORDER_STATUS_UPDATE_FOR_CUSTOMER);
    assert_eq!(event["data"]["new_status"], "rejected");
    assert_eq!(event["data"]["reason"], "sold out");
}

#[tokio::test]
async fn reject_and_cancel_require_a_reason() {
    let app = TestApp::new().await;
    let operator = Uuid::new_v4();
    let customer = Uuid::new_v4();
    let (truck, item, _, _) = app.seed_standard_menu(operator).await;
    let order = place_order(&app, customer, truck.id, item.id, FulfillmentType::Pickup).await;

    let err = app
        .services
        .order_status
        .update_status(operator, order.id, transition(OrderStatus::Rejected))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // Blank reasons do not count.
    let err = app
        .services
        .order_status
        .update_status(
            operator,
            order.id,
            transition_with_reason(OrderStatus::Rejected, "   "),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // Nothing changed and no refund fired.
    let stored = Order::find_by_id(order.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::PendingConfirmation);
    assert_eq!(app.gateway.refund_count(), 0);
}

#[tokio::test]
async fn illegal_transitions_leave_state_and_timestamps_unchanged() {
    let app = TestApp::new().await;
    let operator = Uuid::new_v4();
    let customer = Uuid::new_v4();
    let (truck, item, _, _) = app.seed_standard_menu(operator).await;
    let order = place_order(&app, customer, truck.id, item.id, FulfillmentType::Pickup).await;

    for target in [
        OrderStatus::Preparing,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::CancellationRequested,
    ] {
        let err = app
            .services
            .order_status
            .update_status(operator, order.id, transition(target))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidTransition { .. });
    }

    let stored = Order::find_by_id(order.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::PendingConfirmation);
    assert!(stored.accepted_at.is_none());
    assert!(stored.ready_at.is_none());
    assert!(stored.finalized_at.is_none());
}

#[tokio::test]
async fn failed_refund_rolls_back_the_cancellation() {
    let app = TestApp::new().await;
    let operator = Uuid::new_v4();
    let customer = Uuid::new_v4();
    let (truck, item, _, _) = app.seed_standard_menu(operator).await;
    let order = place_order(&app, customer, truck.id, item.id, FulfillmentType::Pickup).await;

    app.services
        .order_status
        .update_status(operator, order.id, transition(OrderStatus::Accepted))
        .await
        .unwrap();

    app.gateway
        .fail_refunds
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let err = app
        .services
        .order_status
        .update_status(
            operator,
            order.id,
            transition_with_reason(OrderStatus::Cancelled, "customer call"),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::RefundFailed(_));

    // The order is still accepted and unrefunded: no partial outcome.
    let stored = Order::find_by_id(order.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::Accepted);
    assert!(!stored.refunded);
    assert!(stored.finalized_at.is_none());

    // Once the gateway recovers, the same transition succeeds and refunds
    // exactly once.
    app.gateway
        .fail_refunds
        .store(false, std::sync::atomic::Ordering::SeqCst);
    let cancelled = app
        .services
        .order_status
        .update_status(
            operator,
            order.id,
            transition_with_reason(OrderStatus::Cancelled, "customer call"),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(cancelled.refunded);
    assert_eq!(app.gateway.refund_count(), 1);

    // Terminal: a second cancel is illegal, so the refund cannot re-fire.
    let err = app
        .services
        .order_status
        .update_status(
            operator,
            order.id,
            transition_with_reason(OrderStatus::Cancelled, "again"),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
    assert_eq!(app.gateway.refund_count(), 1);
}

#[tokio::test]
async fn only_the_trucks_operator_may_transition() {
    let app = TestApp::new().await;
    let operator = Uuid::new_v4();
    let other_operator = Uuid::new_v4();
    let customer = Uuid::new_v4();
    let (truck, item, _, _) = app.seed_standard_menu(operator).await;
    let order = place_order(&app, customer, truck.id, item.id, FulfillmentType::Pickup).await;

    let err = app
        .services
        .order_status
        .update_status(other_operator, order.id, transition(OrderStatus::Accepted))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let stored = Order::find_by_id(order.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::PendingConfirmation);
}

#[tokio::test]
async fn cancellation_request_handshake() {
    let app = TestApp::new().await;
    let operator = Uuid::new_v4();
    let customer = Uuid::new_v4();
    let (truck, item, _, _) = app.seed_standard_menu(operator).await;
    let order = place_order(&app, customer, truck.id, item.id, FulfillmentType::Pickup).await;

    let status = &app.services.order_status;

    // Only legal from accepted.
    let err = status
        .request_cancellation(customer, order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });

    status
        .update_status(operator, order.id, transition(OrderStatus::Accepted))
        .await
        .unwrap();

    let mut operator_events = app.subscribe(operator);
    let requested = status.request_cancellation(customer, order.id).await.unwrap();
    assert_eq!(requested.status, OrderStatus::CancellationRequested);

    let event = operator_events.recv().await.expect("operator event");
    assert_eq!(event["event"], CUSTOMER_CANCELLATION_REQUEST);

    // A stranger cannot request cancellation of someone else's order.
    let err = status
        .request_cancellation(Uuid::new_v4(), order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    // Operator approves: cancelled, refunded.
    let cancelled = status
        .update_status(
            operator,
            order.id,
            transition_with_reason(OrderStatus::Cancelled, "approved customer request"),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(cancelled.refunded);
    assert_eq!(app.gateway.refund_count(), 1);
}

#[tokio::test]
async fn cancellation_request_can_be_declined_back_to_accepted() {
    let app = TestApp::new().await;
    let operator = Uuid::new_v4();
    let customer = Uuid::new_v4();
    let (truck, item, _, _) = app.seed_standard_menu(operator).await;
    let order = place_order(&app, customer, truck.id, item.id, FulfillmentType::Pickup).await;

    let status = &app.services.order_status;
    status
        .update_status(operator, order.id, transition(OrderStatus::Accepted))
        .await
        .unwrap();
    status.request_cancellation(customer, order.id).await.unwrap();

    let restored = status
        .update_status(operator, order.id, transition(OrderStatus::Accepted))
        .await
        .unwrap();
    assert_eq!(restored.status, OrderStatus::Accepted);
    assert!(!restored.refunded);
    assert_eq!(app.gateway.refund_count(), 0);
}

#[tokio::test]
async fn http_status_update_round_trip() {
    let app = TestApp::new().await;
    let operator = Uuid::new_v4();
    let customer = Uuid::new_v4();
    let (truck, item, _, _) = app.seed_standard_menu(operator).await;
    let order = place_order(&app, customer, truck.id, item.id, FulfillmentType::Pickup).await;

    let uri = format!("/api/v1/operators/me/orders/{}/status", order.id);

    let response = app
        .request(
            Method::PUT,
            &uri,
            Some((operator, Role::Operator)),
            Some(json!({"new_status": "accepted"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let payload = response_json(response).await;
    assert_eq!(payload["data"]["status"], "accepted");

    // Customers cannot drive operator transitions.
    let response = app
        .request(
            Method::PUT,
            &uri,
            Some((customer, Role::Customer)),
            Some(json!({"new_status": "preparing"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Illegal transition surfaces as a conflict.
    let response = app
        .request(
            Method::PUT,
            &uri,
            Some((operator, Role::Operator)),
            Some(json!({"new_status": "delivered"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Refund failure surfaces as 502 and the status stays put.
    app.gateway
        .fail_refunds
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let response = app
        .request(
            Method::PUT,
            &uri,
            Some((operator, Role::Operator)),
            Some(json!({"new_status": "cancelled", "reason": "ran out of gas"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let stored = Order::find_by_id(order.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::Accepted);
}

#[tokio::test]
async fn http_request_cancellation_conflicts_outside_accepted() {
    let app = TestApp::new().await;
    let operator = Uuid::new_v4();
    let customer = Uuid::new_v4();
    let (truck, item, _, _) = app.seed_standard_menu(operator).await;
    let order = place_order(&app, customer, truck.id, item.id, FulfillmentType::Pickup).await;

    let uri = format!("/api/v1/orders/me/{}/request_cancellation", order.id);

    let response = app
        .request(Method::POST, &uri, Some((customer, Role::Customer)), None)
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    app.services
        .order_status
        .update_status(operator, order.id, transition(OrderStatus::Accepted))
        .await
        .unwrap();

    let response = app
        .request(Method::POST, &uri, Some((customer, Role::Customer)), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let payload = response_json(response).await;
    assert_eq!(payload["data"]["status"], "cancellation_requested");
}
