use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use folio_shared::{LineRequest, Order, OrderId, Page, PageRequest};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, middleware::BearerToken, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<LineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub order_id: OrderId,
    pub payment_url: String,
    pub order: Order,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order).get(list_my_orders))
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/pay", post(pay_order))
        .route("/v1/admin/orders", get(list_all_orders))
        .route("/v1/admin/orders/{id}/status", put(update_order_status))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/orders
pub async fn create_order(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    WithRejection(Json(req), _): WithRejection<Json<CreateOrderRequest>, AppError>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = state.orders.create_order(&token, &req.items, None).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /v1/orders?page&limit
/// The caller's own orders, newest first
pub async fn list_my_orders(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    WithRejection(Query(page), _): WithRejection<Query<PageRequest>, AppError>,
) -> Result<Json<Page<Order>>, AppError> {
    Ok(Json(state.orders.get_orders_for_buyer(&token, page).await?))
}

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    WithRejection(Path(order_id), _): WithRejection<Path<i64>, AppError>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders.get_order(&token, OrderId(order_id)).await?))
}

/// POST /v1/orders/{id}/pay
/// Hands a pending order to the payment provider
pub async fn pay_order(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    WithRejection(Path(order_id), _): WithRejection<Path<i64>, AppError>,
) -> Result<Json<PaymentResponse>, AppError> {
    let initiation = state
        .orders
        .initiate_payment(&token, OrderId(order_id), None)
        .await?;

    Ok(Json(PaymentResponse {
        order_id: initiation.order.id,
        payment_url: initiation.redirect_url,
        order: initiation.order,
    }))
}

/// GET /v1/admin/orders?page&limit
pub async fn list_all_orders(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    WithRejection(Query(page), _): WithRejection<Query<PageRequest>, AppError>,
) -> Result<Json<Page<Order>>, AppError> {
    Ok(Json(state.orders.get_all_orders(&token, page).await?))
}

/// PUT /v1/admin/orders/{id}/status
pub async fn update_order_status(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    WithRejection(Path(order_id), _): WithRejection<Path<i64>, AppError>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateStatusRequest>, AppError>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .update_order_status(&token, OrderId(order_id), &req.status)
        .await?;
    Ok(Json(order))
}
