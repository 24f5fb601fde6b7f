//! Order lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{OrderId, OwnerId};
use domain::{Money, Order, OrderError, OrderLine, OrderStatus};
use lifecycle::{CreateOrder, MutationOutcome, OrderLifecycle};
use serde::{Deserialize, Serialize};

use crate::backends::{DynCache, DynChannel, DynStore};
use crate::error::ApiError;

/// Engine over runtime-selected backends.
pub type Engine = OrderLifecycle<DynStore, DynCache, DynChannel>;

/// Header carrying the client-chosen key that makes a create retry-safe.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub lifecycle: Engine,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub owner_id: String,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub owner_id: String,
    pub status: String,
    pub status_description: String,
    pub total_amount_cents: i64,
    pub items: Vec<OrderItemResponse>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        let items = order
            .lines()
            .iter()
            .map(|line| OrderItemResponse {
                product_id: line.product_id.to_string(),
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                subtotal_cents: line.subtotal().map(|m| m.cents()).unwrap_or_default(),
            })
            .collect();

        Self {
            id: order.id().to_string(),
            owner_id: order.owner_id().to_string(),
            status: order.status().to_string(),
            status_description: order.status().description().to_string(),
            total_amount_cents: order.total_amount().cents(),
            items,
            version: order.version().as_i64(),
            created_at: order.created_at().to_rfc3339(),
            updated_at: order.updated_at().to_rfc3339(),
            warnings: Vec::new(),
        }
    }
}

impl From<MutationOutcome> for OrderResponse {
    fn from(outcome: MutationOutcome) -> Self {
        let mut response = OrderResponse::from(&outcome.order);
        response.warnings = outcome.warnings.iter().map(ToString::to_string).collect();
        response
    }
}

// -- Handlers --

/// POST /orders: create a new order.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let owner_id = parse_owner_id(&req.owner_id)?;
    let lines = req
        .items
        .into_iter()
        .map(OrderItemRequest::into_line)
        .collect::<Result<Vec<_>, _>>()?;

    let mut command = CreateOrder::new(owner_id, lines);
    if let Some(key) = idempotency_key(&headers)? {
        command = command.with_idempotency_key(key);
    }

    let outcome = state.lifecycle.create(command).await?;
    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(outcome.into())))
}

/// GET /orders/{id}: read one order, served from the cache when possible.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.lifecycle.get(order_id).await?;
    Ok(Json((&order).into()))
}

/// GET /orders: list every order.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.lifecycle.list_all().await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /users/{owner_id}/orders: list the orders of one owner.
#[tracing::instrument(skip(state))]
pub async fn list_by_owner(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let owner_id = parse_owner_id(&owner_id)?;
    let orders = state.lifecycle.list_by_owner(owner_id).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// PUT /orders/{id}/status: move an order to its next status.
#[tracing::instrument(skip(state, req))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let target: OrderStatus = req
        .status
        .parse::<OrderStatus>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let outcome = state.lifecycle.change_status(order_id, target).await?;
    Ok(Json(outcome.into()))
}

/// DELETE /orders/{id}: cancel an order.
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let outcome = state.lifecycle.cancel(order_id).await?;
    Ok(Json(outcome.into()))
}

impl OrderItemRequest {
    fn into_line(self) -> Result<OrderLine, OrderError> {
        let quantity = u32::try_from(self.quantity).map_err(|_| OrderError::InvalidQuantity {
            product_id: self.product_id.clone(),
            quantity: self.quantity,
        })?;

        Ok(OrderLine::new(
            self.product_id,
            self.product_name,
            quantity,
            Money::from_cents(self.unit_price_cents),
        ))
    }
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("Idempotency-Key must be visible ASCII".to_string()))?
        .trim();
    if key.is_empty() {
        return Err(ApiError::BadRequest(
            "Idempotency-Key must not be empty".to_string(),
        ));
    }
    Ok(Some(key.to_string()))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}

fn parse_owner_id(id: &str) -> Result<OwnerId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid owner id: {e}")))?;
    Ok(OwnerId::from_uuid(uuid))
}
