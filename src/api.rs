// Copyright 2025 Cowboy AI, LLC.

//! HTTP surface over [`RegistryService`]
//!
//! Caller identity is established upstream; the authenticating proxy passes
//! it in `x-caller-id`, with `x-caller-role: admin` for administrators.

use crate::access::AccessGate;
use crate::entity::{ClaimId, LineItemId, RegistryId};
use crate::errors::{ErrorKind, RegistryError};
use crate::identity::{Caller, IdentityRef};
use crate::registry::{
    BuyerInfo, Claim, ClaimKind, ClaimRequest, FulfillmentStatus, ItemState, LineItem, Registry,
    RegistryDraft, RegistryPatch, RegistryStatus,
};
use crate::service::{PurchaseRequest, RegistryService, RegistryStats, RegistrySummary};
use crate::settlement::SettlementReport;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use schemars::schema::RootSchema;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Header carrying the authenticated identity
pub const CALLER_ID_HEADER: &str = "x-caller-id";
/// Header carrying the caller role
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    service: RegistryService,
}

/// Build the registry router
pub fn router(service: RegistryService) -> Router {
    Router::new()
        .route("/registries", get(registries_list).post(registry_create))
        .route("/registries/stats", get(registries_stats))
        .route(
            "/registries/{id}",
            get(registry_get).put(registry_update).delete(registry_delete),
        )
        .route("/registries/{id}/items", post(item_add))
        .route("/registries/{id}/items/{item_id}", delete(item_remove))
        .route("/registries/{id}/items/{item_id}/quantity", put(item_quantity))
        .route("/registries/{id}/items/{item_id}/state", put(item_state))
        .route("/registries/{id}/items/{item_id}/claims", post(item_claim))
        .route("/registries/{id}/purchase", post(registry_purchase))
        .route("/registries/{id}/settlement", get(registry_settlement))
        .with_state(ApiState { service })
}

#[derive(Debug)]
enum ApiError {
    Registry(RegistryError),
    Invalid(String),
}

impl ApiError {
    fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::Invalid(msg.into())
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::Registry(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Invalid(msg) => {
                let body = serde_json::json!({ "code": "invalid_request", "message": msg });
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            ApiError::Registry(err) => err,
        };
        let status = match (&err, err.kind()) {
            (RegistryError::Unauthenticated, _) => StatusCode::UNAUTHORIZED,
            (_, ErrorKind::Authorization) => StatusCode::FORBIDDEN,
            (_, ErrorKind::Validation) => StatusCode::BAD_REQUEST,
            (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
            (_, ErrorKind::InsufficientCapacity) => StatusCode::BAD_REQUEST,
            (_, ErrorKind::Contention) => StatusCode::CONFLICT,
            (_, ErrorKind::RegistryNotActive) => StatusCode::BAD_REQUEST,
            (_, ErrorKind::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut body = serde_json::json!({
            "code": err.kind().code(),
            "message": err.to_string(),
        });
        if let Some(remaining) = err.remaining() {
            body["remaining"] = remaining.into();
        }
        (status, Json(body)).into_response()
    }
}

fn caller_from(headers: &HeaderMap) -> Caller {
    let identity = headers
        .get(CALLER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(IdentityRef::new);
    let is_admin = identity.is_some()
        && headers
            .get(CALLER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|role| role.eq_ignore_ascii_case("admin"));
    Caller { identity, is_admin }
}

fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid {what} id: {raw}")))
}

/// Claim as shown to the registry owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimView {
    /// Claim identifier
    pub id: ClaimId,
    /// Buyer name
    pub buyer_name: String,
    /// Buyer email
    pub buyer_email: String,
    /// Claimed quantity
    pub quantity: u32,
    /// Reservation or purchase
    pub kind: ClaimKind,
    /// Gift message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// When the claim was made
    pub created_at: DateTime<Utc>,
    /// Outcome of the backing order
    pub fulfillment_status: FulfillmentStatus,
}

impl From<&Claim> for ClaimView {
    fn from(claim: &Claim) -> Self {
        Self {
            id: claim.id,
            buyer_name: claim.buyer_name.clone(),
            buyer_email: claim.buyer_email.clone(),
            quantity: claim.quantity,
            kind: claim.kind,
            note: claim.note.clone(),
            created_at: claim.created_at,
            fulfillment_status: claim.fulfillment_status,
        }
    }
}

/// Line item with its derived state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    /// Item identifier
    pub id: LineItemId,
    /// Catalog reference
    pub product_ref: String,
    /// Quantity asked for
    pub requested_quantity: u32,
    /// Quantity claimed
    pub claimed_quantity: u32,
    /// Quantity still open
    pub remaining_quantity: u32,
    /// Derived state
    pub state: ItemState,
    /// Claims, only for the owner and administrators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Vec<ClaimView>>,
}

impl ItemView {
    fn new(item: &LineItem, with_claims: bool) -> Self {
        Self {
            id: item.id,
            product_ref: item.product_ref.clone(),
            requested_quantity: item.requested_quantity,
            claimed_quantity: item.claimed_quantity,
            remaining_quantity: item.remaining(),
            state: item.state(),
            claims: with_claims.then(|| item.claims.iter().map(ClaimView::from).collect()),
        }
    }
}

/// Registry with its items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryView {
    /// Registry identifier
    pub id: RegistryId,
    /// Owner identity
    pub owner_id: IdentityRef,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Expected date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    /// Public visibility
    pub is_public: bool,
    /// Status
    pub status: RegistryStatus,
    /// Items in display order
    pub items: Vec<ItemView>,
    /// Number of distinct authenticated contributors
    pub contributor_count: usize,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl RegistryView {
    fn new(registry: &Registry, caller: &Caller) -> Self {
        let with_claims = AccessGate::can_write(registry, caller);
        Self {
            id: registry.id,
            owner_id: registry.owner_id.clone(),
            title: registry.title.clone(),
            description: registry.description.clone(),
            due_date: registry.due_date,
            is_public: registry.is_public,
            status: registry.status,
            items: registry
                .items
                .iter()
                .map(|item| ItemView::new(item, with_claims))
                .collect(),
            contributor_count: registry.contributors.len(),
            created_at: registry.created_at,
            updated_at: registry.updated_at,
        }
    }
}

/// Body of `POST /registries/{id}/items`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddItemBody {
    /// Catalog reference
    pub product_ref: String,
    /// Quantity asked for
    pub requested_quantity: u32,
}

/// Body of `PUT /registries/{id}/items/{itemId}/quantity`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuantityBody {
    /// New requested quantity
    pub requested_quantity: u32,
}

/// Buyer details as accepted on the wire
///
/// There is no identity field; the buyer identity is the caller's.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuyerBody {
    /// Display name
    pub name: String,
    /// Contact address
    pub email: String,
    /// Phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// Gift message
    #[serde(default)]
    pub note: Option<String>,
}

impl From<BuyerBody> for BuyerInfo {
    fn from(body: BuyerBody) -> Self {
        BuyerInfo {
            name: body.name,
            email: body.email,
            phone: body.phone,
            identity: None,
            note: body.note,
        }
    }
}

/// Body of the legacy state setter
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StateBody {
    /// `0=Pending, 1=Reserved, 2=Purchased`
    pub state: u8,
    /// Buyer claiming the item
    #[serde(default)]
    pub user_data: Option<BuyerBody>,
}

/// Body of `POST /registries/{id}/items/{itemId}/claims`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimBody {
    /// Quantity to claim
    pub quantity: u32,
    /// Reservation or purchase
    pub kind: ClaimKind,
    /// Buyer
    pub buyer: BuyerBody,
}

/// Response of the purchase endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    /// The item after the purchase
    pub item: ItemView,
    /// Whether every item is now fully claimed
    pub is_list_complete: bool,
    /// The committed claim
    pub claim_id: ClaimId,
}

/// Response of the legacy state setter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    /// The item afterwards
    pub item: ItemView,
    /// Legacy numeric state of the item afterwards
    pub state: u8,
    /// Claim submitted for the caller, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<ClaimId>,
    /// Whether every item is now fully claimed
    pub is_list_complete: bool,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    public: Option<bool>,
}

/// JSON schemas of the request and response bodies
pub fn schemas() -> BTreeMap<&'static str, RootSchema> {
    BTreeMap::from([
        ("RegistryDraft", schema_for!(RegistryDraft)),
        ("RegistryPatch", schema_for!(RegistryPatch)),
        ("RegistryView", schema_for!(RegistryView)),
        ("RegistrySummary", schema_for!(RegistrySummary)),
        ("RegistryStats", schema_for!(RegistryStats)),
        ("AddItemBody", schema_for!(AddItemBody)),
        ("QuantityBody", schema_for!(QuantityBody)),
        ("StateBody", schema_for!(StateBody)),
        ("StateResponse", schema_for!(StateResponse)),
        ("ClaimBody", schema_for!(ClaimBody)),
        ("BuyerBody", schema_for!(BuyerBody)),
        ("PurchaseRequest", schema_for!(PurchaseRequest)),
        ("PurchaseResponse", schema_for!(PurchaseResponse)),
        ("SettlementReport", schema_for!(SettlementReport)),
    ])
}

async fn registries_list(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if query.public != Some(true) {
        return Err(ApiError::bad_request("only ?public=true listings are available"));
    }
    Ok(Json(state.service.list_public().await?))
}

async fn registries_stats(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.stats(&caller_from(&headers)).await?))
}

async fn registry_create(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<RegistryDraft>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(draft) = payload?;
    let caller = caller_from(&headers);
    let registry = state.service.create_registry(&caller, draft).await?;
    Ok((StatusCode::CREATED, Json(RegistryView::new(&registry, &caller))))
}

async fn registry_get(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let registry_id: RegistryId = parse_id(&id, "registry")?;
    let caller = caller_from(&headers);
    let registry = state.service.get_registry(&caller, &registry_id).await?;
    Ok(Json(RegistryView::new(&registry, &caller)))
}

async fn registry_update(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<RegistryPatch>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let registry_id: RegistryId = parse_id(&id, "registry")?;
    let Json(patch) = payload?;
    let caller = caller_from(&headers);
    let registry = state
        .service
        .update_registry(&caller, &registry_id, patch)
        .await?;
    Ok(Json(RegistryView::new(&registry, &caller)))
}

async fn registry_delete(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let registry_id: RegistryId = parse_id(&id, "registry")?;
    state
        .service
        .delete_registry(&caller_from(&headers), &registry_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn item_add(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<AddItemBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let registry_id: RegistryId = parse_id(&id, "registry")?;
    let Json(body) = payload?;
    let item = state
        .service
        .add_item(
            &caller_from(&headers),
            &registry_id,
            &body.product_ref,
            body.requested_quantity,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ItemView::new(&item, true))))
}

async fn item_remove(
    State(state): State<ApiState>,
    Path((id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let registry_id: RegistryId = parse_id(&id, "registry")?;
    let item_id: LineItemId = parse_id(&item_id, "item")?;
    state
        .service
        .remove_item(&caller_from(&headers), &registry_id, &item_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn item_quantity(
    State(state): State<ApiState>,
    Path((id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
    payload: Result<Json<QuantityBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let registry_id: RegistryId = parse_id(&id, "registry")?;
    let item_id: LineItemId = parse_id(&item_id, "item")?;
    let Json(body) = payload?;
    let item = state
        .service
        .set_requested_quantity(
            &caller_from(&headers),
            &registry_id,
            &item_id,
            body.requested_quantity,
        )
        .await?;
    Ok(Json(ItemView::new(&item, true)))
}

async fn item_state(
    State(state): State<ApiState>,
    Path((id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
    payload: Result<Json<StateBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let registry_id: RegistryId = parse_id(&id, "registry")?;
    let item_id: LineItemId = parse_id(&item_id, "item")?;
    let Json(body) = payload?;
    let outcome = state
        .service
        .set_item_state(
            &caller_from(&headers),
            &registry_id,
            &item_id,
            body.state,
            body.user_data.map(BuyerInfo::from),
        )
        .await?;
    let response = StateResponse {
        item: ItemView::new(&outcome.item, false),
        state: outcome.state.legacy_code(),
        claim_id: outcome.claim.as_ref().map(|record| record.claim.id),
        is_list_complete: outcome
            .claim
            .as_ref()
            .is_some_and(|record| record.is_list_complete),
    };
    Ok((
        [(
            HeaderName::from_static("deprecation"),
            HeaderValue::from_static("true"),
        )],
        Json(response),
    )
        .into_response())
}

async fn item_claim(
    State(state): State<ApiState>,
    Path((id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
    payload: Result<Json<ClaimBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let registry_id: RegistryId = parse_id(&id, "registry")?;
    let item_id: LineItemId = parse_id(&item_id, "item")?;
    let Json(body) = payload?;
    let record = state
        .service
        .claim(
            &caller_from(&headers),
            &registry_id,
            &item_id,
            ClaimRequest::new(body.quantity, body.buyer.into(), body.kind),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(PurchaseResponse {
            item: ItemView::new(&record.item, false),
            is_list_complete: record.is_list_complete,
            claim_id: record.claim.id,
        }),
    ))
}

async fn registry_purchase(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let registry_id: RegistryId = parse_id(&id, "registry")?;
    let Json(purchase) = payload?;
    let record = state
        .service
        .purchase(&caller_from(&headers), &registry_id, purchase)
        .await?;
    Ok(Json(PurchaseResponse {
        item: ItemView::new(&record.item, false),
        is_list_complete: record.is_list_complete,
        claim_id: record.claim.id,
    }))
}

async fn registry_settlement(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let registry_id: RegistryId = parse_id(&id, "registry")?;
    let report = state
        .service
        .settlement(&caller_from(&headers), &registry_id)
        .await?;
    Ok(Json(report))
}
