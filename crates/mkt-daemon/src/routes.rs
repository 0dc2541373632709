//! Axum router and all HTTP handlers for mkt-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Every route except `/health` takes a [`Caller`], so a
//! missing or unknown credential is refused before any handler logic runs.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use mkt_messaging::NewConversation;
use mkt_orders::NewOrder;
use mkt_schemas::{Conversation, Dispute, Message, Order, ServiceError};
use mkt_store::Stored;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::{
    api_types::{
        HealthResponse, ListParams, ListResponse, OpenDisputeRequest, SendMessageRequest,
        UpdateStatusRequest,
    },
    auth::Caller,
    error::ApiError,
    state::{AppState, BusMsg},
};

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stream", get(stream))
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", put(update_status))
        .route("/disputes", post(open_dispute))
        .route("/disputes/:id", get(get_dispute))
        .route("/conversations", post(create_conversation).get(list_conversations))
        .route("/conversations/:id/messages", get(list_messages))
        .route("/messages", post(send_message))
        .with_state(state)
}

/// Ids are opaque to clients: one that does not parse cannot exist.
fn parse_id(kind: &str, raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::Service(ServiceError::not_found(format_args!("{kind} {raw}"))))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|rej| ApiError::invalid(rej.body_text()))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            store: st.store_name,
        }),
    )
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub(crate) async fn create_order(
    State(st): State<Arc<AppState>>,
    Caller(caller): Caller,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Stored<Order>>)> {
    let order = st.orders.create_order(&caller, body(payload)?).await?;
    st.publish(BusMsg::order_status(&order.record, &caller));
    Ok((StatusCode::CREATED, Json(order)))
}

pub(crate) async fn get_order(
    State(st): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(raw): Path<String>,
) -> ApiResult<Json<Stored<Order>>> {
    let id = parse_id("order", &raw)?;
    Ok(Json(st.orders.get_order(&caller, id).await?))
}

/// PUT /orders/:id/status
///
/// 404 unknown order, 403 not the vendor, 409 locked by a dispute or lost a
/// concurrent write, 422 not an edge of the status graph or not a status.
pub(crate) async fn update_status(
    State(st): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(raw): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> ApiResult<Json<Stored<Order>>> {
    let id = parse_id("order", &raw)?;
    let req = body(payload)?;
    let order = st
        .orders
        .request_named_transition(&caller, id, &req.status, req.note)
        .await?;
    st.publish(BusMsg::order_status(&order.record, &caller));
    Ok(Json(order))
}

// ---------------------------------------------------------------------------
// Disputes
// ---------------------------------------------------------------------------

pub(crate) async fn open_dispute(
    State(st): State<Arc<AppState>>,
    Caller(caller): Caller,
    payload: Result<Json<OpenDisputeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Stored<Dispute>>)> {
    let (raw_order_id, req) = body(payload)?.into_parts();
    let order_id = parse_id("order", &raw_order_id)?;

    let dispute = st.orders.open_dispute(&caller, order_id, req).await?;
    if let Ok(order) = st.orders.get_order(&caller, order_id).await {
        st.publish(BusMsg::dispute_opened(&dispute.record, &order.record));
    }
    Ok((StatusCode::CREATED, Json(dispute)))
}

pub(crate) async fn get_dispute(
    State(st): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(raw): Path<String>,
) -> ApiResult<Json<Stored<Dispute>>> {
    let id = parse_id("dispute", &raw)?;
    Ok(Json(st.orders.get_dispute(&caller, id).await?))
}

// ---------------------------------------------------------------------------
// Conversations / messages
// ---------------------------------------------------------------------------

pub(crate) async fn create_conversation(
    State(st): State<Arc<AppState>>,
    Caller(caller): Caller,
    payload: Result<Json<NewConversation>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Stored<Conversation>>)> {
    let conversation = st
        .conversations
        .create_conversation(&caller, body(payload)?)
        .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /conversations?limit=&skip=  (newest first)
pub(crate) async fn list_conversations(
    State(st): State<Arc<AppState>>,
    Caller(caller): Caller,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<ListResponse<Stored<Conversation>>>> {
    let Query(params) = params.map_err(|rej| ApiError::invalid(rej.body_text()))?;
    let results = st
        .conversations
        .list_conversations(&caller, params.limit, params.skip)
        .await?;
    Ok(Json(ListResponse { results }))
}

pub(crate) async fn send_message(
    State(st): State<Arc<AppState>>,
    Caller(caller): Caller,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Stored<Message>>)> {
    let req = body(payload)?;
    let conversation_id = parse_id("conversation", &req.conversation_id)?;
    let (message, conversation) = st
        .messages
        .send_message(&caller, conversation_id, &req.text)
        .await?;
    st.publish(BusMsg::message(&message.record, &conversation.record));
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /conversations/:id/messages  (oldest first)
pub(crate) async fn list_messages(
    State(st): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(raw): Path<String>,
) -> ApiResult<Json<ListResponse<Stored<Message>>>> {
    let id = parse_id("conversation", &raw)?;
    let results = st.messages.list_messages(&caller, id).await?;
    Ok(Json(ListResponse { results }))
}

// ---------------------------------------------------------------------------
// GET /stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>, Caller(caller): Caller) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx, caller);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
    caller: String,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(move |msg| {
        let visible = match msg {
            Ok(m) if m.visible_to(&caller) => Some(m),
            _ => None, // not addressed to caller / lagged / closed
        };
        async move {
            let m = visible?;
            let data = serde_json::to_string(&m).ok()?;
            Some(Ok(Event::default().event(m.event_name()).data(data)))
        }
    })
}
