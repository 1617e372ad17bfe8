//! HTTP and WebSocket endpoints
//!
//! REST surface for leads, decisions and business profiles, plus the two
//! sockets: `/ws/voice` for the telephony media stream and
//! `/ws/leads/:owner_id` for owner dashboards.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use leadline_core::{
    BusinessProfile, LeadEvent, LeadStore, PipelineStep, QuoteBreakdown, TradieDecision,
    TradieDecisionKind,
};

use crate::call::handle_voice_socket;
use crate::state::AppState;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.settings.server.cors_origins);

    Router::new()
        // Lead lifecycle
        .route("/api/leads", post(create_lead))
        .route("/api/leads/:id", get(get_lead))
        .route("/api/leads/:id/message", post(post_message))
        .route("/api/leads/:id/decision", post(post_decision))
        .route("/api/leads/:id/cancel", post(post_cancel))
        .route("/api/leads/:id/photos", post(post_photo))
        // Business profiles
        .route("/api/businesses/:id", get(get_business).put(upsert_business))
        .route("/api/businesses/:id/leads", get(list_leads))
        // Health
        .route("/health", get(health_check))
        // Sockets
        .route("/ws/voice", get(ws_voice))
        .route("/ws/leads/:owner_id", get(ws_leads))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS from configured origins; an empty list means a permissive layer
/// for local development.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        warn!("no CORS origins configured, allowing all origins");
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "invalid CORS origin ignored");
                None
            }
        })
        .collect();

    info!(count = parsed.len(), "CORS configured");
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any)
}

// ---------------------------------------------------------------------------
// Leads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateLeadRequest {
    business_id: String,
    #[serde(default)]
    customer_phone: String,
    #[serde(default)]
    customer_name: String,
}

async fn create_lead(
    State(state): State<AppState>,
    Json(request): Json<CreateLeadRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let (lead, event) = state
        .manager
        .create_lead(
            &request.business_id,
            &request.customer_phone,
            &request.customer_name,
        )
        .await?;
    state.registry.broadcast(&request.business_id, &event);
    Ok((StatusCode::CREATED, Json(lead)))
}

async fn get_lead(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let store = state.manager.store();
    let lead = store
        .get_lead(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("lead {id}")))?;
    let line_items = store.line_items(&id).await?;
    let line_item_history = store.line_item_batches(&id).await?;
    Ok(Json(serde_json::json!({
        "lead": lead,
        "line_items": line_items,
        "line_item_history": line_item_history,
    })))
}

async fn list_leads(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let leads = state.manager.store().list_leads(&business_id).await?;
    Ok(Json(serde_json::json!({
        "count": leads.len(),
        "leads": leads,
    })))
}

#[derive(Debug, Deserialize)]
struct MessageRequest {
    text: String,
}

/// Text-channel entry into the same pipeline the voice leg uses.
async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    if request.text.trim().is_empty() {
        return Err(ServerError::InvalidRequest("message text is empty".into()));
    }
    let outcome = state
        .manager
        .process_customer_message(&id, &request.text)
        .await?;
    state
        .registry
        .broadcast_batch(&outcome.lead.business_id, &outcome.events);
    Ok(Json(serde_json::json!({
        "lead": outcome.lead,
        "reply": outcome.reply,
        "declined": outcome.declined,
    })))
}

#[derive(Debug, Deserialize)]
struct DecisionRequest {
    business_id: String,
    decision: TradieDecisionKind,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    edited_quote: Option<QuoteBreakdown>,
    #[serde(default)]
    booked_date: Option<String>,
    #[serde(default)]
    booked_time_slot: Option<String>,
}

async fn post_decision(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let decision = TradieDecision {
        decision: request.decision,
        notes: request.notes,
        edited_quote: request.edited_quote,
        booked_date: request.booked_date,
        booked_time_slot: request.booked_time_slot,
    };
    let (lead, events) = state
        .manager
        .handle_decision(&request.business_id, &id, decision)
        .await?;
    state.registry.broadcast_batch(&request.business_id, &events);
    Ok(Json(serde_json::json!({ "lead": lead })))
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    business_id: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Close a lead out without deleting it: the customer withdrew or the
/// owner called the job off.
async fn post_cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let (lead, events) = state
        .manager
        .cancel_lead(&request.business_id, &id, request.reason)
        .await?;
    state.registry.broadcast_batch(&request.business_id, &events);
    Ok(Json(serde_json::json!({ "lead": lead })))
}

#[derive(Debug, Deserialize)]
struct PhotoRequest {
    url: String,
}

/// Attach an uploaded photo to a lead. There is no automatic analyzer
/// wired in, so the photo is parked for the owner's review and the
/// dashboard is told as much.
async fn post_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PhotoRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    if request.url.trim().is_empty() {
        return Err(ServerError::InvalidRequest("photo url is empty".into()));
    }

    let store = state.manager.store();
    let mut lead = store
        .get_lead(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("lead {id}")))?;
    lead.photo_urls.push(request.url);
    store.update_lead(&lead).await?;

    state.registry.broadcast_batch(
        &lead.business_id,
        &[
            LeadEvent::StepChanged {
                lead_id: lead.id.clone(),
                step: PipelineStep::AnalysingPhoto,
                message: "Photo received".into(),
            },
            LeadEvent::StepChanged {
                lead_id: lead.id.clone(),
                step: PipelineStep::AnalysisFailed,
                message: "Automatic analysis unavailable, photo saved for review".into(),
            },
        ],
    );
    Ok(Json(serde_json::json!({ "lead": lead })))
}

// ---------------------------------------------------------------------------
// Businesses
// ---------------------------------------------------------------------------

async fn get_business(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BusinessProfile>, ServerError> {
    let profile = state
        .manager
        .store()
        .get_business(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("business {id}")))?;
    Ok(Json(profile))
}

async fn upsert_business(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut profile): Json<BusinessProfile>,
) -> Result<Json<BusinessProfile>, ServerError> {
    if profile.service_radius_km < 0.0 {
        return Err(ServerError::InvalidRequest(
            "service_radius_km must be non-negative".into(),
        ));
    }
    profile.id = id;
    state.manager.store().upsert_business(&profile).await?;
    Ok(Json(profile))
}

// ---------------------------------------------------------------------------
// Health and sockets
// ---------------------------------------------------------------------------

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ws_voice(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_voice_socket(socket, state))
}

async fn ws_leads(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_lead_feed(socket, state, owner_id))
}

/// Dashboard feed: serialized lead events until either side hangs up.
async fn handle_lead_feed(socket: WebSocket, state: AppState, owner_id: String) {
    let mut events = state.registry.register(&owner_id);
    let (mut ws_tx, mut ws_rx) = socket.split();
    info!(owner_id, "dashboard client connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(payload) => {
                    if ws_tx.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!(owner_id, "dashboard client disconnected");
}
