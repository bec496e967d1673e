//! HTTP front-end: occupancy reads and book/release writes.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::REQUEST_DURATION_SECONDS;

// ── Wire types ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationView {
    pub reservation_id: String,
    pub slot_id: String,
    pub holder: String,
    pub start_time: Ms,
    pub duration_hours: u32,
    pub expires_at: Ms,
}

impl ReservationView {
    fn new(slot_id: &str, r: &Reservation) -> Self {
        Self {
            reservation_id: r.id.to_string(),
            slot_id: slot_id.to_string(),
            holder: r.holder.clone(),
            start_time: r.start_time,
            duration_hours: r.duration_hours,
            expires_at: r.expires_at(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub slot_id: String,
    pub section: String,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation: Option<ReservationView>,
}

impl From<&Slot> for SlotView {
    fn from(slot: &Slot) -> Self {
        Self {
            slot_id: slot.id.clone(),
            section: slot.section.clone(),
            state: if slot.state.is_free() { "free" } else { "held" },
            reservation: slot
                .state
                .reservation()
                .map(|r| ReservationView::new(&slot.id, r)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupiedSlot {
    pub slot_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyResponse {
    pub occupied_slots: Vec<OccupiedSlot>,
}

#[derive(Debug, Serialize)]
pub struct SlotsResponse {
    pub slots: Vec<SlotView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRequest {
    pub slot_id: String,
    pub holder: String,
    pub duration_hours: i64,
}

#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub reservation: ReservationView,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    pub slot_id: String,
    pub holder: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseResponse {
    pub slot_id: String,
    pub released: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub section: Option<String>,
    pub state: Option<String>,
    pub holder: Option<String>,
}

impl ListParams {
    fn into_filter(self) -> Result<SlotFilter, EngineError> {
        let state = match self.state.as_deref() {
            None => None,
            Some("free") => Some(StateFilter::Free),
            Some("held") => Some(StateFilter::Held),
            Some(other) => {
                return Err(EngineError::InvalidInput(format!(
                    "state must be \"free\" or \"held\", got {other:?}"
                )));
            }
        };
        Ok(SlotFilter {
            section: self.section,
            state,
            holder: self.holder,
        })
    }
}

// ── Errors ───────────────────────────────────────────────────────

/// An engine failure rendered as `{"error": {"kind", "message"}}`.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self(EngineError::InvalidInput(e.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self(EngineError::InvalidInput(e.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::NotOwner(_) => StatusCode::FORBIDDEN,
            EngineError::AlreadyBooked(_) | EngineError::NotHeld(_) => StatusCode::CONFLICT,
            EngineError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        }
        let body = Json(json!({
            "error": {
                "kind": self.0.kind(),
                "message": self.0.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

// ── Handlers ─────────────────────────────────────────────────────

type Shared = State<Arc<Engine>>;

fn observe(route: &'static str, start: Instant) {
    metrics::histogram!(REQUEST_DURATION_SECONDS, "route" => route)
        .record(start.elapsed().as_secs_f64());
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn occupied_slots(State(engine): Shared) -> Result<Json<OccupancyResponse>, ApiError> {
    let start = Instant::now();
    let occupied = engine.occupancy().await;
    observe("occupied_slots", start);
    Ok(Json(OccupancyResponse {
        occupied_slots: occupied?
            .into_iter()
            .map(|slot_id| OccupiedSlot { slot_id })
            .collect(),
    }))
}

async fn list_slots(
    State(engine): Shared,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<SlotsResponse>, ApiError> {
    let start = Instant::now();
    let Query(params) = params?;
    let filter = params.into_filter()?;
    let slots = engine.query(&filter).await;
    observe("list_slots", start);
    Ok(Json(SlotsResponse {
        slots: slots?.iter().map(SlotView::from).collect(),
    }))
}

async fn get_slot(
    State(engine): Shared,
    Path(slot_id): Path<String>,
) -> Result<Json<SlotView>, ApiError> {
    let start = Instant::now();
    let slot = engine.get_slot(&slot_id).await;
    observe("get_slot", start);
    Ok(Json(SlotView::from(&slot?)))
}

async fn book_slot(
    State(engine): Shared,
    body: Result<Json<BookRequest>, JsonRejection>,
) -> Result<Json<BookResponse>, ApiError> {
    let start = Instant::now();
    let Json(req) = body?;
    let result = engine
        .book(&req.slot_id, &req.holder, req.duration_hours)
        .await;
    observe("book", start);
    let reservation = result?;
    Ok(Json(BookResponse {
        reservation: ReservationView::new(&req.slot_id, &reservation),
    }))
}

async fn release_slot(
    State(engine): Shared,
    body: Result<Json<ReleaseRequest>, JsonRejection>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    let start = Instant::now();
    let Json(req) = body?;
    let result = engine.release(&req.slot_id, &req.holder).await;
    observe("release", start);
    result?;
    Ok(Json(ReleaseResponse {
        slot_id: req.slot_id,
        released: true,
    }))
}

pub fn routes(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/slots", get(list_slots))
        .route("/api/slots/occupied-slots", get(occupied_slots))
        .route("/api/slots/book", post(book_slot))
        .route("/api/slots/release", post(release_slot))
        .route("/api/slots/{id}", get(get_slot))
        .with_state(engine)
}
