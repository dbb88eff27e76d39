use std::time::Instant;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use common::types::{MessageBody, StateRequest, StateResponse};
use common::{STATE_KEY, STORE_NAME};
use service::StateItem;
use tracing::{debug, warn};

use crate::errors::ApiError;
use crate::observability::{STATE_READS_TOTAL, STATE_WRITES_TOTAL, STORE_CALL_DURATION};
use crate::state::AppState;

pub async fn ping() -> Json<MessageBody> {
    Json(MessageBody::new("ping"))
}

/// `POST /t1`: acknowledges without reading the body.
pub async fn echo() -> Json<MessageBody> {
    Json(MessageBody::new("received"))
}

pub async fn get_state(State(state): State<AppState>) -> Result<Json<StateResponse>, ApiError> {
    debug!(backend = state.store.name(), store = STORE_NAME, key = STATE_KEY, "get state");
    let started = Instant::now();
    let result = state.store.get(STORE_NAME, STATE_KEY).await;
    STORE_CALL_DURATION.with_label_values(&["get"]).observe(started.elapsed().as_secs_f64());

    match result {
        Ok(entry) => {
            STATE_READS_TOTAL.with_label_values(&["ok"]).inc();
            Ok(Json(StateResponse { state: entry.value_lossy(), etag: entry.etag_or_empty() }))
        }
        Err(e) => {
            STATE_READS_TOTAL.with_label_values(&[e.kind()]).inc();
            if !e.is_not_found() {
                warn!(error = %e, kind = e.kind(), "state read failed");
            }
            Err(state.policy.read_error(&e))
        }
    }
}

pub async fn save_state(
    State(state): State<AppState>,
    payload: Result<Json<StateRequest>, JsonRejection>,
) -> Result<Json<MessageBody>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        STATE_WRITES_TOTAL.with_label_values(&["bad_request"]).inc();
        ApiError::BadRequest(rejection.body_text())
    })?;

    debug!(backend = state.store.name(), store = STORE_NAME, key = STATE_KEY, "save state");
    let item = StateItem::new(STATE_KEY, request.message.into_bytes());
    let started = Instant::now();
    let result = state.store.save(STORE_NAME, vec![item]).await;
    STORE_CALL_DURATION.with_label_values(&["save"]).observe(started.elapsed().as_secs_f64());

    match result {
        Ok(()) => {
            STATE_WRITES_TOTAL.with_label_values(&["ok"]).inc();
            Ok(Json(MessageBody::new("State Persisted")))
        }
        Err(e) => {
            STATE_WRITES_TOTAL.with_label_values(&[e.kind()]).inc();
            warn!(error = %e, kind = e.kind(), "state write failed");
            Err(state.policy.write_error(&e))
        }
    }
}
