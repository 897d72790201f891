use axum::{extract::State, http::StatusCode, Json};
use drasi_mcp_core::{error::IngestError, ChangeEventHandler};
use drasi_mcp_proto::{ControlEvent, Envelope};
use tracing::{debug, error, warn};

use crate::state::IngestState;

/// `POST /` — the inbound change/control event endpoint (spec.md §6).
/// Success is `2xx`; a retryable failure (uninitialised query) is `5xx` so
/// the transport redelivers; a client error (unknown query, malformed body)
/// is `4xx` so it does not.
pub async fn handle_envelope(State(state): State<IngestState>, Json(envelope): Json<Envelope>) -> StatusCode {
    match envelope {
        Envelope::Control(control) => {
            handle_control(control);
            StatusCode::OK
        }
        Envelope::Change(event) => {
            let handler = ChangeEventHandler { store: &state.store, sync_points: &state.sync_points };
            match handler.apply(&state.configs, &event) {
                Ok(()) => {
                    debug!(query_id = %event.query_id, sequence = event.sequence, "applied change event");
                    StatusCode::OK
                }
                Err(err @ IngestError::UnknownQuery(_)) => {
                    warn!(query_id = %event.query_id, error = %err, "rejecting envelope for unconfigured query");
                    StatusCode::BAD_REQUEST
                }
                Err(err) if err.is_retryable() => {
                    warn!(query_id = %event.query_id, error = %err, "retryable failure applying change event");
                    StatusCode::SERVICE_UNAVAILABLE
                }
                Err(err) => {
                    error!(query_id = %event.query_id, error = %err, "failed to apply change event");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }
    }
}

fn handle_control(control: ControlEvent) {
    debug!(query_id = %control.query_id, signal = ?control.control_signal, "received control signal");
}

pub async fn health() -> &'static str { "OK" }
