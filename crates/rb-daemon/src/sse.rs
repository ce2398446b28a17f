// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `/exec` and `/exec/cancel` handlers. `/exec` streams the
//! zero-or-more-`log`, zero-or-one-`outputs`, zero-or-one-`files`,
//! exactly-one-terminal-`status` sequence; a pre-spawn failure collapses
//! to a single terminal `error` event instead.

use crate::dto::{ExecCancelRequest, ExecRequest};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use rb_core::{ErrorCode, ErrorInfo};
use rb_exec::{ExecEvent, ExecutionRequest};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

pub async fn exec(State(state): State<Arc<AppState>>, Json(request): Json<ExecRequest>) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let executable_ref = match (request.executable_id, request.component_id) {
        (Some(id), None) => id,
        (None, Some(id)) => id,
        _ => {
            return Err(ErrorInfo::new(ErrorCode::UsageError, "exactly one of executableId or componentId is required").into());
        }
    };

    let execution_id = Uuid::new_v4().to_string();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    state.register_execution(execution_id.clone(), cancel_tx);

    let (tx, rx) = mpsc::unbounded_channel::<ExecEvent>();
    let (fatal_tx, fatal_rx) = oneshot::channel::<Option<ErrorInfo>>();

    let engine = state.engine.clone();
    let state_for_cleanup = state.clone();
    let execution_id_for_cleanup = execution_id.clone();
    tokio::spawn(async move {
        let exec_request = ExecutionRequest {
            executable_ref,
            values: request.variables,
            auth_env: request.auth_env,
            use_pty: request.use_pty,
        };
        let result = engine.execute(exec_request, tx, cancel_rx).await;
        state_for_cleanup.unregister_execution(&execution_id_for_cleanup);
        let _ = fatal_tx.send(result.err());
    });

    let events = UnboundedReceiverStream::new(rx).map(|event| Ok(to_sse_event(&event)));
    let fatal = stream::once(async move { fatal_rx.await.ok().flatten() }).filter_map(|maybe_error| async move { maybe_error.map(|e| Ok(fatal_sse_event(&e))) });

    Ok(Sse::new(events.chain(fatal)).keep_alive(KeepAlive::default()))
}

pub async fn exec_cancel(State(state): State<Arc<AppState>>, Json(request): Json<ExecCancelRequest>) -> Json<serde_json::Value> {
    state.cancel_execution(&request.execution_id);
    Json(json!({}))
}

fn to_sse_event(event: &ExecEvent) -> Event {
    match event {
        ExecEvent::Log(entry) => Event::default().event("log").json_data(entry).expect("log entry always serializes"),
        ExecEvent::Outputs(outputs) => Event::default().event("outputs").json_data(json!({ "outputs": outputs })).expect("outputs always serialize"),
        ExecEvent::Files(tree) => Event::default()
            .event("files")
            .json_data(json!({ "fileTree": tree.children.clone().unwrap_or_default() }))
            .expect("file tree always serializes"),
        ExecEvent::Status(status, exit_code) => Event::default()
            .event("status")
            .json_data(json!({ "status": status, "exitCode": exit_code }))
            .expect("status always serializes"),
    }
}

fn fatal_sse_event(error: &ErrorInfo) -> Event {
    Event::default()
        .event("error")
        .json_data(json!({ "message": error.message, "details": error.context }))
        .expect("error payload always serializes")
}
