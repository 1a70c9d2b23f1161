//! The per-request pipeline executor (§4.5): runs an ordered list of
//! commands, threading tags, environment, and body between them.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use cmdgate_core::{tags, Command};
use http::{HeaderName, HeaderValue, StatusCode};
use tracing::{debug, error};

use crate::state::AppState;

/// Maximum request body size buffered before a stage ever runs.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Run one endpoint's pipeline against an incoming request.
///
/// Callers (the router builder) close over a specific `pipeline` and build
/// a per-route axum handler that calls this with a clone of it — each
/// request gets its own clone of the ancestor command list, never a shared
/// mutable one.
///
/// `id_params` lists, outermost first, the axum-literal path-parameter names
/// that each carry one resource's instance id (see
/// [`cmdgate_core::Endpoint::id_params`]); they're resolved here into a
/// single ordered `HTTP_PARAM_ID` chain so a nested resource's id correctly
/// shadows its parent's.
pub async fn execute_pipeline(
    state: Arc<AppState>,
    pipeline: Vec<Arc<Command>>,
    id_params: Vec<String>,
    params: HashMap<String, String>,
    req: Request,
) -> Response {
    let params = ordered_params(&id_params, &params);
    let (parts, body) = req.into_parts();
    let mut env = cmdgate_core::env::from_request(&parts.method, &parts.uri, &parts.headers, &params);

    let mut current_input = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => return error_response(format!("failed to read request body: {e}")),
    };

    let mut terminal = tags::TagMap::new();

    for command in &pipeline {
        let driver = match state.driver_for(command).await {
            Ok(driver) => driver,
            Err(e) => return error_response(e.to_string()),
        };

        let output = match driver
            .execute(
                command,
                &env,
                cmdgate_drivers::Streams::new(current_input.clone()),
            )
            .await
        {
            Ok(output) => output,
            Err(e) => return error_response(e.to_string()),
        };

        for line in output.stderr.split(|&b| b == b'\n') {
            if !line.is_empty() {
                debug!(stage = %command.name, stderr = %String::from_utf8_lossy(line), "stage stderr");
            }
        }

        if output.status != 0 {
            return (StatusCode::INTERNAL_SERVER_ERROR, output.stdout).into_response();
        }

        let parsed = match tags::parse_tags(&output.stdout) {
            Ok(parsed) => parsed,
            Err(e) => return error_response(e.to_string()),
        };

        let outcome = match tags::apply_between_stage(&parsed.tags, &mut env, &mut terminal) {
            Ok(outcome) => outcome,
            Err(e) => return error_response(e.to_string()),
        };

        current_input = parsed.body;

        if outcome.halt {
            break;
        }
    }

    apply_terminal(&terminal, current_input)
}

/// Resolve axum's flat path-parameter map into the ordered pair list
/// `cmdgate_core::env::from_request` expects, mapping every name in
/// `id_params` (outermost first) to the logical name `id` so nested
/// resources shadow correctly, then appending any other named parameters
/// (sorted, for determinism) this route doesn't otherwise have today.
fn ordered_params(id_params: &[String], params: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut ordered = Vec::with_capacity(params.len());
    for name in id_params {
        if let Some(value) = params.get(name) {
            ordered.push(("id".to_string(), value.clone()));
        }
    }

    let mut rest: Vec<_> = params
        .iter()
        .filter(|(name, _)| !id_params.contains(name))
        .collect();
    rest.sort_by(|a, b| a.0.cmp(b.0));
    for (name, value) in rest {
        ordered.push((name.clone(), value.clone()));
    }

    ordered
}

fn apply_terminal(terminal: &tags::TagMap, body: Bytes) -> Response {
    let effects = match tags::resolve_terminal(terminal) {
        Ok(effects) => effects,
        Err(e) => return error_response(e.to_string()),
    };

    let mut status = StatusCode::OK;
    let mut headers = Vec::new();

    for effect in effects {
        match effect {
            tags::TerminalEffect::ContentType(value) => {
                if let Ok(value) = HeaderValue::from_str(&value) {
                    headers.push((HeaderName::from_static("content-type"), value));
                }
            }
            tags::TerminalEffect::StatusCode(code) => {
                status = StatusCode::from_u16(code).unwrap_or(StatusCode::OK);
            }
            tags::TerminalEffect::Redirect(location) => {
                if let Ok(value) = HeaderValue::from_str(&location) {
                    headers.push((HeaderName::from_static("location"), value));
                }
            }
        }
    }

    let mut response = Response::builder().status(status);
    for (name, value) in headers {
        response = response.header(name, value);
    }
    response
        .body(Body::from(body))
        .unwrap_or_else(|e| error_response(format!("failed to build response: {e}")))
}

fn error_response(message: String) -> Response {
    error!(%message, "pipeline stage failed");
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}
