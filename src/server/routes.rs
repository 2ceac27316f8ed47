//! Built-in endpoints: `/version`, `/infos`, `/autoupdate`.

use super::AppState;
use crate::constants::{FORWARDED_FOR_HEADER, RESPONSE_FLUSH_DELAY, UPDATE_SECRET_HEADER};
use crate::core::HotError;
use crate::diagnostics;
use crate::update::{ReceiveOutcome, UpdateRequestContext, VersionIdentity, version_document};
use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

type AppStateArc = Arc<AppState>;

pub fn builtin_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/version", get(version))
        .route("/infos", get(infos))
        .route("/autoupdate", put(autoupdate))
}

async fn version(State(state): State<AppStateArc>) -> Response {
    let identity = VersionIdentity::from_config(state.config.as_ref());
    text(StatusCode::OK, version_document(&identity))
}

async fn infos(
    State(state): State<AppStateArc>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let source_ip = source_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    if let Err(err) = state.guard.check(&source_ip) {
        return error_response(&err);
    }
    text(StatusCode::OK, diagnostics::infos(state.config.as_ref()))
}

async fn autoupdate(
    State(state): State<AppStateArc>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let source_ip = source_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    if let Err(err) = state.guard.check(&source_ip) {
        return error_response(&err);
    }

    let presented_secret = headers
        .get(UPDATE_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let ctx = UpdateRequestContext {
        source_ip,
        presented_secret,
        payload: body.into_data_stream(),
    };

    match state.receiver.receive(ctx).await {
        ReceiveOutcome::Saved(staged) => {
            let sink = Arc::clone(&state.sink);
            tokio::spawn(async move {
                // Let the 200 reach the caller before this process goes away.
                tokio::time::sleep(RESPONSE_FLUSH_DELAY).await;
                info!("Applying update from {}", staged.path.display());
                // Script writing, process lookup and spawning all block.
                if let Err(err) = tokio::task::spawn_blocking(move || sink.deliver(staged)).await {
                    error!("Update hand-off task failed: {}", err);
                }
            });
            text(StatusCode::OK, "update received".to_string())
        }
        ReceiveOutcome::Rejected(err) | ReceiveOutcome::Failed(err) => error_response(&err),
    }
}

/// Caller address: first `X-Forwarded-For` entry, else the peer address.
pub(crate) fn source_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get(FORWARDED_FOR_HEADER)
        && let Ok(forwarded) = forwarded.to_str()
        && let Some(first) = forwarded.split(',').next()
        && !first.trim().is_empty()
    {
        return first.trim().to_string();
    }

    match peer {
        Some(addr) => addr.ip().to_canonical().to_string(),
        None => "unknown".to_string(),
    }
}

fn error_response(err: &HotError) -> Response {
    let message = match err {
        HotError::Configuration { .. } | HotError::ConfigParse { .. } => "configuration failure",
        HotError::Unauthorized { .. } | HotError::Forbidden { .. } => "unauthorized",
        _ => "update failed",
    };
    text(err.http_status(), message.to_string())
}

fn text(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_for_first_entry_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static("10.0.0.5, 172.16.0.1"));
        let peer: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        assert_eq!(source_ip(&headers, Some(peer)), "10.0.0.5");
    }

    #[test]
    fn test_peer_address_fallback() {
        let peer: SocketAddr = "192.168.1.9:5555".parse().unwrap();
        assert_eq!(source_ip(&HeaderMap::new(), Some(peer)), "192.168.1.9");
        assert_eq!(source_ip(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn test_ipv4_mapped_peer_is_canonical() {
        let peer: SocketAddr = "[::ffff:10.0.0.5]:5555".parse().unwrap();
        assert_eq!(source_ip(&HeaderMap::new(), Some(peer)), "10.0.0.5");
    }

    #[test]
    fn test_error_messages_stay_generic() {
        let response = error_response(&HotError::Transfer {
            reason: "disk full at /opt/secret/path".to_string(),
        });
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
