use crate::containment::{blocklist::IpBlocklist, containment_engine::normalize_ip};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct GatewayState {
    pub blocklist: Arc<IpBlocklist>,
    /// Honour `x-forwarded-for` and friends. Only safe behind a proxy that
    /// overwrites them.
    pub trust_proxy_headers: bool,
}

/// Where a request came from, resolved once at the gateway and stored as a
/// request extension for the layers behind it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientAddress {
    /// Socket peer, present when served with connect info
    pub peer: Option<String>,
    /// Client named by a trusted proxy header
    pub forwarded: Option<String>,
}

impl ClientAddress {
    pub fn resolve(request: &Request, trust_proxy_headers: bool) -> Self {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .and_then(|ConnectInfo(addr)| normalize_ip(&addr.ip().to_string()).ok());
        let forwarded = if trust_proxy_headers {
            extract_ip_address(request.headers())
        } else {
            None
        };
        Self { peer, forwarded }
    }

    /// Address the caller is identified by
    pub fn client_ip(&self) -> Option<&str> {
        self.forwarded.as_deref().or(self.peer.as_deref())
    }

    fn candidates(&self) -> impl Iterator<Item = &str> {
        self.forwarded.iter().chain(self.peer.iter()).map(String::as_str)
    }
}

/// Gateway check: requests from a blocked address get a fixed denial and
/// never reach a handler.
///
/// Both the socket peer and any trusted forwarded address are checked, so a
/// blocked peer cannot get through by naming another client in a header.
pub async fn ip_block_middleware(
    State(gateway): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    let address = ClientAddress::resolve(&request, gateway.trust_proxy_headers);

    for ip in address.candidates() {
        if gateway.blocklist.is_blocked(ip).await {
            warn!(ip_address = %ip, path = %request.uri().path(), "Request from blocked address rejected");
            return blocked_response();
        }
    }

    request.extensions_mut().insert(address);
    next.run(request).await
}

pub fn blocked_response() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "access_denied",
            "message": "Access denied",
        })),
    )
        .into_response()
}

/// Client address from proxy headers, normalized to the block-set form
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    // X-Forwarded-For first; the first hop is the client
    if let Some(forwarded_for) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded_for.to_str() {
            if let Some(first_ip) = value.split(',').next() {
                if let Ok(ip) = normalize_ip(first_ip) {
                    return Some(ip);
                }
            }
        }
    }

    for header in ["x-real-ip", "cf-connecting-ip"] {
        if let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) {
            if let Ok(ip) = normalize_ip(value) {
                return Some(ip);
            }
        }
    }

    None
}
