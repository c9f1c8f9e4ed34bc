// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client address and user agent, for rate limiting and session metadata.
//!
//! The socket peer is the client address unless the deployment says a proxy
//! in front of us sets the forwarding headers. Those headers are otherwise
//! client-controlled and would let a caller pick its own rate-limit key.

use crate::services::ClientInfo;
use crate::AppState;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

/// Address reported by a trusted proxy: the right-most `X-Forwarded-For`
/// entry (the one our proxy appended), else `X-Real-IP`.
fn forwarded_address(headers: &HeaderMap) -> Option<String> {
    let forwarded = header_str(headers, "x-forwarded-for").and_then(|h| {
        h.rsplit(',')
            .map(str::trim)
            .find(|hop| !hop.is_empty())
    });

    let real_ip = header_str(headers, "x-real-ip")
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    forwarded.or(real_ip).map(str::to_string)
}

/// Client info from the socket peer, or from proxy headers when
/// `trust_proxy_headers` is set.
pub fn extract_client_info(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> ClientInfo {
    let proxied = if trust_proxy_headers {
        forwarded_address(headers)
    } else {
        None
    };

    let ip_address = proxied.or_else(|| peer.map(|addr| addr.ip().to_string()));

    let user_agent = header_str(headers, header::USER_AGENT.as_str()).map(str::to_string);

    ClientInfo {
        ip_address,
        user_agent,
    }
}

impl FromRequestParts<Arc<AppState>> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(extract_client_info(
            &parts.headers,
            peer,
            state.config.trust_proxy_headers,
        ))
    }
}
