//! Session security middleware for Axum.
//!
//! Re-validates the session binding on every request that carries a session
//! token and slides the session's expiry.
//!
//! ```rust,ignore
//! use axum::{Router, middleware};
//! use myrvm_session::middleware::session_security;
//!
//! let app = Router::new()
//!     .route("/api/kiosk/status", get(status))
//!     .layer(middleware::from_fn_with_state(sessions.clone(), session_security::<AnyStore>));
//! ```

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use myrvm_cache::{CacheStore, ScanPrefix};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::model::SessionRecord;
use crate::service::SessionService;

/// Header carrying the session token.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

pub async fn session_security<S>(
    State(sessions): State<SessionService<S>>,
    mut req: Request,
    next: Next,
) -> Response
where
    S: CacheStore + ScanPrefix,
{
    let Some(session_id) = header_value(req.headers(), SESSION_TOKEN_HEADER).map(str::to_owned)
    else {
        return next.run(req).await;
    };

    let ip = client_ip(&req);
    let user_agent = header_value(req.headers(), header::USER_AGENT.as_str())
        .unwrap_or_default()
        .to_owned();

    if !sessions
        .validate_session_security(&session_id, &ip, &user_agent)
        .await
    {
        warn!(
            session.id = %session_id,
            ip = %ip,
            user_agent = %user_agent,
            url = %req.uri(),
            "Session security validation failed"
        );

        if expects_json(&req) {
            return SessionError::SecurityViolation.into_response();
        }
        return Redirect::to(&sessions.config().login_path).into_response();
    }

    let config = sessions.config();
    let remaining = sessions.get_session_ttl(&session_id).await;
    let refreshed = if Duration::from_secs(remaining) < config.renew_threshold() {
        debug!(session.id = %session_id, remaining, "Renewing session");
        sessions.extend_session(&session_id, config.renew_ttl()).await
    } else {
        sessions.touch_session(&session_id).await
    };
    if let Err(e) = refreshed {
        warn!(session.id = %session_id, error = %e, "Failed to refresh session");
    }

    match sessions.get_session(&session_id).await {
        Ok(record) => {
            req.extensions_mut().insert(record);
        }
        Err(e) => warn!(session.id = %session_id, error = %e, "Validated session vanished"),
    }

    next.run(req).await
}

/// Session validated by [`session_security`] for this request.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionRecord);

impl<St: Send + Sync> FromRequestParts<St> for CurrentSession {
    type Rejection = SessionError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionRecord>()
            .cloned()
            .map(CurrentSession)
            .ok_or(SessionError::SecurityViolation)
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// First `X-Forwarded-For` hop, else the peer address.
fn client_ip(req: &Request) -> String {
    if let Some(forwarded) = header_value(req.headers(), "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// API-style callers get JSON errors instead of a login redirect.
fn expects_json(req: &Request) -> bool {
    let headers = req.headers();
    let accepts_json = header_value(headers, header::ACCEPT.as_str())
        .is_some_and(|accept| accept.contains("application/json"));
    let ajax = header_value(headers, "x-requested-with")
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));

    accepts_json || ajax || req.uri().path().starts_with("/api/")
}
