//! Request context and attribution resolution
//!
//! Computes the `(session_id, user_id)` pair attached to every instrumented
//! span. Each field resolves independently through a fixed precedence:
//!
//! 1. a caller-supplied extractor over the call arguments;
//! 2. HTTP headers (`Mcp-Session-Id` for the session, the JWT subject claim
//!    from `Authorization: Bearer <token>` for the user);
//! 3. the client-level defaults in [`TelemetryConfig`].
//!
//! An unresolved user id becomes the literal `"anonymous"`; an unresolved
//! session id stays absent and is omitted from the span.
//!
//! JWT handling here is best-effort attribution, NOT authentication: the
//! token signature is never verified and the extracted subject must not be
//! used for authorization decisions.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;
use tracing::debug;

use crate::config::TelemetryConfig;

/// MCP header names used for attribution
pub mod headers {
    /// Session ID header for stateful MCP connections
    pub const MCP_SESSION_ID: &str = "Mcp-Session-Id";
    /// Bearer-token header the user id is derived from
    pub const AUTHORIZATION: &str = "Authorization";
}

/// User id recorded when no source resolves one
pub const ANONYMOUS_USER: &str = "anonymous";

/// Caller-supplied closure deriving an identifier from the call's argument
/// object. Returning `None` degrades resolution to the next source.
pub type Extractor = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Resolved attribution for a single instrumented call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    /// Session id, absent when unresolved (never defaulted to a placeholder)
    pub session_id: Option<String>,
    /// User id, `"anonymous"` when unresolved
    pub user_id: String,
}

/// Per-request view of MCP HTTP headers
///
/// Captures the session id and the user id derivable from a request's
/// headers, along with the decoded (unverified) token claims.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Session id from the `Mcp-Session-Id` header
    pub session_id: Option<String>,
    /// User id from the bearer token's subject claim
    pub user_id: Option<String>,
    /// Raw headers for additional access
    pub headers: HashMap<String, String>,
    /// Decoded JWT claims, empty when the token was absent or malformed
    pub token_claims: serde_json::Map<String, Value>,
}

impl RequestContext {
    /// Build a context from HTTP headers. Header-name lookup is
    /// case-insensitive; any malformed token degrades to empty claims.
    #[must_use]
    pub fn from_headers(headers: &HashMap<String, String>) -> Self {
        let session_id = header_value(headers, headers::MCP_SESSION_ID).map(String::from);

        let (user_id, token_claims) = match header_value(headers, headers::AUTHORIZATION) {
            Some(auth) => (user_id_from_token(auth), parse_jwt_claims(auth)),
            None => (None, serde_json::Map::new()),
        };

        Self {
            session_id,
            user_id,
            headers: headers.clone(),
            token_claims,
        }
    }
}

/// Case-insensitive header lookup
fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Decode the payload claims of a JWT without verifying its signature.
///
/// Accepts the token with or without a `Bearer ` prefix and with or without
/// base64url padding. Any parse failure yields an empty map; this can never
/// fail an instrumented call.
#[must_use]
pub fn parse_jwt_claims(token: &str) -> serde_json::Map<String, Value> {
    let token = strip_bearer(token.trim());

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return serde_json::Map::new();
    }

    let payload = match URL_SAFE_NO_PAD.decode(parts[1].trim_end_matches('=')) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "JWT payload is not valid base64url");
            return serde_json::Map::new();
        }
    };

    match serde_json::from_slice::<Value>(&payload) {
        Ok(Value::Object(claims)) => claims,
        Ok(_) => serde_json::Map::new(),
        Err(e) => {
            debug!(error = %e, "JWT payload is not a JSON object");
            serde_json::Map::new()
        }
    }
}

/// Extract a user id from a JWT token.
///
/// Prefers the standard `sub` claim, then common alternatives. Returns
/// `None` for malformed tokens or tokens carrying none of the claims.
/// Attribution only; the signature is never checked.
#[must_use]
pub fn user_id_from_token(token: &str) -> Option<String> {
    let claims = parse_jwt_claims(token);

    for claim in ["sub", "user_id", "userId", "uid", "user"] {
        if let Some(value) = claims.get(claim).and_then(Value::as_str)
            && !value.is_empty()
        {
            return Some(value.to_string());
        }
    }

    None
}

fn strip_bearer(token: &str) -> &str {
    if token
        .get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("bearer "))
    {
        &token[7..]
    } else {
        token
    }
}

/// Resolve session and user attribution for one instrumented call.
///
/// Pure and deterministic: reads its inputs and the immutable config, never
/// mutates anything, and cannot fail. Session and user resolve independently
/// through extractor, then headers, then config defaults.
#[must_use]
pub fn resolve_attribution(
    args: &Value,
    request_headers: Option<&HashMap<String, String>>,
    session_extractor: Option<&Extractor>,
    user_extractor: Option<&Extractor>,
    config: &TelemetryConfig,
) -> Attribution {
    let ctx = request_headers.map(RequestContext::from_headers);

    let session_id = session_extractor
        .and_then(|extract| extract(args))
        .or_else(|| ctx.as_ref().and_then(|c| c.session_id.clone()))
        .or_else(|| config.default_session_id.clone());

    let user_id = user_extractor
        .and_then(|extract| extract(args))
        .or_else(|| ctx.as_ref().and_then(|c| c.user_id.clone()))
        .or_else(|| config.default_user_id.clone())
        .unwrap_or_else(|| ANONYMOUS_USER.to_string());

    Attribution {
        session_id,
        user_id,
    }
}
