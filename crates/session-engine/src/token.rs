//! Access token inspection.
//!
//! Reads the claims embedded in a signed token without verifying the
//! signature; the server does that. Everything here is pure and cheap
//! enough to run on every outbound request.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Claims this client cares about.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<f64>,
    #[serde(default)]
    pub iat: Option<f64>,
}

/// Three non-empty, dot-separated base64url segments.
pub fn is_well_formed(token: &str) -> bool {
    let mut segments = 0;
    for segment in token.split('.') {
        segments += 1;
        let segment = segment.trim_end_matches('=');
        if segment.is_empty() || !segment.bytes().all(is_base64url_byte) {
            return false;
        }
    }
    segments == 3
}

fn is_base64url_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Decode the payload segment. `None` for anything malformed.
pub fn claims(token: &str) -> Option<TokenClaims> {
    if !is_well_formed(token) {
        return None;
    }
    let payload = token.split('.').nth(1)?.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub fn subject(token: &str) -> Option<String> {
    claims(token)?.sub
}

/// The `exp` claim as a timestamp.
pub fn expiry(token: &str) -> Option<DateTime<Utc>> {
    claims(token)?.exp.and_then(timestamp)
}

/// Expiry measured from when this client received the token.
///
/// With both `iat` and `exp` present, the token lifetime is applied to
/// `issued_at`, so a skewed server clock does not shift the refresh window.
/// Otherwise falls back to `exp`.
pub fn effective_expiry(token: &str, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let claims = claims(token)?;
    let exp = claims.exp?;
    match claims.iat {
        Some(iat) if exp >= iat => {
            let lifetime_ms = ((exp - iat) * 1000.0) as i64;
            issued_at.checked_add_signed(chrono::Duration::milliseconds(lifetime_ms))
        }
        _ => timestamp(exp),
    }
}

/// A malformed token, or one without `exp`, counts as expired.
pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    expired(expiry(token), now)
}

/// True once `now` is within `lead` of expiry.
pub fn should_refresh(token: &str, now: DateTime<Utc>, lead: Duration) -> bool {
    refresh_due(expiry(token), now, lead)
}

/// [`is_expired`] for an already computed expiry.
pub fn expired(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expiry {
        Some(expiry) => expiry <= now,
        None => true,
    }
}

/// [`should_refresh`] for an already computed expiry.
pub fn refresh_due(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>, lead: Duration) -> bool {
    let Some(expiry) = expiry else {
        return true;
    };
    let lead_ms = i64::try_from(lead.as_millis()).unwrap_or(i64::MAX);
    (expiry - now).num_milliseconds() <= lead_ms
}

fn timestamp(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt((seconds * 1000.0) as i64).single()
}
