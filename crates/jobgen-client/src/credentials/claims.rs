//! Expiry extraction from JWT access tokens.
//!
//! Only the payload segment is read. The signature is the backend's business;
//! the client just needs the `exp` claim to schedule refreshes.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;
use tracing::debug;

/// Decode the `exp` claim of a compact JWT into Unix milliseconds.
///
/// Accepts integer, fractional and stringified `exp` values. Returns `None`
/// for anything that is not a three-segment token with a numeric expiry.
pub fn decode_expiry_ms(token: &str) -> Option<i64> {
    let mut segments = token.trim().split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;

    let exp_secs = match claims.get("exp")? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };

    exp_secs.checked_mul(1000)
}

/// Expiry of `token`, or the epoch when it cannot be decoded.
///
/// An undecodable token is treated as already expired so the next use goes
/// through the refresh path.
pub fn expiry_or_expired(token: &str) -> i64 {
    decode_expiry_ms(token).unwrap_or_else(|| {
        debug!("Access token carries no decodable expiry; treating as expired");
        0
    })
}
