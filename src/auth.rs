//! Bearer-token codec for WebSocket upgrades, plus the constant-time secret
//! comparison used by the internal broadcast channel.
//!
//! Token format: `base64url(payload JSON) + "." + base64url(signature)`,
//! where the signature is HMAC-SHA256 over the UTF-8 bytes of the encoded
//! payload segment. Tokens are stateless — nothing is persisted or revoked
//! server-side, so validity is purely a function of the signature and the
//! optional `exp` claim (Unix seconds, must be strictly in the future).
//!
//! Issuance normally happens in the externally-owned auth layer; [`sign`] is
//! provided for symmetry and for tests.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// The four ways token verification can fail.
///
/// Each kind is logged distinctly server-side; at the HTTP boundary the
/// status is always 401 and only the `Display` text below is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Invalid token format")]
    InvalidFormat,
    #[error("Invalid token signature")]
    InvalidSignature,
    #[error("Invalid token payload")]
    InvalidPayload,
    #[error("Token expired")]
    Expired,
}

/// Typed view of a verified token payload.
///
/// Integer identity fields default to zero when absent so the per-kind
/// resolution step can treat "missing" and "zero" uniformly as unauthorized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenClaims {
    pub user_id: i64,
    pub conversation_id: i64,
    pub cart_user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Sign `payload` with `secret`, producing a compact bearer token.
pub fn sign<T: Serialize>(payload: &T, secret: &str) -> Result<String, TokenError> {
    let payload_json = serde_json::to_vec(payload).map_err(|_| TokenError::InvalidPayload)?;
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json);

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();

    Ok(format!("{payload_b64}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

/// Verify `token` against `secret` and return the decoded payload object.
///
/// The signature is checked before the payload is decoded, using the HMAC
/// primitive's constant-time verification — never a byte-equality loop over
/// the attacker-controlled signature bytes.
pub fn verify(token: &str, secret: &str) -> Result<Value, TokenError> {
    let mut parts = token.split('.');
    let (Some(payload_b64), Some(signature_b64), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::InvalidFormat);
    };
    if payload_b64.is_empty() || signature_b64.is_empty() {
        return Err(TokenError::InvalidFormat);
    }

    let claimed_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| TokenError::InvalidFormat)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&claimed_signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| TokenError::InvalidPayload)?;
    let payload: Value =
        serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::InvalidPayload)?;
    if !payload.is_object() {
        return Err(TokenError::InvalidPayload);
    }

    if let Some(exp) = payload.get("exp").and_then(Value::as_i64) {
        if exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
    }

    Ok(payload)
}

/// Verify `token` and decode its payload into [`TokenClaims`].
pub fn verify_claims(token: &str, secret: &str) -> Result<TokenClaims, TokenError> {
    let payload = verify(token, secret)?;
    serde_json::from_value(payload).map_err(|_| TokenError::InvalidPayload)
}

/// Constant-time string comparison for shared secrets.
///
/// Iterates over the longer of the two lengths and folds the length mismatch
/// into the accumulator before any character comparison, so neither the
/// number of matching leading bytes nor the overall length is observable
/// through timing.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let len = a.len().max(b.len());
    let mut diff = u8::from(a.len() != b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "unit-test-secret";

    fn future_exp() -> i64 {
        Utc::now().timestamp() + 60
    }

    #[test]
    fn round_trips_a_signed_payload() {
        let payload = json!({"userId": 7, "conversationId": 42, "exp": future_exp()});
        let token = sign(&payload, SECRET).unwrap();

        let verified = verify(&token, SECRET).unwrap();
        assert_eq!(verified["userId"], 7);
        assert_eq!(verified["conversationId"], 42);
    }

    #[test]
    fn decodes_typed_claims() {
        let token = sign(
            &json!({"userId": 7, "cartUserId": 9, "role": "agent", "exp": future_exp()}),
            SECRET,
        )
        .unwrap();

        let claims = verify_claims(&token, SECRET).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.cart_user_id, 9);
        assert_eq!(claims.conversation_id, 0);
        assert_eq!(claims.role.as_deref(), Some("agent"));
    }

    #[test]
    fn rejects_expired_tokens_regardless_of_signature() {
        let past = Utc::now().timestamp() - 60;
        let token = sign(&json!({"userId": 7, "exp": past}), SECRET).unwrap();
        assert_eq!(verify(&token, SECRET), Err(TokenError::Expired));
    }

    #[test]
    fn exp_equal_to_now_is_expired() {
        let token = sign(&json!({"userId": 7, "exp": Utc::now().timestamp()}), SECRET).unwrap();
        assert_eq!(verify(&token, SECRET), Err(TokenError::Expired));
    }

    #[test]
    fn payload_without_exp_does_not_expire() {
        let token = sign(&json!({"userId": 7}), SECRET).unwrap();
        assert!(verify(&token, SECRET).is_ok());
    }

    #[test]
    fn rejects_wrong_part_counts() {
        assert_eq!(verify("nodothere", SECRET), Err(TokenError::InvalidFormat));
        assert_eq!(verify("a.b.c", SECRET), Err(TokenError::InvalidFormat));
        assert_eq!(verify(".sig", SECRET), Err(TokenError::InvalidFormat));
        assert_eq!(verify("payload.", SECRET), Err(TokenError::InvalidFormat));
    }

    #[test]
    fn rejects_tampered_signature() {
        let token = sign(&json!({"userId": 7, "exp": future_exp()}), SECRET).unwrap();
        let (payload, signature) = token.split_once('.').unwrap();

        // Flip one bit of the decoded signature and re-encode it.
        let mut bytes = URL_SAFE_NO_PAD.decode(signature).unwrap();
        bytes[0] ^= 0x01;
        let tampered = format!("{payload}.{}", URL_SAFE_NO_PAD.encode(bytes));

        assert_eq!(verify(&tampered, SECRET), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn rejects_tampered_payload() {
        let token = sign(&json!({"userId": 7, "exp": future_exp()}), SECRET).unwrap();
        let (_, signature) = token.split_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(r#"{"userId":8}"#);
        let forged = format!("{forged_payload}.{signature}");

        assert_eq!(verify(&forged, SECRET), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = sign(&json!({"userId": 7, "exp": future_exp()}), SECRET).unwrap();
        assert_eq!(
            verify(&token, "other-secret"),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn rejects_non_object_payloads() {
        // A correctly signed payload that is JSON but not an object.
        let token = sign(&json!([1, 2, 3]), SECRET).unwrap();
        assert_eq!(verify(&token, SECRET), Err(TokenError::InvalidPayload));

        let token = sign(&json!("just a string"), SECRET).unwrap();
        assert_eq!(verify(&token, SECRET), Err(TokenError::InvalidPayload));
    }

    #[test]
    fn rejects_payload_that_is_not_json() {
        let payload_b64 = URL_SAFE_NO_PAD.encode(b"not json at all");
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(payload_b64.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        let token = format!("{payload_b64}.{signature}");

        assert_eq!(verify(&token, SECRET), Err(TokenError::InvalidPayload));
    }

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq("shared-secret", "shared-secret"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn constant_time_eq_rejects_same_length_mismatches() {
        assert!(!constant_time_eq("shared-secret", "shared-secreT"));
        assert!(!constant_time_eq("aaaa", "aaab"));
        assert!(!constant_time_eq("baaa", "aaaa"));
    }

    #[test]
    fn constant_time_eq_rejects_length_mismatches() {
        assert!(!constant_time_eq("secret", "secret-extra"));
        assert!(!constant_time_eq("secret-extra", "secret"));
        assert!(!constant_time_eq("", "x"));
        // A shorter input padded with NULs must not compare equal.
        assert!(!constant_time_eq("ab\0\0", "ab"));
    }
}
