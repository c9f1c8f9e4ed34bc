// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stateless signed bearer tokens (access tokens).
//!
//! Format: `base64url(header).base64url(payload).base64url(signature)` where
//! the signature is HMAC-SHA256 over `header.payload`. Base64 is URL-safe and
//! unpadded, and the header is `{"alg":"HS256","typ":"JWT"}`, so the output is
//! an ordinary HS256 JWT.

use crate::models::Role;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub type Claims = Map<String, Value>;

const ALG: &str = "HS256";

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Errors on the issuing side. Verification never errors; it returns `None`.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("claims must serialize to a JSON object")]
    ClaimsNotObject,

    #[error("signing key rejected by HMAC")]
    InvalidKey,

    #[error("claims serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Claims carried by every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Session id
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims supplied when issuing; `iat`/`exp` are added by the codec.
#[derive(Debug, Clone, Serialize)]
pub struct NewAccessClaims<'a> {
    pub sub: &'a str,
    pub email: &'a str,
    pub role: Role,
    pub sid: &'a str,
}

/// Signs and verifies access tokens with a process-wide secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn sign(&self, signing_input: &str) -> Option<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(signing_input.as_bytes());
        Some(mac.finalize().into_bytes().to_vec())
    }

    /// Sign `claims` plus `iat = now` and `exp = now + ttl` (Unix seconds).
    /// Caller-supplied `iat`/`exp` are overwritten.
    pub fn issue(&self, claims: &impl Serialize, ttl: Duration) -> Result<String, TokenError> {
        let Value::Object(mut payload) = serde_json::to_value(claims)? else {
            return Err(TokenError::ClaimsNotObject);
        };

        let now = Utc::now().timestamp();
        let exp = now.saturating_add(ttl.num_seconds());
        payload.insert("iat".to_string(), Value::from(now));
        payload.insert("exp".to_string(), Value::from(exp));

        let header = Header {
            alg: ALG.to_string(),
            typ: "JWT".to_string(),
        };
        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?);

        let signing_input = format!("{}.{}", header, payload);
        let signature = self.sign(&signing_input).ok_or(TokenError::InvalidKey)?;
        let signature = URL_SAFE_NO_PAD.encode(signature);

        Ok(format!("{}.{}", signing_input, signature))
    }

    /// Verify signature and expiry; return the payload claims.
    ///
    /// Every failure (shape, encoding, signature, expiry) is `None`.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        let mut parts = token.split('.');
        let (header_b64, payload_b64, signature_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => return None,
            };

        let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
        let expected = self.sign(signing_input)?;
        let provided = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
        if !bool::from(expected.ct_eq(&provided)) {
            return None;
        }

        let header: Header =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header_b64).ok()?).ok()?;
        if header.alg != ALG {
            return None;
        }

        let payload: Claims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload_b64).ok()?).ok()?;
        let exp = payload.get("exp")?.as_i64()?;
        if Utc::now().timestamp() >= exp {
            return None;
        }

        Some(payload)
    }

    /// [`verify`](Self::verify) and deserialize the claims into `T`.
    pub fn verify_as<T: DeserializeOwned>(&self, token: &str) -> Option<T> {
        serde_json::from_value(Value::Object(self.verify(token)?)).ok()
    }

    pub fn issue_access(
        &self,
        claims: &NewAccessClaims<'_>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        self.issue(claims, ttl)
    }

    pub fn verify_access(&self, token: &str) -> Option<AccessClaims> {
        self.verify_as(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> TokenCodec {
        TokenCodec::new(b"unit_test_secret".to_vec())
    }

    #[test]
    fn test_roundtrip_keeps_claims_and_adds_times() {
        let codec = codec();
        let claims = json!({ "sub": "user-1", "role": "admin", "n": 7 });
        let token = codec.issue(&claims, Duration::minutes(5)).unwrap();

        let decoded = codec.verify(&token).expect("fresh token verifies");
        assert_eq!(decoded["sub"], "user-1");
        assert_eq!(decoded["role"], "admin");
        assert_eq!(decoded["n"], 7);

        let iat = decoded["iat"].as_i64().unwrap();
        let exp = decoded["exp"].as_i64().unwrap();
        assert_eq!(exp - iat, 300);
    }

    #[test]
    fn test_caller_times_are_overwritten() {
        let codec = codec();
        let claims = json!({ "sub": "x", "exp": 1, "iat": 1 });
        let token = codec.issue(&claims, Duration::hours(1)).unwrap();
        let decoded = codec.verify(&token).expect("exp was replaced");
        assert!(decoded["exp"].as_i64().unwrap() > 1);
    }

    #[test]
    fn test_expired_token_rejected() {
        let codec = codec();
        let token = codec.issue(&json!({ "sub": "x" }), Duration::seconds(-1)).unwrap();
        assert!(codec.verify(&token).is_none());
    }

    #[test]
    fn test_zero_ttl_is_already_expired() {
        let codec = codec();
        let token = codec.issue(&json!({ "sub": "x" }), Duration::zero()).unwrap();
        assert!(codec.verify(&token).is_none());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let codec = codec();
        let token = codec.issue(&json!({ "sub": "user-1" }), Duration::hours(1)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        // Flip each payload character in turn.
        for i in 0..parts[1].len() {
            let mut payload: Vec<u8> = parts[1].bytes().collect();
            payload[i] = if payload[i] == b'A' { b'B' } else { b'A' };
            let tampered = format!(
                "{}.{}.{}",
                parts[0],
                String::from_utf8(payload).unwrap(),
                parts[2]
            );
            if tampered != token {
                assert!(codec.verify(&tampered).is_none(), "position {}", i);
            }
        }
    }

    #[test]
    fn test_forged_claims_rejected() {
        let codec = codec();
        let token = codec.issue(&json!({ "role": "user" }), Duration::hours(1)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let mut claims = codec.verify(&token).unwrap();
        claims.insert("role".to_string(), json!("admin"));
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(codec.verify(&forged).is_none());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = codec().issue(&json!({ "sub": "x" }), Duration::hours(1)).unwrap();
        let other = TokenCodec::new(b"another_secret".to_vec());
        assert!(other.verify(&token).is_none());
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let codec = codec();
        let token = codec.issue(&json!({ "sub": "x" }), Duration::hours(1)).unwrap();

        let extra_segment = format!("{}.extra", token);
        let no_dots = token.replace('.', "");

        for bad in [
            "",
            "abc",
            "a.b",
            "a.b.c.d",
            "invalid.token.here",
            "..",
            extra_segment.as_str(),
            no_dots.as_str(),
        ] {
            assert!(codec.verify(bad).is_none(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_non_object_claims_refused() {
        let result = codec().issue(&json!(["not", "an", "object"]), Duration::hours(1));
        assert!(matches!(result, Err(TokenError::ClaimsNotObject)));
    }

    #[test]
    fn test_access_claims_typed_roundtrip() {
        let codec = codec();
        let token = codec
            .issue_access(
                &NewAccessClaims {
                    sub: "user-9",
                    email: "vet@example.com",
                    role: Role::Veterinarian,
                    sid: "session-1",
                },
                Duration::days(7),
            )
            .unwrap();

        let claims = codec.verify_access(&token).unwrap();
        assert_eq!(claims.sub, "user-9");
        assert_eq!(claims.email, "vet@example.com");
        assert_eq!(claims.role, Role::Veterinarian);
        assert_eq!(claims.sid, "session-1");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_header_shape() {
        let token = codec().issue(&json!({}), Duration::hours(1)).unwrap();
        let header = token.split('.').next().unwrap();
        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header).unwrap()).unwrap();
        assert_eq!(header, json!({ "alg": "HS256", "typ": "JWT" }));
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
    }
}
