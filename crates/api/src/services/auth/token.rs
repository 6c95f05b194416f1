//! HS256 bearer tokens.
//!
//! Tokens are compact JWTs: `base64url(header).base64url(claims).base64url(sig)`
//! without padding, signed with HMAC-SHA256 over the first two segments.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use emporium_core::{UserId, UserRole};

use crate::models::User;

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Token verification failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("unsupported token algorithm")]
    UnsupportedAlgorithm,
    #[error("invalid token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token could not be signed")]
    Signing,
}

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: UserId,
    pub email: String,
    pub role: UserRole,
    /// Issued at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// A freshly signed token.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies bearer tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: SecretString,
    ttl: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenSigner {
    #[must_use]
    pub const fn new(secret: SecretString, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| TokenError::Signing)
    }

    /// Issue a token for `user`, valid from `now` for the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if the claims cannot be encoded.
    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: user.id,
            email: user.email.as_str().to_string(),
            role: user.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        Ok(IssuedToken {
            token: self.sign(&claims)?,
            expires_at,
        })
    }

    /// Encode and sign arbitrary claims.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if the claims cannot be encoded.
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let header = URL_SAFE_NO_PAD.encode(HEADER);
        let claims = serde_json::to_vec(claims).map_err(|_| TokenError::Signing)?;
        let payload = URL_SAFE_NO_PAD.encode(claims);
        let signing_input = format!("{header}.{payload}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] for malformed, tampered or expired tokens.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let header: Header = URL_SAFE_NO_PAD
            .decode(header)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(TokenError::Malformed)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlgorithm);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        let signed_len = token.len() - signature_segment_len(token);
        let mut mac = self.mac()?;
        mac.update(token.as_bytes().get(..signed_len).ok_or(TokenError::Malformed)?);
        // Constant-time comparison.
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(TokenError::Malformed)?;

        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

/// Length of the final `.signature` segment including its dot.
fn signature_segment_len(token: &str) -> usize {
    token.rfind('.').map_or(0, |dot| token.len() - dot)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use emporium_core::Email;

    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(
            SecretString::from("k8Jf2nQ9xLm4Vp7Rt1Yw6Zc3Bh5Ns0Dg"),
            Duration::hours(24),
        )
    }

    fn user() -> User {
        User {
            id: UserId::generate(),
            email: Email::parse("grace@example.com").unwrap(),
            password_hash: String::new(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            role: UserRole::Admin,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_issue_then_verify() {
        let user = user();
        let now = Utc::now();
        let issued = signer().issue(&user, now).unwrap();
        let claims = signer().verify(&issued.token, now).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.email, "grace@example.com");
        assert_eq!(issued.token.split('.').count(), 3);
        assert!(!issued.token.contains('='));
    }

    #[test]
    fn test_expired_token_rejected() {
        let now = Utc::now();
        let issued = signer().issue(&user(), now).unwrap();
        let later = now + Duration::hours(25);
        assert_eq!(signer().verify(&issued.token, later), Err(TokenError::Expired));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let now = Utc::now();
        let issued = signer().issue(&user(), now).unwrap();
        let parts: Vec<&str> = issued.token.split('.').collect();

        let mut claims: Claims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        claims.role = UserRole::Admin;
        claims.sub = UserId::generate();
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let forged = format!("{}.{forged_payload}.{}", parts[0], parts[2]);

        assert_eq!(signer().verify(&forged, now), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let now = Utc::now();
        let issued = signer().issue(&user(), now).unwrap();
        let other = TokenSigner::new(
            SecretString::from("Zq4Wm8Xr2Tn6Yb0Kc5Vh9Lp3Jd7Fs1Ga"),
            Duration::hours(24),
        );
        assert_eq!(other.verify(&issued.token, now), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_malformed_tokens() {
        let now = Utc::now();
        assert_eq!(signer().verify("", now), Err(TokenError::Malformed));
        assert_eq!(signer().verify("a.b", now), Err(TokenError::Malformed));
        assert_eq!(signer().verify("a.b.c.d", now), Err(TokenError::Malformed));
        assert_eq!(signer().verify("!!.@@.##", now), Err(TokenError::Malformed));
    }

    #[test]
    fn test_alg_none_rejected() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let token = format!("{header}.e30.");
        assert_eq!(
            signer().verify(&token, Utc::now()),
            Err(TokenError::UnsupportedAlgorithm)
        );
    }
}
