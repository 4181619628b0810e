use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Scope of a one-off token. Each purpose mixes its own salt into the
/// signing key, so a token issued for one purpose fails signature
/// verification when presented for the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    EmailVerify,
    PasswordReset,
}

impl TokenPurpose {
    fn salt(self) -> &'static [u8] {
        match self {
            TokenPurpose::EmailVerify => b"email-verify",
            TokenPurpose::PasswordReset => b"password-reset",
        }
    }

    /// Window during which the token is accepted, measured from issuance.
    pub fn max_age(self) -> time::Duration {
        match self {
            TokenPurpose::EmailVerify => time::Duration::hours(24),
            TokenPurpose::PasswordReset => time::Duration::hours(1),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
}

#[derive(Debug, Serialize, Deserialize)]
struct PurposeClaims {
    sub: i64,
    iat: usize,
    exp: usize,
}

/// Issues and verifies signed, time-limited, purpose-scoped tokens.
/// Tokens are not tracked server-side: anyone presenting a valid one within
/// its window is accepted (see DESIGN.md on replay).
#[derive(Clone)]
pub struct PurposeTokens {
    secret: Vec<u8>,
}

impl PurposeTokens {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn key_material(&self, purpose: TokenPurpose) -> Vec<u8> {
        let mut key = self.secret.clone();
        key.extend_from_slice(purpose.salt());
        key
    }

    pub fn issue(&self, purpose: TokenPurpose, user_id: i64) -> anyhow::Result<String> {
        self.issue_at(purpose, user_id, OffsetDateTime::now_utc())
    }

    fn issue_at(
        &self,
        purpose: TokenPurpose,
        user_id: i64,
        now: OffsetDateTime,
    ) -> anyhow::Result<String> {
        let exp = now + purpose.max_age();
        let claims = PurposeClaims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
        };
        let key = EncodingKey::from_secret(&self.key_material(purpose));
        Ok(encode(&Header::default(), &claims, &key)?)
    }

    /// Returns the subject user id when the signature checks out and the
    /// token is inside its window.
    pub fn verify(&self, purpose: TokenPurpose, token: &str) -> Result<i64, TokenError> {
        let key = DecodingKey::from_secret(&self.key_material(purpose));
        let mut validation = Validation::default();
        validation.leeway = 0;
        match decode::<PurposeClaims>(token, &key, &validation) {
            Ok(data) => Ok(data.claims.sub),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(TokenError::Expired),
                _ => Err(TokenError::Invalid),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> PurposeTokens {
        PurposeTokens::new("unit-test-secret")
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let t = tokens();
        let token = t.issue(TokenPurpose::PasswordReset, 9).expect("issue");
        assert_eq!(t.verify(TokenPurpose::PasswordReset, &token), Ok(9));
    }

    #[test]
    fn cross_purpose_presentation_is_invalid() {
        let t = tokens();
        let token = t.issue(TokenPurpose::EmailVerify, 9).expect("issue");
        assert_eq!(
            t.verify(TokenPurpose::PasswordReset, &token),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn expired_token_reports_expired() {
        let t = tokens();
        let issued = OffsetDateTime::now_utc() - time::Duration::hours(2);
        let token = t
            .issue_at(TokenPurpose::PasswordReset, 9, issued)
            .expect("issue");
        assert_eq!(
            t.verify(TokenPurpose::PasswordReset, &token),
            Err(TokenError::Expired)
        );
        // The verify window (24h) is longer, so the same age still passes.
        let token = t
            .issue_at(TokenPurpose::EmailVerify, 9, issued)
            .expect("issue");
        assert_eq!(t.verify(TokenPurpose::EmailVerify, &token), Ok(9));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let t = tokens();
        let mut token = t.issue(TokenPurpose::EmailVerify, 9).expect("issue");
        token.push('A');
        assert_eq!(
            t.verify(TokenPurpose::EmailVerify, &token),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn different_secret_is_invalid() {
        let token = tokens().issue(TokenPurpose::EmailVerify, 9).expect("issue");
        let other = PurposeTokens::new("another-secret");
        assert_eq!(
            other.verify(TokenPurpose::EmailVerify, &token),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn replay_within_window_is_accepted() {
        // No revocation list: a captured token stays valid until expiry.
        let t = tokens();
        let token = t.issue(TokenPurpose::PasswordReset, 9).expect("issue");
        assert_eq!(t.verify(TokenPurpose::PasswordReset, &token), Ok(9));
        assert_eq!(t.verify(TokenPurpose::PasswordReset, &token), Ok(9));
    }
}
