use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::domain::UserId;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub session_secret: String,
    pub session_ttl_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: i64,
    iat: i64,
    exp: i64,
}

pub fn mint_session_token(
    cfg: &AuthConfig,
    user_id: UserId,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::seconds(cfg.session_ttl_seconds);
    let claims = SessionClaims {
        sub: user_id.0,
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.session_secret.as_bytes()),
    )
}

/// None for anything but a well-formed, unexpired token signed with
/// our secret.
pub fn verify_session_token(cfg: &AuthConfig, token: &str) -> Option<UserId> {
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(cfg.session_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;
    Some(UserId(data.claims.sub))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AuthConfig {
        AuthConfig {
            session_secret: "test-secret".to_string(),
            session_ttl_seconds: 3600,
        }
    }

    #[test]
    fn token_round_trips() {
        let token = mint_session_token(&cfg(), UserId(42)).expect("mint");
        assert_eq!(verify_session_token(&cfg(), &token), Some(UserId(42)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let expired = AuthConfig {
            session_ttl_seconds: -600,
            ..cfg()
        };
        let token = mint_session_token(&expired, UserId(42)).expect("mint");
        assert_eq!(verify_session_token(&cfg(), &token), None);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = mint_session_token(&cfg(), UserId(42)).expect("mint");
        let other = AuthConfig {
            session_secret: "another-secret".to_string(),
            ..cfg()
        };
        assert_eq!(verify_session_token(&other, &token), None);
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert_eq!(verify_session_token(&cfg(), "not-a-token"), None);
    }
}
