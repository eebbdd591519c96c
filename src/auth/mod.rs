use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::Claims;

/// Issues and validates participant identity tokens (HS256 JWT).
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            expiry: Duration::seconds(config.jwt_expiry_seconds as i64),
            clock,
        }
    }

    /// Issue a token for a participant; not renewable.
    pub fn issue_token(&self, participant_id: &str, is_host: bool) -> Result<String> {
        let now = self.clock.now();

        let claims = Claims {
            participant_id: participant_id.to_string(),
            is_host,
            iat: now.timestamp(),
            exp: (now + self.expiry).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::InternalError(format!("Failed to sign token: {}", e)))
    }

    /// Validate a token and return its claims.
    ///
    /// Expiry is checked against the injected clock with no leeway, so an
    /// expired token is rejected the moment it lapses.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

        if token_data.claims.exp <= self.clock.now().timestamp() {
            return Err(AppError::Unauthorized("Token has expired".to_string()));
        }

        Ok(token_data.claims)
    }

    /// Extract token from query string format: "token=xxx"
    pub fn extract_from_query(&self, query: &str) -> Result<Claims> {
        let token = query
            .split('&')
            .find_map(|pair| {
                let mut parts = pair.split('=');
                match (parts.next(), parts.next()) {
                    (Some("token"), Some(value)) if !value.is_empty() => Some(value),
                    _ => None,
                }
            })
            .ok_or_else(|| AppError::Unauthorized("Token not found in query".to_string()))?;

        self.validate_token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use crate::config::KeyRotationMode;

    fn test_config(secret: &str) -> Config {
        Config {
            server_host: "localhost".to_string(),
            server_port: 8080,
            redis_url: "redis://localhost".to_string(),
            jwt_secret: secret.to_string(),
            jwt_expiry_seconds: 900,
            invitation_key_ttl_seconds: 60,
            key_rotation_seconds: 60,
            key_poll_seconds: 30,
            key_rotation_mode: KeyRotationMode::Push,
            request_timeout_seconds: 30,
            stun_server: "stun:stun.l.google.com:19302".to_string(),
            turn_server: None,
            turn_username: None,
            turn_credential: None,
        }
    }

    #[test]
    fn test_issue_and_validate_token() {
        let tokens = TokenService::new(&test_config("test-secret-key"), Arc::new(SystemClock));

        let token = tokens
            .issue_token("participant-123", true)
            .expect("Should issue token");

        let claims = tokens.validate_token(&token).expect("Should validate token");

        assert_eq!(claims.participant_id, "participant-123");
        assert!(claims.is_host);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_guest_token_is_not_host() {
        let tokens = TokenService::new(&test_config("test-secret-key"), Arc::new(SystemClock));
        let token = tokens.issue_token("guest-1", false).unwrap();

        assert!(!tokens.validate_token(&token).unwrap().is_host);
    }

    #[test]
    fn test_expired_token_rejected() {
        let clock = Arc::new(ManualClock::starting_now());
        let tokens = TokenService::new(&test_config("test-secret-key"), clock.clone());
        let token = tokens.issue_token("participant-123", true).unwrap();

        clock.advance(Duration::minutes(14));
        assert!(tokens.validate_token(&token).is_ok());

        clock.advance(Duration::minutes(1) + Duration::seconds(1));
        let result = tokens.validate_token(&token);
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_token_signed_with_other_secret_rejected() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let forger = TokenService::new(&test_config("attacker-secret"), clock.clone());
        let tokens = TokenService::new(&test_config("test-secret-key"), clock);

        let forged = forger.issue_token("participant-123", true).unwrap();
        assert!(matches!(
            tokens.validate_token(&forged),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_extract_from_query() {
        let tokens = TokenService::new(&test_config("test-secret-key"), Arc::new(SystemClock));
        let token = tokens.issue_token("participant-123", true).unwrap();

        let query = format!("foo=bar&token={}", token);
        let claims = tokens
            .extract_from_query(&query)
            .expect("Should extract from query");

        assert_eq!(claims.participant_id, "participant-123");
        assert!(tokens.extract_from_query("foo=bar").is_err());
        assert!(tokens.extract_from_query("token=").is_err());
    }

    #[test]
    fn test_invalid_token() {
        let tokens = TokenService::new(&test_config("test-secret-key"), Arc::new(SystemClock));

        let result = tokens.validate_token("invalid-token");
        assert!(result.is_err());
    }
}
