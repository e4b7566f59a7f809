use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::config::JwtConfig;
use crate::error::AppError;

use super::Claims;

pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    /// Build a validator, or `None` when tokens are not required
    pub fn from_config(config: &JwtConfig) -> Option<Self> {
        let secret = config.secret.as_deref().filter(|s| !s.is_empty())?;
        Some(Self::new(secret, config))
    }

    pub fn new(secret: &str, config: &JwtConfig) -> Self {
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());

        let mut validation = Validation::default();

        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(ref audience) = config.audience {
            validation.set_audience(&[audience]);
        }

        Self {
            decoding_key,
            validation,
        }
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }
}
