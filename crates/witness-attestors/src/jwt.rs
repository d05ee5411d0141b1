// crates/witness-attestors/src/jwt.rs
// ============================================================================
// Module: JWT Attestor
// Description: Verifies a JSON web token against a remote key set.
// Purpose: Record verified identity claims issued by a CI or cloud provider.
// Dependencies: jsonwebtoken, serde, witness-core
// ============================================================================

//! ## Overview
//! The token header selects a key by `kid`; without a `kid` every key in the
//! set is tried in order. Audience checks are disabled because the attestor
//! records claims rather than authorizing a caller. Expiry is enforced.

// ============================================================================
// SECTION: Imports
// ============================================================================

use jsonwebtoken::DecodingKey;
use jsonwebtoken::Validation;
use jsonwebtoken::decode;
use jsonwebtoken::decode_header;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::jwk::JwkSet;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::Attestor;
use witness_core::AttestorOptions;
use witness_core::RunPhase;

use crate::http::HttpFetcher;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attestor name.
pub const NAME: &str = "jwt";

/// Predicate type URI.
pub const TYPE_URI: &str = "https://witness.dev/attestations/jwt/v0.1";

/// Option key holding the raw token.
pub const OPTION_TOKEN: &str = "token";

/// Option key holding the key-set URL.
pub const OPTION_JWKS_URL: &str = "jwks-url";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Key that verified the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationInfo {
    /// Key-set URL.
    #[serde(rename = "jwksUrl")]
    pub jwks_url: String,
    /// Matched key.
    pub jwk: Value,
}

/// JWT payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JwtPredicate {
    /// Verified claims.
    pub claims: Map<String, Value>,
    /// Verification source.
    #[serde(rename = "verifiedBy", default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<VerificationInfo>,
}

/// JWT attestor.
#[derive(Debug, Default)]
pub struct JwtAttestor {
    /// Raw compact token.
    token: String,
    /// Key-set URL.
    jwks_url: String,
    /// Recorded payload.
    predicate: JwtPredicate,
}

impl JwtAttestor {
    /// Creates an attestor for a token and key-set URL.
    #[must_use]
    pub fn new(token: impl Into<String>, jwks_url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            jwks_url: jwks_url.into(),
            predicate: JwtPredicate::default(),
        }
    }

    /// Returns the recorded payload.
    #[must_use]
    pub const fn predicate_data(&self) -> &JwtPredicate {
        &self.predicate
    }

    /// Registry factory reading `token` and `jwks-url`.
    ///
    /// # Errors
    ///
    /// Never fails; missing options surface when attesting.
    pub fn factory(options: &AttestorOptions) -> Result<Box<dyn Attestor>, AttestationError> {
        Ok(Box::new(Self::new(
            options.get(OPTION_TOKEN).unwrap_or_default(),
            options.get(OPTION_JWKS_URL).unwrap_or_default(),
        )))
    }

    /// Fetches the key set and verifies the token.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::InvalidOption`] for an empty token or URL,
    /// [`AttestationError::Network`] when the key set cannot be fetched, and
    /// [`AttestationError::Failed`] when no key verifies the token.
    pub fn verify(
        &mut self,
        context: &AttestationContext,
        fetcher: &HttpFetcher,
    ) -> Result<(), AttestationError> {
        if self.token.is_empty() {
            return Err(invalid(OPTION_TOKEN, "token is empty"));
        }
        if self.jwks_url.is_empty() {
            return Err(invalid(OPTION_JWKS_URL, "jwks url is empty"));
        }
        let header = decode_header(&self.token)
            .map_err(|err| AttestationError::Failed(format!("invalid token: {err}")))?;
        let body = fetcher.get(context, &self.jwks_url, &[])?;
        let jwks: JwkSet = serde_json::from_slice(&body)
            .map_err(|err| AttestationError::Failed(format!("invalid jwks: {err}")))?;

        let candidates: Vec<&Jwk> = match header.kid.as_deref() {
            Some(kid) => jwks.find(kid).into_iter().collect(),
            None => jwks.keys.iter().collect(),
        };
        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;

        let mut last_error = String::from("no matching key in jwks");
        for jwk in candidates {
            let key = match DecodingKey::from_jwk(jwk) {
                Ok(key) => key,
                Err(err) => {
                    last_error = err.to_string();
                    continue;
                }
            };
            match decode::<Map<String, Value>>(&self.token, &key, &validation) {
                Ok(data) => {
                    self.predicate = JwtPredicate {
                        claims: data.claims,
                        verified_by: Some(VerificationInfo {
                            jwks_url: self.jwks_url.clone(),
                            jwk: serde_json::to_value(jwk)?,
                        }),
                    };
                    return Ok(());
                }
                Err(err) => last_error = err.to_string(),
            }
        }
        Err(AttestationError::Failed(format!("token verification failed: {last_error}")))
    }
}

impl Attestor for JwtAttestor {
    fn name(&self) -> &str {
        NAME
    }

    fn type_uri(&self) -> &str {
        TYPE_URI
    }

    fn phase(&self) -> RunPhase {
        RunPhase::PreMaterial
    }

    fn attest(&mut self, context: &AttestationContext) -> Result<(), AttestationError> {
        let fetcher = HttpFetcher::new()?;
        self.verify(context, &fetcher)
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(serde_json::to_value(&self.predicate)?)
    }
}

/// Builds an invalid-option error.
fn invalid(option: &str, message: &str) -> AttestationError {
    AttestationError::InvalidOption {
        option: option.to_string(),
        message: message.to_string(),
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// JSON schema of the JWT payload.
#[must_use]
pub fn schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "jwt",
        "type": "object",
        "required": ["claims"],
        "properties": {
            "claims": {"type": "object"},
            "verifiedBy": {
                "type": "object",
                "required": ["jwksUrl", "jwk"],
                "properties": {
                    "jwksUrl": {"type": "string"},
                    "jwk": {"type": "object"},
                },
            },
        },
    })
}
