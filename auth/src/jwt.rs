//! RS256 token service: keypair management, claim minting, verification,
//! and JWKS export.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use errors::TokenError;
use guard_core::{AdminRole, Agent};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The `type` claim. Gates which endpoints accept the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Agent,
    Admin,
}

/// Claims carried by every AgentGuard token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<Uuid>,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<AdminRole>,
}

/// A freshly signed token plus the metadata callers return to clients.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: Uuid,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub alg: String,
    pub n: String,
    pub e: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// Issues and verifies RS256 bearer tokens.
///
/// The private key comes from configuration (PEM, PKCS#8 or PKCS#1); when
/// absent a fresh RSA-2048 keypair is generated in memory with a warning —
/// every outstanding token dies with the process in that mode.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    public_n: Vec<u8>,
    public_e: Vec<u8>,
    key_id: Option<String>,
    agent_expire_seconds: u64,
    admin_expire_seconds: u64,
}

impl TokenService {
    pub fn new(
        private_key_pem: Option<&str>,
        key_id: Option<String>,
        agent_expire_seconds: u64,
        admin_expire_seconds: u64,
    ) -> Result<Self, TokenError> {
        let private_key = match private_key_pem {
            Some(pem) => load_private_key(pem)?,
            None => {
                tracing::warn!(
                    "AG_JWT_PRIVATE_KEY not set — generated an in-memory RSA-2048 keypair; \
                     all issued tokens are invalidated on restart"
                );
                RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).map_err(|e| {
                    TokenError::Keypair {
                        reason: e.to_string(),
                    }
                })?
            }
        };

        let private_pem =
            private_key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| TokenError::Keypair {
                    reason: e.to_string(),
                })?;
        let encoding_key =
            EncodingKey::from_rsa_pem(private_pem.as_bytes()).map_err(|e| TokenError::Keypair {
                reason: e.to_string(),
            })?;

        let public_key = RsaPublicKey::from(&private_key);
        let public_pem =
            public_key
                .to_public_key_pem(LineEnding::LF)
                .map_err(|e| TokenError::Keypair {
                    reason: e.to_string(),
                })?;
        let decoding_key =
            DecodingKey::from_rsa_pem(public_pem.as_bytes()).map_err(|e| TokenError::Keypair {
                reason: e.to_string(),
            })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
            public_n: public_key.n().to_bytes_be(),
            public_e: public_key.e().to_bytes_be(),
            key_id,
            agent_expire_seconds,
            admin_expire_seconds,
        })
    }

    /// Mint a token for an agent: `sub` is the agent id, with `env` and
    /// `team` extras.
    pub fn issue_agent_token(
        &self,
        agent: &Agent,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let jti = Uuid::new_v4();
        let claims = Claims {
            sub: agent.agent_id.clone(),
            jti: Some(jti),
            iat: now.timestamp(),
            exp: now.timestamp() + self.agent_expire_seconds as i64,
            token_type: TokenType::Agent,
            env: Some(agent.environment.to_string()),
            team: Some(agent.owner_team.clone()),
            role: None,
        };
        Ok(IssuedToken {
            token: self.sign(&claims)?,
            jti,
            expires_in: self.agent_expire_seconds,
        })
    }

    /// Mint a token for an admin identity: `role` claim plus optional
    /// `team` scope.
    pub fn issue_admin_token(
        &self,
        sub: &str,
        role: AdminRole,
        team: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let jti = Uuid::new_v4();
        let claims = Claims {
            sub: sub.to_string(),
            jti: Some(jti),
            iat: now.timestamp(),
            exp: now.timestamp() + self.admin_expire_seconds as i64,
            token_type: TokenType::Admin,
            env: None,
            team: team.map(|t| t.to_string()),
            role: Some(role),
        };
        Ok(IssuedToken {
            token: self.sign(&claims)?,
            jti,
            expires_in: self.admin_expire_seconds,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();
        encode(&header, claims, &self.encoding_key).map_err(|e| TokenError::Keypair {
            reason: e.to_string(),
        })
    }

    /// Verify signature and expiry, and require a `jti` claim.
    ///
    /// The revocation list lives in the database; the server's auth
    /// resolver checks it after this call.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "JWT verification failed");
            TokenError::Invalid
        })?;

        if data.claims.jti.is_none() {
            return Err(TokenError::MissingJti);
        }

        Ok(data.claims)
    }

    /// Public key set for third-party verification of AgentGuard tokens.
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: vec![Jwk {
                kty: "RSA".to_string(),
                use_: "sig".to_string(),
                alg: "RS256".to_string(),
                n: URL_SAFE_NO_PAD.encode(&self.public_n),
                e: URL_SAFE_NO_PAD.encode(&self.public_e),
                kid: self.key_id.clone(),
            }],
        }
    }

    pub fn agent_expire_seconds(&self) -> u64 {
        self.agent_expire_seconds
    }

    pub fn admin_expire_seconds(&self) -> u64 {
        self.admin_expire_seconds
    }
}

fn load_private_key(pem: &str) -> Result<RsaPrivateKey, TokenError> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse AG_JWT_PRIVATE_KEY");
        TokenError::Keypair {
            reason: "unparseable RSA private key PEM".to_string(),
        }
    })
}
