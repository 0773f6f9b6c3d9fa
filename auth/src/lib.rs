//! # Authentication
//!
//! Two concerns live here:
//!
//! - [`keys`] — static credential handling: `agk_`/`adk_` key generation,
//!   SHA-256 hashing, and operator-facing key prefixes. Raw keys are never
//!   stored; verification is an exact index lookup on the hash.
//! - [`jwt`] — the RS256 bearer-token service: claim minting for agent and
//!   admin tokens, signature/expiry verification, and JWKS export. The
//!   revocation check needs the database and is composed by the server's
//!   auth resolver on top of [`jwt::TokenService::verify`].

pub mod jwt;
pub mod keys;

pub use jwt::{Claims, IssuedToken, Jwk, Jwks, TokenService, TokenType};
pub use keys::{generate_key, hash_key, key_prefix, random_id};
