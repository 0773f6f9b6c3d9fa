//! # Configuration
//!
//! Settings for the AgentGuard control plane, loaded from `AG_*`
//! environment variables following 12-factor principles. Every field has a
//! development-friendly default; validation runs after load and rejects
//! nonsense values (zero pool size, unknown log level) at startup instead
//! of at first use.

pub mod loader;
pub mod settings;

pub use loader::load_from_env;
pub use settings::{ConfigError, LogFormat, Settings};
pub use validator::Validate;
