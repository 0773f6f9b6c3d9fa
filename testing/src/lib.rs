//! Shared test fixtures for the AgentGuard workspace.
//!
//! Provides a single PostgreSQL testcontainer shared by every test file
//! in the process, lazily started on first use and cleaned up at process
//! exit. Suites call [`postgres`] and skip themselves when it returns
//! `None` (no Docker available), so the unit-test tier never depends on
//! infrastructure.

mod fixtures;

pub use fixtures::*;
