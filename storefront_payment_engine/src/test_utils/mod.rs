//! Helpers for tests: temporary databases, a scriptable in-memory payment processor and credential issuer, and a
//! fully wired engine on top of them.
pub mod fakes;
pub mod prepare_env;
