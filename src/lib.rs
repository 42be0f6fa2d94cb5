//! Realtime sync server for the voice-agent dashboard.
//!
//! Reads are served through a short-lived response cache; every write purges
//! the affected cache keys and then pushes a typed message to the owning
//! identity's WebSocket subscribers.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod realtime;
