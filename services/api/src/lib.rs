//! VoiceNet API Library Crate
//!
//! This library contains the HTTP side of the voice-call service: configuration,
//! webhook verification, the call command surface, dispatch subscription
//! bookkeeping and the worker that consumes session outputs. The `api` binary
//! is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod signature;
pub mod state;
pub mod subscriptions;
pub mod worker;
