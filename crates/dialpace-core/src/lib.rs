//! # dialpace-core
//!
//! Core types for the dialpace outbound calling system.
//!
//! Calls are placed through a telephony provider, followed through their
//! lifecycle by webhook callbacks, and dialed in paced batches under a
//! per-number daily cap. This crate holds what every other crate agrees on:
//! call statuses, validated webhook events, the placement seam, configuration
//! and the shared error type.

pub mod config;
mod error;
mod event;
pub mod fail_open;
mod placer;
mod types;

pub use config::DialpaceConfig;
pub use error::{DialpaceError, Result};
pub use event::{CallEvent, EventKind, WebhookPayload};
pub use placer::{CallPlacer, PlaceCallRequest};
pub use types::*;
