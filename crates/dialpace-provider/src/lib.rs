//! # dialpace-provider
//!
//! HTTP client that asks the telephony provider to start an outbound call.

mod client;

pub use client::HttpCallPlacer;
