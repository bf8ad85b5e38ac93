//! Outbound call placement seam

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Everything the provider needs to dial one number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceCallRequest {
    pub call_id: String,
    pub destination: String,
    /// Where the provider should post lifecycle webhooks for this call
    pub event_url: String,
    pub caller_id: Option<String>,
    pub tag: Option<String>,
}

/// Places a single outbound call
///
/// Implementations return `DialpaceError::Placement` with a readable reason when
/// the provider refuses or cannot be reached.
#[async_trait]
pub trait CallPlacer: Send + Sync {
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<()>;
}
