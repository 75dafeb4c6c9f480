//! LlmProvider trait — the abstraction over the completion endpoint.
//!
//! The pipeline only constructs prompts; generation itself is owned by the
//! caller. This trait exists so integration tests can observe what the
//! assembler would send.

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A completion request. The prompt is the assembled context payload text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Wall-clock bound for the whole call.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// The completion endpoint collaborator. Treated as a black box: it either
/// returns generated text or times out.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Send a prompt and get generated text back.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}
