//! Boundary to the text completion service

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ResponseError;
use crate::prompt::ChatMessage;

/// Sampling parameters for one completion call
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CompletionParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A service that turns a list of chat messages into reply text.
///
/// Implementations must not retry on their own.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: CompletionParams,
    ) -> Result<String, ResponseError>;
}
