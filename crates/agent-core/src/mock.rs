//! Mock LLM Provider
//!
//! For testing and demo purposes. Replays scripted responses in order and
//! records every request it receives.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{ChatOptions, ChunkStream, LlmProvider, StreamChunk};
use crate::response::Response;

/// A request as seen by the mock
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub options: ChatOptions,
    pub streamed: bool,
}

enum Scripted {
    Reply(Response),
    Fail(String),
}

/// Provider that returns pre-configured responses
pub struct MockProvider {
    script: Mutex<VecDeque<Scripted>>,
    /// Returned once the script is exhausted
    fallback: Option<Response>,
    requests: Mutex<Vec<RecordedRequest>>,
    tool_calling: bool,
    vision: bool,
    structured_output: bool,
}

impl MockProvider {
    /// Create a mock that replays `responses` in order
    pub fn new(responses: Vec<Response>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Scripted::Reply).collect()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            tool_calling: true,
            vision: false,
            structured_output: false,
        }
    }

    /// Create a mock that answers every request with `response`
    pub fn repeating(response: Response) -> Self {
        let mut mock = Self::new(Vec::new());
        mock.fallback = Some(response);
        mock
    }

    /// Append a provider failure to the script
    #[must_use]
    pub fn then_error(self, message: impl Into<String>) -> Self {
        lock(&self.script).push_back(Scripted::Fail(message.into()));
        self
    }

    #[must_use]
    pub const fn with_tool_calling(mut self, enabled: bool) -> Self {
        self.tool_calling = enabled;
        self
    }

    #[must_use]
    pub const fn with_vision(mut self, enabled: bool) -> Self {
        self.vision = enabled;
        self
    }

    #[must_use]
    pub const fn with_structured_output(mut self, enabled: bool) -> Self {
        self.structured_output = enabled;
        self
    }

    /// Number of chat and stream calls received so far
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    fn next(
        &self,
        messages: &[Message],
        options: &ChatOptions,
        streamed: bool,
    ) -> Result<Response> {
        lock(&self.requests).push(RecordedRequest {
            messages: messages.to_vec(),
            options: options.clone(),
            streamed,
        });

        match lock(&self.script).pop_front() {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(AgentError::Provider(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| AgentError::Provider("mock script exhausted".into())),
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<Response> {
        self.next(messages, options, false)
    }

    /// Splits the scripted text into word-sized deltas, then sends a final
    /// chunk carrying the tool calls, usage and stop reason.
    async fn stream(&self, messages: &[Message], options: &ChatOptions) -> Result<ChunkStream> {
        let response = self.next(messages, options, true)?;

        let mut chunks: Vec<Result<StreamChunk>> = response
            .text
            .split_inclusive(' ')
            .map(|piece| Ok(StreamChunk::text(piece)))
            .collect();

        let mut last = StreamChunk::complete()
            .with_tool_calls(response.tool_calls)
            .with_usage(response.usage);
        last.stop_reason = response.stop_reason;
        chunks.push(Ok(last));

        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn supports_tool_calling(&self) -> bool {
        self.tool_calling
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }

    fn supports_structured_output(&self) -> bool {
        self.structured_output
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
