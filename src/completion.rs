//! Completion-service seams and in-crate test doubles.
//!
//! The non-streaming seam is a Tower service so callers can bring any
//! provider (or layer one with retry/timeout middleware) without the kernel
//! knowing. The streaming seam stays a plain trait because its response is a
//! lazy stream, not a single value.
//!
//! The doubles here are the ones the crate's own tests use: a fixed scripted
//! response with an invocation counter, and a scripted chunk sequence that
//! can fail mid-stream.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::Value;
use tower::util::BoxCloneService;
use tower::{BoxError, Service};

use crate::args::KernelArguments;
use crate::error::{KernelError, Result};
use crate::streaming::{self, ValueStream};

/// Request handed to the completion service by the terminal action.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Final prompt text, after the render pipeline ran.
    pub prompt: String,
    pub arguments: KernelArguments,
}

/// Response from the completion service.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub content: Value,
    pub metadata: HashMap<String, Value>,
}

/// Boxed completion service type alias.
pub type CompletionSvc = BoxCloneService<CompletionRequest, CompletionResponse, BoxError>;

/// Streaming counterpart of the completion seam.
pub trait StreamingCompletion: Send + Sync + 'static {
    fn complete_streaming(&self, request: CompletionRequest)
        -> BoxFuture<'static, Result<ValueStream>>;
}

/// A completion service that returns the same scripted response on every
/// call and records how it was called.
#[derive(Clone)]
pub struct FixedCompletion {
    content: Value,
    metadata: HashMap<String, Value>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl FixedCompletion {
    pub fn new(content: impl Into<Value>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// How many times the service was invoked (either mode).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt the service was invoked with, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn record(&self, request: &CompletionRequest) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
    }
}

impl Service<CompletionRequest> for FixedCompletion {
    type Response = CompletionResponse;
    type Error = BoxError;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: CompletionRequest) -> Self::Future {
        self.record(&request);
        let response = CompletionResponse {
            content: self.content.clone(),
            metadata: self.metadata.clone(),
        };
        Box::pin(async move { Ok(response) })
    }
}

impl StreamingCompletion for FixedCompletion {
    fn complete_streaming(
        &self,
        request: CompletionRequest,
    ) -> BoxFuture<'static, Result<ValueStream>> {
        self.record(&request);
        let content = self.content.clone();
        Box::pin(async move { Ok(streaming::once(content)) })
    }
}

/// A streaming completion that yields a scripted chunk sequence; `Err`
/// entries surface lazily as stream errors at their position.
#[derive(Clone)]
pub struct SequenceCompletion {
    items: Vec<std::result::Result<Value, String>>,
    calls: Arc<AtomicUsize>,
}

impl SequenceCompletion {
    pub fn new(items: Vec<std::result::Result<Value, String>>) -> Self {
        Self {
            items,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StreamingCompletion for SequenceCompletion {
    fn complete_streaming(
        &self,
        _request: CompletionRequest,
    ) -> BoxFuture<'static, Result<ValueStream>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let items: Vec<Result<Value>> = self
            .items
            .clone()
            .into_iter()
            .map(|item| item.map_err(KernelError::function))
            .collect();
        Box::pin(async move { Ok(streaming::from_results(items)) })
    }
}
