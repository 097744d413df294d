//! The kernel: filter registry plus the invocation pipelines.
//!
//! `invoke` and `invoke_streaming` share the same shape: render the prompt
//! if the function is prompt-backed (running the prompt filters around the
//! renderer), fold the registered function filters around a terminal action,
//! then run the chain. The chain is rebuilt from the filter list on every
//! call, so registration order is the only thing that determines nesting and
//! filters added after construction participate in the very next invocation.
//!
//! The streaming variant differs only in its terminal action (it asks the
//! streaming completion seam for a lazy stream instead of awaiting a single
//! response) and in its return type: the result slot is converted to a
//! [`ValueStream`] after the chain unwinds, so filters wrap the stream while
//! nothing has been pulled yet.

use std::sync::Arc;

use tower::{BoxError, Service, ServiceExt};
use tracing::{debug, warn};

use crate::args::KernelArguments;
use crate::completion::{CompletionRequest, CompletionResponse, CompletionSvc, StreamingCompletion};
use crate::context::{FunctionInvocationContext, PromptRenderedContext, PromptRenderingContext};
use crate::error::{KernelError, Result};
use crate::filter::{build_invocation_chain, FunctionFilter, InvocationNext, PromptFilter};
use crate::function::{FunctionBody, FunctionResult, KernelFunction};
use crate::render::{PromptRenderer, VariableRenderer};
use crate::streaming::ValueStream;

/// Entry point for invoking kernel functions through the filter pipeline.
pub struct Kernel {
    function_filters: Vec<Arc<dyn FunctionFilter>>,
    prompt_filters: Vec<Arc<dyn PromptFilter>>,
    completion: Option<Arc<tokio::sync::Mutex<CompletionSvc>>>,
    streaming: Option<Arc<dyn StreamingCompletion>>,
    renderer: Arc<dyn PromptRenderer>,
}

impl Kernel {
    pub fn builder() -> KernelBuilder {
        KernelBuilder::default()
    }

    /// Append a function filter; it becomes the innermost layer.
    pub fn add_function_filter(&mut self, filter: Arc<dyn FunctionFilter>) {
        self.function_filters.push(filter);
    }

    /// Insert a function filter at `index` in the nesting order.
    /// `index` must be at most the current filter count.
    pub fn insert_function_filter(&mut self, index: usize, filter: Arc<dyn FunctionFilter>) {
        self.function_filters.insert(index, filter);
    }

    /// Append a prompt filter; hooks run in registration order.
    pub fn add_prompt_filter(&mut self, filter: Arc<dyn PromptFilter>) {
        self.prompt_filters.push(filter);
    }

    /// Insert a prompt filter at `index` in the hook order.
    pub fn insert_prompt_filter(&mut self, index: usize, filter: Arc<dyn PromptFilter>) {
        self.prompt_filters.insert(index, filter);
    }

    /// Invoke a function and await its complete result.
    pub async fn invoke(
        &self,
        function: Arc<KernelFunction>,
        arguments: KernelArguments,
    ) -> Result<FunctionResult> {
        let mut context = FunctionInvocationContext::new(function, arguments);
        debug!(function = %context.function.name(), "invoking function");

        let rendered = self.render_if_prompt(&mut context)?;
        let terminal = self.terminal_action(rendered, false);
        let chain = build_invocation_chain(&self.function_filters, terminal);
        let context = chain(context).await?;
        Ok(context.result)
    }

    /// Invoke a function and return its result as a lazy value stream.
    ///
    /// The chain runs to completion before anything is pulled from the
    /// stream; element production (and any per-element errors) happen only
    /// as the caller polls.
    pub async fn invoke_streaming(
        &self,
        function: Arc<KernelFunction>,
        arguments: KernelArguments,
    ) -> Result<ValueStream> {
        let mut context = FunctionInvocationContext::new(function, arguments);
        debug!(function = %context.function.name(), "invoking function (streaming)");

        let rendered = self.render_if_prompt(&mut context)?;
        let terminal = self.terminal_action(rendered, true);
        let chain = build_invocation_chain(&self.function_filters, terminal);
        let context = chain(context).await?;
        Ok(context.result.into_stream())
    }

    /// Run the prompt render pipeline for prompt-backed functions.
    ///
    /// Returns the final prompt text, or `None` for method-backed functions
    /// (their invocation skips rendering entirely). A rendered hook that
    /// sets the cancel flag aborts here with a typed error; the function
    /// filters and the completion service never run.
    fn render_if_prompt(
        &self,
        context: &mut FunctionInvocationContext,
    ) -> Result<Option<String>> {
        let template = match context.function.template() {
            Some(template) => template.to_string(),
            None => return Ok(None),
        };

        let arguments = std::mem::take(&mut context.arguments);
        let mut rendering = PromptRenderingContext {
            function: Arc::clone(&context.function),
            arguments,
        };
        for filter in &self.prompt_filters {
            filter.on_prompt_rendering(&mut rendering);
        }

        let rendered_prompt = self.renderer.render(&template, &rendering.arguments)?;
        let mut rendered = PromptRenderedContext {
            function: rendering.function,
            arguments: rendering.arguments,
            rendered_prompt,
            cancel: false,
        };
        for filter in &self.prompt_filters {
            filter.on_prompt_rendered(&mut rendered);
        }

        if rendered.cancel {
            warn!(function = %context.function.name(), "invocation canceled by prompt filter");
            return Err(KernelError::FunctionCanceled {
                function_name: context.function.name().to_string(),
                result: context.result.as_scalar().cloned(),
            });
        }

        context.arguments = rendered.arguments;
        Ok(Some(rendered.rendered_prompt))
    }

    /// The innermost link of the chain: actually run the function.
    fn terminal_action(&self, rendered: Option<String>, streaming: bool) -> InvocationNext {
        let completion = self.completion.clone();
        let streaming_svc = self.streaming.clone();

        Box::new(move |mut context| {
            Box::pin(async move {
                match context.function.body() {
                    FunctionBody::Method(handler) => {
                        let handler = Arc::clone(handler);
                        let value = handler(context.arguments.clone()).await?;
                        context.result = FunctionResult::from_value(value);
                    }
                    FunctionBody::Prompt { .. } => {
                        let prompt = rendered.ok_or_else(|| {
                            KernelError::Render("prompt was never rendered".to_string())
                        })?;
                        let request = CompletionRequest {
                            prompt,
                            arguments: context.arguments.clone(),
                        };

                        if streaming {
                            let svc = streaming_svc
                                .ok_or(KernelError::MissingService("streaming completion"))?;
                            let stream = svc.complete_streaming(request).await?;
                            context.result = FunctionResult::stream(stream);
                        } else {
                            let svc =
                                completion.ok_or(KernelError::MissingService("completion"))?;
                            let mut guard = svc.lock().await;
                            let response = guard
                                .ready()
                                .await
                                .map_err(KernelError::Completion)?
                                .call(request)
                                .await
                                .map_err(KernelError::Completion)?;
                            drop(guard);
                            context.result = FunctionResult::scalar(response.content)
                                .with_metadata(response.metadata);
                        }
                    }
                }
                Ok(context)
            })
        })
    }
}

/// Builder for [`Kernel`]. All collaborators are optional; a kernel with no
/// completion service can still invoke method-backed functions.
#[derive(Default)]
pub struct KernelBuilder {
    function_filters: Vec<Arc<dyn FunctionFilter>>,
    prompt_filters: Vec<Arc<dyn PromptFilter>>,
    completion: Option<CompletionSvc>,
    streaming: Option<Arc<dyn StreamingCompletion>>,
    renderer: Option<Arc<dyn PromptRenderer>>,
}

impl KernelBuilder {
    /// Register the non-streaming completion service. Any Tower service over
    /// [`CompletionRequest`] works, layered or not.
    pub fn completion<S>(mut self, service: S) -> Self
    where
        S: Service<CompletionRequest, Response = CompletionResponse, Error = BoxError>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        self.completion = Some(CompletionSvc::new(service));
        self
    }

    /// Register the streaming completion seam.
    pub fn streaming_completion(mut self, service: impl StreamingCompletion) -> Self {
        self.streaming = Some(Arc::new(service));
        self
    }

    /// Override the prompt renderer (defaults to [`VariableRenderer`]).
    pub fn renderer(mut self, renderer: impl PromptRenderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn function_filter(mut self, filter: impl FunctionFilter + 'static) -> Self {
        self.function_filters.push(Arc::new(filter));
        self
    }

    pub fn prompt_filter(mut self, filter: impl PromptFilter + 'static) -> Self {
        self.prompt_filters.push(Arc::new(filter));
        self
    }

    pub fn build(self) -> Kernel {
        Kernel {
            function_filters: self.function_filters,
            prompt_filters: self.prompt_filters,
            completion: self
                .completion
                .map(|svc| Arc::new(tokio::sync::Mutex::new(svc))),
            streaming: self.streaming,
            renderer: self
                .renderer
                .unwrap_or_else(|| Arc::new(VariableRenderer)),
        }
    }
}
