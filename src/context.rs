//! Per-invocation and per-render contexts handed to filters.

use std::sync::Arc;

use crate::args::KernelArguments;
use crate::function::{FunctionResult, KernelFunction};

/// State threaded through the function-filter chain.
///
/// The context is owned by exactly one link of the chain at a time: each
/// filter receives it by value, passes it to `next`, and gets it back when
/// the inner part of the chain returns. The result slot starts empty and
/// holds whatever the terminal action (or the last filter to touch it) put
/// there.
#[derive(Debug)]
pub struct FunctionInvocationContext {
    pub function: Arc<KernelFunction>,
    pub arguments: KernelArguments,
    pub result: FunctionResult,
}

impl FunctionInvocationContext {
    pub fn new(function: Arc<KernelFunction>, arguments: KernelArguments) -> Self {
        Self {
            function,
            arguments,
            result: FunctionResult::empty(),
        }
    }

    /// Take the current result out of the context, leaving an empty one.
    ///
    /// Handy for filters that rewrap a streaming result.
    pub fn take_result(&mut self) -> FunctionResult {
        std::mem::take(&mut self.result)
    }
}

/// State handed to `on_prompt_rendering` hooks, before the template renders.
#[derive(Debug)]
pub struct PromptRenderingContext {
    pub function: Arc<KernelFunction>,
    pub arguments: KernelArguments,
}

/// State handed to `on_prompt_rendered` hooks, after the template renders.
///
/// Hooks may rewrite `rendered_prompt` or set `cancel` to abort the
/// invocation before the completion call happens.
#[derive(Debug)]
pub struct PromptRenderedContext {
    pub function: Arc<KernelFunction>,
    pub arguments: KernelArguments,
    pub rendered_prompt: String,
    pub cancel: bool,
}
