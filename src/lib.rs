//! Middleware pipeline for invoking LLM-backed and native functions.
//!
//! The crate centers on a [`Kernel`] that invokes [`KernelFunction`]s
//! through an onion of [`FunctionFilter`]s: the first registered filter is
//! outermost, each filter decides whether to call the rest of the chain, and
//! the terminal action at the center runs the function body. Prompt-backed
//! functions additionally pass through a render pipeline where
//! [`PromptFilter`]s can rewrite arguments, rewrite the rendered prompt, or
//! cancel the call before the completion service sees it.
//!
//! Streaming invocations return a lazy [`ValueStream`]; filters wrap the
//! stream before anything is pulled, so per-element rewrites and error
//! substitutions cost nothing until the consumer polls.
//!
//! ```
//! use llm_kernel::{
//!     FixedCompletion, FunctionFilterFn, Kernel, KernelArguments, KernelFunction,
//! };
//!
//! # async fn demo() -> llm_kernel::Result<()> {
//! let kernel = Kernel::builder()
//!     .completion(FixedCompletion::new("a poem about cats"))
//!     .function_filter(FunctionFilterFn::new(|mut context, next| async move {
//!         context.arguments.set("topic", "cats");
//!         next(context).await
//!     }))
//!     .build();
//!
//! let function = KernelFunction::from_prompt("poet", "Write a poem about {{topic}}");
//! let result = kernel
//!     .invoke(function, KernelArguments::new().with("topic", "dogs"))
//!     .await?;
//! assert_eq!(result.as_scalar().and_then(|v| v.as_str()), Some("a poem about cats"));
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod chat;
pub mod completion;
pub mod context;
pub mod error;
pub mod filter;
pub mod function;
pub mod kernel;
pub mod render;
pub mod streaming;

pub use args::KernelArguments;
pub use chat::{AgentGroupChat, AuthorRole, ChatAgent, ChatExecutionSettings, ChatMessage};
pub use completion::{
    CompletionRequest, CompletionResponse, CompletionSvc, FixedCompletion, SequenceCompletion,
    StreamingCompletion,
};
pub use context::{FunctionInvocationContext, PromptRenderedContext, PromptRenderingContext};
pub use error::{KernelError, Result};
pub use filter::{
    build_invocation_chain, FunctionFilter, FunctionFilterFn, InvocationNext, PromptFilter,
    PromptFilterFn,
};
pub use function::{FunctionResult, KernelFunction, ResultValue};
pub use kernel::{Kernel, KernelBuilder};
pub use render::{PromptRenderer, VariableRenderer};
pub use streaming::ValueStream;

// Tower is part of the public completion seam.
pub use tower::{BoxError, Service, ServiceExt};
