//! Filter capability traits and the per-invocation chain builder.
//!
//! Function filters compose like an onion: the first registered filter is the
//! outermost layer, and calling `next` descends one layer until the terminal
//! action runs at the center. Control then unwinds back out in reverse
//! registration order. A filter that never calls `next` short-circuits the
//! rest of the chain; that is the documented cancellation mechanism, not an
//! error.
//!
//! Prompt filters are different: they never nest. All `on_prompt_rendering`
//! hooks run in registration order before the template renders, then all
//! `on_prompt_rendered` hooks run in registration order after.
//!
//! The chain is rebuilt on every invocation, so filters inserted after
//! construction (at any index) take effect for the next call. Filter
//! instances are shared across concurrent invocations and must be safe for
//! re-entrant use; the pipeline holds no locks around them.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::{FunctionInvocationContext, PromptRenderedContext, PromptRenderingContext};
use crate::error::Result;

/// One-shot continuation for the rest of the invocation chain.
///
/// Consumes the context and hands it back (or an error) once every inner
/// layer has run.
pub type InvocationNext =
    Box<dyn FnOnce(FunctionInvocationContext) -> BoxFuture<'static, Result<FunctionInvocationContext>> + Send>;

/// Middleware wrapping function invocation.
#[async_trait]
pub trait FunctionFilter: Send + Sync {
    /// Called once per invocation. Implementations decide whether to call
    /// `next`; skipping it cancels everything nested inside, silently.
    async fn on_function_invocation(
        &self,
        context: FunctionInvocationContext,
        next: InvocationNext,
    ) -> Result<FunctionInvocationContext>;
}

/// Middleware around prompt rendering. Both hooks default to no-ops.
pub trait PromptFilter: Send + Sync {
    fn on_prompt_rendering(&self, _context: &mut PromptRenderingContext) {}

    fn on_prompt_rendered(&self, _context: &mut PromptRenderedContext) {}
}

type FunctionFilterHandler = Arc<
    dyn Fn(FunctionInvocationContext, InvocationNext) -> BoxFuture<'static, Result<FunctionInvocationContext>>
        + Send
        + Sync,
>;

/// Closure-backed [`FunctionFilter`] for ergonomic registration.
#[derive(Clone)]
pub struct FunctionFilterFn(FunctionFilterHandler);

impl FunctionFilterFn {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(FunctionInvocationContext, InvocationNext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<FunctionInvocationContext>> + Send + 'static,
    {
        Self(Arc::new(move |context, next| Box::pin(f(context, next))))
    }
}

#[async_trait]
impl FunctionFilter for FunctionFilterFn {
    async fn on_function_invocation(
        &self,
        context: FunctionInvocationContext,
        next: InvocationNext,
    ) -> Result<FunctionInvocationContext> {
        (self.0)(context, next).await
    }
}

type RenderingHook = Arc<dyn Fn(&mut PromptRenderingContext) + Send + Sync>;
type RenderedHook = Arc<dyn Fn(&mut PromptRenderedContext) + Send + Sync>;

/// Closure-backed [`PromptFilter`].
#[derive(Clone, Default)]
pub struct PromptFilterFn {
    on_rendering: Option<RenderingHook>,
    on_rendered: Option<RenderedHook>,
}

impl PromptFilterFn {
    pub fn new<F, G>(on_rendering: F, on_rendered: G) -> Self
    where
        F: Fn(&mut PromptRenderingContext) + Send + Sync + 'static,
        G: Fn(&mut PromptRenderedContext) + Send + Sync + 'static,
    {
        Self {
            on_rendering: Some(Arc::new(on_rendering)),
            on_rendered: Some(Arc::new(on_rendered)),
        }
    }

    /// A filter with only a pre-render hook.
    pub fn rendering<F>(f: F) -> Self
    where
        F: Fn(&mut PromptRenderingContext) + Send + Sync + 'static,
    {
        Self {
            on_rendering: Some(Arc::new(f)),
            on_rendered: None,
        }
    }

    /// A filter with only a post-render hook.
    pub fn rendered<G>(g: G) -> Self
    where
        G: Fn(&mut PromptRenderedContext) + Send + Sync + 'static,
    {
        Self {
            on_rendering: None,
            on_rendered: Some(Arc::new(g)),
        }
    }
}

impl PromptFilter for PromptFilterFn {
    fn on_prompt_rendering(&self, context: &mut PromptRenderingContext) {
        if let Some(hook) = &self.on_rendering {
            hook(context);
        }
    }

    fn on_prompt_rendered(&self, context: &mut PromptRenderedContext) {
        if let Some(hook) = &self.on_rendered {
            hook(context);
        }
    }
}

/// Fold an ordered filter list and a terminal action into one continuation.
///
/// Folds right-to-left so the first filter in the list ends up outermost.
/// With no filters the chain is exactly the terminal action.
pub fn build_invocation_chain(
    filters: &[Arc<dyn FunctionFilter>],
    terminal: InvocationNext,
) -> InvocationNext {
    let mut next = terminal;
    for filter in filters.iter().rev() {
        let filter = Arc::clone(filter);
        let inner = next;
        next = Box::new(move |context| {
            Box::pin(async move { filter.on_function_invocation(context, inner).await })
        });
    }
    next
}
