//! Kernel functions and their results.
//!
//! A [`KernelFunction`] is either method-backed (an async handler over the
//! arguments) or prompt-backed (a template rendered and sent to the
//! completion service). Both kinds are invoked through the same filter
//! pipeline; only prompt-backed functions additionally pass through the
//! prompt render pipeline.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::args::KernelArguments;
use crate::error::{KernelError, Result};
use crate::streaming::{self, ValueStream};

pub(crate) type MethodHandler =
    Arc<dyn Fn(KernelArguments) -> BoxFuture<'static, Result<ResultValue>> + Send + Sync>;

pub(crate) enum FunctionBody {
    Method(MethodHandler),
    Prompt { template: String },
}

/// A named, invocable unit registered with the kernel.
pub struct KernelFunction {
    name: String,
    body: FunctionBody,
}

impl fmt::Debug for KernelFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.body {
            FunctionBody::Method(_) => "method",
            FunctionBody::Prompt { .. } => "prompt",
        };
        f.debug_struct("KernelFunction")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

impl KernelFunction {
    /// Create a method-backed function from an async handler returning a
    /// scalar JSON value.
    pub fn from_method<F, Fut>(name: impl Into<String>, handler: F) -> Arc<Self>
    where
        F: Fn(KernelArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            body: FunctionBody::Method(Arc::new(move |args| {
                let fut = handler(args);
                Box::pin(async move { Ok(ResultValue::Scalar(fut.await?)) })
            })),
        })
    }

    /// Create a method-backed function whose handler produces a lazy value
    /// stream instead of a scalar.
    pub fn from_streaming_method<F, Fut>(name: impl Into<String>, handler: F) -> Arc<Self>
    where
        F: Fn(KernelArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ValueStream>> + Send + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            body: FunctionBody::Method(Arc::new(move |args| {
                let fut = handler(args);
                Box::pin(async move { Ok(ResultValue::Stream(fut.await?)) })
            })),
        })
    }

    /// Create a prompt-backed function from a template.
    pub fn from_prompt(name: impl Into<String>, template: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            body: FunctionBody::Prompt {
                template: template.into(),
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_prompt(&self) -> bool {
        matches!(self.body, FunctionBody::Prompt { .. })
    }

    /// The prompt template, for prompt-backed functions.
    pub fn template(&self) -> Option<&str> {
        match &self.body {
            FunctionBody::Prompt { template } => Some(template),
            FunctionBody::Method(_) => None,
        }
    }

    pub(crate) fn body(&self) -> &FunctionBody {
        &self.body
    }
}

/// The payload of a [`FunctionResult`].
pub enum ResultValue {
    /// No value yet, or a short-circuited invocation.
    Empty,
    Scalar(Value),
    /// A lazy sequence consumed by the caller after the chain returns.
    Stream(ValueStream),
}

impl fmt::Debug for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Empty => f.write_str("Empty"),
            ResultValue::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            ResultValue::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl ResultValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResultValue::Empty)
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            ResultValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// View the value as a stream: scalars become a single-element stream,
    /// an empty value becomes an empty stream.
    pub fn into_stream(self) -> ValueStream {
        match self {
            ResultValue::Empty => streaming::empty(),
            ResultValue::Scalar(v) => streaming::once(v),
            ResultValue::Stream(s) => s,
        }
    }
}

/// The outcome of a function invocation.
///
/// Filters replace the result wholesale (via the context's result slot)
/// rather than mutating it in place.
#[derive(Debug)]
pub struct FunctionResult {
    value: ResultValue,
    metadata: HashMap<String, Value>,
    locale: Option<String>,
}

impl Default for FunctionResult {
    fn default() -> Self {
        Self::empty()
    }
}

impl FunctionResult {
    pub fn empty() -> Self {
        Self {
            value: ResultValue::Empty,
            metadata: HashMap::new(),
            locale: None,
        }
    }

    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::from_value(ResultValue::Scalar(value.into()))
    }

    pub fn stream(stream: ValueStream) -> Self {
        Self::from_value(ResultValue::Stream(stream))
    }

    pub fn from_value(value: ResultValue) -> Self {
        Self {
            value,
            metadata: HashMap::new(),
            locale: None,
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn value(&self) -> &ResultValue {
        &self.value
    }

    pub fn into_value(self) -> ResultValue {
        self.value
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        self.value.as_scalar()
    }

    /// Deserialize the scalar value into a concrete type.
    pub fn value_as<T: DeserializeOwned>(&self) -> Result<T> {
        match self.value.as_scalar() {
            Some(v) => Ok(serde_json::from_value(v.clone())?),
            None => Err(KernelError::Other(
                "result does not hold a scalar value".to_string(),
            )),
        }
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// Consume the result as a stream (see [`ResultValue::into_stream`]).
    pub fn into_stream(self) -> ValueStream {
        self.value.into_stream()
    }
}
