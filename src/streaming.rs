//! Lazy result streams and the adapters filters use to rewrite them.
//!
//! A streaming invocation stores a [`ValueStream`] in the result slot rather
//! than a scalar. Filters that want to intercept elements (or errors raised
//! while an element is pulled) wrap the stream with one of the adapters here
//! and put the wrapped stream back into the context. Nothing installed this
//! way executes until the final consumer polls; back-pressure and laziness
//! are preserved because every adapter is a plain `Stream` combinator.
//!
//! Error handling mirrors the synchronous chain but per element: an `Err`
//! item plays the role of an exception thrown at that position. A wrapping
//! adapter may substitute a value for it ([`catch_errors`]) or convert it
//! into a different error, and only the outermost conversion reaches the
//! consumer.

use std::pin::Pin;

use futures::{stream, Stream, StreamExt};
use serde_json::Value;

use crate::error::{KernelError, Result};

/// Pull-based, element-at-a-time producer of JSON values.
pub type ValueStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;

/// A stream that yields nothing.
pub fn empty() -> ValueStream {
    Box::pin(stream::empty())
}

/// A stream that yields a single value.
pub fn once(value: Value) -> ValueStream {
    Box::pin(stream::once(async move { Ok(value) }))
}

/// A stream over a scripted list of values.
pub fn from_values(values: Vec<Value>) -> ValueStream {
    Box::pin(stream::iter(values.into_iter().map(Ok)))
}

/// A stream over scripted items, including mid-stream errors.
pub fn from_results(items: Vec<Result<Value>>) -> ValueStream {
    Box::pin(stream::iter(items))
}

/// Rewrite each successful element lazily; errors pass through untouched.
pub fn map_values<F>(inner: ValueStream, mut f: F) -> ValueStream
where
    F: FnMut(Value) -> Value + Send + 'static,
{
    Box::pin(inner.map(move |item| item.map(|value| f(value))))
}

/// Observe each error raised while pulling an element and either substitute
/// a value in its place or return a (possibly new) error.
pub fn catch_errors<F>(inner: ValueStream, mut f: F) -> ValueStream
where
    F: FnMut(KernelError) -> Result<Value> + Send + 'static,
{
    Box::pin(inner.map(move |item| match item {
        Ok(value) => Ok(value),
        Err(err) => f(err),
    }))
}

/// Substitute the element (or error) at `position` with `replacement`,
/// leaving every other element untouched.
pub fn replace_at(inner: ValueStream, position: usize, replacement: Value) -> ValueStream {
    let mut index = 0usize;
    Box::pin(inner.map(move |item| {
        let current = index;
        index += 1;
        if current == position {
            Ok(replacement.clone())
        } else {
            item
        }
    }))
}

/// Drain a stream into a vector, stopping at the first error.
pub async fn collect_values(mut stream: ValueStream) -> Result<Vec<Value>> {
    let mut values = Vec::new();
    while let Some(item) = stream.next().await {
        values.push(item?);
    }
    Ok(values)
}
