//! Streaming invocations: lazy result streams wrapped by function filters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use llm_kernel::streaming::{self, catch_errors, collect_values, map_values, replace_at};
use llm_kernel::{
    FunctionFilterFn, FunctionResult, Kernel, KernelArguments, KernelError, KernelFunction,
    PromptFilterFn, SequenceCompletion,
};

/// A streaming method function yielding the given values, counting how many
/// elements were actually pulled.
fn counting_stream_function(
    values: Vec<i64>,
    pulled: Arc<AtomicUsize>,
) -> Arc<KernelFunction> {
    KernelFunction::from_streaming_method("numbers", move |_args| {
        let values = values.clone();
        let pulled = pulled.clone();
        async move {
            let stream: llm_kernel::ValueStream =
                Box::pin(futures::stream::iter(values).map(move |n| {
                    pulled.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(n))
                }));
            Ok(stream)
        }
    })
}

#[tokio::test]
async fn skipping_next_yields_an_empty_stream() {
    let kernel = Kernel::builder()
        .function_filter(FunctionFilterFn::new(|context, _next| async move {
            Ok(context)
        }))
        .build();

    let pulled = Arc::new(AtomicUsize::new(0));
    let function = counting_stream_function(vec![1, 2, 3], pulled.clone());
    let stream = kernel
        .invoke_streaming(function, KernelArguments::new())
        .await
        .unwrap();

    let values = collect_values(stream).await.unwrap();
    assert!(values.is_empty());
    assert_eq!(pulled.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn filter_doubles_each_element_lazily() {
    let kernel = Kernel::builder()
        .function_filter(FunctionFilterFn::new(|context, next| async move {
            let mut context = next(context).await?;
            let stream = context.take_result().into_stream();
            context.result = FunctionResult::stream(map_values(stream, |v| {
                json!(v.as_i64().unwrap_or(0) * 2)
            }));
            Ok(context)
        }))
        .build();

    let pulled = Arc::new(AtomicUsize::new(0));
    let function = counting_stream_function(vec![1, 2, 3], pulled.clone());
    let stream = kernel
        .invoke_streaming(function, KernelArguments::new())
        .await
        .unwrap();

    // Nothing pulled until the consumer drains the stream.
    assert_eq!(pulled.load(Ordering::SeqCst), 0);

    let values = collect_values(stream).await.unwrap();
    assert_eq!(values, vec![json!(2), json!(4), json!(6)]);
    assert_eq!(pulled.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn filter_substitutes_a_chunk_for_a_stream_error() {
    let completion = SequenceCompletion::new(vec![
        Ok(json!("first chunk")),
        Err("Exception from method".to_string()),
    ]);
    let kernel = Kernel::builder()
        .streaming_completion(completion)
        .function_filter(FunctionFilterFn::new(|context, next| async move {
            let mut context = next(context).await?;
            let stream = context.take_result().into_stream();
            context.result = FunctionResult::stream(catch_errors(stream, |_| {
                Ok(json!("chunk instead of exception"))
            }));
            Ok(context)
        }))
        .build();

    let function = KernelFunction::from_prompt("p", "Prompt");
    let stream = kernel
        .invoke_streaming(function, KernelArguments::new())
        .await
        .unwrap();
    let values = collect_values(stream).await.unwrap();
    assert_eq!(
        values,
        vec![json!("first chunk"), json!("chunk instead of exception")]
    );
}

#[tokio::test]
async fn filter_rethrows_a_stream_error_after_earlier_elements_arrive() {
    let completion = SequenceCompletion::new(vec![
        Ok(json!("first chunk")),
        Err("Exception from method".to_string()),
    ]);
    let kernel = Kernel::builder()
        .streaming_completion(completion)
        .function_filter(FunctionFilterFn::new(|context, next| async move {
            let mut context = next(context).await?;
            let stream = context.take_result().into_stream();
            context.result = FunctionResult::stream(catch_errors(stream, |_| {
                Err(KernelError::function("Exception from filter"))
            }));
            Ok(context)
        }))
        .build();

    let function = KernelFunction::from_prompt("p", "Prompt");
    let mut stream = kernel
        .invoke_streaming(function, KernelArguments::new())
        .await
        .unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first, json!("first chunk"));

    match stream.next().await.unwrap() {
        Err(err) => assert_eq!(err.to_string(), "function error: Exception from filter"),
        Ok(v) => panic!("expected rethrown error, got {v:?}"),
    }
}

#[tokio::test]
async fn rewrapping_filters_surface_the_outermost_stream_error() {
    let observations = Arc::new(AtomicUsize::new(0));
    let mut kernel = Kernel::builder()
        .streaming_completion(SequenceCompletion::new(vec![Err(
            "Exception from method".to_string(),
        )]))
        .build();

    for i in 1..=3 {
        let observations = observations.clone();
        kernel.add_function_filter(Arc::new(FunctionFilterFn::new(
            move |context, next| {
                let observations = observations.clone();
                async move {
                    let mut context = next(context).await?;
                    let stream = context.take_result().into_stream();
                    context.result = FunctionResult::stream(catch_errors(stream, move |_| {
                        observations.fetch_add(1, Ordering::SeqCst);
                        Err(KernelError::function(format!(
                            "Error from functionFilter{i}"
                        )))
                    }));
                    Ok(context)
                }
            },
        )));
    }

    let function = KernelFunction::from_prompt("p", "Prompt");
    let mut stream = kernel
        .invoke_streaming(function, KernelArguments::new())
        .await
        .unwrap();

    match stream.next().await.unwrap() {
        Err(err) => assert_eq!(err.to_string(), "function error: Error from functionFilter1"),
        Ok(v) => panic!("expected error, got {v:?}"),
    }
    assert_eq!(observations.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn filter_replaces_the_element_at_a_position() {
    let kernel = Kernel::builder()
        .function_filter(FunctionFilterFn::new(|context, next| async move {
            let mut context = next(context).await?;
            let stream = context.take_result().into_stream();
            context.result =
                FunctionResult::stream(replace_at(stream, 1, json!("replaced")));
            Ok(context)
        }))
        .build();

    let function = counting_stream_function(vec![10, 20, 30], Arc::new(AtomicUsize::new(0)));
    let stream = kernel
        .invoke_streaming(function, KernelArguments::new())
        .await
        .unwrap();
    let values = collect_values(stream).await.unwrap();
    assert_eq!(values, vec![json!(10), json!("replaced"), json!(30)]);
}

#[tokio::test]
async fn prompt_pipeline_runs_once_for_streaming_invocations() {
    let completion = SequenceCompletion::new(vec![Ok(json!("a")), Ok(json!("b"))]);
    let probe = completion.clone();
    let hook_calls = Arc::new(AtomicUsize::new(0));
    let hook_calls_in_filter = hook_calls.clone();

    let kernel = Kernel::builder()
        .streaming_completion(completion)
        .prompt_filter(PromptFilterFn::rendered(move |_| {
            hook_calls_in_filter.fetch_add(1, Ordering::SeqCst);
        }))
        .build();

    let function = KernelFunction::from_prompt("p", "Prompt");
    let stream = kernel
        .invoke_streaming(function, KernelArguments::new())
        .await
        .unwrap();
    let values = collect_values(stream).await.unwrap();

    assert_eq!(values, vec![json!("a"), json!("b")]);
    assert_eq!(probe.call_count(), 1);
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scalar_results_stream_as_a_single_element() {
    let kernel = Kernel::builder().build();
    let function = KernelFunction::from_method("scalar", |_| async { Ok(json!("only")) });

    let stream = kernel
        .invoke_streaming(function, KernelArguments::new())
        .await
        .unwrap();
    let values = collect_values(stream).await.unwrap();
    assert_eq!(values, vec![json!("only")]);
}

#[tokio::test]
async fn streaming_helpers_compose_without_consuming_eagerly() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let pulled_in_stream = pulled.clone();
    let inner: llm_kernel::ValueStream =
        Box::pin(futures::stream::iter(vec![json!(1), json!(2)]).map(move |v| {
            pulled_in_stream.fetch_add(1, Ordering::SeqCst);
            Ok(v)
        }));

    let wrapped = map_values(
        replace_at(inner, 0, json!(0)),
        |v: Value| json!(v.as_i64().unwrap_or(0) + 100),
    );
    assert_eq!(pulled.load(Ordering::SeqCst), 0);

    let values = collect_values(wrapped).await.unwrap();
    assert_eq!(values, vec![json!(100), json!(102)]);
    assert_eq!(pulled.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn once_and_empty_constructors_behave() {
    let values = collect_values(streaming::once(json!("x"))).await.unwrap();
    assert_eq!(values, vec![json!("x")]);

    let values = collect_values(streaming::empty()).await.unwrap();
    assert!(values.is_empty());
}
