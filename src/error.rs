//! Error types for the kernel pipeline

use serde_json::Value;
use thiserror::Error;

/// Result type alias for the kernel pipeline
pub type Result<T> = std::result::Result<T, KernelError>;

/// Main error type for the kernel pipeline
#[derive(Debug, Error)]
pub enum KernelError {
    /// A rendered-prompt hook set the cancel flag, so the terminal
    /// completion call never ran. Carries the function name and a scalar
    /// snapshot of whatever result was in flight (usually none).
    #[error("function invocation canceled: {function_name}")]
    FunctionCanceled {
        function_name: String,
        result: Option<Value>,
    },

    /// Error surfaced by the completion service
    #[error("completion service error: {0}")]
    Completion(tower::BoxError),

    /// Error while rendering a prompt template
    #[error("prompt render error: {0}")]
    Render(String),

    /// A required collaborator was never registered on the kernel
    #[error("no {0} service registered")]
    MissingService(&'static str),

    /// Serialization/deserialization error
    #[error("invalid arguments: {0}")]
    Arguments(#[from] serde_json::Error),

    /// Error raised by a function body or by a filter
    #[error("function error: {message}")]
    Function { message: String },

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl KernelError {
    /// Shorthand for a [`KernelError::Function`] with the given message.
    pub fn function(message: impl Into<String>) -> Self {
        Self::Function {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KernelError::FunctionCanceled {
            function_name: "summarize".to_string(),
            result: None,
        };
        assert_eq!(err.to_string(), "function invocation canceled: summarize");

        let err = KernelError::MissingService("completion");
        assert_eq!(err.to_string(), "no completion service registered");

        let err = KernelError::function("boom");
        assert_eq!(err.to_string(), "function error: boom");
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<Value>("not json").unwrap_err();
        let err: KernelError = serde_err.into();
        assert!(matches!(err, KernelError::Arguments(_)));
    }

    #[test]
    fn test_result_type() {
        fn example_function() -> Result<String> {
            Ok("success".to_string())
        }

        let result = example_function();
        assert_eq!(result.unwrap(), "success");
    }

    #[test]
    fn test_canceled_carries_partial_result() {
        let err = KernelError::FunctionCanceled {
            function_name: "f".to_string(),
            result: Some(Value::from(42)),
        };
        if let KernelError::FunctionCanceled { result, .. } = err {
            assert_eq!(result, Some(Value::from(42)));
        } else {
            panic!("expected FunctionCanceled");
        }
    }
}
