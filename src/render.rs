//! Prompt renderer seam and the default variable-substitution renderer.

use serde_json::Value;

use crate::args::KernelArguments;
use crate::error::Result;

/// Renders a prompt template against the current arguments.
///
/// Template-language internals belong to the implementation behind this
/// seam; the pipeline only cares about the final text.
pub trait PromptRenderer: Send + Sync {
    fn render(&self, template: &str, arguments: &KernelArguments) -> Result<String>;
}

/// Default renderer: substitutes `{{name}}` placeholders with argument
/// values. String arguments are inserted verbatim, other values as JSON.
/// Unknown placeholders and unclosed braces are left untouched.
#[derive(Debug, Clone, Default)]
pub struct VariableRenderer;

impl PromptRenderer for VariableRenderer {
    fn render(&self, template: &str, arguments: &KernelArguments) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let name = after[..end].trim();
                    match arguments.get(name) {
                        Some(Value::String(s)) => out.push_str(s),
                        Some(other) => out.push_str(&other.to_string()),
                        None => {
                            out.push_str("{{");
                            out.push_str(&after[..end]);
                            out.push_str("}}");
                        }
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str("{{");
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }
}
