//! Prompt template with `{{key}}` placeholder substitution.
//!
//! The context map is opaque to the core: it is produced by the
//! excluded narrative layer and only flows through rendering here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A round's prompt template (Value Object)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate(String);

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the template against a context map.
    ///
    /// Each `{{key}}` placeholder is replaced by the context value:
    /// strings verbatim, other JSON values in their compact form.
    /// Placeholders with no matching key are left untouched.
    pub fn render(&self, context: &serde_json::Map<String, Value>) -> String {
        let mut rendered = self.0.clone();
        for (key, value) in context {
            let placeholder = format!("{{{{{key}}}}}");
            if !rendered.contains(&placeholder) {
                continue;
            }
            let replacement = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&placeholder, &replacement);
        }
        rendered
    }
}

impl From<&str> for PromptTemplate {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_render_string_values() {
        let template = PromptTemplate::new("Consider {{theme}} from the view of {{role}}.");
        let rendered = template.render(&ctx(&[
            ("theme", json!("entropy")),
            ("role", json!("a historian")),
        ]));
        assert_eq!(rendered, "Consider entropy from the view of a historian.");
    }

    #[test]
    fn test_render_non_string_values_compact() {
        let template = PromptTemplate::new("round {{n}} of {{total}}");
        let rendered = template.render(&ctx(&[("n", json!(2)), ("total", json!(5))]));
        assert_eq!(rendered, "round 2 of 5");
    }

    #[test]
    fn test_unknown_placeholder_left_untouched() {
        let template = PromptTemplate::new("{{present}} and {{missing}}");
        let rendered = template.render(&ctx(&[("present", json!("here"))]));
        assert_eq!(rendered, "here and {{missing}}");
    }

    #[test]
    fn test_repeated_placeholder() {
        let template = PromptTemplate::new("{{x}}, again {{x}}");
        let rendered = template.render(&ctx(&[("x", json!("echo"))]));
        assert_eq!(rendered, "echo, again echo");
    }
}
