//! Prompt template rendering
//!
//! The gateway consumes rendered prompts; template management lives
//! elsewhere. Rendering substitutes `{{variable}}` placeholders,
//! preferring provided values, then declared defaults. Optional variables
//! without a value render empty; required ones without a value fail with
//! the full list of what is missing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap());

/// Template rendering errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// Required variables had neither a provided value nor a default
    #[error("missing required template variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),
}

/// A variable declared by a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVariable {
    /// Placeholder name
    pub name: String,
    /// Rendering fails when a required variable has no value
    #[serde(default)]
    pub required: bool,
    /// Value used when none is provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// A prompt template with `{{variable}}` placeholders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name
    pub name: String,
    /// Template body
    pub content: String,
    /// Declared variables
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
}

impl PromptTemplate {
    /// Create a template
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            variables: Vec::new(),
        }
    }

    /// Declare a variable (builder pattern)
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        required: bool,
        default_value: Option<String>,
    ) -> Self {
        self.variables.push(TemplateVariable {
            name: name.into(),
            required,
            default_value,
        });
        self
    }

    /// Placeholder names appearing in the template body
    pub fn placeholders(&self) -> Vec<String> {
        PLACEHOLDER
            .captures_iter(&self.content)
            .map(|c| c[1].to_string())
            .collect()
    }

    /// Render the template with the provided values
    pub fn render(&self, values: &HashMap<String, String>) -> Result<String, TemplateError> {
        let declared: HashMap<&str, &TemplateVariable> = self
            .variables
            .iter()
            .map(|v| (v.name.as_str(), v))
            .collect();

        let mut missing = Vec::new();
        for name in self.placeholders() {
            if values.contains_key(&name) {
                continue;
            }
            if let Some(variable) = declared.get(name.as_str()) {
                if variable.default_value.is_none() && variable.required {
                    missing.push(name);
                }
            }
        }
        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            return Err(TemplateError::MissingVariables(missing));
        }

        let rendered = PLACEHOLDER.replace_all(&self.content, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            values
                .get(name)
                .cloned()
                .or_else(|| {
                    declared
                        .get(name)
                        .and_then(|v| v.default_value.clone())
                })
                .unwrap_or_default()
        });
        Ok(rendered.into_owned())
    }
}
