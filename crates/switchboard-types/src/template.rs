//! Response template definitions.
//!
//! A template is an ordered recipe of segment references and variable
//! slots describing how a dynamic spoken response is assembled.

use crate::VariableFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One element of a template, in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateElement {
    /// A reference to a pre-rendered segment.
    Segment {
        /// Logical segment key.
        key: String,
    },
    /// A runtime-bound variable slot.
    Variable {
        /// Binding name looked up at render time.
        name: String,
        /// Spoken-form canonicalization applied to the bound value.
        format: VariableFormat,
    },
}

/// Structural defects detected by [`Template::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateInvariantError {
    /// A variable element's name is missing from `required_variables`.
    #[error("variable element '{0}' is not listed in required_variables")]
    UndeclaredVariable(String),

    /// The template has no elements.
    #[error("template '{0}' has no elements")]
    Empty(String),
}

/// An ordered recipe of segments and variable slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Stable identifier.
    pub id: String,
    /// Agent this template belongs to.
    pub agent_id: String,
    /// Elements in playback order.
    pub elements: Vec<TemplateElement>,
    /// Names of every variable the template references.
    pub required_variables: Vec<String>,
}

impl Template {
    /// Checks the structural invariant: every variable element's name must
    /// appear in `required_variables`, and the template must be non-empty.
    pub fn validate(&self) -> Result<(), TemplateInvariantError> {
        if self.elements.is_empty() {
            return Err(TemplateInvariantError::Empty(self.id.clone()));
        }
        for element in &self.elements {
            if let TemplateElement::Variable { name, .. } = element {
                if !self.required_variables.iter().any(|v| v == name) {
                    return Err(TemplateInvariantError::UndeclaredVariable(name.clone()));
                }
            }
        }
        Ok(())
    }
}
