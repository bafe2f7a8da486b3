//! Intent definitions.
//!
//! An intent is a classified caller goal. Intents are authored externally
//! (management UI) and are read-only to the synthesis core. The action an
//! intent performs is a tagged union: each variant carries only the fields
//! that are meaningful for it.

use serde::{Deserialize, Serialize};

/// What an intent does once matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntentAction {
    /// Play a fixed response: either a pre-rendered audio key or static
    /// text rendered through the response cache.
    Static {
        /// Key of a pre-rendered, pinned audio entry, if one exists.
        audio_key: Option<String>,
        /// Static text to render when no pre-rendered audio is referenced.
        text: Option<String>,
    },
    /// Answer from a knowledge base article.
    KbLookup {
        /// Identifier of the knowledge base to query.
        kb_id: String,
    },
    /// Invoke a backend function and speak its templated result.
    FunctionCall {
        /// Name of the backend function.
        function: String,
    },
    /// Transfer the caller to a human queue.
    Transfer {
        /// Destination queue identifier.
        transfer_queue: String,
    },
    /// Collect a variable value from the caller.
    CollectInput {
        /// Name of the variable being collected.
        variable: String,
        /// Segment key of the reprompt audio.
        reprompt_key: String,
    },
}

/// Matching criteria evaluated by the classifier.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TriggerCriteria {
    /// Keywords whose presence in an utterance supports this intent.
    pub keywords: Vec<String>,
    /// Example utterances (consumed by embedding/LLM classifiers).
    pub utterance_examples: Vec<String>,
}

/// A classified caller goal, authored externally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Stable identifier.
    pub id: String,
    /// Agent this intent belongs to.
    pub agent_id: String,
    /// The action performed when this intent is matched.
    pub action: IntentAction,
    /// Matching criteria for the classifier.
    pub trigger: TriggerCriteria,
    /// Minimum classification confidence for this intent to fire.
    pub confidence_threshold: f64,
    /// Template rendered for this intent, if its response is templated.
    pub template_id: Option<String>,
    /// Tie-break priority; higher wins.
    pub priority: i64,
    /// Inactive intents are never matched.
    pub active: bool,
}

/// Result of classifying one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Identifier of the best-matching intent.
    pub intent_id: String,
    /// Classifier confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}
