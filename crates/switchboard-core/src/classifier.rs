//! The classifier seam.
//!
//! Classification itself is pluggable — keyword matching ships in-tree,
//! and the trait admits LLM or embedding implementations behind the same
//! interface. The core consumes only the resulting `(intent_id,
//! confidence)` pair and selects the implementation through the factory;
//! nothing outside this module branches on the classifier identifier.

use std::sync::Arc;

use async_trait::async_trait;

use switchboard_db::{repo, DbPool};
use switchboard_types::Classification;

use crate::error::{AssembleError, ConfigurationError};

/// Classifies one caller utterance against an agent's active intents.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Returns the best-matching intent and a confidence in `[0.0, 1.0]`,
    /// or `None` when nothing matches at all.
    async fn classify(
        &self,
        agent_id: &str,
        utterance: &str,
    ) -> Result<Option<Classification>, AssembleError>;
}

/// Keyword-overlap classifier.
///
/// Confidence is the fraction of an intent's trigger keywords present in
/// the utterance; ties break on intent priority (the repository already
/// orders by it).
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    pool: DbPool,
}

impl KeywordClassifier {
    /// Creates a classifier over the shared repository pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(
        &self,
        agent_id: &str,
        utterance: &str,
    ) -> Result<Option<Classification>, AssembleError> {
        let conn = self.pool.get()?;
        let intents = repo::list_active_intents(&conn, agent_id)?;

        let normalized = utterance.to_lowercase();
        let tokens: Vec<&str> = normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut best: Option<Classification> = None;
        for intent in &intents {
            if intent.trigger.keywords.is_empty() {
                continue;
            }
            let matched = intent
                .trigger
                .keywords
                .iter()
                .filter(|keyword| {
                    let keyword = keyword.to_lowercase();
                    tokens.contains(&keyword.as_str())
                })
                .count();
            if matched == 0 {
                continue;
            }
            let confidence = matched as f64 / intent.trigger.keywords.len() as f64;
            let better = match &best {
                None => true,
                Some(current) => confidence > current.confidence,
            };
            if better {
                best = Some(Classification {
                    intent_id: intent.id.clone(),
                    confidence,
                });
            }
        }

        Ok(best)
    }
}

/// Factory: creates a classifier by configured identifier.
///
/// # Supported classifiers
///
/// - `"keyword"` — keyword-overlap matching against trigger criteria
pub fn create_classifier(
    classifier_type: &str,
    pool: DbPool,
) -> Result<Arc<dyn Classifier>, AssembleError> {
    match classifier_type.to_lowercase().as_str() {
        "keyword" => Ok(Arc::new(KeywordClassifier::new(pool))),
        other => Err(ConfigurationError::UnknownClassifier(other.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_db::{create_pool, run_migrations, PoolSettings};
    use switchboard_types::{Intent, IntentAction, TriggerCriteria};

    fn test_pool(dir: &tempfile::TempDir) -> DbPool {
        let db_path = dir.path().join("classifier.db");
        let pool = create_pool(&db_path, PoolSettings::default()).expect("pool");
        {
            let conn = pool.get().expect("conn");
            run_migrations(&conn).expect("migrations");
        }
        pool
    }

    fn seed_intent(pool: &DbPool, id: &str, keywords: &[&str], priority: i64) {
        let conn = pool.get().expect("conn");
        repo::upsert_intent(
            &conn,
            &Intent {
                id: id.to_string(),
                agent_id: "agent-1".to_string(),
                action: IntentAction::Static {
                    audio_key: None,
                    text: Some("ok".to_string()),
                },
                trigger: TriggerCriteria {
                    keywords: keywords.iter().map(|k| k.to_string()).collect(),
                    utterance_examples: vec![],
                },
                confidence_threshold: 0.5,
                template_id: None,
                priority,
                active: true,
            },
        )
        .expect("upsert");
    }

    #[tokio::test]
    async fn picks_highest_overlap_intent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = test_pool(&dir);
        seed_intent(&pool, "balance", &["balance", "owe"], 0);
        seed_intent(&pool, "hours", &["open", "hours", "close"], 0);

        let classifier = KeywordClassifier::new(pool);
        let result = classifier
            .classify("agent-1", "how much do I owe on my balance")
            .await
            .expect("classify")
            .expect("match");
        assert_eq!(result.intent_id, "balance");
        assert!((result.confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_keyword_overlap_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = test_pool(&dir);
        seed_intent(&pool, "balance", &["balance"], 0);

        let classifier = KeywordClassifier::new(pool);
        let result = classifier
            .classify("agent-1", "tell me a joke")
            .await
            .expect("classify");
        assert!(result.is_none());
    }

    #[test]
    fn factory_rejects_unknown_type() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = test_pool(&dir);
        match create_classifier("quantum", pool) {
            Err(AssembleError::Configuration(ConfigurationError::UnknownClassifier(t))) => {
                assert_eq!(t, "quantum")
            }
            Err(other) => panic!("expected UnknownClassifier, got {other:?}"),
            Ok(_) => panic!("expected UnknownClassifier, got a classifier"),
        }
    }
}
