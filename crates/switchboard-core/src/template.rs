//! Template resolution.
//!
//! Turns a template plus runtime bindings into an ordered list of concrete
//! resolution targets: pre-rendered segments and variable cache keys. No
//! audio is touched here; the assembler resolves each element against the
//! cache and the synthesis invoker afterwards.

use std::collections::HashMap;

use switchboard_cache::key;
use switchboard_db::{repo, DbPool};
use switchboard_types::{Segment, Template, TemplateElement, VariableFormat};

use crate::error::{AssembleError, ConfigurationError};

/// One element of a rendered template, in playback order.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedElement {
    /// A pre-rendered segment, resolved for the requested language at its
    /// latest published version.
    Segment(Segment),
    /// A variable slot, resolved to a canonical cache key plus the spoken
    /// text to synthesize on a miss.
    Variable {
        /// Canonical VariableCache key.
        cache_key: String,
        /// Text handed to the provider if the key is unresolved.
        spoken_text: String,
        /// The format the value was canonicalized under.
        format: VariableFormat,
    },
}

/// Resolves templates against the segment store and binding map.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    pool: DbPool,
}

impl TemplateEngine {
    /// Creates an engine over the shared repository pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Renders a template into ordered resolution targets.
    ///
    /// Fails with [`ConfigurationError::MissingBinding`] if any of the
    /// template's `required_variables` is absent from `bindings`, and with
    /// [`ConfigurationError::UnknownSegment`] if a referenced segment has
    /// no published version for `language` — it never substitutes another
    /// language.
    pub fn render(
        &self,
        template: &Template,
        bindings: &HashMap<String, String>,
        agent_id: &str,
        language: &str,
    ) -> Result<Vec<ResolvedElement>, AssembleError> {
        // Check the full requirement set up front so a missing binding is
        // reported even when its element sits late in the template.
        for required in &template.required_variables {
            if !bindings.contains_key(required) {
                return Err(ConfigurationError::MissingBinding(required.clone()).into());
            }
        }

        let conn = self.pool.get()?;
        let mut resolved = Vec::with_capacity(template.elements.len());

        for element in &template.elements {
            match element {
                TemplateElement::Segment { key: segment_key } => {
                    let segment = repo::get_segment(&conn, segment_key, language)?.ok_or_else(
                        || ConfigurationError::UnknownSegment {
                            key: segment_key.clone(),
                            language: language.to_string(),
                        },
                    )?;
                    resolved.push(ResolvedElement::Segment(segment));
                }
                TemplateElement::Variable { name, format } => {
                    let value = bindings
                        .get(name)
                        .ok_or_else(|| ConfigurationError::MissingBinding(name.clone()))?;
                    resolved.push(ResolvedElement::Variable {
                        cache_key: key::variable_key(agent_id, *format, value),
                        spoken_text: key::spoken_form(value, *format),
                        format: *format,
                    });
                }
            }
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_db::{create_pool, run_migrations, PoolSettings};
    use switchboard_types::SegmentKind;

    fn test_pool(dir: &tempfile::TempDir) -> DbPool {
        let db_path = dir.path().join("core.db");
        let pool = create_pool(&db_path, PoolSettings::default()).expect("pool");
        {
            let conn = pool.get().expect("conn");
            run_migrations(&conn).expect("migrations");
        }
        pool
    }

    fn invoice_template() -> Template {
        Template {
            id: "tpl-invoice".to_string(),
            agent_id: "agent-1".to_string(),
            elements: vec![
                TemplateElement::Segment {
                    key: "invoice_prefix".to_string(),
                },
                TemplateElement::Variable {
                    name: "invoice_no".to_string(),
                    format: VariableFormat::SpellDigits,
                },
            ],
            required_variables: vec!["invoice_no".to_string()],
        }
    }

    fn publish_prefix(pool: &DbPool, language: &str) {
        let conn = pool.get().expect("conn");
        repo::publish_segment(
            &conn,
            "invoice_prefix",
            language,
            SegmentKind::Prefix,
            "Your invoice number is",
            "invoice_prefix.pcm",
            900,
        )
        .expect("publish");
    }

    #[test]
    fn renders_in_declared_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = test_pool(&dir);
        publish_prefix(&pool, "en-US");

        let engine = TemplateEngine::new(pool);
        let bindings = HashMap::from([("invoice_no".to_string(), "1203".to_string())]);
        let resolved = engine
            .render(&invoice_template(), &bindings, "agent-1", "en-US")
            .expect("render");

        assert_eq!(resolved.len(), 2);
        match &resolved[0] {
            ResolvedElement::Segment(segment) => assert_eq!(segment.key, "invoice_prefix"),
            other => panic!("expected segment first, got {other:?}"),
        }
        match &resolved[1] {
            ResolvedElement::Variable {
                cache_key,
                spoken_text,
                ..
            } => {
                assert_eq!(spoken_text, "1 2 0 3");
                // Phonetically identical input yields the identical key.
                assert_eq!(
                    cache_key,
                    &switchboard_cache::variable_key(
                        "agent-1",
                        VariableFormat::SpellDigits,
                        "one two zero three"
                    )
                );
            }
            other => panic!("expected variable second, got {other:?}"),
        }
    }

    #[test]
    fn missing_required_binding_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = test_pool(&dir);
        publish_prefix(&pool, "en-US");

        let engine = TemplateEngine::new(pool);
        let err = engine
            .render(&invoice_template(), &HashMap::new(), "agent-1", "en-US")
            .expect_err("render must fail");
        match err {
            AssembleError::Configuration(ConfigurationError::MissingBinding(name)) => {
                assert_eq!(name, "invoice_no")
            }
            other => panic!("expected MissingBinding, got {other:?}"),
        }
    }

    #[test]
    fn unknown_segment_never_falls_back_across_languages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = test_pool(&dir);
        // Only the English variant exists.
        publish_prefix(&pool, "en-US");

        let engine = TemplateEngine::new(pool);
        let bindings = HashMap::from([("invoice_no".to_string(), "1203".to_string())]);
        let err = engine
            .render(&invoice_template(), &bindings, "agent-1", "tr-TR")
            .expect_err("render must fail");
        match err {
            AssembleError::Configuration(ConfigurationError::UnknownSegment { key, language }) => {
                assert_eq!(key, "invoice_prefix");
                assert_eq!(language, "tr-TR");
            }
            other => panic!("expected UnknownSegment, got {other:?}"),
        }
    }
}
