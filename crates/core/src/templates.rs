//! Claim prompt catalog and placeholder rendering.
//!
//! Prompts are plain text with `{name}` placeholders filled from the assembled claim facts.
//! `{{` and `}}` render as literal braces. The catalog is a YAML file:
//!
//! ```yaml
//! prompts:
//!   reclamacion_eps: |
//!     Redacta una reclamación para {nombre_paciente} ...
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::{ClaimError, ClaimResult};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("template placeholder '{0}' has no value")]
    MissingField(String),
    #[error("unclosed placeholder starting at byte {0}")]
    Unclosed(usize),
    #[error("unmatched '}}' at byte {0}")]
    StrayBrace(usize),
    #[error("empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),
}

/// Source of claim prompt templates, keyed by prompt name (`reclamacion_eps`, `desacato2`, ...).
pub trait PromptCatalog: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PromptFile {
    prompts: HashMap<String, String>,
}

/// Prompt catalog loaded once from a YAML file.
#[derive(Debug, Clone)]
pub struct YamlPromptCatalog {
    prompts: HashMap<String, String>,
}

impl YamlPromptCatalog {
    /// Load the catalog from `path`.
    ///
    /// # Errors
    ///
    /// Returns `ClaimError::FileRead` if the file cannot be read, or
    /// `ClaimError::YamlDeserialization` naming the offending path if it does not parse.
    pub fn load(path: &Path) -> ClaimResult<Self> {
        let text = std::fs::read_to_string(path).map_err(ClaimError::FileRead)?;
        let catalog = Self::from_yaml_str(&text)?;
        tracing::info!(
            "loaded {} claim prompts from {}",
            catalog.prompts.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn from_yaml_str(yaml_text: &str) -> ClaimResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
        match serde_path_to_error::deserialize::<_, PromptFile>(deserializer) {
            Ok(file) => Ok(Self {
                prompts: file.prompts,
            }),
            Err(err) => {
                let path = err.path().to_string();
                let path = if path.is_empty() || path == "." {
                    "<root>".to_string()
                } else {
                    path
                };
                Err(ClaimError::YamlDeserialization {
                    path,
                    source: err.into_inner(),
                })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

impl PromptCatalog for YamlPromptCatalog {
    fn get(&self, name: &str) -> Option<String> {
        self.prompts.get(name).cloned()
    }
}

/// In-memory catalog for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryPromptCatalog {
    prompts: HashMap<String, String>,
}

impl MemoryPromptCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.prompts.insert(name.into(), template.into());
        self
    }
}

impl PromptCatalog for MemoryPromptCatalog {
    fn get(&self, name: &str) -> Option<String> {
        self.prompts.get(name).cloned()
    }
}

/// Substitute every `{name}` in `template` with its value from `vars`.
///
/// # Errors
///
/// Returns a [`TemplateError`] for an unknown placeholder or unbalanced braces. Nothing is
/// substituted partially.
pub fn render(template: &str, vars: &BTreeMap<String, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(TemplateError::Unclosed(pos));
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(TemplateError::EmptyPlaceholder(pos));
                }
                let value = vars
                    .get(name)
                    .ok_or_else(|| TemplateError::MissingField(name.to_string()))?;
                out.push_str(value);
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(TemplateError::StrayBrace(pos));
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn fills_placeholders() {
        let out = render(
            "Paciente {nombre_paciente}, EPS {eps_estandarizada}.",
            &vars(&[("nombre_paciente", "Ana"), ("eps_estandarizada", "Nueva EPS")]),
        )
        .unwrap();
        assert_eq!(out, "Paciente Ana, EPS Nueva EPS.");
    }

    #[test]
    fn doubled_braces_are_literal() {
        let out = render("{{\"campo\": \"{x}\"}}", &vars(&[("x", "1")])).unwrap();
        assert_eq!(out, "{\"campo\": \"1\"}");
    }

    #[test]
    fn missing_field_is_named() {
        let err = render("Hola {ciudad}", &vars(&[])).unwrap_err();
        assert_eq!(err, TemplateError::MissingField("ciudad".into()));
    }

    #[test]
    fn unbalanced_braces_fail() {
        assert_eq!(render("a {b", &vars(&[])), Err(TemplateError::Unclosed(2)));
        assert_eq!(render("a } b", &vars(&[])), Err(TemplateError::StrayBrace(2)));
        assert_eq!(render("{ }", &vars(&[])), Err(TemplateError::EmptyPlaceholder(0)));
    }

    #[test]
    fn yaml_catalog_parses_and_reports_paths() {
        let catalog = YamlPromptCatalog::from_yaml_str(
            "prompts:\n  reclamacion_eps: \"Hola {nombre_paciente}\"\n",
        )
        .unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.get("reclamacion_eps").as_deref(),
            Some("Hola {nombre_paciente}")
        );
        assert!(catalog.get("tutela").is_none());

        let err = YamlPromptCatalog::from_yaml_str("prompts:\n  tutela: [1, 2]\n").unwrap_err();
        match err {
            ClaimError::YamlDeserialization { path, .. } => assert_eq!(path, "prompts.tutela"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn bundled_catalog_covers_every_base_prompt() {
        let text = include_str!("../../../prompts/claims.yaml");
        let catalog = YamlPromptCatalog::from_yaml_str(text).unwrap();
        for name in [
            "reclamacion_eps",
            "reclamacion_eps_escalado",
            "reclamacion_supersalud",
            "reclamacion_supersalud_escalado",
            "tutela",
            "desacato",
            "desacato2",
            "desacato3",
        ] {
            assert!(catalog.get(name).is_some(), "missing prompt {name}");
        }
    }
}
