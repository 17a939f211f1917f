//! Content renderer port and the file-backed template renderer.
//!
//! Templates use `{{ name }}` placeholders with an optional fallback,
//! `{{ name | there }}`. Rendering fails closed: a placeholder with no value
//! and no fallback is an error, never an empty string.

use crate::paths;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("template '{template}' has unresolved placeholders: {}", .placeholders.join(", "))]
    Unresolved {
        template: String,
        placeholders: Vec<String>,
    },

    #[error("template '{template}' is malformed: {reason}")]
    Malformed { template: String, reason: String },

    #[error("failed to read template '{template}': {reason}")]
    Io { template: String, reason: String },
}

#[async_trait]
pub trait ContentRenderer: Send + Sync {
    async fn render(
        &self,
        template_ref: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<RenderedContent, RenderError>;
}

// ---------------------------------------------------------------------------
// Placeholder substitution
// ---------------------------------------------------------------------------

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:\|\s*([^{}]*?)\s*)?\}\}").unwrap()
    })
}

/// Substitute placeholders in `text`. Unresolved names are appended to
/// `missing`.
fn substitute(text: &str, variables: &BTreeMap<String, String>, missing: &mut Vec<String>) -> String {
    placeholder_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match variables.get(name).filter(|v| !v.trim().is_empty()) {
                Some(v) => v.clone(),
                None => match caps.get(2) {
                    Some(fallback) => fallback.as_str().to_string(),
                    None => {
                        if !missing.iter().any(|m| m == name) {
                            missing.push(name.to_string());
                        }
                        String::new()
                    }
                },
            }
        })
        .into_owned()
}

/// Render one template body against `variables`.
pub fn render_text(
    template: &str,
    text: &str,
    variables: &BTreeMap<String, String>,
) -> Result<String, RenderError> {
    let mut missing = Vec::new();
    let out = substitute(text, variables, &mut missing);
    if !missing.is_empty() {
        return Err(RenderError::Unresolved {
            template: template.to_string(),
            placeholders: missing,
        });
    }
    // Anything brace-shaped that survived substitution is a broken placeholder.
    if placeholder_re().replace_all(text, "").contains("{{") {
        return Err(RenderError::Malformed {
            template: template.to_string(),
            reason: "unterminated or invalid placeholder".into(),
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// FileTemplateRenderer
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(default)]
    subject: Option<String>,
    body: String,
}

/// Reads `<dir>/<template_ref>.yaml` with `subject` and `body` keys.
#[derive(Debug, Clone)]
pub struct FileTemplateRenderer {
    dir: PathBuf,
}

impl FileTemplateRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Renderer over the project's `.outreach/templates` directory.
    pub fn for_root(root: &Path) -> Self {
        Self::new(paths::templates_dir(root))
    }
}

#[async_trait]
impl ContentRenderer for FileTemplateRenderer {
    async fn render(
        &self,
        template_ref: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<RenderedContent, RenderError> {
        if paths::validate_slug(template_ref).is_err() {
            return Err(RenderError::TemplateNotFound(template_ref.to_string()));
        }
        let path = self
            .dir
            .join(format!("{template_ref}.{}", paths::TEMPLATE_EXT));
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RenderError::TemplateNotFound(template_ref.to_string()))
            }
            Err(e) => {
                return Err(RenderError::Io {
                    template: template_ref.to_string(),
                    reason: e.to_string(),
                })
            }
        };
        let file: TemplateFile =
            serde_yaml::from_str(&raw).map_err(|e| RenderError::Malformed {
                template: template_ref.to_string(),
                reason: e.to_string(),
            })?;

        let subject = file
            .subject
            .as_deref()
            .map(|s| render_text(template_ref, s, variables))
            .transpose()?;
        let body = render_text(template_ref, &file.body, variables)?;
        if body.trim().is_empty() {
            return Err(RenderError::Malformed {
                template: template_ref.to_string(),
                reason: "rendered body is empty".into(),
            });
        }
        Ok(RenderedContent { subject, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_and_uses_fallbacks() {
        let out = render_text(
            "t",
            "Hi {{first_name}}, how is {{ company | your team }}?",
            &vars(&[("first_name", "Ada")]),
        )
        .unwrap();
        assert_eq!(out, "Hi Ada, how is your team?");
    }

    #[test]
    fn unresolved_placeholders_fail_closed() {
        let err = render_text("t", "{{a}} {{ b }} {{a}}", &vars(&[])).unwrap_err();
        assert_eq!(
            err,
            RenderError::Unresolved {
                template: "t".into(),
                placeholders: vec!["a".into(), "b".into()],
            }
        );
    }

    #[test]
    fn blank_value_counts_as_missing() {
        assert!(render_text("t", "{{a}}", &vars(&[("a", "  ")])).is_err());
    }

    #[test]
    fn broken_braces_are_malformed() {
        let err = render_text("t", "Hello {{ first name }}", &vars(&[])).unwrap_err();
        assert!(matches!(err, RenderError::Malformed { .. }));
    }

    #[tokio::test]
    async fn file_renderer_reads_yaml_templates() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("intro.yaml"),
            "subject: Hello {{ first_name }}\nbody: |\n  Hi {{ first_name }} at {{ company }}.\n",
        )
        .unwrap();
        let r = FileTemplateRenderer::new(dir.path());
        let out = r
            .render("intro", &vars(&[("first_name", "Ada"), ("company", "AE")]))
            .await
            .unwrap();
        assert_eq!(out.subject.as_deref(), Some("Hello Ada"));
        assert_eq!(out.body, "Hi Ada at AE.\n");

        let err = r.render("intro", &vars(&[("first_name", "Ada")])).await.unwrap_err();
        assert!(matches!(err, RenderError::Unresolved { .. }));
    }

    #[tokio::test]
    async fn missing_template_is_reported() {
        let dir = TempDir::new().unwrap();
        let r = FileTemplateRenderer::new(dir.path());
        assert_eq!(
            r.render("nope", &BTreeMap::new()).await.unwrap_err(),
            RenderError::TemplateNotFound("nope".into())
        );
        assert!(matches!(
            r.render("../etc", &BTreeMap::new()).await.unwrap_err(),
            RenderError::TemplateNotFound(_)
        ));
    }
}
