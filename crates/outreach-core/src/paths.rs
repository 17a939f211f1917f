use crate::error::{OutreachError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const OUTREACH_DIR: &str = ".outreach";
pub const TEMPLATES_DIR: &str = ".outreach/templates";
pub const OUTBOX_DIR: &str = ".outreach/outbox";

pub const CONFIG_FILE: &str = ".outreach/config.yaml";
pub const DB_FILE: &str = ".outreach/outreach.db";

pub const TEMPLATE_EXT: &str = "yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn outreach_dir(root: &Path) -> PathBuf {
    root.join(OUTREACH_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}

pub fn templates_dir(root: &Path) -> PathBuf {
    root.join(TEMPLATES_DIR)
}

pub fn template_path(root: &Path, template_ref: &str) -> PathBuf {
    templates_dir(root).join(format!("{template_ref}.{TEMPLATE_EXT}"))
}

/// Resolve a configured path: absolute paths are kept, relative paths are
/// anchored at the project root.
pub fn resolve(root: &Path, configured: &str) -> PathBuf {
    let p = Path::new(configured);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

// ---------------------------------------------------------------------------
// Slug validation
// ---------------------------------------------------------------------------

static SLUG_RE: OnceLock<Regex> = OnceLock::new();

fn slug_re() -> &'static Regex {
    SLUG_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

/// Campaign ids and template refs share the slug format, which also keeps
/// template refs from escaping the templates directory.
pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > 64 || !slug_re().is_match(slug) {
        return Err(OutreachError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_slugs() {
        for slug in ["spring-launch", "a", "intro-email-2", "x1"] {
            validate_slug(slug).unwrap_or_else(|_| panic!("expected valid: {slug}"));
        }
    }

    #[test]
    fn invalid_slugs() {
        for slug in ["", "-lead", "trail-", "has spaces", "UPPER", "../etc", "a_b"] {
            assert!(validate_slug(slug).is_err(), "expected invalid: {slug}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            config_path(root),
            PathBuf::from("/tmp/proj/.outreach/config.yaml")
        );
        assert_eq!(
            template_path(root, "intro"),
            PathBuf::from("/tmp/proj/.outreach/templates/intro.yaml")
        );
        assert_eq!(
            resolve(root, ".outreach/outbox/email.jsonl"),
            PathBuf::from("/tmp/proj/.outreach/outbox/email.jsonl")
        );
        assert_eq!(resolve(root, "/var/out.jsonl"), PathBuf::from("/var/out.jsonl"));
    }
}
