// Shared helpers: slug derivation and graph label normalisation.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_SLUG_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s-]").unwrap());
static SLUG_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_]+").unwrap());
static REPEATED_HYPHENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").unwrap());

/// Convert a display name to a URL-safe slug.
pub fn slugify(name: &str) -> String {
    let slug = name.to_lowercase();
    let slug = NON_SLUG_CHARS.replace_all(&slug, "");
    let slug = SLUG_SEPARATORS.replace_all(&slug, "-");
    let slug = REPEATED_HYPHENS.replace_all(&slug, "-");
    slug.trim_matches('-').to_string()
}

/// Private graph namespace handle for a project slug.
pub fn graph_name_for_slug(slug: &str) -> String {
    format!("project_{}", slug.replace('-', "_"))
}

/// Extract the first label from the graph engine's `labels()` result.
///
/// The engine returns node labels as a list (e.g. `["Concept"]`); this
/// normalises list and scalar forms to a plain string.
pub fn normalize_label(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Array(items) => items
            .first()
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string(),
        serde_json::Value::String(s) if !s.is_empty() => s.clone(),
        _ => "Unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("Demo Shop"), "demo-shop");
        assert_eq!(slugify("  My  Project  "), "my-project");
        assert_eq!(slugify("Already-Sluggy"), "already-sluggy");
    }

    #[test]
    fn slugify_strips_punctuation() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("a/b\\c"), "abc");
    }

    #[test]
    fn slugify_collapses_repeats() {
        assert_eq!(slugify("a --- b"), "a-b");
        assert_eq!(slugify("--edges--"), "edges");
    }

    #[test]
    fn graph_name_replaces_hyphens() {
        assert_eq!(graph_name_for_slug("demo-shop"), "project_demo_shop");
        assert_eq!(graph_name_for_slug("plain"), "project_plain");
    }

    #[test]
    fn normalize_label_handles_lists_and_scalars() {
        assert_eq!(normalize_label(&json!(["Component"])), "Component");
        assert_eq!(normalize_label(&json!(["A", "B"])), "A");
        assert_eq!(normalize_label(&json!("Concept")), "Concept");
        assert_eq!(normalize_label(&json!([])), "Unknown");
        assert_eq!(normalize_label(&json!(null)), "Unknown");
        assert_eq!(normalize_label(&json!("")), "Unknown");
    }
}
