//! `{{name}}` placeholder parsing and substitution

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// Names referenced in `text`, in order of appearance (duplicates kept)
pub fn placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Whether `text` references any placeholder
pub fn has_placeholders(text: &str) -> bool {
    PLACEHOLDER.is_match(text)
}

/// Replace every placeholder with `lookup(name)`; unknown names are left verbatim
pub fn substitute<F>(text: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Placeholder token for `name`
pub fn placeholder(name: &str) -> String {
    format!("{{{{{}}}}}", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_known_and_unknown() {
        let out = substitute("Hi {{name}}, code {{ code }} {{missing}}", |name| match name {
            "name" => Some("Ada".to_string()),
            "code" => Some("42".to_string()),
            _ => None,
        });
        assert_eq!(out, "Hi Ada, code 42 {{missing}}");
    }

    #[test]
    fn test_placeholder_token() {
        assert_eq!(placeholder("email"), "{{email}}");
        assert!(has_placeholders(&placeholder("email")));
        assert!(!has_placeholders("{{ 1bad }}"));
    }
}
