//! Fulltext derivation.
//!
//! Every write recomputes a node's `fulltext` from its title,
//! description, tags, and searchable aspect-property values. The result
//! is lowercased, diacritic-folded, and stripped of short tokens, so
//! fulltext matching is accent- and case-insensitive.
//!
//! Folding targets Latin-script languages: NFD decomposition followed
//! by removal of combining marks. Other scripts pass through unchanged.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::defaults::FULLTEXT_MIN_TOKEN_LEN;

/// Lowercase and diacritic-fold a string.
pub fn fold_text(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Derive the fulltext search string for a node.
///
/// `searchable_values` carries the stringified values of aspect
/// properties flagged `searchable`. Tokens shorter than
/// [`FULLTEXT_MIN_TOKEN_LEN`] are dropped.
pub fn derive_fulltext<'a, I>(
    title: &str,
    description: Option<&str>,
    tags: &[String],
    searchable_values: I,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut source = String::new();
    source.push_str(title);
    if let Some(description) = description {
        source.push(' ');
        source.push_str(description);
    }
    for tag in tags {
        source.push(' ');
        source.push_str(tag);
    }
    for value in searchable_values {
        source.push(' ');
        source.push_str(value);
    }

    let folded = fold_text(&source);
    folded
        .split_whitespace()
        .filter(|token| token.chars().count() >= FULLTEXT_MIN_TOKEN_LEN)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_text_lowercases() {
        assert_eq!(fold_text("Hello World"), "hello world");
    }

    #[test]
    fn test_fold_text_strips_diacritics() {
        assert_eq!(fold_text("Código às 10h"), "codigo as 10h");
        assert_eq!(fold_text("naïve café"), "naive cafe");
    }

    #[test]
    fn test_fold_text_leaves_other_scripts() {
        assert_eq!(fold_text("日本語"), "日本語");
    }

    #[test]
    fn test_derive_fulltext_concatenates_sources() {
        let tags = vec!["finance".to_string(), "2024".to_string()];
        let fulltext = derive_fulltext(
            "Invoice",
            Some("Monthly statement"),
            &tags,
            ["ACME Corporation"],
        );
        assert_eq!(fulltext, "invoice monthly statement finance 2024 acme corporation");
    }

    #[test]
    fn test_derive_fulltext_drops_short_tokens() {
        let fulltext = derive_fulltext("An Ox at a Farm", None, &[], []);
        assert_eq!(fulltext, "farm");
    }

    #[test]
    fn test_derive_fulltext_is_deterministic() {
        let tags = vec!["alpha".to_string()];
        let a = derive_fulltext("Título", Some("descrição"), &tags, ["Três"]);
        let b = derive_fulltext("Título", Some("descrição"), &tags, ["Três"]);
        assert_eq!(a, b);
        assert_eq!(a, "titulo descricao alpha tres");
    }
}
