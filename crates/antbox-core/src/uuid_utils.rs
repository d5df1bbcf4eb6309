//! Identifier utilities: node uuids, fid slugs, and the `--fid--` alias
//! encoding used to look nodes up by their human-friendly identifier.
//!
//! Reserved (built-in) identifiers are `--`-delimited slugs such as
//! `--root--`; everything user-created is a plain UUIDv4 string.

use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use crate::fulltext::fold_text;

/// Prefix marking a uuid as a fid alias: `--fid--<slug>`.
pub const FID_PREFIX: &str = "--fid--";

/// Generate a new node uuid (UUIDv4, lowercase hyphenated).
#[inline]
pub fn new_node_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Whether `uuid` denotes a reserved built-in identifier.
///
/// Built-ins are `--`-delimited slugs (`--root--`, `--admins--`, …).
/// Fid aliases share the prefix but are not built-ins themselves.
pub fn is_builtin_uuid(uuid: &str) -> bool {
    uuid.len() > 4 && uuid.starts_with("--") && uuid.ends_with("--")
}

/// Whether `uuid` is a fid alias of the form `--fid--<slug>`.
pub fn is_fid_alias(uuid: &str) -> bool {
    uuid.len() > FID_PREFIX.len() && uuid.starts_with(FID_PREFIX)
}

/// Extract the fid slug from a `--fid--<slug>` alias.
pub fn fid_from_alias(uuid: &str) -> Option<&str> {
    if is_fid_alias(uuid) {
        Some(&uuid[FID_PREFIX.len()..])
    } else {
        None
    }
}

/// Encode a fid slug as a lookup alias.
pub fn fid_to_alias(fid: &str) -> String {
    format!("{}{}", FID_PREFIX, fid)
}

/// Derive a fid slug from a node title.
///
/// Lowercased and diacritic-folded, with every non-alphanumeric run
/// collapsed to a single `-`. Uniqueness is enforced by the repository;
/// callers resolve collisions with [`fid_with_suffix`].
pub fn slugify(title: &str) -> String {
    let folded = fold_text(title);
    let mut slug = String::with_capacity(folded.len());
    let mut last_dash = true;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        new_node_uuid()
    } else {
        slug
    }
}

/// Append a short random alphanumeric suffix to a colliding fid slug.
pub fn fid_with_suffix(fid: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(crate::defaults::FID_SUFFIX_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("{}-{}", fid, suffix)
}

/// Generate a random api-key secret.
pub fn new_api_key_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(crate::defaults::API_KEY_SECRET_LEN)
        .map(char::from)
        .collect()
}
