//! Index name normalization.
//!
//! Index names are case-insensitive namespaces. Rather than reject malformed
//! input, malformed characters are normalized into a stable identifier:
//! lowercase, substitute illegal characters, and bound the length.

use crate::validation::MAX_INDEX_NAME_LEN;

/// Name used when the caller supplies no index.
pub const DEFAULT_INDEX_NAME: &str = "default";

/// Letter used to pad a name that would otherwise start or end with `-`.
const PAD_CHAR: char = 'x';

fn is_illegal(c: char) -> bool {
  c.is_whitespace() || matches!(c, '\\' | '/' | '.' | '_' | ':')
}

/// Normalize a caller-supplied index name.
///
/// - case-folded to lowercase
/// - illegal characters (whitespace, `\ / . _ :`) become `-`
/// - leading/trailing `-` are padded with a letter so the name never starts
///   or ends on the substitution character
/// - empty input normalizes to [`DEFAULT_INDEX_NAME`]
/// - truncated to [`MAX_INDEX_NAME_LEN`] characters
pub fn normalize_index_name(raw: &str) -> String {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return DEFAULT_INDEX_NAME.to_string();
  }

  let mut normalized: String = trimmed
    .chars()
    .map(|c| if is_illegal(c) { '-' } else { c })
    .collect::<String>()
    .to_lowercase();

  if normalized.starts_with('-') {
    normalized.insert(0, PAD_CHAR);
  }
  if normalized.ends_with('-') {
    normalized.push(PAD_CHAR);
  }

  if normalized.chars().count() > MAX_INDEX_NAME_LEN {
    normalized = normalized.chars().take(MAX_INDEX_NAME_LEN).collect();
  }

  if normalized.is_empty() {
    DEFAULT_INDEX_NAME.to_string()
  } else {
    normalized
  }
}
