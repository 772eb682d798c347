//! Tag multimap shared by documents and memory records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::validation::{ValidationResult, validate_tag_key, validate_tag_value};

/// Prefix reserved for system-set tags. User tags MUST NOT use it directly;
/// see [`TagSet::insert_user`].
pub const RESERVED_PREFIX: &str = "__";

pub const TAG_DOCUMENT_ID: &str = "__document_id";
pub const TAG_FILE_ID: &str = "__file_id";
pub const TAG_FILE_PART: &str = "__file_part";
pub const TAG_PART_N: &str = "__part_n";
pub const TAG_SECT_N: &str = "__sect_n";
pub const TAG_FILE_TYPE: &str = "__file_type";
pub const TAG_SYNTHETIC: &str = "__syn";

/// `string -> list<string|null>` multimap with case-insensitive keys.
///
/// Keys are stored lowercased; a `None` value means a presence-only tag (the
/// key is set but carries no value).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagSet(BTreeMap<String, Vec<Option<String>>>);

impl TagSet {
  pub fn new() -> Self {
    Self::default()
  }

  fn normalize_key(key: &str) -> String {
    key.to_lowercase()
  }

  /// Insert a tag after validating the key is not reserved and, if present,
  /// the value contains neither filter separator.
  pub fn insert_user(&mut self, key: &str, value: Option<String>) -> ValidationResult<()> {
    validate_tag_key(key, false)?;
    if let Some(v) = &value {
      validate_tag_value(v)?;
    }
    self.insert_raw(key, value);
    Ok(())
  }

  /// Insert a tag without the reserved-prefix check. Used by step handlers to
  /// write `__document_id` and friends.
  pub fn insert_raw(&mut self, key: &str, value: Option<String>) {
    self.0.entry(Self::normalize_key(key)).or_default().push(value);
  }

  pub fn set_reserved(&mut self, key: &str, value: impl Into<String>) {
    debug_assert!(key.starts_with(RESERVED_PREFIX));
    self.0.insert(Self::normalize_key(key), vec![Some(value.into())]);
  }

  /// Merge `other`'s entries into self, appending rather than overwriting.
  pub fn merge(&mut self, other: &TagSet) {
    for (k, values) in &other.0 {
      self.0.entry(k.clone()).or_default().extend(values.iter().cloned());
    }
  }

  pub fn get(&self, key: &str) -> Option<&[Option<String>]> {
    self.0.get(&Self::normalize_key(key)).map(Vec::as_slice)
  }

  /// True if `key` is present with a value equal to `value` (a multi-valued
  /// match: any of the stored values may satisfy it).
  pub fn contains(&self, key: &str, value: &str) -> bool {
    self
      .get(key)
      .map(|values| values.iter().any(|v| v.as_deref() == Some(value)))
      .unwrap_or(false)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &[Option<String>])> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn keys_are_case_insensitive() {
    let mut tags = TagSet::new();
    tags.insert_user("User", Some("alice".into())).unwrap();
    assert!(tags.contains("user", "alice"));
    assert!(tags.contains("USER", "alice"));
  }

  #[test]
  fn rejects_reserved_prefix_from_user_input() {
    let mut tags = TagSet::new();
    assert!(tags.insert_user("__document_id", Some("x".into())).is_err());
  }

  #[test]
  fn reserved_tags_bypass_the_check() {
    let mut tags = TagSet::new();
    tags.set_reserved(TAG_DOCUMENT_ID, "doc1");
    assert!(tags.contains(TAG_DOCUMENT_ID, "doc1"));
  }

  #[test]
  fn merge_appends_values() {
    let mut a = TagSet::new();
    a.insert_user("type", Some("news".into())).unwrap();
    let mut b = TagSet::new();
    b.insert_user("type", Some("fact".into())).unwrap();
    a.merge(&b);
    assert!(a.contains("type", "news"));
    assert!(a.contains("type", "fact"));
  }

  #[test]
  fn rejects_value_containing_separator() {
    let mut tags = TagSet::new();
    assert!(tags.insert_user("user", Some("a=b".into())).is_err());
    assert!(tags.insert_user("user", Some("a:b".into())).is_err());
  }

  #[test]
  fn presence_only_tag_has_no_value() {
    let mut tags = TagSet::new();
    tags.insert_user("flagged", None).unwrap();
    assert_eq!(tags.get("flagged"), Some(&[None][..]));
  }
}
