//! Query-side types: filters, citations, search results and grounded answers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default answer text returned when `Ask` finds no matching partitions.
pub const DEFAULT_EMPTY_ANSWER: &str = "INFO NOT FOUND";

/// One `(tagKey, tagValue)` equality predicate within a [`MemoryFilter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagPredicate {
  pub key: String,
  pub value: String,
}

/// A set of tag predicates ANDed together, plus a parallel set of negated
/// ("not-equal") predicates also ANDed. Different `MemoryFilter`s passed to a
/// query are ORed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryFilter {
  pub equals: Vec<TagPredicate>,
  pub not_equals: Vec<TagPredicate>,
}

impl MemoryFilter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn by_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.equals.push(TagPredicate { key: key.into(), value: value.into() });
    self
  }

  pub fn by_tag_not(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.not_equals.push(TagPredicate { key: key.into(), value: value.into() });
    self
  }

  pub fn is_empty(&self) -> bool {
    self.equals.is_empty() && self.not_equals.is_empty()
  }
}

/// One partition returned as part of a [`Citation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationPartition {
  pub text: String,
  pub relevance: f32,
  pub partition_number: Option<u32>,
  pub section_number: Option<u32>,
  pub last_update: DateTime<Utc>,
}

/// Matched records for a single source document, grouped by `(documentId, fileId)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
  pub document_id: String,
  pub file_id: String,
  pub source_name: String,
  pub partitions: Vec<CitationPartition>,
}

/// Result of [`crate::retrieval::MemoryFilter`]-scoped similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
  pub query: String,
  pub results: Vec<Citation>,
  pub no_result: bool,
}

impl SearchResult {
  pub fn empty(query: impl Into<String>) -> Self {
    Self { query: query.into(), results: Vec::new(), no_result: true }
  }
}

/// Grounded-generation answer, with the citations it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryAnswer {
  pub question: String,
  pub text: String,
  pub relevant_sources: Vec<Citation>,
  pub no_result: bool,
}

impl MemoryAnswer {
  pub fn empty(question: impl Into<String>) -> Self {
    Self {
      question: question.into(),
      text: DEFAULT_EMPTY_ANSWER.to_string(),
      relevant_sources: Vec::new(),
      no_result: true,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn filter_builder_accumulates_predicates() {
    let filter = MemoryFilter::new().by_tag("user", "alice").by_tag("type", "news").by_tag_not("archived", "true");
    assert_eq!(filter.equals.len(), 2);
    assert_eq!(filter.not_equals.len(), 1);
    assert!(!filter.is_empty());
  }

  #[test]
  fn empty_search_result_carries_no_result_flag() {
    let result = SearchResult::empty("what is it?");
    assert!(result.no_result);
    assert!(result.results.is_empty());
  }

  #[test]
  fn empty_answer_uses_default_text() {
    let answer = MemoryAnswer::empty("q");
    assert_eq!(answer.text, DEFAULT_EMPTY_ANSWER);
    assert!(answer.no_result);
  }
}
