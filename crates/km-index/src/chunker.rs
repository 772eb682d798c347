//! Deterministic, token-budget-bounded text partitioner used by the
//! `partition` step handler.
//!
//! Splits extracted text on page/slide/scene boundaries (form feeds) into
//! sections, then greedily groups paragraphs within each section under
//! `MaxTokensPerParagraph`, carrying the tail of the previous partition
//! forward as `OverlappingTokens` of context. Any single line or paragraph
//! that alone exceeds its budget is split further on word boundaries, so the
//! chunker never produces a partition larger than the configured limits
//! regardless of input shape.

use km_core::ChunkingConfig;

/// Rough token estimate used for budget accounting. Good enough to bound
/// partition size deterministically without pulling in a real tokenizer.
const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(text: &str) -> usize {
  (text.len() / CHARS_PER_TOKEN).max(if text.is_empty() { 0 } else { 1 })
}

/// One partition produced from an `ExtractedContent` artifact. Carries
/// enough to build the `TextPartition` artifact and its reserved tags
///.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPartition {
  pub content: String,
  pub partition_number: u32,
  pub section_number: Option<u32>,
  pub token_count: usize,
}

pub struct Chunker {
  config: ChunkingConfig,
}

impl Chunker {
  pub fn new(config: ChunkingConfig) -> Self {
    Self { config }
  }

  /// Partition `text` deterministically under the configured token budgets.
  pub fn partition(&self, text: &str) -> Vec<TextPartition> {
    let sections: Vec<&str> = text.split('\x0c').collect();
    let multi_section = sections.len() > 1;

    let mut partitions = Vec::new();
    let mut partition_number = 0u32;

    for (section_idx, section_text) in sections.into_iter().enumerate() {
      let section_number = if multi_section { Some(section_idx as u32) } else { None };

      let mut pieces: Vec<String> = Vec::new();
      for raw_paragraph in split_paragraphs(section_text) {
        let wrapped = wrap_long_lines(&raw_paragraph, self.config.max_tokens_per_line);
        if estimate_tokens(&wrapped) > self.config.max_tokens_per_paragraph {
          pieces.extend(split_words_by_budget(&wrapped, self.config.max_tokens_per_paragraph));
        } else {
          pieces.push(wrapped);
        }
      }

      let mut current = String::new();

      for piece in pieces {
        let candidate = join_nonempty(&current, &piece);

        if !current.is_empty() && estimate_tokens(&candidate) > self.config.max_tokens_per_paragraph {
          partitions.push(TextPartition { content: current.clone(), partition_number, section_number, token_count: estimate_tokens(&current) });
          partition_number += 1;

          let overlap = tail_tokens(&current, self.config.overlapping_tokens);
          current = join_nonempty(&overlap, &piece);
        } else {
          current = candidate;
        }
      }

      if !current.trim().is_empty() {
        partitions.push(TextPartition { content: current.clone(), partition_number, section_number, token_count: estimate_tokens(&current) });
        partition_number += 1;
      }
    }

    partitions
  }
}

fn join_nonempty(a: &str, b: &str) -> String {
  if a.is_empty() {
    b.to_string()
  } else if b.is_empty() {
    a.to_string()
  } else {
    format!("{a}\n\n{b}")
  }
}

fn split_paragraphs(text: &str) -> Vec<String> {
  text.split("\n\n").map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn wrap_long_lines(paragraph: &str, max_tokens_per_line: usize) -> String {
  paragraph
    .lines()
    .map(|line| {
      if estimate_tokens(line) > max_tokens_per_line {
        split_words_by_budget(line, max_tokens_per_line).join("\n")
      } else {
        line.to_string()
      }
    })
    .collect::<Vec<_>>()
    .join("\n")
}

fn split_words_by_budget(text: &str, max_tokens: usize) -> Vec<String> {
  let mut out = Vec::new();
  let mut current = String::new();

  for word in text.split_whitespace() {
    let candidate = if current.is_empty() { word.to_string() } else { format!("{current} {word}") };
    if estimate_tokens(&candidate) > max_tokens && !current.is_empty() {
      out.push(current.clone());
      current = word.to_string();
    } else {
      current = candidate;
    }
  }

  if !current.is_empty() {
    out.push(current);
  }

  out
}

/// The tail of `text` worth approximately `tokens` tokens, used to carry
/// overlap context into the next partition.
fn tail_tokens(text: &str, tokens: usize) -> String {
  if tokens == 0 {
    return String::new();
  }
  let words: Vec<&str> = text.split_whitespace().collect();
  let start = words.len().saturating_sub(tokens);
  words[start..].join(" ")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config(max_paragraph: usize, overlap: usize, max_line: usize) -> ChunkingConfig {
    ChunkingConfig { max_tokens_per_paragraph: max_paragraph, overlapping_tokens: overlap, max_tokens_per_line: max_line }
  }

  #[test]
  fn short_text_is_a_single_partition() {
    let chunker = Chunker::new(ChunkingConfig::default());
    let partitions = chunker.partition("The product name is Orion.");
    assert_eq!(partitions.len(), 1);
    assert_eq!(partitions[0].partition_number, 0);
    assert_eq!(partitions[0].section_number, None);
  }

  #[test]
  fn empty_text_produces_no_partitions() {
    let chunker = Chunker::new(ChunkingConfig::default());
    assert!(chunker.partition("").is_empty());
  }

  #[test]
  fn long_text_splits_into_multiple_partitions() {
    let chunker = Chunker::new(config(20, 5, 50));
    let paragraphs: Vec<String> = (0..10).map(|i| format!("Paragraph number {i} has a handful of words in it.")).collect();
    let text = paragraphs.join("\n\n");

    let partitions = chunker.partition(&text);
    assert!(partitions.len() > 1);
    for p in &partitions {
      assert!(p.token_count <= 20 + 5);
    }
  }

  #[test]
  fn partition_numbers_are_sequential() {
    let chunker = Chunker::new(config(10, 2, 50));
    let text = (0..5).map(|i| format!("word{i} word{i} word{i} word{i}")).collect::<Vec<_>>().join("\n\n");
    let partitions = chunker.partition(&text);
    for (i, p) in partitions.iter().enumerate() {
      assert_eq!(p.partition_number, i as u32);
    }
  }

  #[test]
  fn form_feed_splits_into_sections() {
    let chunker = Chunker::new(ChunkingConfig::default());
    let text = "page one content\x0cpage two content";
    let partitions = chunker.partition(text);
    assert_eq!(partitions.len(), 2);
    assert_eq!(partitions[0].section_number, Some(0));
    assert_eq!(partitions[1].section_number, Some(1));
  }

  #[test]
  fn oversized_single_paragraph_is_split_on_words() {
    let chunker = Chunker::new(config(5, 0, 500));
    let text = "one two three four five six seven eight nine ten";
    let partitions = chunker.partition(text);
    assert!(partitions.len() > 1);
  }

  #[test]
  fn chunking_is_deterministic() {
    let chunker = Chunker::new(config(10, 2, 50));
    let text = "alpha beta gamma\n\ndelta epsilon zeta\n\neta theta iota";
    assert_eq!(chunker.partition(text), chunker.partition(text));
  }
}
