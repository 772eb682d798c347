//! Prompt assembly for grounded question answering.
//!
//! The retrieval engine accumulates citation text under a token budget, then
//! hands it to [`build_answer_prompt`] along with the user's question. The
//! generator is instructed to answer strictly from the supplied facts and to
//! fall back to a fixed sentinel when nothing relevant was retrieved, so a
//! caller can distinguish "answered" from "grounded refusal" without parsing
//! free text.

/// Builds the prompt sent to the generator for an `Ask` request.
///
/// `facts` is the ordered, deduplicated citation text already trimmed to the
/// configured token budget. `empty_answer` is echoed back verbatim so the
/// generator's refusal matches what `MemoryAnswer::empty` expects.
pub fn build_answer_prompt(facts: &[String], question: &str, empty_answer: &str) -> String {
  let mut prompt = String::new();

  prompt.push_str("You are a question answering assistant. Answer the question using ONLY the facts below.\n");
  prompt.push_str("Do not use any knowledge outside of the facts provided.\n");
  prompt.push_str(&format!("If the facts do not contain the answer, respond with exactly: {empty_answer}\n\n"));

  if facts.is_empty() {
    prompt.push_str("Facts:\n(none provided)\n\n");
  } else {
    prompt.push_str("Facts:\n");
    for (i, fact) in facts.iter().enumerate() {
      prompt.push_str(&format!("[{}] {}\n\n", i + 1, fact));
    }
  }

  prompt.push_str(&format!("Question: {question}\n\n"));
  prompt.push_str("Answer concisely, in plain prose, with no preamble.");

  prompt
}
