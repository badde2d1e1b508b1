//! Few-shot prompt assembly.
//!
//! Renders the evidence set and the user's question into a single prompt
//! for the generation model. The worked examples pin the answer format to
//! one short sentence; the model is told to answer "I don't know." when
//! the context does not support an answer.

use crate::models::EvidenceItem;

/// Separator placed between evidence passages.
pub const EVIDENCE_SEPARATOR: &str = "\n\n---\n\n";

const TEMPLATE: &str = r#"
You are an assistant that answers questions using only the context taken from a set of documents. Follow the format of the examples. If the context does not contain the answer, respond with "I don't know."

### Examples:

Example 1:
Context:
"The inspection log records a hydraulic leak found on 03/02/2024. The seal was replaced and the leak closed on 06/02/2024."
Question: When was the leak found?
Answer: The leak was found on 03/02/2024.

Example 2:
Context:
"Overhaul of Pump 2 was signed off by A. Mehta of Workshop 3 on 12/06/2024."
Question: Who signed off the overhaul?
Answer: The overhaul was signed off by A. Mehta of Workshop 3.

Example 3:
Context:
"A worn bearing was identified as the root cause of the vibration, and a replacement was requested on 21/09/2023."
Question: When was the replacement requested?
Answer: The replacement was requested on 21/09/2023.

Example 4:
Context:
"Analysis traced the outage to a firmware fault in the power controller. An update was installed on 30/11/2023."
Question: What caused the outage?
Answer: The outage was caused by a firmware fault in the power controller.

### Answer the following question using the context provided:

Context: {context}

Question: {question}

Answer:
"#;

/// Join evidence contents with [`EVIDENCE_SEPARATOR`], in evidence order.
pub fn render_context(evidence: &[EvidenceItem]) -> String {
    evidence
        .iter()
        .map(|e| e.content.as_str())
        .collect::<Vec<_>>()
        .join(EVIDENCE_SEPARATOR)
}

/// Build the generation prompt for `question` over `evidence`.
///
/// Empty evidence renders an empty context; the template's instruction then
/// steers the model to "I don't know."
pub fn build_prompt(question: &str, evidence: &[EvidenceItem]) -> String {
    TEMPLATE
        .replacen("{context}", &render_context(evidence), 1)
        .replacen("{question}", question, 1)
}
