//! Retrieval and answer quality metrics.
//!
//! Scores a run against hand-labelled ground truth: which chunk ids should
//! have been retrieved and what the answer should have been.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One labelled question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruthCase {
    pub query: String,
    pub answer: String,
    #[serde(default)]
    pub relevant_doc_ids: Vec<String>,
}

/// Metrics for a single evaluated case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseScore {
    pub query: String,
    pub recall_at_k: f64,
    pub average_precision: f64,
    pub exact_match: bool,
}

/// Averages over every case that evaluated successfully.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub k: usize,
    pub cases: Vec<CaseScore>,
    pub failed: usize,
    pub mean_recall_at_k: f64,
    pub mean_average_precision: f64,
    pub exact_match_rate: f64,
}

impl EvaluationSummary {
    /// Summarise `cases`; `failed` counts cases that errored and are excluded.
    pub fn from_cases(k: usize, cases: Vec<CaseScore>, failed: usize) -> Self {
        let mean = |f: &dyn Fn(&CaseScore) -> f64| {
            if cases.is_empty() {
                0.0
            } else {
                cases.iter().map(f).sum::<f64>() / cases.len() as f64
            }
        };
        let mean_recall_at_k = mean(&|c| c.recall_at_k);
        let mean_average_precision = mean(&|c| c.average_precision);
        let exact_match_rate = mean(&|c| if c.exact_match { 1.0 } else { 0.0 });
        Self {
            k,
            cases,
            failed,
            mean_recall_at_k,
            mean_average_precision,
            exact_match_rate,
        }
    }
}

/// Fraction of `relevant` ids found in the first `k` of `retrieved`.
///
/// Zero when `relevant` is empty.
pub fn recall_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f64 {
    let relevant: HashSet<&str> = relevant.iter().map(String::as_str).collect();
    if relevant.is_empty() {
        return 0.0;
    }
    let top: HashSet<&str> = retrieved.iter().take(k).map(String::as_str).collect();
    relevant.intersection(&top).count() as f64 / relevant.len() as f64
}

/// Average precision of `retrieved` against `relevant`.
///
/// Sums precision at each rank holding a relevant id, divided by the number
/// of relevant ids. Zero when `relevant` is empty.
pub fn average_precision(retrieved: &[String], relevant: &[String]) -> f64 {
    let relevant: HashSet<&str> = relevant.iter().map(String::as_str).collect();
    if relevant.is_empty() {
        return 0.0;
    }
    let mut hits = 0usize;
    let mut total = 0.0;
    for (rank, id) in retrieved.iter().enumerate() {
        if relevant.contains(id.as_str()) {
            hits += 1;
            total += hits as f64 / (rank + 1) as f64;
        }
    }
    total / relevant.len() as f64
}

/// Case-insensitive equality after trimming.
pub fn exact_match(answer: &str, expected: &str) -> bool {
    answer.trim().to_lowercase() == expected.trim().to_lowercase()
}

/// Score one case from the sources and answer a run produced.
pub fn score_case(case: &GroundTruthCase, sources: &[String], answer: &str, k: usize) -> CaseScore {
    CaseScore {
        query: case.query.clone(),
        recall_at_k: recall_at_k(sources, &case.relevant_doc_ids, k),
        average_precision: average_precision(sources, &case.relevant_doc_ids),
        exact_match: exact_match(answer, &case.answer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_recall_at_k() {
        let retrieved = ids(&["a", "b", "c", "d"]);
        assert_eq!(recall_at_k(&retrieved, &ids(&["a", "d"]), 2), 0.5);
        assert_eq!(recall_at_k(&retrieved, &ids(&["a", "d"]), 5), 1.0);
        assert_eq!(recall_at_k(&retrieved, &[], 5), 0.0);
    }

    #[test]
    fn test_average_precision() {
        // hits at ranks 1 and 3: (1/1 + 2/3) / 2
        let ap = average_precision(&ids(&["a", "x", "b"]), &ids(&["a", "b"]));
        assert!((ap - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-9);
        assert_eq!(average_precision(&ids(&["x"]), &ids(&["a"])), 0.0);
        assert_eq!(average_precision(&ids(&["a"]), &[]), 0.0);
    }

    #[test]
    fn test_exact_match() {
        assert!(exact_match("  INS Cheetah\n", "ins cheetah"));
        assert!(!exact_match("INS Cheetah.", "INS Cheetah"));
    }

    #[test]
    fn test_summary_excludes_failures() {
        let case = GroundTruthCase {
            query: "q".into(),
            answer: "yes".into(),
            relevant_doc_ids: ids(&["a"]),
        };
        let good = score_case(&case, &ids(&["a"]), "Yes", 5);
        let bad = score_case(&case, &ids(&["b"]), "no", 5);
        let summary = EvaluationSummary::from_cases(5, vec![good, bad], 3);
        assert_eq!(summary.mean_recall_at_k, 0.5);
        assert_eq!(summary.exact_match_rate, 0.5);
        assert_eq!(summary.failed, 3);
    }

    #[test]
    fn test_empty_summary_is_zero() {
        let summary = EvaluationSummary::from_cases(5, Vec::new(), 1);
        assert_eq!(summary.mean_average_precision, 0.0);
    }

    #[test]
    fn test_ground_truth_parses() {
        let json = r#"[{"query": "q", "answer": "a", "relevant_doc_ids": ["data/r.pdf:0"]}]"#;
        let cases: Vec<GroundTruthCase> = serde_json::from_str(json).unwrap();
        assert_eq!(cases[0].relevant_doc_ids, ids(&["data/r.pdf:0"]));
    }
}
