//! Deterministic answer scoring used when no model result is available.
//!
//! Scores come from four observable signals: overlap with the question's
//! expected topics, answer length, structure markers and hedging phrases.
//! The same question and answer always produce the same result.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::evaluation::result::{DimensionScores, EvaluationResult, ScoringConfig};
use crate::interview::Question;
use crate::llm::Provider;

/// Prefix on every heuristic feedback string.
pub const HEURISTIC_FEEDBACK_PREFIX: &str = "Automated estimate (model unavailable):";

/// Word count at which the length signal saturates.
const FULL_LENGTH_WORDS: f64 = 80.0;

/// Answers longer than this start losing clarity.
const RAMBLING_WORDS: usize = 300;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9]+(?:['-][a-z0-9]+)*").expect("word regex"));

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+").expect("list item regex"));

const STRUCTURE_MARKERS: &[&str] = &[
    "first",
    "second",
    "third",
    "then",
    "next",
    "finally",
    "for example",
    "for instance",
    "because",
    "therefore",
    "as a result",
    "trade-off",
    "tradeoff",
    "in summary",
    "situation",
    "result",
];

const HEDGES: &[&str] = &[
    "i think",
    "i guess",
    "maybe",
    "not sure",
    "i don't know",
    "probably",
    "kind of",
    "sort of",
    "i suppose",
    "perhaps",
];

/// Signals extracted from one answer.
#[derive(Debug, Clone, PartialEq)]
struct AnswerSignals {
    word_count: usize,
    /// Fraction of expected topics mentioned, 0.5 when none are expected.
    coverage: f64,
    /// 0..1, saturating at `FULL_LENGTH_WORDS`.
    length: f64,
    /// 0..1, distinct markers out of four plus list items.
    structure: f64,
    hedges: usize,
    covered: Vec<String>,
    missed: Vec<String>,
}

fn tokens(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Shared prefix used to match inflections ("invalidate" / "invalidation").
fn stem(word: &str) -> &str {
    match word.char_indices().nth(5) {
        Some((idx, _)) => &word[..idx],
        None => word,
    }
}

/// A topic is mentioned when every word of it appears in the answer.
fn mentions(topic: &str, answer_tokens: &HashSet<String>) -> bool {
    let topic_tokens = tokens(topic);
    !topic_tokens.is_empty()
        && topic_tokens.iter().all(|word| {
            let prefix = stem(word);
            answer_tokens.iter().any(|t| t.starts_with(prefix))
        })
}

fn count_phrases(haystack: &str, phrases: &[&str]) -> usize {
    let padded = format!(" {} ", tokens(haystack).join(" "));
    phrases
        .iter()
        .filter(|p| padded.contains(&format!(" {} ", tokens(p).join(" "))))
        .count()
}

fn analyze(question: &Question, answer: &str) -> AnswerSignals {
    let words = tokens(answer);
    let word_set: HashSet<String> = words.iter().cloned().collect();

    let (covered, missed): (Vec<String>, Vec<String>) = question
        .expected_topics
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .partition(|t| mentions(t, &word_set));

    let expected = covered.len() + missed.len();
    let coverage = if expected == 0 {
        0.5
    } else {
        covered.len() as f64 / expected as f64
    };

    let markers = count_phrases(answer, STRUCTURE_MARKERS) + LIST_ITEM_RE.find_iter(answer).count();

    AnswerSignals {
        word_count: words.len(),
        coverage,
        length: (words.len() as f64 / FULL_LENGTH_WORDS).min(1.0),
        structure: (markers as f64 / 4.0).min(1.0),
        hedges: count_phrases(answer, HEDGES),
        covered,
        missed,
    }
}

/// Round to one decimal so heuristic scores read like hand-assigned ones.
fn tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn scores_for(signals: &AnswerSignals) -> DimensionScores {
    if signals.word_count == 0 {
        return DimensionScores::zero();
    }
    let rambling = if signals.word_count > RAMBLING_WORDS { 0.8 } else { 1.0 };
    let hedge_penalty = (signals.hedges as f64 * 1.5).min(6.0);

    DimensionScores::clamped(
        tenth(10.0 * (0.7 * signals.coverage + 0.3 * signals.length)),
        tenth(10.0 * (0.6 * signals.length + 0.4 * signals.structure) * rambling),
        tenth(10.0 * (0.3 * signals.length + 0.7 * signals.structure)),
        tenth((10.0 - hedge_penalty) * (0.5 + 0.5 * signals.length)),
    )
}

fn feedback_for(signals: &AnswerSignals) -> String {
    let mut notes: Vec<String> = Vec::new();
    if signals.word_count == 0 {
        notes.push("No answer was given.".to_string());
    } else {
        if signals.length < 0.5 {
            notes.push("The answer is short; add detail and a concrete example.".to_string());
        }
        if !signals.missed.is_empty() {
            notes.push(format!(
                "Consider addressing: {}.",
                signals.missed.join(", ")
            ));
        }
        if signals.structure < 0.5 {
            notes.push("Structure the answer into clear steps or points.".to_string());
        }
        if signals.hedges > 0 {
            notes.push("Reduce hedging phrases to sound more confident.".to_string());
        }
        if notes.is_empty() {
            notes.push("Solid, well-structured answer covering the expected topics.".to_string());
        }
    }
    format!("{HEURISTIC_FEEDBACK_PREFIX} {}", notes.join(" "))
}

/// Score `answer` without a model. Tagged `StaticFallback` and degraded.
pub fn score_answer(question: &Question, answer: &str, scoring: &ScoringConfig) -> EvaluationResult {
    let signals = analyze(question, answer);
    let scores = scores_for(&signals);
    let feedback = feedback_for(&signals);
    EvaluationResult::new(
        scores,
        scoring,
        feedback,
        signals.covered,
        signals.missed,
        Provider::StaticFallback,
    )
}

/// Expected topics mentioned in `answer`, lowercased, in question order.
pub fn topics_mentioned(question: &Question, answer: &str) -> (Vec<String>, Vec<String>) {
    let signals = analyze(question, answer);
    (signals.covered, signals.missed)
}
