//! Comment tone analysis helpers
//!
//! Pulls comments out of a selection, turns a sentiment label into the text
//! shown to the user, and picks the notification level for that text.

use crate::surface::NotifyLevel;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

pub const POSITIVE_MARKER: &str = "✅";
pub const WARNING_MARKER: &str = "⚠️";
pub const NEUTRAL_MARKER: &str = "📝";

pub const NO_COMMENTS_MESSAGE: &str = "No comments found to analyze.";

/// Labels below this confidence are reported as neutral.
const CONFIDENCE_THRESHOLD: f64 = 0.8;

const WARNING_KEYWORDS: &[&str] = &["negative", "harsh"];

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/\*[\s\S]*?\*/|//.*").expect("comment pattern is valid"))
}

/// One classifier verdict.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sentiment {
    pub label: String,
    pub score: f64,
}

/// Every `//` and `/* */` comment, delimiters removed.
pub fn extract_comments(code: &str) -> Vec<String> {
    comment_re()
        .find_iter(code)
        .map(|m| {
            let text = m.as_str();
            let text = text.strip_prefix("//").unwrap_or(text);
            let text = text.strip_prefix("/*").unwrap_or(text);
            let text = text.strip_suffix("*/").unwrap_or(text);
            text.trim().to_string()
        })
        .filter(|c| !c.is_empty())
        .collect()
}

/// Comments joined into one classifier input, or `None` when there are none.
pub fn comments_text(code: &str) -> Option<String> {
    let comments = extract_comments(code);
    if comments.is_empty() {
        None
    } else {
        Some(comments.join(" "))
    }
}

/// Render a classifier verdict as the analysis shown to the user.
pub fn describe(sentiment: &Sentiment) -> String {
    let confidence = (sentiment.score * 100.0).round() as i64;
    let mut analysis = String::from("Comment Tone Analysis:\n");
    let label = sentiment.label.to_uppercase();

    if label == "POSITIVE" && sentiment.score > CONFIDENCE_THRESHOLD {
        analysis.push_str(&format!(
            "{} Comments are professional and positive ({}% confidence)",
            POSITIVE_MARKER, confidence
        ));
    } else if label == "NEGATIVE" && sentiment.score > CONFIDENCE_THRESHOLD {
        analysis.push_str(&format!(
            "{} Comments might be too negative or harsh ({}% confidence)\n",
            WARNING_MARKER, confidence
        ));
        analysis.push_str("Consider revising for a more constructive tone.");
    } else {
        analysis.push_str(&format!(
            "{} Comments are neutral in tone ({}% confidence)",
            NEUTRAL_MARKER, confidence
        ));
    }
    analysis
}

/// Pick the notification level for an analysis.
///
/// Positive and neutral analyses are informational; a warning marker or
/// keyword anywhere wins, even next to a positive one.
pub fn route_analysis(text: &str) -> NotifyLevel {
    let lower = text.to_lowercase();
    if text.contains(WARNING_MARKER) || WARNING_KEYWORDS.iter().any(|k| lower.contains(k)) {
        NotifyLevel::Warning
    } else {
        NotifyLevel::Info
    }
}
