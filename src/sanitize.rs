//! Response cleanup
//!
//! Models wrap code in fences, open with "Here's the refactored code:" and
//! tack an explanation on the end. This module strips all of that and decides
//! whether what is left is a real replacement.

use crate::policy::NO_CHANGES_SENTINEL;
use crate::transform::{TransformResult, UnchangedReason};
use regex::Regex;
use std::sync::OnceLock;

/// Phrase models use instead of the sentinel. Matched case-insensitively.
const DECLINE_PHRASE: &str = "recommend returning the original code unchanged";

const EXPLANATION_HEADINGS: &[&str] = &[
    "explanation of changes",
    "explanation",
    "changes made",
    "key changes",
    "summary of changes",
    "what changed",
];

fn preamble_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:(?:sure|okay|ok|certainly|of course)[!,.]?\s*)?(?:here(?:'s|’s|\s+is|\s+are)\b|(?:the\s+)?(?:refactored|improved|updated|completed|optimized|modernized)\s+(?:code|version)\b)",
        )
        .expect("preamble pattern is valid")
    })
}

/// Classify a raw backend response against the text it was asked to change.
pub fn sanitize(raw: &str, original: &str) -> TransformResult {
    let cleaned = clean(raw);

    let reason = if cleaned.is_empty() {
        Some(UnchangedReason::NoPayload)
    } else if is_decline(&cleaned) {
        Some(UnchangedReason::Declined)
    } else if cleaned == original || cleaned == original.trim() {
        Some(UnchangedReason::Identical)
    } else {
        None
    };

    match reason {
        Some(reason) => TransformResult::Unchanged {
            original: original.to_string(),
            reason,
        },
        None => TransformResult::Replacement(cleaned),
    }
}

/// Strip fences, preambles and explanations until nothing else changes.
///
/// Each pass only removes text, so the loop terminates, and the result is a
/// fixed point: `clean(clean(x)) == clean(x)`.
pub fn clean(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = clean_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn clean_once(text: &str) -> String {
    let text = strip_fences(text);
    let text = strip_preamble(&text);
    let text = strip_explanation(&text);
    text.trim().to_string()
}

fn is_decline(text: &str) -> bool {
    if text.contains(NO_CHANGES_SENTINEL) {
        return true;
    }
    text.to_lowercase().contains(DECLINE_PHRASE)
}

/// Drop fence delimiter lines, keeping what is between them.
fn strip_fences(text: &str) -> String {
    if !text.contains("```") {
        return text.to_string();
    }
    let mut kept = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with("```") {
            kept.push(line);
            continue;
        }
        // One-line fence: ```NO_CHANGES_NEEDED```
        if trimmed.len() > 6 && trimmed.ends_with("```") {
            kept.push(trimmed[3..trimmed.len() - 3].trim());
        }
    }
    kept.join("\n")
}

fn strip_preamble(text: &str) -> String {
    let body = text.trim_start();
    let (first, rest) = match body.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (body, ""),
    };
    let first_trimmed = first.trim();
    if !preamble_re().is_match(first_trimmed) {
        return text.to_string();
    }

    // "Here's the fix: foo();" keeps what follows the colon
    let inline = first_trimmed
        .split_once(':')
        .map(|(_, after)| after.trim())
        .unwrap_or("");
    if inline.is_empty() {
        rest.to_string()
    } else if rest.is_empty() {
        inline.to_string()
    } else {
        format!("{}\n{}", inline, rest)
    }
}

/// Cut at the first explanation heading.
///
/// A heading starts at column 0 and is either markdown (`#`, `**`) or follows
/// a blank line, so indented code such as an `explanation:` object key stays.
fn strip_explanation(text: &str) -> String {
    let mut offset = 0;
    let mut after_blank = false;
    for line in text.split_inclusive('\n') {
        if is_explanation_heading(line, after_blank) {
            return text[..offset].to_string();
        }
        after_blank = line.trim().is_empty();
        offset += line.len();
    }
    text.to_string()
}

fn is_explanation_heading(line: &str, after_blank: bool) -> bool {
    if line.starts_with(char::is_whitespace) {
        return false;
    }
    let markdown = line.starts_with('#') || line.starts_with("**");
    if !markdown && !after_blank {
        return false;
    }
    let stripped = line
        .trim()
        .trim_start_matches(|c: char| c == '#' || c == '*' || c.is_whitespace())
        .to_lowercase();
    EXPLANATION_HEADINGS.iter().any(|heading| {
        stripped.strip_prefix(heading).is_some_and(|after| {
            let after = after.trim_start_matches(|c: char| c == '*' || c.is_whitespace());
            after.is_empty() || after.starts_with(':')
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replacement(text: &str) -> TransformResult {
        TransformResult::Replacement(text.to_string())
    }

    fn reason_of(result: &TransformResult) -> Option<UnchangedReason> {
        match result {
            TransformResult::Unchanged { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    #[test]
    fn test_fenced_payload() {
        assert_eq!(sanitize("```js\nfoo();\n```", "x"), replacement("foo();"));
    }

    #[test]
    fn test_preamble_is_stripped() {
        assert_eq!(
            sanitize("Here's the refactored code:\nfoo();", "x"),
            replacement("foo();")
        );
        assert_eq!(
            sanitize("HERE IS THE REFACTORED CODE\n\nfoo();", "x"),
            replacement("foo();")
        );
        assert_eq!(
            sanitize("Sure! Here’s an improved version:\n```ts\nfoo();\n```", "x"),
            replacement("foo();")
        );
    }

    #[test]
    fn test_preamble_with_inline_code() {
        assert_eq!(sanitize("Refactored code: foo();", "x"), replacement("foo();"));
    }

    #[test]
    fn test_trailing_explanation_is_stripped() {
        let raw = "```js\nconst total = sum(items);\n```\n\nExplanation:\n- renamed variables";
        assert_eq!(sanitize(raw, "x"), replacement("const total = sum(items);"));

        let raw = "foo();\n\n**Changes made:** extracted helper";
        assert_eq!(sanitize(raw, "x"), replacement("foo();"));

        let raw = "foo();\n### Explanation\nshorter";
        assert_eq!(sanitize(raw, "x"), replacement("foo();"));
    }

    #[test]
    fn test_code_comments_are_not_explanations() {
        let raw = "// Explanation: cache the length\nfor (let i = 0, n = a.length; i < n; i++) {}";
        assert_eq!(sanitize(raw, "x"), replacement(raw));
    }

    #[test]
    fn test_object_key_named_explanation_is_kept() {
        let raw = "const result = {\n  score: 1,\n  explanation: text,\n};";
        assert_eq!(sanitize(raw, "const result = {};"), replacement(raw));

        let raw = "const result = {\n  score: 1,\n\n  explanation: text,\n};";
        assert_eq!(sanitize(raw, "const result = {};"), replacement(raw));
    }

    #[test]
    fn test_unindented_heading_needs_blank_line_or_markdown() {
        let raw = "foo();\nExplanation: none";
        assert_eq!(sanitize(raw, "x"), replacement(raw));
        assert_eq!(sanitize("foo();\n\nExplanation: none", "x"), replacement("foo();"));
    }

    #[test]
    fn test_decline_wording_inside_code_is_a_replacement() {
        let raw = "if (!diff) {\n  console.log(\"No changes needed\");\n  return;\n}";
        assert_eq!(sanitize(raw, "if (!diff) return;"), replacement(raw));

        let raw = "I recommend returning the original code unchanged.";
        assert_eq!(reason_of(&sanitize(raw, "foo();")), Some(UnchangedReason::Declined));
    }

    #[test]
    fn test_sentinel_variants_are_unchanged() {
        for raw in [
            "NO_CHANGES_NEEDED",
            "  NO_CHANGES_NEEDED \n",
            "```\nNO_CHANGES_NEEDED\n```",
            "```NO_CHANGES_NEEDED```",
            "The code is fine. NO_CHANGES_NEEDED",
        ] {
            let result = sanitize(raw, "foo();");
            assert_eq!(reason_of(&result), Some(UnchangedReason::Declined), "{raw:?}");
        }
    }

    #[test]
    fn test_sentinel_is_case_sensitive() {
        let result = sanitize("no_changes_needed", "foo();");
        assert_eq!(result, replacement("no_changes_needed"));
    }

    #[test]
    fn test_identical_to_original_is_unchanged() {
        let original = "function add(a, b) {\n  return a + b;\n}\n";
        let result = sanitize(original, original);
        assert_eq!(reason_of(&result), Some(UnchangedReason::Identical));

        let fenced = format!("```js\n{}```", original);
        assert_eq!(reason_of(&sanitize(&fenced, original)), Some(UnchangedReason::Identical));
    }

    #[test]
    fn test_empty_payload_is_unchanged_not_error() {
        for raw in ["", "   \n\t", "```\n```", "Here's the refactored code:"] {
            let result = sanitize(raw, "foo();");
            assert_eq!(reason_of(&result), Some(UnchangedReason::NoPayload), "{raw:?}");
        }
    }

    #[test]
    fn test_unchanged_carries_original_text() {
        match sanitize("NO_CHANGES_NEEDED", "foo();") {
            TransformResult::Unchanged { original, .. } => assert_eq!(original, "foo();"),
            other => panic!("expected Unchanged, got {other:?}"),
        }
    }

    #[test]
    fn test_clean_is_idempotent() {
        let inputs = [
            "```js\nfoo();\n```",
            "Here's the refactored code:\n```\nHere is the code:\nfoo();\n```",
            "foo();\nExplanation: none",
            "```python\ndef f():\n    return 1\n```\n\nChanges made:\n- none",
            "   plain text   ",
            "``````",
            "Sure, here is the updated code:\nHere's the code:\nbar();",
        ];
        for input in inputs {
            let once = clean(input);
            assert_eq!(clean(&once), once, "{input:?}");
        }
    }

    #[test]
    fn test_sanitize_is_idempotent_on_payloads() {
        let original = "var x = 1;";
        for raw in ["```js\nlet x = 1;\n```", "Here's the refactored code:\nconst x = 1;"] {
            let first = sanitize(raw, original);
            let TransformResult::Replacement(payload) = &first else {
                panic!("expected replacement for {raw:?}");
            };
            assert_eq!(sanitize(payload, original), first);
        }
    }

    #[test]
    fn test_indentation_inside_fence_is_preserved() {
        let raw = "```rust\nfn main() {\n    run();\n}\n```";
        assert_eq!(sanitize(raw, "x"), replacement("fn main() {\n    run();\n}"));
    }
}
