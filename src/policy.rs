//! Per-intent instructions handed to a backend.
//!
//! Pure: the same `(intent, source)` always yields the same policy.

use crate::transform::Intent;

/// Exact token a backend returns to decline a change. Case-sensitive.
pub const NO_CHANGES_SENTINEL: &str = "NO_CHANGES_NEEDED";

pub const REFACTOR_SYSTEM: &str = r#"You are a conservative code refactoring assistant. Only suggest changes when there are clear and specific issues to fix.

If the code is already well-written for the given goal, return exactly NO_CHANGES_NEEDED and nothing else.
Never add documentation, comments or JSDoc. Never change what the code does.
Return only code: no prose, no markdown fences, no explanations."#;

pub const COMPLETE_SYSTEM: &str = r#"You complete partially written code. Implement exactly what the signature and comments describe.
Return only the completed code: no prose, no markdown fences."#;

pub const ANNOTATE_SYSTEM: &str = r#"You explain code with short line comments. Return only comment lines."#;

pub const TONE_SYSTEM: &str = r#"You judge whether code comments are professional and constructive."#;

const OUTPUT_CONTRACT: &str = r#"OUTPUT CONTRACT:
- Return ONLY the transformed code, ready to paste over the original selection
- No markdown fences, no "here is" preamble, no explanation section
- If nothing needs to change, return exactly NO_CHANGES_NEEDED"#;

/// Issues an intent is licensed to fix, plus when it must decline.
struct IntentRules {
    focus: &'static str,
    checklist: &'static [&'static str],
    decline_when: &'static str,
}

fn rules_for(intent: Intent) -> IntentRules {
    match intent {
        Intent::Readability => IntentRules {
            focus: "readability",
            checklist: &[
                "Names that hide what a value or function is for",
                "Deeply nested conditionals that can be flattened",
                "Long functions doing several unrelated things",
            ],
            decline_when: "the code is already clear. Do not change clear, working code",
        },
        Intent::Performance => IntentRules {
            focus: "performance",
            checklist: &[
                "Work repeated inside loops that can be hoisted",
                "Algorithms with clearly worse complexity than an obvious alternative",
            ],
            decline_when: "there is no clear bottleneck. Do not optimize prematurely",
        },
        Intent::Security => IntentRules {
            focus: "security",
            checklist: &[
                "Hardcoded secrets: API keys, passwords, tokens or private keys in source",
                "Injection: SQL, shell or template strings built from unvalidated input",
                "Unsafe DOM operations: innerHTML, outerHTML, document.write or insertAdjacentHTML with untrusted data",
                "Unsafe string evaluation: eval, new Function, setTimeout/setInterval with string arguments",
                "Input validation gaps that let malformed input crash the program",
                "Type coercion vulnerabilities from loose equality on untrusted values",
                "Prototype pollution through unchecked object key assignment",
                "Buffer handling that can read or write past its bounds",
            ],
            decline_when: "no concrete vulnerability is present. Do not modify for hypothetical edge cases and do not add type checks without a clear security benefit",
        },
        Intent::Modernization => IntentRules {
            focus: "modernization",
            checklist: &[
                "Deprecated APIs with a direct modern replacement",
                "Callback pyramids that map cleanly onto async/await",
                "var declarations, string concatenation chains and manual loops with idiomatic modern forms",
            ],
            decline_when: "the code already uses current idioms",
        },
        Intent::Testability => IntentRules {
            focus: "testability",
            checklist: &[
                "Hidden dependencies (globals, clocks, network) that can be passed in",
                "Functions mixing side effects with pure computation",
            ],
            decline_when: "dependencies are already explicit",
        },
        Intent::ErrorHandling => IntentRules {
            focus: "error handling",
            checklist: &[
                "Errors that are swallowed or logged and ignored",
                "Missing handling on operations that can fail (I/O, parsing, network)",
                "Promises without rejection handling",
            ],
            decline_when: "every failure path is already handled",
        },
        Intent::Complete | Intent::Annotate | Intent::ToneCheck => IntentRules {
            focus: intent.as_str(),
            checklist: &[],
            decline_when: "there is nothing to do",
        },
    }
}

/// Task specification for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    intent: Intent,
    source: String,
    system: String,
    task: String,
    prompt: String,
}

impl Policy {
    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// The selected text the policy was built for.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// System instructions for chat-style backends.
    pub fn system(&self) -> &str {
        &self.system
    }

    /// User message for chat-style backends.
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Single completion prompt for text-generation backends.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// Build the policy for `intent` over `source`.
pub fn build(intent: Intent, source: &str) -> Policy {
    let (system, task, prompt) = match intent {
        Intent::Complete => (
            COMPLETE_SYSTEM.to_string(),
            format!("Complete this code:\n\n{}", source),
            format!(
                "/* JavaScript implementation needed.\nInput: Function signature and comments\n{}\n\nOutput: Complete implementation */\n\n",
                source
            ),
        ),
        Intent::Annotate => (
            ANNOTATE_SYSTEM.to_string(),
            format!("Add comments to explain this code:\n\n{}", source),
            format!("Add comments to explain this JavaScript code:\n{}\n\nComments:", source),
        ),
        Intent::ToneCheck => (
            TONE_SYSTEM.to_string(),
            format!("Assess the tone of the comments in this code:\n\n{}", source),
            source.to_string(),
        ),
        refactor => (
            REFACTOR_SYSTEM.to_string(),
            refactor_task(refactor, source),
            refactor_prompt(refactor, source),
        ),
    };

    Policy {
        intent,
        source: source.to_string(),
        system,
        task,
        prompt,
    }
}

fn refactor_task(intent: Intent, source: &str) -> String {
    let rules = rules_for(intent);
    let mut task = format!(
        "Analyze this code for {focus} improvements.\n\n\
         Only propose changes if there are SPECIFIC {focus} issues to fix.\n\
         Every change must directly improve {focus}.\n\n\
         {FOCUS} CHECKLIST (fix only these):\n",
        focus = rules.focus,
        FOCUS = rules.focus.to_uppercase(),
    );
    for item in rules.checklist {
        task.push_str("- ");
        task.push_str(item);
        task.push('\n');
    }
    task.push_str(&format!(
        "\nCONSERVATISM: If no concrete instance of a checklist issue is present, decline: {}.\n\n",
        rules.decline_when
    ));
    task.push_str(OUTPUT_CONTRACT);
    task.push_str("\n\nOriginal code:\n");
    task.push_str(source);
    task
}

fn refactor_prompt(intent: Intent, source: &str) -> String {
    let rules = rules_for(intent);
    format!(
        "// Original code:\n{source}\n\n\
         // Task: Refactor the above code to improve {focus}.\n\
         // Return {sentinel} if no improvements are needed.\n\
         // Only output the refactored code, no explanations.\n\n\
         // Refactored code:",
        source = source,
        focus = rules.focus,
        sentinel = NO_CHANGES_SENTINEL,
    )
}
