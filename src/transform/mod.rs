//! Transform requests, results and the backend capability interface.

pub mod claude;
mod http;
pub mod huggingface;

use crate::error::{RefactorError, Result};
use crate::policy::Policy;
use crate::sanitize;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Intent {
    Readability,
    Performance,
    Security,
    Modernization,
    Testability,
    ErrorHandling,
    Complete,
    Annotate,
    #[serde(rename = "tonecheck")]
    ToneCheck,
}

impl Intent {
    pub const ALL: [Intent; 9] = [
        Intent::Readability,
        Intent::Performance,
        Intent::Security,
        Intent::Modernization,
        Intent::Testability,
        Intent::ErrorHandling,
        Intent::Complete,
        Intent::Annotate,
        Intent::ToneCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Readability => "readability",
            Intent::Performance => "performance",
            Intent::Security => "security",
            Intent::Modernization => "modernization",
            Intent::Testability => "testability",
            Intent::ErrorHandling => "error-handling",
            Intent::Complete => "complete",
            Intent::Annotate => "annotate",
            Intent::ToneCheck => "tonecheck",
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Intent::Complete => Operation::Complete,
            Intent::Annotate => Operation::Annotate,
            Intent::ToneCheck => Operation::ToneCheck,
            _ => Operation::Refactor,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        let intent = match normalized.as_str() {
            "readability" => Intent::Readability,
            "performance" => Intent::Performance,
            "security" => Intent::Security,
            "modernization" | "modernize" => Intent::Modernization,
            "testability" => Intent::Testability,
            "error-handling" | "errorhandling" => Intent::ErrorHandling,
            "complete" | "completion" => Intent::Complete,
            "annotate" | "comments" => Intent::Annotate,
            "tonecheck" | "tone-check" | "tone" => Intent::ToneCheck,
            _ => return Err(format!("Unknown intent '{}'", s.trim())),
        };
        Ok(intent)
    }
}

/// The kind of work a backend is asked to do. Derived from the intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Refactor,
    Complete,
    Annotate,
    ToneCheck,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Refactor => "refactoring",
            Operation::Complete => "code completion",
            Operation::Annotate => "comment generation",
            Operation::ToneCheck => "tone analysis",
        }
    }

    /// Operations that always go to one backend, whatever the user selected.
    pub fn is_pinned(&self) -> bool {
        !matches!(self, Operation::Refactor)
    }
}

/// Backends available for transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Anthropic Messages API
    Claude,
    /// Hugging Face Inference API (text generation + sentiment classifier)
    HuggingFace,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Claude => "claude",
            BackendKind::HuggingFace => "huggingface",
        }
    }

    /// Human name used in messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            BackendKind::Claude => "Anthropic",
            BackendKind::HuggingFace => "HuggingFace",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claude" | "anthropic" => Ok(BackendKind::Claude),
            "huggingface" | "hugging-face" | "hf" => Ok(BackendKind::HuggingFace),
            other => Err(format!("Unknown backend '{}'", other)),
        }
    }
}

/// One user-initiated transform. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    source_text: String,
    intent: Intent,
    backend: BackendKind,
}

impl TransformRequest {
    pub fn new(source_text: impl Into<String>, intent: Intent, backend: BackendKind) -> Self {
        Self {
            source_text: source_text.into(),
            intent,
            backend,
        }
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// Backend the user selected. Pinned operations may still run elsewhere.
    pub fn backend(&self) -> BackendKind {
        self.backend
    }
}

/// Why a transform produced no replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnchangedReason {
    /// The backend returned the decline sentinel.
    Declined,
    /// The candidate is the original text.
    Identical,
    /// Nothing usable was left after cleaning the response.
    NoPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformResult {
    Unchanged {
        original: String,
        reason: UnchangedReason,
    },
    Replacement(String),
    /// Free-text analysis; never applied to the document.
    Analysis(String),
}

/// Capability set every backend implements.
///
/// Methods return the backend's raw text; `run` turns it into a
/// `TransformResult`. Operations a backend does not offer keep the default
/// body and report `CapabilityUnsupported`.
#[async_trait]
pub trait Transformer: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn transform(&self, policy: &Policy) -> Result<String>;

    async fn complete(&self, _policy: &Policy) -> Result<String> {
        Err(unsupported(self.kind(), Operation::Complete))
    }

    async fn annotate(&self, _policy: &Policy) -> Result<String> {
        Err(unsupported(self.kind(), Operation::Annotate))
    }

    async fn analyze_tone(&self, _policy: &Policy) -> Result<String> {
        Err(unsupported(self.kind(), Operation::ToneCheck))
    }
}

pub(crate) fn unsupported(backend: BackendKind, operation: Operation) -> RefactorError {
    RefactorError::CapabilityUnsupported {
        backend,
        operation: operation.name(),
    }
}

/// Run the operation the policy describes and classify the response.
pub async fn run(transformer: &dyn Transformer, policy: &Policy) -> Result<TransformResult> {
    let source = policy.source();
    let result = match policy.intent().operation() {
        Operation::Refactor => sanitize::sanitize(&transformer.transform(policy).await?, source),
        Operation::Complete => sanitize::sanitize(&transformer.complete(policy).await?, source),
        Operation::Annotate => sanitize::sanitize(&transformer.annotate(policy).await?, source),
        Operation::ToneCheck => TransformResult::Analysis(transformer.analyze_tone(policy).await?),
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy;

    struct EchoBackend(&'static str);

    #[async_trait]
    impl Transformer for EchoBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Claude
        }

        async fn transform(&self, _policy: &Policy) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_intent_round_trips_through_str() {
        for intent in Intent::ALL {
            assert_eq!(intent.as_str().parse::<Intent>(), Ok(intent));
        }
        assert_eq!("Error_Handling".parse::<Intent>(), Ok(Intent::ErrorHandling));
        assert!("speed".parse::<Intent>().is_err());
    }

    #[test]
    fn test_intent_operations() {
        assert_eq!(Intent::Security.operation(), Operation::Refactor);
        assert_eq!(Intent::Complete.operation(), Operation::Complete);
        assert_eq!(Intent::ToneCheck.operation(), Operation::ToneCheck);
        assert!(!Operation::Refactor.is_pinned());
        assert!(Operation::ToneCheck.is_pinned());
    }

    #[test]
    fn test_backend_aliases() {
        assert_eq!("anthropic".parse::<BackendKind>(), Ok(BackendKind::Claude));
        assert_eq!("HF".parse::<BackendKind>(), Ok(BackendKind::HuggingFace));
    }

    #[tokio::test]
    async fn test_run_sanitizes_refactor_output() {
        let backend = EchoBackend("```js\nbar();\n```");
        let policy = policy::build(Intent::Readability, "foo();");
        let result = run(&backend, &policy).await.unwrap();
        assert_eq!(result, TransformResult::Replacement("bar();".to_string()));
    }

    #[tokio::test]
    async fn test_default_capabilities_are_unsupported() {
        let backend = EchoBackend("ignored");
        let policy = policy::build(Intent::Complete, "function add(a, b) {");
        let err = run(&backend, &policy).await.unwrap_err();
        assert!(matches!(
            err,
            RefactorError::CapabilityUnsupported {
                backend: BackendKind::Claude,
                ..
            }
        ));
    }
}
