//! Hugging Face Inference API backend
//!
//! Text generation for refactor, completion and comments; a sentiment
//! classifier for tone checks.

use super::http::{build_client, send_with_retry, truncate_str};
use super::{BackendKind, Transformer};
use crate::error::{RefactorError, Result};
use crate::policy::Policy;
use crate::tone::{self, Sentiment};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co/";
pub const KEY_PREFIX: &str = "hf_";

const CODE_MODEL: &str = "bigcode/santacoder";
const COMMENT_MODEL: &str = "gpt2";
const SENTIMENT_MODEL: &str = "distilbert-base-uncased-finetuned-sst-2-english";

#[derive(Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Serialize)]
struct GenerationParameters {
    max_new_tokens: u32,
    temperature: f32,
    top_p: f32,
    return_full_text: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    do_sample: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<&'static str>,
}

impl GenerationParameters {
    fn refactor() -> Self {
        Self {
            max_new_tokens: 200,
            temperature: 0.2,
            top_p: 0.95,
            return_full_text: false,
            do_sample: Some(true),
            stop: vec!["// End"],
        }
    }

    fn completion() -> Self {
        Self {
            max_new_tokens: 200,
            temperature: 0.1,
            top_p: 0.95,
            return_full_text: false,
            do_sample: Some(true),
            stop: vec!["/*", "*/", "```"],
        }
    }

    fn comments() -> Self {
        Self {
            max_new_tokens: 100,
            temperature: 0.3,
            top_p: 0.95,
            return_full_text: false,
            do_sample: None,
            stop: Vec::new(),
        }
    }
}

#[derive(Serialize)]
struct ClassificationRequest<'a> {
    inputs: &'a str,
}

#[derive(Deserialize)]
struct Generation {
    generated_text: String,
}

/// The API answers with a list, a single object, or an error object
/// (e.g. `{"error":"Model is loading"}`) even on a 200.
#[derive(Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    Many(Vec<Generation>),
    Error { error: String },
    One(Generation),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClassificationResponse {
    Nested(Vec<Vec<Sentiment>>),
    Flat(Vec<Sentiment>),
    Error { error: String },
}

/// Header of a JS function declaration, up to and including its `{`.
fn function_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"function\s+\w+\s*\([^)]*\)\s*\{").expect("function pattern is valid")
    })
}

pub struct HuggingFaceTransformer {
    client: reqwest::Client,
    api_key: String,
    base_url: Url,
}

impl std::fmt::Debug for HuggingFaceTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceTransformer")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HuggingFaceTransformer {
    /// Build a handle. The key must be present and start with `hf_`.
    pub fn new(api_key: Option<String>, base_url: Option<&str>) -> Result<Self> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                RefactorError::Configuration(
                    "HuggingFace API key not configured. Run 'refract set-credential huggingface' or set HUGGINGFACE_API_KEY."
                        .to_string(),
                )
            })?;

        if !api_key.starts_with(KEY_PREFIX) {
            return Err(RefactorError::Configuration(format!(
                "Invalid HuggingFace API key format. Key should start with \"{}\"",
                KEY_PREFIX
            )));
        }

        let mut base_url = Url::parse(base_url.unwrap_or(DEFAULT_BASE_URL)).map_err(|e| {
            RefactorError::Configuration(format!("Invalid HuggingFace endpoint: {}", e))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client: build_client(BackendKind::HuggingFace)?,
            api_key,
            base_url,
        })
    }

    fn model_url(&self, model: &str) -> Result<Url> {
        self.base_url
            .join(&format!("models/{}", model))
            .map_err(|e| RefactorError::backend(BackendKind::HuggingFace, e))
    }

    async fn generate(
        &self,
        model: &str,
        inputs: &str,
        parameters: GenerationParameters,
    ) -> Result<String> {
        let url = self.model_url(model)?;
        let request = GenerationRequest { inputs, parameters };
        debug!(model, "sending generation request");
        let body = send_with_retry(BackendKind::HuggingFace, || {
            self.client
                .post(url.clone())
                .bearer_auth(&self.api_key)
                .json(&request)
        })
        .await?;
        parse_generation(&body).map_err(|e| RefactorError::backend(BackendKind::HuggingFace, e))
    }

    async fn classify(&self, inputs: &str) -> Result<Sentiment> {
        let url = self.model_url(SENTIMENT_MODEL)?;
        let request = ClassificationRequest { inputs };
        debug!(model = SENTIMENT_MODEL, "sending classification request");
        let body = send_with_retry(BackendKind::HuggingFace, || {
            self.client
                .post(url.clone())
                .bearer_auth(&self.api_key)
                .json(&request)
        })
        .await?;
        parse_classification(&body).map_err(|e| RefactorError::backend(BackendKind::HuggingFace, e))
    }
}

#[async_trait]
impl Transformer for HuggingFaceTransformer {
    fn kind(&self) -> BackendKind {
        BackendKind::HuggingFace
    }

    async fn transform(&self, policy: &Policy) -> Result<String> {
        let generated = self
            .generate(CODE_MODEL, policy.prompt(), GenerationParameters::refactor())
            .await?;
        Ok(generated.trim().to_string())
    }

    async fn complete(&self, policy: &Policy) -> Result<String> {
        let generated = self
            .generate(CODE_MODEL, policy.prompt(), GenerationParameters::completion())
            .await?;
        Ok(extract_function(generated.trim()).to_string())
    }

    async fn annotate(&self, policy: &Policy) -> Result<String> {
        let generated = self
            .generate(COMMENT_MODEL, policy.prompt(), GenerationParameters::comments())
            .await?;
        Ok(attach_comments(&generated, policy.source()))
    }

    async fn analyze_tone(&self, policy: &Policy) -> Result<String> {
        let Some(comments) = tone::comments_text(policy.source()) else {
            return Ok(tone::NO_COMMENTS_MESSAGE.to_string());
        };
        let sentiment = self.classify(&comments).await?;
        debug!(label = %sentiment.label, score = sentiment.score, "tone classified");
        Ok(tone::describe(&sentiment))
    }
}

fn parse_generation(body: &str) -> std::result::Result<String, String> {
    let parsed: GenerationResponse = serde_json::from_str(body)
        .map_err(|e| format!("Failed to parse response: {} ({})", e, truncate_str(body, 200)))?;
    let generation = match parsed {
        GenerationResponse::Many(items) => items.into_iter().next(),
        GenerationResponse::One(item) => Some(item),
        GenerationResponse::Error { error } => return Err(error),
    };
    generation
        .map(|g| g.generated_text)
        .ok_or_else(|| "Empty generation response".to_string())
}

/// Highest-scoring label.
fn parse_classification(body: &str) -> std::result::Result<Sentiment, String> {
    let parsed: ClassificationResponse = serde_json::from_str(body)
        .map_err(|e| format!("Failed to parse response: {} ({})", e, truncate_str(body, 200)))?;
    let labels = match parsed {
        ClassificationResponse::Nested(outer) => outer.into_iter().flatten().collect::<Vec<_>>(),
        ClassificationResponse::Flat(labels) => labels,
        ClassificationResponse::Error { error } => return Err(error),
    };
    labels
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .ok_or_else(|| "Empty classification response".to_string())
}

/// Keep only the first complete `function name(...) { ... }` when there is one.
///
/// Braces are balanced; braces inside strings and comments don't count. An
/// unclosed function keeps the whole text.
fn extract_function(generated: &str) -> &str {
    let Some(header) = function_header_re().find(generated) else {
        return generated;
    };
    let bytes = generated.as_bytes();
    let mut depth = 0usize;
    let mut i = header.end() - 1;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &generated[header.start()..=i];
                }
            }
            quote @ (b'"' | b'\'' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    generated
}

/// Comment lines on top of the original code, or empty when the model
/// produced nothing usable.
fn attach_comments(generated: &str, code: &str) -> String {
    let comments: Vec<String> = generated
        .trim()
        .lines()
        .map(|line| line.trim())
        .map(|line| {
            if line.starts_with("//") {
                line.to_string()
            } else {
                format!("// {}", line)
            }
        })
        .filter(|line| line.len() > 3)
        .collect();

    if comments.is_empty() {
        String::new()
    } else {
        format!("{}\n\n{}", comments.join("\n"), code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_must_have_prefix() {
        let err = HuggingFaceTransformer::new(Some("abc123".into()), None).unwrap_err();
        match err {
            RefactorError::Configuration(msg) => assert!(msg.contains("hf_")),
            other => panic!("expected configuration error, got {other:?}"),
        }
        assert!(matches!(
            HuggingFaceTransformer::new(None, None),
            Err(RefactorError::Configuration(_))
        ));
    }

    #[test]
    fn test_model_url() {
        let backend = HuggingFaceTransformer::new(Some("hf_test".into()), None).unwrap();
        assert_eq!(
            backend.model_url(CODE_MODEL).unwrap().as_str(),
            "https://api-inference.huggingface.co/models/bigcode/santacoder"
        );

        let backend =
            HuggingFaceTransformer::new(Some("hf_test".into()), Some("http://localhost:8080/hf")).unwrap();
        assert_eq!(
            backend.model_url("gpt2").unwrap().as_str(),
            "http://localhost:8080/hf/models/gpt2"
        );
    }

    #[test]
    fn test_parse_generation_shapes() {
        assert_eq!(parse_generation(r#"[{"generated_text":"a"}]"#).unwrap(), "a");
        assert_eq!(parse_generation(r#"{"generated_text":"b"}"#).unwrap(), "b");
        assert!(parse_generation("[]").is_err());
        assert_eq!(
            parse_generation(r#"{"error":"Model is loading"}"#).unwrap_err(),
            "Model is loading"
        );
        assert!(parse_generation(r#"{"unexpected":true}"#).is_err());
    }

    #[test]
    fn test_parse_classification_shapes() {
        let nested = r#"[[{"label":"NEGATIVE","score":0.1},{"label":"POSITIVE","score":0.9}]]"#;
        assert_eq!(parse_classification(nested).unwrap().label, "POSITIVE");
        let flat = r#"[{"label":"NEGATIVE","score":0.85}]"#;
        assert_eq!(parse_classification(flat).unwrap().score, 0.85);
        assert!(parse_classification("[]").is_err());
        assert_eq!(
            parse_classification(r#"{"error":"Model is loading"}"#).unwrap_err(),
            "Model is loading"
        );
    }

    #[test]
    fn test_extract_function() {
        let generated = "function add(a, b) {\n  return a + b;\n}\n\nadd(1, 2);";
        assert_eq!(extract_function(generated), "function add(a, b) {\n  return a + b;\n}");
        assert_eq!(extract_function("return a + b;"), "return a + b;");
    }

    #[test]
    fn test_extract_function_balances_nested_braces() {
        let function = "function pick(o) {\n  if (o.a) {\n    return '}';\n  }\n  // closing } here\n  return { b: o.b };\n}";
        let generated = format!("{}\n\npick({{}});", function);
        assert_eq!(extract_function(&generated), function);

        let unclosed = "function f(x) {\n  if (x) {\n    return 1;\n  }";
        assert_eq!(extract_function(unclosed), unclosed);
    }

    #[test]
    fn test_attach_comments() {
        let out = attach_comments("Adds two numbers\n\n// returns sum\n//", "add(a, b)");
        assert_eq!(out, "// Adds two numbers\n// returns sum\n\nadd(a, b)");
        assert_eq!(attach_comments("  \n", "x"), "");
    }

    #[tokio::test]
    async fn test_tone_without_comments_skips_network() {
        // Unroutable base URL: any request would fail.
        let backend =
            HuggingFaceTransformer::new(Some("hf_test".into()), Some("http://127.0.0.1:9/")).unwrap();
        let policy = crate::policy::build(crate::transform::Intent::ToneCheck, "let x = 1;");
        assert_eq!(backend.analyze_tone(&policy).await.unwrap(), tone::NO_COMMENTS_MESSAGE);
    }
}
