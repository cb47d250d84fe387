//! HTTP plumbing shared by the remote backends.

use crate::error::{RefactorError, Result};
use crate::transform::BackendKind;
use std::time::Duration;
use tracing::{debug, warn};

/// Rate limit retry configuration
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000; // 2 seconds
const BACKOFF_MULTIPLIER: u64 = 2; // Exponential backoff

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_client(backend: BackendKind) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| RefactorError::backend(backend, e))
}

/// Extract retry-after hint from a response body (if present)
fn parse_retry_after(text: &str) -> Option<u64> {
    // Look for patterns like "retry after X seconds" or "wait X seconds"
    let text_lower = text.to_lowercase();
    let pos = text_lower.find("retry").or_else(|| text_lower.find("wait"))?;
    let after = &text_lower[pos..];
    for word in after.split_whitespace().skip(1).take(5) {
        if let Ok(secs) = word
            .trim_matches(|c: char| !c.is_numeric())
            .parse::<u64>()
        {
            if secs > 0 && secs < 300 {
                return Some(secs);
            }
        }
    }
    None
}

fn backoff_secs(retry_count: u32) -> u64 {
    (INITIAL_BACKOFF_MS * BACKOFF_MULTIPLIER.pow(retry_count.saturating_sub(1))) / 1000
}

/// Send a request, retrying on rate limits, and return the body of the first
/// successful response.
///
/// `build` is called once per attempt since a sent request can't be reused.
pub(crate) async fn send_with_retry<F>(backend: BackendKind, build: F) -> Result<String>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut retry_count = 0;

    loop {
        let response = build()
            .send()
            .await
            .map_err(|e| RefactorError::backend(backend, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RefactorError::backend(backend, e))?;

        if status.is_success() {
            debug!(%backend, bytes = text.len(), "backend responded");
            return Ok(text);
        }

        if status.as_u16() == 429 && retry_count < MAX_RETRIES {
            retry_count += 1;
            let retry_after = parse_retry_after(&text).unwrap_or_else(|| backoff_secs(retry_count));
            warn!(
                %backend,
                retry_after,
                attempt = retry_count,
                max = MAX_RETRIES,
                "rate limited, retrying"
            );
            tokio::time::sleep(Duration::from_secs(retry_after)).await;
            continue;
        }

        return Err(RefactorError::backend(
            backend,
            describe_status(backend, status.as_u16(), retry_count, &text),
        ));
    }
}

fn describe_status(backend: BackendKind, status: u16, retries: u32, body: &str) -> String {
    match status {
        401 | 403 => format!(
            "Invalid {} API key. Run 'refract set-credential {}' to update it.",
            backend.display_name(),
            backend
        ),
        429 => format!(
            "Rate limited after {} retries. Try again in a few minutes.",
            retries
        ),
        500..=599 => format!(
            "Server error ({}). The service may be temporarily unavailable.",
            status
        ),
        _ => format!("API error {}: {}", status, truncate_str(body, 200)),
    }
}

/// Truncate a string for display (Unicode-safe)
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}
