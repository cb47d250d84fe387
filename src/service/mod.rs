//! Service front door
//!
//! `RefactorSession` owns everything that outlives a single request: the
//! transformer registry and the preview state machine. Each call to
//! `handle_user_request` runs one request end to end and reports every
//! failure to the document surface itself.

use crate::config::Config;
use crate::error::{RefactorError, Result};
use crate::policy;
use crate::preview::{self, PreviewMachine, PreviewOutcome};
use crate::registry::{self, Registry};
use crate::surface::{Decision, DocumentSurface, NotifyLevel};
use crate::tone;
use crate::transform::{self, BackendKind, Intent, Operation, TransformRequest, TransformResult, UnchangedReason};
use std::time::Duration;
use tracing::{debug, info, warn};


/// How a `Replacement` reaches the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Render a preview and wait for accept/reject.
    Preview,
    /// Replace the selection immediately.
    Direct,
}

impl ApplyMode {
    pub fn from_preview_flag(preview_changes: bool) -> Self {
        if preview_changes {
            ApplyMode::Preview
        } else {
            ApplyMode::Direct
        }
    }
}

/// What one request ended with. Already reported to the user.
#[derive(Debug)]
pub enum RequestOutcome {
    NoChange(UnchangedReason),
    Applied,
    Discarded,
    Analysis(NotifyLevel),
    Failed(RefactorError),
}

pub struct RefactorSession {
    registry: Registry,
    preview: PreviewMachine,
    timeout: Duration,
}

impl RefactorSession {
    pub fn new(registry: Registry, timeout: Duration) -> Self {
        Self {
            registry,
            preview: PreviewMachine::new(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Registry::from_config(config.clone()), config.request_timeout())
    }

    /// True while a preview waits for a decision.
    pub fn is_busy(&self) -> bool {
        !self.preview.is_idle()
    }

    pub fn preview(&self) -> &PreviewMachine {
        &self.preview
    }

    /// Run one request against the current selection of `doc`.
    ///
    /// Never returns an error: failures are reported through `doc.notify`
    /// and handed back as `RequestOutcome::Failed`.
    pub async fn handle_user_request(
        &mut self,
        doc: &mut dyn DocumentSurface,
        intent: Intent,
        backend: BackendKind,
        mode: ApplyMode,
    ) -> RequestOutcome {
        match self.run_request(doc, intent, backend, mode).await {
            Ok(outcome) => outcome,
            Err(err) => {
                if !matches!(err, RefactorError::PreviewPending) {
                    self.preview.abandon(doc);
                }
                report_failure(doc, &err);
                RequestOutcome::Failed(err)
            }
        }
    }

    async fn run_request(
        &mut self,
        doc: &mut dyn DocumentSurface,
        intent: Intent,
        backend: BackendKind,
        mode: ApplyMode,
    ) -> Result<RequestOutcome> {
        if self.is_busy() {
            return Err(RefactorError::PreviewPending);
        }

        let range = doc.selection().ok_or(RefactorError::NoActiveDocument)?;
        let source = doc.text(range)?;
        if source.trim().is_empty() {
            return Err(RefactorError::EmptySelection);
        }

        let request = TransformRequest::new(source, intent, backend);
        let operation = request.intent().operation();
        let target = registry::backend_for(operation, request.backend());
        if target != request.backend() {
            debug!(
                operation = operation.name(),
                selected = %request.backend(),
                %target,
                "operation pinned to another backend"
            );
        }

        let transformer = self.registry.resolve(target)?;
        let policy = policy::build(request.intent(), request.source_text());

        info!(intent = %request.intent(), backend = %target, "transform requested");
        let result = tokio::time::timeout(self.timeout, transform::run(transformer.as_ref(), &policy))
            .await
            .map_err(|_| {
                RefactorError::backend(
                    target,
                    format!("timed out after {}s", self.timeout.as_secs_f32()),
                )
            })??;

        match result {
            TransformResult::Unchanged { reason, .. } => {
                debug!(?reason, "transform left the code unchanged");
                doc.notify(NotifyLevel::Info, &unchanged_message(request.intent(), reason));
                Ok(RequestOutcome::NoChange(reason))
            }
            TransformResult::Replacement(candidate) => match mode {
                ApplyMode::Direct => {
                    preview::apply_direct(doc, range, request.source_text(), &candidate)?;
                    Ok(RequestOutcome::Applied)
                }
                ApplyMode::Preview => {
                    self.preview.begin(doc, range, request.source_text(), &candidate)?;
                    let decision = self
                        .preview
                        .session()
                        .map(|session| doc.request_decision(session))
                        .unwrap_or(Decision::Reject);
                    debug!(?decision, "preview decided");
                    match self.preview.resolve(doc, decision)? {
                        PreviewOutcome::Applied => Ok(RequestOutcome::Applied),
                        PreviewOutcome::Discarded => Ok(RequestOutcome::Discarded),
                    }
                }
            },
            TransformResult::Analysis(text) => {
                let level = tone::route_analysis(&text);
                doc.notify(level, &text);
                Ok(RequestOutcome::Analysis(level))
            }
        }
    }
}

fn unchanged_message(intent: Intent, reason: UnchangedReason) -> String {
    match intent.operation() {
        Operation::Refactor => format!(
            "No refactoring needed - code is already optimized for {}",
            intent
        ),
        other => match reason {
            UnchangedReason::NoPayload => format!("No {} result was produced", other.name()),
            _ => format!("No {} changes were suggested", other.name()),
        },
    }
}

/// The one place a failure becomes a user-visible message.
fn report_failure(doc: &mut dyn DocumentSurface, err: &RefactorError) {
    warn!(kind = err.kind(), error = %err, "request failed");
    let (level, message) = match err {
        RefactorError::EmptySelection | RefactorError::NoActiveDocument => {
            (NotifyLevel::Error, err.to_string())
        }
        RefactorError::PreviewPending => (NotifyLevel::Warning, err.to_string()),
        RefactorError::Configuration(msg) => (NotifyLevel::Error, msg.clone()),
        RefactorError::CapabilityUnsupported { backend, operation } => (
            NotifyLevel::Error,
            format!(
                "{} is not available with the {} backend",
                capitalize(operation),
                backend.display_name()
            ),
        ),
        RefactorError::Backend { .. } | RefactorError::EditConflict(_) => {
            (NotifyLevel::Error, format!("Failed to refactor code: {}", err))
        }
    };
    doc.notify(level, &message);
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
