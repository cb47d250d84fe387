//! Preview state machine for proposed replacements
//!
//! Tracks: Idle -> Previewing -> (Applied | Discarded) -> Idle
//!
//! While previewing, the candidate sits in a scratch region right after the
//! original selection. The original is marked `Removed`, the scratch region
//! `Added`. Nothing outside the scratch region is touched until the user
//! accepts.

use crate::error::{EditConflict, RefactorError, Result};
use crate::surface::{Decision, DocumentSurface, MarkupHandle, MarkupStyle, NotifyLevel, TextRange};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Separates the original selection from the scratch region.
const SCRATCH_SEPARATOR: &str = "\n";

pub const APPLIED_MESSAGE: &str = "Code refactored successfully!";

/// A pending proposal over one selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSession {
    pub id: Uuid,
    pub original_range: TextRange,
    pub original_text: String,
    pub candidate_text: String,
    /// Where the candidate was inserted, separator included.
    pub scratch_range: TextRange,
    pub decorations: Vec<MarkupHandle>,
}

impl PreviewSession {
    fn scratch_text(&self) -> String {
        format!("{}{}", SCRATCH_SEPARATOR, self.candidate_text)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PreviewState {
    #[default]
    Idle,
    Previewing(PreviewSession),
}

/// How a preview ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewOutcome {
    Applied,
    Discarded,
}

#[derive(Debug, Default)]
pub struct PreviewMachine {
    state: PreviewState,
}

impl PreviewMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, PreviewState::Idle)
    }

    pub fn session(&self) -> Option<&PreviewSession> {
        match &self.state {
            PreviewState::Previewing(session) => Some(session),
            PreviewState::Idle => None,
        }
    }

    /// Idle -> Previewing. Renders the candidate next to the selection.
    ///
    /// Fails with `PreviewPending` if a session is already open. A rendering
    /// failure cleans up whatever was rendered and leaves the machine idle.
    pub fn begin(
        &mut self,
        doc: &mut dyn DocumentSurface,
        original_range: TextRange,
        original_text: &str,
        candidate_text: &str,
    ) -> Result<()> {
        if !self.is_idle() {
            return Err(RefactorError::PreviewPending);
        }

        let mut session = PreviewSession {
            id: Uuid::new_v4(),
            original_range,
            original_text: original_text.to_string(),
            candidate_text: candidate_text.to_string(),
            scratch_range: TextRange::new(original_range.end, original_range.end),
            decorations: Vec::new(),
        };

        if let Err(err) = render(doc, &mut session) {
            warn!(session = %session.id, error = %err, "preview rendering failed");
            teardown(doc, &session);
            return Err(err.into());
        }

        debug!(
            session = %session.id,
            start = original_range.start,
            end = original_range.end,
            "preview opened"
        );
        self.state = PreviewState::Previewing(session);
        Ok(())
    }

    /// Previewing -> Applied | Discarded -> Idle.
    ///
    /// The machine is idle afterwards whatever happens. On `EditConflict`
    /// the document is left as the last successful edit left it.
    pub fn resolve(
        &mut self,
        doc: &mut dyn DocumentSurface,
        decision: Decision,
    ) -> Result<PreviewOutcome> {
        let session = match std::mem::take(&mut self.state) {
            PreviewState::Previewing(session) => session,
            PreviewState::Idle => {
                return Err(RefactorError::EditConflict(EditConflict(
                    "no preview is open".to_string(),
                )))
            }
        };

        for handle in &session.decorations {
            doc.clear_markup(*handle);
        }
        remove_scratch(doc, &session)?;

        match decision {
            Decision::Accept => {
                commit(doc, session.original_range, &session.original_text, &session.candidate_text)?;
                info!(session = %session.id, "preview applied");
                doc.notify(NotifyLevel::Info, APPLIED_MESSAGE);
                Ok(PreviewOutcome::Applied)
            }
            Decision::Reject => {
                info!(session = %session.id, "preview discarded");
                Ok(PreviewOutcome::Discarded)
            }
        }
    }

    /// Drop an open preview without applying it. Best effort.
    pub fn abandon(&mut self, doc: &mut dyn DocumentSurface) {
        if let PreviewState::Previewing(session) = std::mem::take(&mut self.state) {
            debug!(session = %session.id, "preview abandoned");
            teardown(doc, &session);
        }
    }
}

/// Legacy path: replace the selection immediately, no preview.
pub fn apply_direct(
    doc: &mut dyn DocumentSurface,
    range: TextRange,
    original_text: &str,
    candidate_text: &str,
) -> Result<()> {
    commit(doc, range, original_text, candidate_text)?;
    doc.notify(NotifyLevel::Info, APPLIED_MESSAGE);
    Ok(())
}

fn render(
    doc: &mut dyn DocumentSurface,
    session: &mut PreviewSession,
) -> std::result::Result<(), EditConflict> {
    let insert_at = session.original_range.end;
    let scratch = session.scratch_text();
    doc.replace(TextRange::new(insert_at, insert_at), &scratch)?;
    session.scratch_range = TextRange::new(insert_at, insert_at + scratch.len());

    let removed = doc.render_markup(session.original_range, MarkupStyle::Removed)?;
    session.decorations.push(removed);

    let added_range = TextRange::new(
        insert_at + SCRATCH_SEPARATOR.len(),
        session.scratch_range.end,
    );
    let added = doc.render_markup(added_range, MarkupStyle::Added)?;
    session.decorations.push(added);
    Ok(())
}

/// Remove the scratch region, but only if it still holds what we inserted.
fn remove_scratch(
    doc: &mut dyn DocumentSurface,
    session: &PreviewSession,
) -> std::result::Result<(), EditConflict> {
    if session.scratch_range.is_empty() {
        return Ok(());
    }
    let current = doc.text(session.scratch_range)?;
    if current != session.scratch_text() {
        return Err(EditConflict(
            "the preview region was edited before a decision was made".to_string(),
        ));
    }
    doc.replace(session.scratch_range, "")
}

fn teardown(doc: &mut dyn DocumentSurface, session: &PreviewSession) {
    for handle in &session.decorations {
        doc.clear_markup(*handle);
    }
    if let Err(err) = remove_scratch(doc, session) {
        warn!(session = %session.id, error = %err, "could not remove preview region");
    }
}

fn commit(
    doc: &mut dyn DocumentSurface,
    range: TextRange,
    original_text: &str,
    candidate_text: &str,
) -> std::result::Result<(), EditConflict> {
    let current = doc.text(range)?;
    if current != original_text {
        return Err(EditConflict(
            "the selected code changed before the edit could be applied".to_string(),
        ));
    }
    doc.replace(range, candidate_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemoryDocument;

    fn doc_with_selection(text: &str, selected: &str) -> (MemoryDocument, TextRange) {
        let start = text.find(selected).unwrap();
        let range = TextRange::new(start, start + selected.len());
        (MemoryDocument::new(text).with_selection(range), range)
    }

    #[test]
    fn test_begin_renders_scratch_without_touching_original() {
        let (mut doc, range) = doc_with_selection("a();\nfoo();\nz();", "foo();");
        let mut machine = PreviewMachine::new();

        machine.begin(&mut doc, range, "foo();", "bar();").unwrap();
        let session = machine.session().unwrap();
        assert_eq!(session.decorations.len(), 2);
        assert_eq!(session.original_text, "foo();");
        assert_eq!(doc.contents(), "a();\nfoo();\nbar();\nz();");
        assert_eq!(doc.text(range).unwrap(), "foo();");
        assert_eq!(doc.markup_count(), 2);
        assert!(!machine.is_idle());

        let styles: Vec<_> = doc.markups().map(|(r, s)| (doc.text(*r).unwrap(), *s)).collect();
        assert!(styles.contains(&("foo();".to_string(), MarkupStyle::Removed)));
        assert!(styles.contains(&("bar();".to_string(), MarkupStyle::Added)));
    }

    #[test]
    fn test_accept_applies_and_clears() {
        let (mut doc, range) = doc_with_selection("foo();", "foo();");
        let mut machine = PreviewMachine::new();
        machine.begin(&mut doc, range, "foo();", "bar();").unwrap();

        let outcome = machine.resolve(&mut doc, Decision::Accept).unwrap();
        assert_eq!(outcome, PreviewOutcome::Applied);
        assert_eq!(doc.contents(), "bar();");
        assert_eq!(doc.markup_count(), 0);
        assert!(machine.is_idle());
        assert_eq!(
            doc.last_notification(),
            Some(&(NotifyLevel::Info, APPLIED_MESSAGE.to_string()))
        );
    }

    #[test]
    fn test_reject_restores_and_stays_quiet() {
        let (mut doc, range) = doc_with_selection("x\nfoo();\ny", "foo();");
        let mut machine = PreviewMachine::new();
        machine.begin(&mut doc, range, "foo();", "bar();").unwrap();

        let outcome = machine.resolve(&mut doc, Decision::Reject).unwrap();
        assert_eq!(outcome, PreviewOutcome::Discarded);
        assert_eq!(doc.contents(), "x\nfoo();\ny");
        assert_eq!(doc.markup_count(), 0);
        assert!(doc.notifications().is_empty());
        assert!(machine.is_idle());
    }

    #[test]
    fn test_second_preview_is_rejected() {
        let (mut doc, range) = doc_with_selection("foo();", "foo();");
        let mut machine = PreviewMachine::new();
        machine.begin(&mut doc, range, "foo();", "bar();").unwrap();

        let err = machine.begin(&mut doc, range, "foo();", "baz();").unwrap_err();
        assert!(matches!(err, RefactorError::PreviewPending));
        assert_eq!(doc.markup_count(), 2);
        assert_eq!(doc.contents(), "foo();\nbar();");
    }

    #[test]
    fn test_conflict_on_commit_forces_idle() {
        let (mut doc, range) = doc_with_selection("foo();", "foo();");
        let mut machine = PreviewMachine::new();
        machine.begin(&mut doc, range, "foo();", "bar();").unwrap();

        // Someone edits the original selection while the preview is open.
        doc.replace(TextRange::new(0, 3), "qux").unwrap();

        let err = machine.resolve(&mut doc, Decision::Accept).unwrap_err();
        assert!(matches!(err, RefactorError::EditConflict(_)));
        assert!(machine.is_idle());
        assert_eq!(doc.markup_count(), 0);
        assert_eq!(doc.contents(), "qux();");
    }

    #[test]
    fn test_render_failure_leaves_machine_idle() {
        let mut doc = MemoryDocument::new("foo();");
        let mut machine = PreviewMachine::new();
        let err = machine
            .begin(&mut doc, TextRange::new(0, 40), "foo();", "bar();")
            .unwrap_err();
        assert!(matches!(err, RefactorError::EditConflict(_)));
        assert!(machine.is_idle());
        assert_eq!(doc.contents(), "foo();");
        assert_eq!(doc.markup_count(), 0);
    }

    #[test]
    fn test_resolve_without_preview_is_error() {
        let mut doc = MemoryDocument::new("foo();");
        let mut machine = PreviewMachine::new();
        assert!(machine.resolve(&mut doc, Decision::Accept).is_err());
    }

    #[test]
    fn test_abandon_cleans_up() {
        let (mut doc, range) = doc_with_selection("foo();", "foo();");
        let mut machine = PreviewMachine::new();
        machine.begin(&mut doc, range, "foo();", "bar();").unwrap();
        machine.abandon(&mut doc);
        assert!(machine.is_idle());
        assert_eq!(doc.contents(), "foo();");
        assert_eq!(doc.markup_count(), 0);
    }

    #[test]
    fn test_apply_direct_checks_original() {
        let mut doc = MemoryDocument::new("foo();");
        apply_direct(&mut doc, TextRange::new(0, 6), "foo();", "bar();").unwrap();
        assert_eq!(doc.contents(), "bar();");

        let err = apply_direct(&mut doc, TextRange::new(0, 6), "foo();", "baz();").unwrap_err();
        assert!(matches!(err, RefactorError::EditConflict(_)));
        assert_eq!(doc.contents(), "bar();");
    }
}
