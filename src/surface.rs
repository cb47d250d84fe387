//! Document surface: what the pipeline needs from a host editor.
//!
//! Ranges are byte offsets into the document text. `MemoryDocument` is a
//! complete in-process implementation used by the CLI host and by tests.

use crate::error::EditConflict;
use crate::preview::PreviewSession;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte range covering 1-based lines `first..=last`, without the final
    /// line break.
    pub fn for_lines(text: &str, first: usize, last: usize) -> Option<TextRange> {
        if first == 0 || last < first {
            return None;
        }
        let mut start = None;
        let mut offset = 0;
        for (idx, line) in text.split_inclusive('\n').enumerate() {
            let number = idx + 1;
            if number == first {
                start = Some(offset);
            }
            if number == last {
                let content = line.trim_end_matches(['\n', '\r']);
                return start.map(|s| TextRange::new(s, offset + content.len()));
            }
            offset += line.len();
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupStyle {
    /// Original text about to be replaced (struck through).
    Removed,
    /// Candidate text (highlighted).
    Added,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkupHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
}

/// The user's answer to a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

pub trait DocumentSurface {
    /// Current selection, or `None` when there is no active document.
    fn selection(&self) -> Option<TextRange>;

    fn text(&self, range: TextRange) -> Result<String, EditConflict>;

    fn replace(&mut self, range: TextRange, text: &str) -> Result<(), EditConflict>;

    fn render_markup(
        &mut self,
        range: TextRange,
        style: MarkupStyle,
    ) -> Result<MarkupHandle, EditConflict>;

    fn clear_markup(&mut self, handle: MarkupHandle);

    fn notify(&mut self, level: NotifyLevel, message: &str);

    /// Block until the user accepts or rejects the preview.
    fn request_decision(&mut self, session: &PreviewSession) -> Decision;
}

/// In-memory document with a scripted decision queue.
///
/// When the queue is empty a preview is rejected.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    buffer: String,
    selection: Option<TextRange>,
    markups: BTreeMap<MarkupHandle, (TextRange, MarkupStyle)>,
    next_markup: u64,
    notifications: Vec<(NotifyLevel, String)>,
    decisions: VecDeque<Decision>,
    edit_on_decision: Option<String>,
    replace_calls: usize,
}

impl MemoryDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            buffer: text.into(),
            ..Default::default()
        }
    }

    /// A document with no active selection API at all.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn with_selection(mut self, range: TextRange) -> Self {
        self.selection = Some(range);
        self
    }

    pub fn select_all(mut self) -> Self {
        self.selection = Some(TextRange::new(0, self.buffer.len()));
        self
    }

    pub fn push_decision(&mut self, decision: Decision) {
        self.decisions.push_back(decision);
    }

    /// Replace the whole buffer while the next decision is pending,
    /// as if someone else edited the document.
    pub fn edit_while_deciding(&mut self, new_text: impl Into<String>) {
        self.edit_on_decision = Some(new_text.into());
    }

    pub fn contents(&self) -> &str {
        &self.buffer
    }

    pub fn markup_count(&self) -> usize {
        self.markups.len()
    }

    pub fn markups(&self) -> impl Iterator<Item = &(TextRange, MarkupStyle)> {
        self.markups.values()
    }

    pub fn notifications(&self) -> &[(NotifyLevel, String)] {
        &self.notifications
    }

    pub fn last_notification(&self) -> Option<&(NotifyLevel, String)> {
        self.notifications.last()
    }

    pub fn replace_calls(&self) -> usize {
        self.replace_calls
    }

    fn check_range(&self, range: TextRange) -> Result<(), EditConflict> {
        if range.start > range.end || range.end > self.buffer.len() {
            return Err(EditConflict(format!(
                "range {}..{} is outside the document ({} bytes)",
                range.start,
                range.end,
                self.buffer.len()
            )));
        }
        if !self.buffer.is_char_boundary(range.start) || !self.buffer.is_char_boundary(range.end) {
            return Err(EditConflict(format!(
                "range {}..{} splits a character",
                range.start, range.end
            )));
        }
        Ok(())
    }
}

impl DocumentSurface for MemoryDocument {
    fn selection(&self) -> Option<TextRange> {
        self.selection
    }

    fn text(&self, range: TextRange) -> Result<String, EditConflict> {
        self.check_range(range)?;
        Ok(self.buffer[range.start..range.end].to_string())
    }

    fn replace(&mut self, range: TextRange, text: &str) -> Result<(), EditConflict> {
        self.check_range(range)?;
        self.replace_calls += 1;
        self.buffer.replace_range(range.start..range.end, text);
        Ok(())
    }

    fn render_markup(
        &mut self,
        range: TextRange,
        style: MarkupStyle,
    ) -> Result<MarkupHandle, EditConflict> {
        self.check_range(range)?;
        let handle = MarkupHandle(self.next_markup);
        self.next_markup += 1;
        self.markups.insert(handle, (range, style));
        Ok(handle)
    }

    fn clear_markup(&mut self, handle: MarkupHandle) {
        self.markups.remove(&handle);
    }

    fn notify(&mut self, level: NotifyLevel, message: &str) {
        self.notifications.push((level, message.to_string()));
    }

    fn request_decision(&mut self, _session: &PreviewSession) -> Decision {
        if let Some(text) = self.edit_on_decision.take() {
            self.buffer = text;
        }
        self.decisions.pop_front().unwrap_or(Decision::Reject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_lines() {
        let text = "one\ntwo\r\nthree\n";
        assert_eq!(TextRange::for_lines(text, 1, 1), Some(TextRange::new(0, 3)));
        let range = TextRange::for_lines(text, 2, 3).unwrap();
        assert_eq!(&text[range.start..range.end], "two\r\nthree");
        assert_eq!(TextRange::for_lines(text, 4, 4), None);
        assert_eq!(TextRange::for_lines(text, 0, 1), None);
        assert_eq!(TextRange::for_lines(text, 3, 2), None);
    }

    #[test]
    fn test_replace_and_text() {
        let mut doc = MemoryDocument::new("let a = 1;\nlet b = 2;");
        doc.replace(TextRange::new(4, 5), "x").unwrap();
        assert_eq!(doc.contents(), "let x = 1;\nlet b = 2;");
        assert_eq!(doc.text(TextRange::new(0, 5)).unwrap(), "let x");
        assert_eq!(doc.replace_calls(), 1);
    }

    #[test]
    fn test_out_of_range_is_conflict() {
        let mut doc = MemoryDocument::new("abc");
        assert!(doc.text(TextRange::new(1, 10)).is_err());
        assert!(doc.replace(TextRange::new(4, 4), "x").is_err());
        assert!(doc.render_markup(TextRange::new(0, 9), MarkupStyle::Added).is_err());

        let doc = MemoryDocument::new("é");
        assert!(doc.text(TextRange::new(0, 1)).is_err());
    }

    #[test]
    fn test_markup_lifecycle() {
        let mut doc = MemoryDocument::new("abc");
        let a = doc.render_markup(TextRange::new(0, 1), MarkupStyle::Removed).unwrap();
        let b = doc.render_markup(TextRange::new(1, 3), MarkupStyle::Added).unwrap();
        assert_ne!(a, b);
        assert_eq!(doc.markup_count(), 2);
        doc.clear_markup(a);
        doc.clear_markup(a);
        assert_eq!(doc.markup_count(), 1);
    }
}
