//! Built-in report consumers.
//!
//! - [`TextAccumulator`] turns key presses into a running text buffer.
//! - [`SubmitNotifier`] collects one line at a time and hands it to a
//!   callback when Enter is pressed.
//!
//! Both react to key *presses*: a key counts once when it first appears in a
//! report, not for every report in which it is still held.

use std::sync::Arc;

use hidkey_core::keymap::usage_to_char;
use hidkey_core::{DecodedReport, HidKeyCode, ModifierFlags};
use parking_lot::Mutex;
use tracing::trace;

use super::dispatch_reports::{ConsumerError, ReportConsumer};

/// What a newly pressed key does to a line of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Insert(char),
    Backspace,
    Enter,
}

impl Edit {
    fn from_usage(code: u8, modifiers: ModifierFlags) -> Option<Self> {
        match HidKeyCode::from_u8(code)? {
            HidKeyCode::Backspace => Some(Edit::Backspace),
            key if key.is_enter() => Some(Edit::Enter),
            _ => usage_to_char(code, modifiers).map(Edit::Insert),
        }
    }
}

/// Keyboard-page error usages (ErrorRollOver, POSTFail, ErrorUndefined).
const ERROR_USAGES: std::ops::RangeInclusive<u8> = 0x01..=0x03;

/// Tracks held keys between reports so each press is seen once.
#[derive(Debug, Default)]
struct KeyEdges {
    held: Vec<u8>,
}

impl KeyEdges {
    /// Returns the edits for keys pressed in `report` that were not held before.
    ///
    /// Opaque reports and error reports (phantom-key rollover) yield nothing
    /// and leave the held set untouched.
    fn edits(&mut self, report: &DecodedReport) -> Vec<Edit> {
        let Some(boot) = report.as_boot() else {
            return Vec::new();
        };
        if boot.key_codes.iter().any(|code| ERROR_USAGES.contains(code)) {
            trace!("error report from keyboard; keeping held keys");
            return Vec::new();
        }

        let edits = boot
            .key_codes
            .iter()
            .filter(|&&code| !self.held.contains(&code))
            .filter_map(|&code| Edit::from_usage(code, boot.modifiers))
            .collect();

        self.held.clone_from(&boot.key_codes);
        edits
    }
}

// ── Text accumulator ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct TextState {
    text: String,
    edges: KeyEdges,
}

impl TextState {
    fn apply(&mut self, edit: Edit) {
        match edit {
            Edit::Insert(c) => self.text.push(c),
            Edit::Enter => self.text.push('\n'),
            Edit::Backspace => {
                self.text.pop();
            }
        }
    }
}

/// Accumulates typed text from keyboard reports.
///
/// Clones share the same buffer: register one clone with the dispatcher and
/// keep another to read [`text`](Self::text).
#[derive(Debug, Clone, Default)]
pub struct TextAccumulator {
    state: Arc<Mutex<TextState>>,
}

impl TextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of the buffer.
    pub fn text(&self) -> String {
        self.state.lock().text.clone()
    }

    pub fn clear(&self) {
        self.state.lock().text.clear();
    }

    /// Appends a key from the fallback key-event path.
    ///
    /// Only single-character keys are typed; names such as `"Shift"` or
    /// `"ArrowLeft"` are ignored.
    pub fn push_key(&self, key: &str) {
        let mut chars = key.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            self.state.lock().text.push(c);
        }
    }
}

impl ReportConsumer for TextAccumulator {
    fn on_report(&mut self, report: &DecodedReport) -> Result<(), ConsumerError> {
        let mut state = self.state.lock();
        for edit in state.edges.edits(report) {
            state.apply(edit);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "text"
    }
}

// ── Submit notifier ───────────────────────────────────────────────────────────

/// Callback invoked with each submitted line.
pub type SubmitCallback = Box<dyn FnMut(&str) + Send>;

/// Buffers one line of typed text and hands it to a callback on Enter.
///
/// Empty lines are not submitted.
pub struct SubmitNotifier {
    line: String,
    edges: KeyEdges,
    on_submit: SubmitCallback,
}

impl SubmitNotifier {
    pub fn new(on_submit: impl FnMut(&str) + Send + 'static) -> Self {
        Self {
            line: String::new(),
            edges: KeyEdges::default(),
            on_submit: Box::new(on_submit),
        }
    }

    /// Text typed since the last submission.
    pub fn pending(&self) -> &str {
        &self.line
    }
}

impl ReportConsumer for SubmitNotifier {
    fn on_report(&mut self, report: &DecodedReport) -> Result<(), ConsumerError> {
        for edit in self.edges.edits(report) {
            match edit {
                Edit::Insert(c) => self.line.push(c),
                Edit::Backspace => {
                    self.line.pop();
                }
                Edit::Enter if self.line.is_empty() => {}
                Edit::Enter => {
                    trace!(len = self.line.len(), "submitting line");
                    (self.on_submit)(&self.line);
                    self.line.clear();
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "submit-notifier"
    }
}
