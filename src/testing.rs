//! Recording test doubles shared by unit tests
//!
//! Every sink call and LED write lands in one ordered journal so tests can
//! assert cross-capability ordering.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::events::{KeySink, LogicalKey, MidiSink, NoteEvent, RotaryEvent, RotarySink};
use crate::led::{LedAddress, LedColors, LedFeedbackController, LedSetter, Rgb};
use crate::router::{InputEventRouter, RouterBuilder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    KeyPress(LogicalKey),
    KeyRelease(LogicalKey),
    Note(NoteEvent),
    Rotary(RotaryEvent),
    Led(LedAddress, Rgb),
}

#[derive(Default, Clone)]
pub struct Journal {
    entries: Arc<Mutex<Vec<Observed>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: Observed) {
        self.entries.lock().push(entry);
    }

    pub fn take(&self) -> Vec<Observed> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeySink for Journal {
    fn keypress(&self, key: LogicalKey) {
        self.push(Observed::KeyPress(key));
    }

    fn keyrelease(&self, key: LogicalKey) {
        self.push(Observed::KeyRelease(key));
    }
}

impl MidiSink for Journal {
    fn send_midi_event(&self, event: NoteEvent) {
        self.push(Observed::Note(event));
    }
}

impl RotarySink for Journal {
    fn rotary(&self, event: RotaryEvent) {
        self.push(Observed::Rotary(event));
    }
}

impl LedSetter for Journal {
    fn set_led(&self, address: LedAddress, color: Rgb) {
        self.push(Observed::Led(address, color));
    }
}

/// Builder with every capability wired to `journal`, no pad banks yet
pub fn journal_builder(journal: &Journal) -> RouterBuilder {
    let shared = Arc::new(journal.clone());
    InputEventRouter::builder()
        .led_setter(shared.clone())
        .feedback(LedFeedbackController::push2(LedColors::default()))
        .key_sink(shared.clone())
        .midi_sink(shared.clone())
        .rotary_sink(shared)
}
