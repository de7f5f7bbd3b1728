//! Logical application events and the sinks that consume them
//!
//! The router never reaches into a global "current application". Instead the
//! composition root hands it these sink capabilities at construction time.
//!
//! Note: all sink methods take `&self` so sinks can be shared as `Arc<dyn ...>`.
//! Implementations use interior mutability for their own state.

use std::fmt;

/// Application-level key, decoupled from the physical layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogicalKey {
    Arpeggiator,
    Synth,
    Envelope,
    Voices,
    Fx1,
    Fx2,
    Sequencer,
    Play,
    Shift,
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogicalKey::Arpeggiator => "arpeggiator",
            LogicalKey::Synth => "synth",
            LogicalKey::Envelope => "envelope",
            LogicalKey::Voices => "voices",
            LogicalKey::Fx1 => "fx1",
            LogicalKey::Fx2 => "fx2",
            LogicalKey::Sequencer => "sequencer",
            LogicalKey::Play => "play",
            LogicalKey::Shift => "shift",
        };
        f.write_str(name)
    }
}

/// One of the four rotary channels, named after their indicator colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotaryChannel {
    Blue,
    Green,
    Yellow,
    Red,
}

impl RotaryChannel {
    pub const ALL: [RotaryChannel; 4] = [
        RotaryChannel::Blue,
        RotaryChannel::Green,
        RotaryChannel::Yellow,
        RotaryChannel::Red,
    ];

    /// Position of the channel, 0 for the first (blue) through 3
    pub fn index(self) -> usize {
        match self {
            RotaryChannel::Blue => 0,
            RotaryChannel::Green => 1,
            RotaryChannel::Yellow => 2,
            RotaryChannel::Red => 3,
        }
    }
}

/// Relative rotary movement; deltas are forwarded exactly as received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotaryEvent {
    pub channel: RotaryChannel,
    pub delta: i32,
}

/// Note event sent to the audio engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8, velocity: u8 },
}

impl NoteEvent {
    pub fn note(&self) -> u8 {
        match *self {
            NoteEvent::NoteOn { note, .. } | NoteEvent::NoteOff { note, .. } => note,
        }
    }
}

impl fmt::Display for NoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            NoteEvent::NoteOn { note, velocity } => write!(f, "NoteOn n:{} v:{}", note, velocity),
            NoteEvent::NoteOff { note, velocity } => write!(f, "NoteOff n:{} v:{}", note, velocity),
        }
    }
}

/// Receives discrete key transitions
pub trait KeySink: Send + Sync {
    fn keypress(&self, key: LogicalKey);
    fn keyrelease(&self, key: LogicalKey);
}

/// Receives note events destined for the audio engine
pub trait MidiSink: Send + Sync {
    fn send_midi_event(&self, event: NoteEvent);
}

/// Receives relative rotary movements
pub trait RotarySink: Send + Sync {
    fn rotary(&self, event: RotaryEvent);
}
