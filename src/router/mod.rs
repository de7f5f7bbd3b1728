//! Router module - translation of physical widget events into logical events
//!
//! The router turns each input notification into at most one logical action
//! plus, for buttons and pads, one LED write:
//! - Button row and shift → `keypress` / `keyrelease`
//! - Pads → note on/off with a per-bank note offset
//! - Encoders → relative rotary deltas on one of four channels
//! - Touch hooks → accepted and logged, no side effects
//!
//! Unrecognized identities are not errors. They are dropped without any
//! event or LED write so partial hardware layouts degrade to "control does
//! nothing".


use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::callbacks::{ButtonCallback, EncoderCallback, PadCallback, TouchSurfaceCallback};
use crate::events::{KeySink, LogicalKey, MidiSink, NoteEvent, RotaryChannel, RotaryEvent, RotarySink};
use crate::led::{LedFeedbackController, LedSetter, LedWrite, Rgb};
use crate::widget::{PadState, PressState, Topology, TouchPoint, TouchState, Widget};

/// Logical keys of the button row, indexed by `coord.x`
pub const BUTTON_ROW_KEYS: [LogicalKey; 8] = [
    LogicalKey::Arpeggiator,
    LogicalKey::Synth,
    LogicalKey::Envelope,
    LogicalKey::Voices,
    LogicalKey::Fx1,
    LogicalKey::Fx2,
    LogicalKey::Sequencer,
    LogicalKey::Play,
];

/// Rotary channels of the encoder bank, indexed by `coord.x`
pub const ENCODER_CHANNELS: [RotaryChannel; 4] = RotaryChannel::ALL;

/// Highest valid MIDI note number
const MAX_NOTE: i32 = 127;

/// Resolve a button row coordinate to its logical key
pub fn button_row_key(x: i32) -> Option<LogicalKey> {
    usize::try_from(x).ok().and_then(|i| BUTTON_ROW_KEYS.get(i)).copied()
}

/// Resolve an encoder coordinate to its rotary channel
pub fn encoder_channel(x: i32) -> Option<RotaryChannel> {
    usize::try_from(x).ok().and_then(|i| ENCODER_CHANNELS.get(i)).copied()
}

/// Note range and LED accent of one pad bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadBank {
    pub note_offset: i32,
    pub accent: Rgb,
}

impl PadBank {
    /// `x + y + offset`, or `None` when it falls outside 0..=127
    pub fn note_for(&self, widget: &Widget) -> Option<u8> {
        let note = widget.coord.x + widget.coord.y + self.note_offset;
        if (0..=MAX_NOTE).contains(&note) {
            Some(note as u8)
        } else {
            None
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("router capability missing: {0}")]
    MissingCapability(&'static str),
}

/// Collects the capabilities the router borrows from the application
#[derive(Default)]
pub struct RouterBuilder {
    leds: Option<Arc<dyn LedSetter>>,
    feedback: Option<LedFeedbackController>,
    keys: Option<Arc<dyn KeySink>>,
    midi: Option<Arc<dyn MidiSink>>,
    rotary: Option<Arc<dyn RotarySink>>,
    pad_banks: HashMap<u8, PadBank>,
}

impl RouterBuilder {
    pub fn led_setter(mut self, leds: Arc<dyn LedSetter>) -> Self {
        self.leds = Some(leds);
        self
    }

    pub fn feedback(mut self, feedback: LedFeedbackController) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn key_sink(mut self, keys: Arc<dyn KeySink>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn midi_sink(mut self, midi: Arc<dyn MidiSink>) -> Self {
        self.midi = Some(midi);
        self
    }

    pub fn rotary_sink(mut self, rotary: Arc<dyn RotarySink>) -> Self {
        self.rotary = Some(rotary);
        self
    }

    /// Register a pad bank. A later registration for the same id replaces the earlier one.
    pub fn pad_bank(mut self, bank: u8, note_offset: i32, accent: Rgb) -> Self {
        self.pad_banks.insert(bank, PadBank { note_offset, accent });
        self
    }

    pub fn build(self) -> Result<InputEventRouter, RouterError> {
        Ok(InputEventRouter {
            leds: self.leds.ok_or(RouterError::MissingCapability("led setter"))?,
            feedback: self
                .feedback
                .ok_or(RouterError::MissingCapability("led feedback controller"))?,
            keys: self.keys.ok_or(RouterError::MissingCapability("key sink"))?,
            midi: self.midi.ok_or(RouterError::MissingCapability("midi sink"))?,
            rotary: self.rotary.ok_or(RouterError::MissingCapability("rotary sink"))?,
            pad_banks: self.pad_banks,
        })
    }
}

/// Stateless translator from widget events to logical events
pub struct InputEventRouter {
    leds: Arc<dyn LedSetter>,
    feedback: LedFeedbackController,
    keys: Arc<dyn KeySink>,
    midi: Arc<dyn MidiSink>,
    rotary: Arc<dyn RotarySink>,
    pad_banks: HashMap<u8, PadBank>,
}

impl InputEventRouter {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    pub fn pad_bank(&self, bank: u8) -> Option<&PadBank> {
        self.pad_banks.get(&bank)
    }

    /// Button row and shift handling
    ///
    /// The key event is always dispatched before the LED write.
    pub fn on_button_event(&self, widget: &Widget, state: PressState) {
        let key = match widget.topology {
            Topology::Shift => LogicalKey::Shift,
            Topology::ButtonRow => match button_row_key(widget.coord.x) {
                Some(key) => key,
                None => {
                    trace!("Ignoring unmapped button {}", widget);
                    return;
                }
            },
            _ => {
                trace!("Ignoring button event from {}", widget);
                return;
            }
        };

        if key == LogicalKey::Shift {
            info!("Shift {}", if state.is_pressed() { "pressed" } else { "released" });
        } else {
            debug!("Button {} → {} ({:?})", widget, key, state);
        }

        match state {
            PressState::Pressed => self.keys.keypress(key),
            PressState::Released => self.keys.keyrelease(key),
        }

        // Shift has no row LED
        if widget.topology == Topology::ButtonRow {
            self.write_led(self.feedback.button(widget, state));
        }
    }

    /// Pad hit or release: note event first, then the pad LED
    pub fn on_pressure_pad_event(&self, widget: &Widget, state: PadState) {
        let Topology::Pads(bank_id) = widget.topology else {
            trace!("Ignoring pad event from {}", widget);
            return;
        };
        let Some(bank) = self.pad_banks.get(&bank_id) else {
            trace!("Ignoring pad event from unknown bank {}", bank_id);
            return;
        };
        let Some(note) = bank.note_for(widget) else {
            trace!("Pad {} maps outside the MIDI note range", widget);
            return;
        };

        let event = match state.press {
            PressState::Pressed => NoteEvent::NoteOn {
                note,
                velocity: state.velocity,
            },
            PressState::Released => NoteEvent::NoteOff {
                note,
                velocity: state.velocity,
            },
        };
        debug!("Pad {} → {}", widget, event);

        self.midi.send_midi_event(event);
        self.write_led(self.feedback.pad(widget, state.press, bank.accent));
    }

    /// Pressure stream after the hit: accepted, not acted upon
    pub fn on_pad_pressure(&self, widget: &Widget, pressure: u32) {
        trace!("Pad pressure {} on {}", pressure, widget);
    }

    /// Forward an encoder delta unmodified to its rotary channel
    pub fn on_encoder_increment(&self, widget: &Widget, delta: i32) {
        let Some(channel) = encoder_channel(widget.coord.x) else {
            trace!("Ignoring increment {} from unmapped encoder {}", delta, widget);
            return;
        };
        debug!("Encoder {} → {:?} {:+}", widget, channel, delta);
        self.rotary.rotary(RotaryEvent { channel, delta });
    }

    pub fn on_encoder_touch(&self, widget: &Widget, state: TouchState) {
        debug!("Encoder touch {} on {}", state, widget);
    }

    pub fn on_touch_surface_state(&self, widget: &Widget, state: TouchState) {
        debug!("Touch strip {} on {}", state, widget);
    }

    pub fn on_touch_surface_position(&self, widget: &Widget, point: TouchPoint) {
        debug!(
            "Touch strip position {} {} pressure {} on {}",
            point.pos.x, point.pos.y, point.pressure, widget
        );
    }

    fn write_led(&self, write: Option<LedWrite>) {
        if let Some(LedWrite { address, color }) = write {
            self.leds.set_led(address, color);
        }
    }
}

impl ButtonCallback for InputEventRouter {
    fn on_button(&self, widget: &Widget, state: PressState) {
        self.on_button_event(widget, state);
    }
}

impl PadCallback for InputEventRouter {
    fn on_pad(&self, widget: &Widget, state: PadState) {
        self.on_pressure_pad_event(widget, state);
    }

    fn on_pad_pressure(&self, widget: &Widget, pressure: u32) {
        InputEventRouter::on_pad_pressure(self, widget, pressure);
    }
}

impl EncoderCallback for InputEventRouter {
    fn on_encoder_increment(&self, widget: &Widget, delta: i32) {
        InputEventRouter::on_encoder_increment(self, widget, delta);
    }

    fn on_encoder_touch(&self, widget: &Widget, state: TouchState) {
        InputEventRouter::on_encoder_touch(self, widget, state);
    }
}

impl TouchSurfaceCallback for InputEventRouter {
    fn on_touch_state(&self, widget: &Widget, state: TouchState) {
        self.on_touch_surface_state(widget, state);
    }

    fn on_touch_position(&self, widget: &Widget, point: TouchPoint) {
        self.on_touch_surface_position(widget, point);
    }
}
