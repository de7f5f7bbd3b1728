//! Push 2 MIDI transport
//!
//! Buttons, pads, encoders and the touch strip arrive as MIDI on the
//! controller's "Live" port; LED colours go back as palette indices on the
//! same port. The display is fed by a separate [`RenderMedium`].

use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::{Callback, ControllerTransport, Dispatcher, InputEvent, InputKind, RenderMedium};
use crate::led::{palette, LedAddress, LedSetter, Rgb};
use crate::midi::{format_hex, relative_delta, MidiMessage};
use crate::widget::{Coord, PadState, PressState, Topology, TouchPoint, TouchState, Widget, WidgetSelector};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("MIDI {direction} port matching '{pattern}' not found")]
    PortNotFound {
        direction: &'static str,
        pattern: String,
    },
    #[error("MIDI init failed: {0}")]
    Init(#[from] midir::InitError),
    #[error("MIDI connect failed: {0}")]
    Connect(String),
    #[error("MIDI send failed: {0}")]
    Send(#[from] midir::SendError),
}

/// Push 2 MIDI layout
pub struct Layout;

impl Layout {
    /// Button row under the display
    pub const BUTTON_ROW_CC: std::ops::Range<u8> = 20..28;
    pub const SHIFT_CC: u8 = 49;
    /// Track encoders above the display
    pub const ENCODER_CC: std::ops::Range<u8> = 71..79;
    pub const ENCODER_TOUCH_NOTES: std::ops::Range<u8> = 0..8;
    pub const TOUCH_STRIP_NOTE: u8 = 12;
    pub const PAD_NOTES: std::ops::Range<u8> = 36..100;
    pub const PAD_COLUMNS: u8 = 8;

    /// Decode one MIDI message into a widget event
    pub fn decode(message: &MidiMessage) -> Option<InputEvent> {
        match *message {
            MidiMessage::ControlChange { cc, value, .. } => Self::decode_cc(cc, value),
            MidiMessage::NoteOn { note, velocity, .. } => {
                Self::decode_note(note, PressState::Pressed, velocity)
            }
            MidiMessage::NoteOff { note, velocity, .. } => {
                Self::decode_note(note, PressState::Released, velocity)
            }
            MidiMessage::PolyPressure { note, pressure, .. } if Self::PAD_NOTES.contains(&note) => {
                Some(InputEvent::new(Self::pad(note), InputKind::PadPressure(u32::from(pressure))))
            }
            MidiMessage::PitchBend { value, .. } => Some(InputEvent::new(
                Widget::at(Topology::TouchStrip, 0),
                InputKind::TouchPosition(TouchPoint {
                    pos: Coord::new(0, i32::from(value)),
                    pressure: 0,
                }),
            )),
            _ => None,
        }
    }

    fn decode_cc(cc: u8, value: u8) -> Option<InputEvent> {
        let press = if value > 0 {
            PressState::Pressed
        } else {
            PressState::Released
        };

        if Self::BUTTON_ROW_CC.contains(&cc) {
            let x = i32::from(cc - Self::BUTTON_ROW_CC.start);
            Some(InputEvent::new(Widget::at(Topology::ButtonRow, x), InputKind::Button(press)))
        } else if cc == Self::SHIFT_CC {
            Some(InputEvent::new(Widget::at(Topology::Shift, 0), InputKind::Button(press)))
        } else if Self::ENCODER_CC.contains(&cc) {
            let x = i32::from(cc - Self::ENCODER_CC.start);
            Some(InputEvent::new(
                Widget::at(Topology::Encoder, x),
                InputKind::EncoderIncrement(relative_delta(value)),
            ))
        } else {
            None
        }
    }

    fn decode_note(note: u8, press: PressState, velocity: u8) -> Option<InputEvent> {
        let touch = match press {
            PressState::Pressed => TouchState::Touched,
            PressState::Released => TouchState::Released,
        };

        if Self::PAD_NOTES.contains(&note) {
            Some(InputEvent::new(
                Self::pad(note),
                InputKind::Pad(PadState { press, velocity }),
            ))
        } else if Self::ENCODER_TOUCH_NOTES.contains(&note) {
            Some(InputEvent::new(
                Widget::at(Topology::Encoder, i32::from(note)),
                InputKind::EncoderTouch(touch),
            ))
        } else if note == Self::TOUCH_STRIP_NOTE {
            Some(InputEvent::new(
                Widget::at(Topology::TouchStrip, 0),
                InputKind::TouchState(touch),
            ))
        } else {
            None
        }
    }

    fn pad(note: u8) -> Widget {
        let offset = note - Self::PAD_NOTES.start;
        Widget::new(
            Topology::Pads(0),
            i32::from(offset % Self::PAD_COLUMNS),
            i32::from(offset / Self::PAD_COLUMNS),
        )
    }
}

/// Default colour palette indices of the controller
const LED_PALETTE: [(Rgb, u8); 6] = [
    (palette::BLACK, 0),
    (palette::AMBER, 7),
    (palette::WHITE, 122),
    (palette::BLUE, 125),
    (palette::GREEN, 126),
    (palette::RED, 127),
];

/// Nearest palette index for an RGB colour
pub fn palette_index(color: Rgb) -> u8 {
    let distance = |c: &Rgb| {
        let dr = i32::from(c.r) - i32::from(color.r);
        let dg = i32::from(c.g) - i32::from(color.g);
        let db = i32::from(c.b) - i32::from(color.b);
        dr * dr + dg * dg + db * db
    };
    LED_PALETTE
        .iter()
        .min_by_key(|(c, _)| distance(c))
        .map(|(_, index)| *index)
        .unwrap_or(0)
}

/// MIDI message that sets an LED
pub fn led_message(address: LedAddress, color: Rgb) -> MidiMessage {
    let index = palette_index(color);
    match address {
        LedAddress::Cc(cc) => MidiMessage::ControlChange {
            channel: 0,
            cc,
            value: index,
        },
        LedAddress::Note(note) if index == 0 => MidiMessage::NoteOff {
            channel: 0,
            note,
            velocity: 0,
        },
        LedAddress::Note(note) => MidiMessage::NoteOn {
            channel: 0,
            note,
            velocity: index,
        },
    }
}

/// LED setter writing to the controller's MIDI output
pub struct MidiLedPort {
    conn: Mutex<MidiOutputConnection>,
}

impl LedSetter for MidiLedPort {
    fn set_led(&self, address: LedAddress, color: Rgb) {
        let data = led_message(address, color).encode();
        if let Err(e) = self.conn.lock().send(&data) {
            warn!("Failed to set LED {}: {}", address, e);
        } else {
            trace!("LED {} = {} ({})", address, color, format_hex(&data));
        }
    }
}

/// Find a port by case-insensitive substring match
pub(crate) fn find_port<P>(
    ports: Vec<P>,
    name_of: impl Fn(&P) -> Option<String>,
    pattern: &str,
) -> Option<(P, String)> {
    let pattern = pattern.to_lowercase();
    ports.into_iter().find_map(|port| {
        let name = name_of(&port)?;
        if name.to_lowercase().contains(&pattern) {
            debug!("Found port '{}' matching pattern '{}'", name, pattern);
            Some((port, name))
        } else {
            None
        }
    })
}

/// Push 2 connected over MIDI
pub struct Push2Transport {
    _input: MidiInputConnection<()>,
    rx: mpsc::Receiver<Vec<u8>>,
    leds: Arc<MidiLedPort>,
    dispatcher: Dispatcher,
    medium: Box<dyn RenderMedium>,
}

impl Push2Transport {
    /// Open input and output ports whose names contain the given patterns
    pub fn connect(
        input_pattern: &str,
        output_pattern: &str,
        medium: Box<dyn RenderMedium>,
    ) -> Result<Self, TransportError> {
        info!(
            "Connecting to controller - Input: '{}', Output: '{}'",
            input_pattern, output_pattern
        );

        let midi_in = MidiInput::new("Push2-GW-Input")?;
        let (in_port, in_name) = find_port(midi_in.ports(), |p| midi_in.port_name(p).ok(), input_pattern)
            .ok_or_else(|| TransportError::PortNotFound {
                direction: "input",
                pattern: input_pattern.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(1024);
        let input = midi_in
            .connect(
                &in_port,
                "Push2-GW",
                move |_timestamp, data, _| {
                    // Never block the MIDI thread
                    if tx.try_send(data.to_vec()).is_err() {
                        warn!("Controller input queue full, dropping {}", format_hex(data));
                    }
                },
                (),
            )
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!("Connected to input port: {}", in_name);

        let midi_out = MidiOutput::new("Push2-GW-Output")?;
        let (out_port, out_name) =
            find_port(midi_out.ports(), |p| midi_out.port_name(p).ok(), output_pattern)
                .ok_or_else(|| TransportError::PortNotFound {
                    direction: "output",
                    pattern: output_pattern.to_string(),
                })?;
        let output = midi_out
            .connect(&out_port, "Push2-GW")
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!("Connected to output port: {}", out_name);

        Ok(Self {
            _input: input,
            rx,
            leds: Arc::new(MidiLedPort {
                conn: Mutex::new(output),
            }),
            dispatcher: Dispatcher::new(),
            medium,
        })
    }
}

impl ControllerTransport for Push2Transport {
    fn register_callback(&mut self, callback: Callback, selector: WidgetSelector) {
        self.dispatcher.register(callback, selector);
    }

    fn led_setter(&self) -> Arc<dyn LedSetter> {
        self.leds.clone()
    }

    fn render_medium(&mut self, display: &Widget) -> Option<&mut dyn RenderMedium> {
        if display.topology != Topology::Display {
            return None;
        }
        Some(self.medium.as_mut())
    }

    fn poll_events(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(raw) = self.rx.try_recv() {
            let Some(message) = MidiMessage::parse(&raw) else {
                trace!("Unsupported MIDI: {}", format_hex(&raw));
                continue;
            };
            match Layout::decode(&message) {
                Some(event) => {
                    self.dispatcher.dispatch(&event);
                    delivered += 1;
                }
                None => trace!("No widget for {}", message),
            }
        }
        delivered
    }
}

/// Port discovery utilities
pub mod discovery {
    use super::*;

    /// Information about a MIDI port
    #[derive(Debug, Clone)]
    pub struct PortInfo {
        pub name: String,
        pub is_virtual: bool,
    }

    fn is_virtual(name: &str) -> bool {
        name.contains("Virtual") || name.contains("loopMIDI") || name.contains("IAC")
    }

    pub fn discover_input_ports() -> Result<Vec<PortInfo>, TransportError> {
        let midi_in = MidiInput::new("Push2-GW-Discovery")?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|p| midi_in.port_name(p).ok())
            .map(|name| PortInfo {
                is_virtual: is_virtual(&name),
                name,
            })
            .collect())
    }

    pub fn discover_output_ports() -> Result<Vec<PortInfo>, TransportError> {
        let midi_out = MidiOutput::new("Push2-GW-Discovery")?;
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .map(|name| PortInfo {
                is_virtual: is_virtual(&name),
                name,
            })
            .collect())
    }

    /// Find the controller's "Live" ports automatically
    pub fn find_push2_ports() -> Option<(String, String)> {
        let inputs = discover_input_ports().ok()?;
        let outputs = discover_output_ports().ok()?;
        let matches = |p: &&PortInfo| p.name.contains("Push 2") && !p.name.contains("User");

        let input = inputs.iter().find(matches)?;
        let output = outputs.iter().find(matches)?;
        Some((input.name.clone(), output.name.clone()))
    }
}
