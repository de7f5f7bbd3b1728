//! Application composition
//!
//! [`Workstation`] is the application the router feeds: it implements the
//! three sink capabilities and draws its own state onto the canvas.
//! [`ProcessLifecycle`] owns the global run flag.

use midir::{MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::canvas::{Surface, UiLayer};
use crate::events::{KeySink, LogicalKey, MidiSink, NoteEvent, RotaryChannel, RotaryEvent, RotarySink};
use crate::geometry::Rect;
use crate::led::{channel_color, Rgb};
use crate::midi::{format_hex, MidiMessage};
use crate::router::BUTTON_ROW_KEYS;
use crate::scheduler::{ExitReason, Lifecycle};
use crate::transport::push2::{find_port, TransportError};

/// Rotary values are clamped to this range for display
pub const ROTARY_RANGE: i32 = 127;

/// Observable application state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkstationState {
    pub held_keys: BTreeSet<LogicalKey>,
    /// Sounding notes and their velocity
    pub active_notes: BTreeMap<u8, u8>,
    pub rotary: [i32; 4],
}

impl WorkstationState {
    pub fn shift(&self) -> bool {
        self.held_keys.contains(&LogicalKey::Shift)
    }

    pub fn rotary(&self, channel: RotaryChannel) -> i32 {
        self.rotary[channel.index()]
    }
}

/// Application state shared between the sinks and the UI layer
#[derive(Clone, Default)]
pub struct Workstation {
    state: Arc<Mutex<WorkstationState>>,
    note_output: Option<Arc<dyn MidiSink>>,
}

impl Workstation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every note event to an external sink as well
    pub fn with_note_output(mut self, sink: Arc<dyn MidiSink>) -> Self {
        self.note_output = Some(sink);
        self
    }

    pub fn snapshot(&self) -> WorkstationState {
        self.state.lock().clone()
    }
}

impl KeySink for Workstation {
    fn keypress(&self, key: LogicalKey) {
        debug!("keypress {}", key);
        self.state.lock().held_keys.insert(key);
    }

    fn keyrelease(&self, key: LogicalKey) {
        debug!("keyrelease {}", key);
        self.state.lock().held_keys.remove(&key);
    }
}

impl MidiSink for Workstation {
    fn send_midi_event(&self, event: NoteEvent) {
        {
            let mut state = self.state.lock();
            match event {
                NoteEvent::NoteOn { note, velocity } => {
                    state.active_notes.insert(note, velocity);
                }
                NoteEvent::NoteOff { note, .. } => {
                    state.active_notes.remove(&note);
                }
            }
        }
        if let Some(output) = &self.note_output {
            output.send_midi_event(event);
        }
    }
}

impl RotarySink for Workstation {
    fn rotary(&self, event: RotaryEvent) {
        let mut state = self.state.lock();
        let value = &mut state.rotary[event.channel.index()];
        *value = (*value + event.delta).clamp(0, ROTARY_RANGE);
    }
}

fn rgba(color: Rgb) -> [u8; 4] {
    [color.r, color.g, color.b, 0xFF]
}

const KEY_HELD: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const KEY_IDLE: [u8; 4] = [0x30, 0x30, 0x30, 0xFF];
const NOTE_LIT: [u8; 4] = [0x00, 0xA0, 0xFF, 0xFF];

impl UiLayer for Workstation {
    /// Layout, top to bottom: four rotary bars, the key row, a 128-column
    /// note strip.
    fn draw(&mut self, surface: &mut dyn Surface) -> anyhow::Result<()> {
        let state = self.snapshot();
        let size = surface.size();
        let (w, h) = (size.width as i32, size.height as i32);

        let bars_h = h / 2;
        let bar_w = w / 4;
        for channel in RotaryChannel::ALL {
            let filled = bars_h * state.rotary(channel) / ROTARY_RANGE;
            let x = bar_w * channel.index() as i32;
            surface.fill_rect(
                Rect::new(x + 2, bars_h - filled, (bar_w - 4).max(0) as u32, filled as u32),
                rgba(channel_color(channel)),
            );
        }

        let key_y = bars_h + 4;
        let key_h = (h / 4 - 8).max(1);
        let key_w = w / BUTTON_ROW_KEYS.len() as i32;
        for (i, key) in BUTTON_ROW_KEYS.iter().enumerate() {
            let color = if state.held_keys.contains(key) {
                KEY_HELD
            } else {
                KEY_IDLE
            };
            surface.fill_rect(
                Rect::new(key_w * i as i32 + 2, key_y, (key_w - 4).max(0) as u32, key_h as u32),
                color,
            );
        }
        if state.shift() {
            surface.fill_rect(Rect::new(0, key_y - 2, w as u32, 2), KEY_HELD);
        }

        let strip_y = h * 3 / 4;
        let strip_h = h - strip_y;
        for (&note, &velocity) in &state.active_notes {
            let x = w * i32::from(note) / 128;
            let lit = (strip_h * i32::from(velocity) / 127).max(1);
            surface.fill_rect(
                Rect::new(x, h - lit, (w / 128).max(1) as u32, lit as u32),
                NOTE_LIT,
            );
        }

        Ok(())
    }
}

/// Global run flag plus the exit-once latch
#[derive(Debug)]
pub struct ProcessLifecycle {
    running: AtomicBool,
    exit: Mutex<Option<ExitReason>>,
}

impl ProcessLifecycle {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            exit: Mutex::new(None),
        }
    }

    /// Clear the run flag; the frame loop stops at the next tick boundary
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Run flag cleared");
        }
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        *self.exit.lock()
    }
}

impl Default for ProcessLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for ProcessLifecycle {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn exit(&self, reason: ExitReason) {
        let mut exit = self.exit.lock();
        if exit.is_some() {
            debug!("Exit already requested, ignoring {:?}", reason);
            return;
        }
        *exit = Some(reason);
        self.running.store(false, Ordering::SeqCst);
        info!("Exit requested: {:?}", reason);
    }
}

/// Forwards note events to an external MIDI output
pub struct MidiOutSink {
    conn: Mutex<MidiOutputConnection>,
    channel: u8,
}

impl MidiOutSink {
    pub fn connect(pattern: &str) -> Result<Self, TransportError> {
        let midi_out = MidiOutput::new("Push2-GW-Notes")?;
        let (port, name) = find_port(midi_out.ports(), |p| midi_out.port_name(p).ok(), pattern)
            .ok_or_else(|| TransportError::PortNotFound {
                direction: "output",
                pattern: pattern.to_string(),
            })?;
        let conn = midi_out
            .connect(&port, "Push2-GW-Notes")
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!("Note output connected: {}", name);

        Ok(Self {
            conn: Mutex::new(conn),
            channel: 0,
        })
    }
}

/// Channel-voice message for a note event
pub fn note_message(event: NoteEvent, channel: u8) -> MidiMessage {
    match event {
        NoteEvent::NoteOn { note, velocity } => MidiMessage::NoteOn {
            channel,
            note,
            velocity,
        },
        NoteEvent::NoteOff { note, velocity } => MidiMessage::NoteOff {
            channel,
            note,
            velocity,
        },
    }
}

impl MidiSink for MidiOutSink {
    fn send_midi_event(&self, event: NoteEvent) {
        let data = note_message(event, self.channel).encode();
        if let Err(e) = self.conn.lock().send(&data) {
            warn!("Failed to send {}: {}", event, e);
        } else {
            debug!("→ notes {}", format_hex(&data));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Canvas, RasterCanvas};
    use crate::geometry::Size;
    use crate::led::{palette, LedColors, LedFeedbackController};
    use crate::router::InputEventRouter;
    use crate::transport::sim::SimTransport;
    use crate::transport::{register_router, ControllerTransport};
    use crate::widget::{Topology, Widget};

    #[derive(Default)]
    struct NoteLog(Mutex<Vec<NoteEvent>>);

    impl MidiSink for NoteLog {
        fn send_midi_event(&self, event: NoteEvent) {
            self.0.lock().push(event);
        }
    }

    fn wired(workstation: &Workstation) -> SimTransport {
        let mut transport = SimTransport::new();
        let sink = Arc::new(workstation.clone());
        let router = InputEventRouter::builder()
            .led_setter(transport.led_setter())
            .feedback(LedFeedbackController::push2(LedColors::default()))
            .key_sink(sink.clone())
            .midi_sink(sink.clone())
            .rotary_sink(sink)
            .pad_bank(0, 60, palette::BLUE)
            .build()
            .unwrap();
        register_router(&mut transport, Arc::new(router), [0]);
        transport
    }

    #[test]
    fn test_workstation_tracks_input() {
        let workstation = Workstation::new();
        let mut transport = wired(&workstation);
        let handle = transport.handle();

        handle.press(Widget::at(Topology::ButtonRow, 2));
        handle.press(Widget::at(Topology::Shift, 0));
        handle.hit_pad(Widget::new(Topology::Pads(0), 3, 4), 100);
        handle.turn(1, 5);
        handle.turn(1, -2);
        transport.poll_events();

        let state = workstation.snapshot();
        assert!(state.held_keys.contains(&LogicalKey::Envelope));
        assert!(state.shift());
        assert_eq!(state.active_notes.get(&67), Some(&100));
        assert_eq!(state.rotary(RotaryChannel::Green), 3);

        handle.release(Widget::at(Topology::ButtonRow, 2));
        handle.release_pad(Widget::new(Topology::Pads(0), 3, 4), 0);
        transport.poll_events();

        let state = workstation.snapshot();
        assert!(!state.held_keys.contains(&LogicalKey::Envelope));
        assert!(state.active_notes.is_empty());
    }

    #[test]
    fn test_rotary_clamped() {
        let workstation = Workstation::new();
        workstation.rotary(RotaryEvent {
            channel: RotaryChannel::Red,
            delta: -10,
        });
        assert_eq!(workstation.snapshot().rotary(RotaryChannel::Red), 0);
        workstation.rotary(RotaryEvent {
            channel: RotaryChannel::Red,
            delta: 500,
        });
        assert_eq!(workstation.snapshot().rotary(RotaryChannel::Red), ROTARY_RANGE);
    }

    #[test]
    fn test_notes_forwarded_to_output() {
        let log = Arc::new(NoteLog::default());
        let workstation = Workstation::new().with_note_output(log.clone());
        workstation.send_midi_event(NoteEvent::NoteOn { note: 61, velocity: 9 });
        workstation.send_midi_event(NoteEvent::NoteOff { note: 61, velocity: 0 });
        assert_eq!(
            *log.0.lock(),
            vec![
                NoteEvent::NoteOn { note: 61, velocity: 9 },
                NoteEvent::NoteOff { note: 61, velocity: 0 }
            ]
        );
    }

    #[test]
    fn test_draw_shows_rotary_and_keys() {
        let mut workstation = Workstation::new();
        workstation.rotary(RotaryEvent {
            channel: RotaryChannel::Blue,
            delta: ROTARY_RANGE,
        });
        workstation.keypress(LogicalKey::Arpeggiator);

        let mut canvas = RasterCanvas::new(Size::new(80, 40));
        canvas.begin_frame().unwrap();
        workstation.draw(canvas.surface()).unwrap();

        // Full blue bar in the first quarter, empty green bar next to it
        assert_eq!(canvas.image().get_pixel(5, 10).0, [0, 0, 0xFF, 0xFF]);
        assert_eq!(canvas.image().get_pixel(25, 10).0, [0, 0, 0, 0xFF]);
        // First key held, second idle
        assert_eq!(canvas.image().get_pixel(4, 24).0, KEY_HELD);
        assert_eq!(canvas.image().get_pixel(14, 24).0, KEY_IDLE);
    }

    #[test]
    fn test_exit_signalled_once() {
        let lifecycle = ProcessLifecycle::new();
        assert!(lifecycle.is_running());
        lifecycle.exit(ExitReason::StartupFailed);
        lifecycle.exit(ExitReason::UiClosed);
        assert_eq!(lifecycle.exit_reason(), Some(ExitReason::StartupFailed));
        assert!(!lifecycle.is_running());
    }

    #[test]
    fn test_stop_clears_run_flag() {
        let lifecycle = ProcessLifecycle::new();
        lifecycle.stop();
        assert!(!lifecycle.is_running());
        assert_eq!(lifecycle.exit_reason(), None);
    }

    #[test]
    fn test_note_message() {
        assert_eq!(
            note_message(NoteEvent::NoteOn { note: 67, velocity: 100 }, 0).encode(),
            [0x90, 67, 100]
        );
        assert_eq!(
            note_message(NoteEvent::NoteOff { note: 67, velocity: 0 }, 1).encode(),
            [0x81, 67, 0]
        );
    }
}
