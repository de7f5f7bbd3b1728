//! In-memory simulated controller
//!
//! Input is injected through a [`SimHandle`] and delivered on the next
//! `poll_events`. LED writes land in a register map that mirrors what the
//! hardware's own output register would hold.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

use super::{Callback, ControllerTransport, Dispatcher, InputEvent, InputKind, RenderMedium};
use crate::led::{LedAddress, LedSetter, Rgb};
use crate::widget::{PadState, PressState, Topology, Widget, WidgetSelector};

/// LED output register of the simulated surface
#[derive(Default)]
pub struct SimLeds {
    register: Mutex<HashMap<LedAddress, Rgb>>,
}

impl SimLeds {
    pub fn get(&self, address: LedAddress) -> Option<Rgb> {
        self.register.lock().get(&address).copied()
    }

    /// Addresses currently showing something other than `off`
    pub fn lit(&self, off: Rgb) -> Vec<LedAddress> {
        let mut lit: Vec<LedAddress> = self
            .register
            .lock()
            .iter()
            .filter(|(_, c)| **c != off)
            .map(|(a, _)| *a)
            .collect();
        lit.sort_by_key(|a| format!("{a}"));
        lit
    }
}

impl LedSetter for SimLeds {
    fn set_led(&self, address: LedAddress, color: Rgb) {
        debug!("sim LED {} = {}", address, color);
        self.register.lock().insert(address, color);
    }
}

/// Cloneable injector for simulated input
#[derive(Clone, Default)]
pub struct SimHandle {
    queue: Arc<Mutex<VecDeque<InputEvent>>>,
}

impl SimHandle {
    pub fn inject(&self, event: InputEvent) {
        self.queue.lock().push_back(event);
    }

    pub fn press(&self, widget: Widget) {
        self.inject(InputEvent::new(widget, InputKind::Button(PressState::Pressed)));
    }

    pub fn release(&self, widget: Widget) {
        self.inject(InputEvent::new(widget, InputKind::Button(PressState::Released)));
    }

    pub fn hit_pad(&self, widget: Widget, velocity: u8) {
        self.inject(InputEvent::new(
            widget,
            InputKind::Pad(PadState {
                press: PressState::Pressed,
                velocity,
            }),
        ));
    }

    pub fn release_pad(&self, widget: Widget, velocity: u8) {
        self.inject(InputEvent::new(
            widget,
            InputKind::Pad(PadState {
                press: PressState::Released,
                velocity,
            }),
        ));
    }

    pub fn turn(&self, encoder: i32, delta: i32) {
        self.inject(InputEvent::new(
            Widget::at(Topology::Encoder, encoder),
            InputKind::EncoderIncrement(delta),
        ));
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

pub struct SimTransport {
    handle: SimHandle,
    dispatcher: Dispatcher,
    leds: Arc<SimLeds>,
    medium: Option<Box<dyn RenderMedium>>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self {
            handle: SimHandle::default(),
            dispatcher: Dispatcher::new(),
            leds: Arc::new(SimLeds::default()),
            medium: None,
        }
    }

    pub fn with_render_medium(mut self, medium: Box<dyn RenderMedium>) -> Self {
        self.medium = Some(medium);
        self
    }

    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }

    pub fn leds(&self) -> Arc<SimLeds> {
        self.leds.clone()
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerTransport for SimTransport {
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
        match &mut self.medium {
            Some(medium) => Some(medium.as_mut()),
            None => None,
        }
    }

    fn poll_events(&mut self) -> usize {
        // Take the batch first so callbacks may inject follow-up input
        let batch: Vec<InputEvent> = self.handle.queue.lock().drain(..).collect();
        for event in &batch {
            self.dispatcher.dispatch(event);
        }
        batch.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogicalKey;
    use crate::led::{palette, LedColors, LedFeedbackController};
    use crate::router::InputEventRouter;
    use crate::testing::{Journal, Observed};
    use crate::transport::register_router;

    fn wired() -> (SimTransport, Journal) {
        let mut transport = SimTransport::new();
        let journal = Journal::new();
        let sinks = Arc::new(journal.clone());
        let router = InputEventRouter::builder()
            .led_setter(transport.led_setter())
            .feedback(LedFeedbackController::push2(LedColors::default()))
            .key_sink(sinks.clone())
            .midi_sink(sinks.clone())
            .rotary_sink(sinks)
            .pad_bank(0, 60, palette::BLUE)
            .build()
            .unwrap();
        register_router(&mut transport, Arc::new(router), [0]);
        (transport, journal)
    }

    #[test]
    fn test_events_wait_for_poll() {
        let (mut transport, journal) = wired();
        let handle = transport.handle();

        handle.press(Widget::at(Topology::ButtonRow, 6));
        assert!(journal.is_empty());
        assert_eq!(handle.pending(), 1);

        assert_eq!(transport.poll_events(), 1);
        assert_eq!(journal.take(), vec![Observed::KeyPress(LogicalKey::Sequencer)]);
        assert_eq!(transport.poll_events(), 0);
    }

    #[test]
    fn test_led_register_tracks_down_widgets() {
        let (mut transport, _journal) = wired();
        let handle = transport.handle();
        let leds = transport.leds();

        handle.press(Widget::at(Topology::ButtonRow, 0));
        handle.hit_pad(Widget::new(Topology::Pads(0), 2, 2), 80);
        transport.poll_events();
        assert_eq!(
            leds.lit(palette::BLACK),
            vec![LedAddress::Cc(20), LedAddress::Note(54)]
        );

        handle.release(Widget::at(Topology::ButtonRow, 0));
        handle.release_pad(Widget::new(Topology::Pads(0), 2, 2), 0);
        transport.poll_events();
        assert!(leds.lit(palette::BLACK).is_empty());
        assert_eq!(leds.get(LedAddress::Cc(20)), Some(palette::BLACK));
    }

    #[test]
    fn test_events_delivered_in_order() {
        let (mut transport, journal) = wired();
        let handle = transport.handle();

        handle.turn(1, 3);
        handle.turn(1, -2);
        handle.turn(0, 1);
        transport.poll_events();

        let deltas: Vec<i32> = journal
            .take()
            .into_iter()
            .filter_map(|e| match e {
                Observed::Rotary(r) => Some(r.delta),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec![3, -2, 1]);
    }

    #[test]
    fn test_render_medium_only_for_display() {
        let mut transport = SimTransport::new()
            .with_render_medium(Box::new(crate::transport::display::Push2Display::new(
                crate::transport::display::NullLink::default(),
            )));
        assert!(transport.render_medium(&crate::scheduler::DISPLAY).is_some());
        assert!(transport.render_medium(&Widget::at(Topology::Encoder, 0)).is_none());
    }
}
