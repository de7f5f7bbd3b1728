//! Controller transport boundary
//!
//! A transport delivers widget events, exposes the LED setter capability and
//! owns the render medium of the display. Input is pumped explicitly through
//! [`ControllerTransport::poll_events`], once per frame tick, so callbacks
//! always run on the render loop's thread in delivery order.

pub mod display;
pub mod push2;
pub mod sim;

use std::sync::Arc;
use tracing::trace;

use crate::callbacks::{ButtonCallback, EncoderCallback, PadCallback, TouchSurfaceCallback};
use crate::led::{LedAddress, LedSetter, Rgb};
use crate::widget::{PadState, PressState, TouchPoint, TouchState, Widget, WidgetSelector};

pub use display::RenderMedium;

/// What happened to a widget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Button(PressState),
    Pad(PadState),
    PadPressure(u32),
    EncoderIncrement(i32),
    EncoderTouch(TouchState),
    TouchState(TouchState),
    TouchPosition(TouchPoint),
}

/// One discrete input notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub widget: Widget,
    pub kind: InputKind,
}

impl InputEvent {
    pub fn new(widget: Widget, kind: InputKind) -> Self {
        Self { widget, kind }
    }
}

/// A registered handler for one event category
#[derive(Clone)]
pub enum Callback {
    Button(Arc<dyn ButtonCallback>),
    Pad(Arc<dyn PadCallback>),
    Encoder(Arc<dyn EncoderCallback>),
    TouchSurface(Arc<dyn TouchSurfaceCallback>),
}

/// Capabilities a controller transport offers to the core
pub trait ControllerTransport {
    /// Subscribe `callback` to every widget matched by `selector`
    fn register_callback(&mut self, callback: Callback, selector: WidgetSelector);

    /// Shared LED setter capability
    fn led_setter(&self) -> Arc<dyn LedSetter>;

    fn set_led(&self, address: LedAddress, color: Rgb) {
        self.led_setter().set_led(address, color);
    }

    /// Render medium of a display widget, if the transport has one
    fn render_medium(&mut self, display: &Widget) -> Option<&mut dyn RenderMedium>;

    /// Deliver all queued input to the registered callbacks, in arrival
    /// order, without blocking. Returns the number of events delivered.
    fn poll_events(&mut self) -> usize;
}

/// Selector-based callback registry shared by the transports
#[derive(Default, Clone)]
pub struct Dispatcher {
    registrations: Vec<(WidgetSelector, Callback)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: Callback, selector: WidgetSelector) {
        self.registrations.push((selector, callback));
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Invoke every matching callback of the event's category
    ///
    /// Returns how many callbacks saw the event.
    pub fn dispatch(&self, event: &InputEvent) -> usize {
        let widget = &event.widget;
        let mut delivered = 0;

        for (selector, callback) in &self.registrations {
            if !selector.matches(widget) {
                continue;
            }
            let handled = match (callback, event.kind) {
                (Callback::Button(cb), InputKind::Button(state)) => {
                    cb.on_button(widget, state);
                    true
                }
                (Callback::Pad(cb), InputKind::Pad(state)) => {
                    cb.on_pad(widget, state);
                    true
                }
                (Callback::Pad(cb), InputKind::PadPressure(pressure)) => {
                    cb.on_pad_pressure(widget, pressure);
                    true
                }
                (Callback::Encoder(cb), InputKind::EncoderIncrement(delta)) => {
                    cb.on_encoder_increment(widget, delta);
                    true
                }
                (Callback::Encoder(cb), InputKind::EncoderTouch(state)) => {
                    cb.on_encoder_touch(widget, state);
                    true
                }
                (Callback::TouchSurface(cb), InputKind::TouchState(state)) => {
                    cb.on_touch_state(widget, state);
                    true
                }
                (Callback::TouchSurface(cb), InputKind::TouchPosition(point)) => {
                    cb.on_touch_position(widget, point);
                    true
                }
                _ => false,
            };
            if handled {
                delivered += 1;
            }
        }

        if delivered == 0 {
            trace!("No callback registered for {:?} on {}", event.kind, widget);
        }
        delivered
    }
}

/// Register one router for every widget class it understands
pub fn register_router<T, R>(transport: &mut T, router: Arc<R>, pad_banks: impl IntoIterator<Item = u8>)
where
    T: ControllerTransport + ?Sized,
    R: ButtonCallback + PadCallback + EncoderCallback + TouchSurfaceCallback + 'static,
{
    use crate::widget::Topology;

    transport.register_callback(
        Callback::Button(router.clone()),
        WidgetSelector::All(Topology::ButtonRow),
    );
    transport.register_callback(
        Callback::Button(router.clone()),
        WidgetSelector::All(Topology::Shift),
    );
    for bank in pad_banks {
        transport.register_callback(
            Callback::Pad(router.clone()),
            WidgetSelector::All(Topology::Pads(bank)),
        );
    }
    transport.register_callback(
        Callback::Encoder(router.clone()),
        WidgetSelector::All(Topology::Encoder),
    );
    transport.register_callback(
        Callback::TouchSurface(router),
        WidgetSelector::All(Topology::TouchStrip),
    );
}
