//! Per-category input callback interfaces
//!
//! The transport invokes these synchronously while it pumps events. One type
//! (the router) implements all of them; the transport only sees the category
//! it registered the handler for.

use crate::widget::{PadState, PressState, TouchPoint, TouchState, Widget};

/// Momentary buttons
pub trait ButtonCallback: Send + Sync {
    fn on_button(&self, widget: &Widget, state: PressState);
}

/// Velocity-sensitive pads
pub trait PadCallback: Send + Sync {
    fn on_pad(&self, widget: &Widget, state: PadState);

    /// Continuous pressure after the initial hit
    fn on_pad_pressure(&self, _widget: &Widget, _pressure: u32) {}
}

/// Rotary encoders
pub trait EncoderCallback: Send + Sync {
    fn on_encoder_increment(&self, widget: &Widget, delta: i32);

    fn on_encoder_touch(&self, _widget: &Widget, _state: TouchState) {}
}

/// Capacitive touch strip
pub trait TouchSurfaceCallback: Send + Sync {
    fn on_touch_state(&self, widget: &Widget, state: TouchState);

    fn on_touch_position(&self, widget: &Widget, point: TouchPoint);
}
