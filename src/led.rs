//! LED feedback mapping
//!
//! Pure mapping from `(widget, logical state)` to a concrete LED write. Nothing
//! is cached here: the only LED state that exists is the controller's own
//! output register, so every call recomputes address and colour from scratch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::events::RotaryChannel;
use crate::widget::{PressState, Topology, Widget};

/// RGB colour triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(c: Rgb) -> Self {
        [c.r, c.g, c.b]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Fixed palette. No interpolation, no timed effects.
pub mod palette {
    use super::Rgb;

    pub const BLACK: Rgb = Rgb::new(0x00, 0x00, 0x00);
    pub const WHITE: Rgb = Rgb::new(0xFF, 0xFF, 0xFF);
    pub const RED: Rgb = Rgb::new(0xFF, 0x00, 0x00);
    pub const GREEN: Rgb = Rgb::new(0x00, 0xFF, 0x00);
    pub const BLUE: Rgb = Rgb::new(0x00, 0x00, 0xFF);
    pub const AMBER: Rgb = Rgb::new(0xFB, 0xB8, 0x0B);
}

/// Transport-specific identifier of a single indicator light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedAddress {
    /// LED driven by a control change number
    Cc(u8),
    /// LED driven by a note number
    Note(u8),
}

impl fmt::Display for LedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedAddress::Cc(n) => write!(f, "cc{}", n),
            LedAddress::Note(n) => write!(f, "note{}", n),
        }
    }
}

/// Capability to set an LED colour, provided by the transport
pub trait LedSetter: Send + Sync {
    fn set_led(&self, address: LedAddress, color: Rgb);
}

/// Geometric mapping from widget identity to LED address
///
/// One implementation per hardware revision.
pub trait LedMap: Send + Sync {
    /// Returns `None` only for widgets that carry no LED or lie outside the
    /// physical layout.
    fn led_for(&self, widget: &Widget) -> Option<LedAddress>;
}

/// LED layout of the Push 2 surface
#[derive(Debug, Clone, Copy, Default)]
pub struct Push2LedMap;

impl Push2LedMap {
    /// First CC of the button row under the display
    pub const BUTTON_ROW_CC: u8 = 20;
    pub const SHIFT_CC: u8 = 49;
    /// Pad (0,0) is bottom-left, notes run left to right then upwards
    pub const PAD_BASE_NOTE: u8 = 36;
    pub const PAD_COLUMNS: i32 = 8;
    pub const PAD_ROWS: i32 = 8;
    /// Buttons above the display double as rotary channel indicators
    pub const CHANNEL_LED_CC: u8 = 102;
    pub const ROW_LEN: i32 = 8;
}

impl LedMap for Push2LedMap {
    fn led_for(&self, widget: &Widget) -> Option<LedAddress> {
        let Widget { topology, coord } = *widget;
        match topology {
            Topology::ButtonRow if (0..Self::ROW_LEN).contains(&coord.x) => {
                Some(LedAddress::Cc(Self::BUTTON_ROW_CC + coord.x as u8))
            }
            Topology::Shift => Some(LedAddress::Cc(Self::SHIFT_CC)),
            Topology::Pads(_)
                if (0..Self::PAD_COLUMNS).contains(&coord.x)
                    && (0..Self::PAD_ROWS).contains(&coord.y) =>
            {
                let offset = coord.y * Self::PAD_COLUMNS + coord.x;
                Some(LedAddress::Note(Self::PAD_BASE_NOTE + offset as u8))
            }
            Topology::ChannelLed if (0..4).contains(&coord.x) => {
                Some(LedAddress::Cc(Self::CHANNEL_LED_CC + coord.x as u8))
            }
            _ => None,
        }
    }
}

/// Colours used for button feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LedColors {
    #[serde(default = "default_button_active")]
    pub button_active: Rgb,
    #[serde(default = "default_off")]
    pub off: Rgb,
}

impl Default for LedColors {
    fn default() -> Self {
        Self {
            button_active: default_button_active(),
            off: default_off(),
        }
    }
}

fn default_button_active() -> Rgb {
    palette::RED
}

fn default_off() -> Rgb {
    palette::BLACK
}

/// A resolved LED write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedWrite {
    pub address: LedAddress,
    pub color: Rgb,
}

/// Maps widget state to LED writes and issues them
#[derive(Clone)]
pub struct LedFeedbackController {
    map: Arc<dyn LedMap>,
    colors: LedColors,
}

impl LedFeedbackController {
    pub fn new(map: Arc<dyn LedMap>, colors: LedColors) -> Self {
        Self { map, colors }
    }

    /// Controller for the Push 2 layout
    pub fn push2(colors: LedColors) -> Self {
        Self::new(Arc::new(Push2LedMap), colors)
    }

    pub fn led_for(&self, widget: &Widget) -> Option<LedAddress> {
        self.map.led_for(widget)
    }

    /// Button feedback: active colour while pressed, off otherwise
    pub fn button(&self, widget: &Widget, state: PressState) -> Option<LedWrite> {
        let color = match state {
            PressState::Pressed => self.colors.button_active,
            PressState::Released => self.colors.off,
        };
        self.resolve(widget, color)
    }

    /// Pad feedback: the bank's accent colour while pressed, off otherwise
    pub fn pad(&self, widget: &Widget, state: PressState, accent: Rgb) -> Option<LedWrite> {
        let color = match state {
            PressState::Pressed => accent,
            PressState::Released => self.colors.off,
        };
        self.resolve(widget, color)
    }

    /// Indicator LED for a rotary channel, lit in the channel's colour
    pub fn channel_indicator(&self, channel: RotaryChannel) -> Option<LedWrite> {
        let widget = Widget::at(Topology::ChannelLed, channel.index() as i32);
        self.resolve(&widget, channel_color(channel))
    }

    fn resolve(&self, widget: &Widget, color: Rgb) -> Option<LedWrite> {
        self.map
            .led_for(widget)
            .map(|address| LedWrite { address, color })
    }
}

/// Colour identifying a rotary channel
pub fn channel_color(channel: RotaryChannel) -> Rgb {
    match channel {
        RotaryChannel::Blue => palette::BLUE,
        RotaryChannel::Green => palette::GREEN,
        RotaryChannel::Yellow => palette::AMBER,
        RotaryChannel::Red => palette::RED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_row_addresses() {
        let map = Push2LedMap;
        for x in 0..8 {
            assert_eq!(
                map.led_for(&Widget::at(Topology::ButtonRow, x)),
                Some(LedAddress::Cc(20 + x as u8))
            );
        }
        assert_eq!(map.led_for(&Widget::at(Topology::ButtonRow, 8)), None);
        assert_eq!(map.led_for(&Widget::at(Topology::ButtonRow, -1)), None);
    }

    #[test]
    fn test_pad_addresses_cover_grid() {
        let map = Push2LedMap;
        assert_eq!(map.led_for(&Widget::new(Topology::Pads(0), 0, 0)), Some(LedAddress::Note(36)));
        assert_eq!(map.led_for(&Widget::new(Topology::Pads(0), 7, 7)), Some(LedAddress::Note(99)));
        assert_eq!(map.led_for(&Widget::new(Topology::Pads(0), 3, 4)), Some(LedAddress::Note(71)));
        assert_eq!(map.led_for(&Widget::new(Topology::Pads(0), 8, 0)), None);
    }

    #[test]
    fn test_widgets_without_leds() {
        let map = Push2LedMap;
        assert_eq!(map.led_for(&Widget::at(Topology::Encoder, 0)), None);
        assert_eq!(map.led_for(&Widget::at(Topology::Display, 0)), None);
        assert_eq!(map.led_for(&Widget::at(Topology::TouchStrip, 0)), None);
    }

    #[test]
    fn test_button_colors_follow_press_state() {
        let ctl = LedFeedbackController::push2(LedColors::default());
        let w = Widget::at(Topology::ButtonRow, 2);

        let on = ctl.button(&w, PressState::Pressed).unwrap();
        assert_eq!(on.address, LedAddress::Cc(22));
        assert_eq!(on.color, palette::RED);

        let off = ctl.button(&w, PressState::Released).unwrap();
        assert_eq!(off.color, palette::BLACK);
    }

    #[test]
    fn test_pad_uses_accent_color() {
        let ctl = LedFeedbackController::push2(LedColors::default());
        let w = Widget::new(Topology::Pads(0), 1, 1);
        assert_eq!(ctl.pad(&w, PressState::Pressed, palette::BLUE).unwrap().color, palette::BLUE);
        assert_eq!(ctl.pad(&w, PressState::Released, palette::BLUE).unwrap().color, palette::BLACK);
    }

    #[test]
    fn test_channel_indicators() {
        let ctl = LedFeedbackController::push2(LedColors::default());
        let writes: Vec<LedWrite> = RotaryChannel::ALL
            .iter()
            .filter_map(|c| ctl.channel_indicator(*c))
            .collect();
        assert_eq!(writes.len(), 4);
        assert_eq!(writes[0].address, LedAddress::Cc(102));
        assert_eq!(writes[2].color, Rgb::new(0xFB, 0xB8, 0x0B));
        assert_eq!(writes[3].color, palette::RED);
    }

    #[test]
    fn test_rgb_yaml_form() {
        let c: Rgb = serde_yaml::from_str("[1, 2, 3]").unwrap();
        assert_eq!(c, Rgb::new(1, 2, 3));
        assert_eq!(c.to_string(), "#010203");
    }
}
