//! Physical widget identity
//!
//! Every event coming from the controller carries a [`Widget`]: the class of
//! control it belongs to ([`Topology`]) plus its position inside that class
//! ([`Coord`]). Identity is produced by the transport and never mutated here.

use std::fmt;

/// Class of physical control on the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Row of eight momentary buttons under the display
    ButtonRow,
    /// The shift button (single instance, coordinate is meaningless)
    Shift,
    /// Velocity-sensitive pad grid, tagged with its bank id
    Pads(u8),
    /// Rotary encoder bank
    Encoder,
    /// Capacitive touch strip
    TouchStrip,
    /// Indicator LEDs showing the rotary channel colours
    ChannelLed,
    /// The bitmap display
    Display,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::ButtonRow => write!(f, "button-row"),
            Topology::Shift => write!(f, "shift"),
            Topology::Pads(bank) => write!(f, "pads[{}]", bank),
            Topology::Encoder => write!(f, "encoder"),
            Topology::TouchStrip => write!(f, "touch-strip"),
            Topology::ChannelLed => write!(f, "channel-led"),
            Topology::Display => write!(f, "display"),
        }
    }
}

/// 2-D position of a widget inside its topology class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Immutable identity of one physical control instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Widget {
    pub topology: Topology,
    pub coord: Coord,
}

impl Widget {
    pub const fn new(topology: Topology, x: i32, y: i32) -> Self {
        Self {
            topology,
            coord: Coord::new(x, y),
        }
    }

    /// Widget addressed by its x index only (rows, encoder banks)
    pub const fn at(topology: Topology, x: i32) -> Self {
        Self::new(topology, x, 0)
    }
}

impl fmt::Display for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.topology, self.coord.x, self.coord.y)
    }
}

/// Selects which widgets a callback subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetSelector {
    /// Every instance of a topology
    All(Topology),
    /// One specific widget
    One(Widget),
}

impl WidgetSelector {
    pub fn matches(&self, widget: &Widget) -> bool {
        match self {
            WidgetSelector::All(topology) => widget.topology == *topology,
            WidgetSelector::One(w) => w == widget,
        }
    }
}

/// Momentary button state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressState {
    Pressed,
    Released,
}

impl PressState {
    pub fn is_pressed(self) -> bool {
        matches!(self, PressState::Pressed)
    }
}

/// Pad press transition with its velocity (0-127)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadState {
    pub press: PressState,
    pub velocity: u8,
}

/// Capacitive touch state for encoders and the touch strip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchState {
    Touched,
    Released,
}

impl fmt::Display for TouchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TouchState::Touched => write!(f, "touched"),
            TouchState::Released => write!(f, "released"),
        }
    }
}

/// Touch strip contact point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchPoint {
    pub pos: Coord,
    pub pressure: u32,
}
