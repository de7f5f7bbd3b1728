//! Push2 GW
//!
//! Routes Push 2 style grid controller input to a music workstation and
//! streams the workstation's UI to the controller display at a fixed rate.

pub mod app;
pub mod callbacks;
pub mod canvas;
pub mod config;
pub mod events;
pub mod geometry;
pub mod led;
pub mod midi;
pub mod router;
pub mod scheduler;
pub mod transport;
pub mod widget;

#[cfg(test)]
mod testing;
