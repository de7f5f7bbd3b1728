//! Fixed-rate frame scheduler
//!
//! Drives draw → readback → stream → pace once per tick:
//! 1. record the tick start
//! 2. begin a canvas frame
//! 3. let the UI layer draw the application state
//! 4. end the frame
//! 5. pump local window events and the controller transport
//! 6. read the rendered pixels back into the reusable buffer
//! 7. stream the buffer to the display and flush it
//! 8. sleep for whatever is left of the frame period
//!
//! Shutdown is only observed between ticks. The loop stops when the canvas
//! asks to close or the application's run flag is cleared, and process exit
//! is signalled exactly once when the loop is left.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::canvas::{Canvas, UiLayer};
use crate::geometry::Rect;
use crate::transport::ControllerTransport;
use crate::widget::{Topology, Widget};

/// Display widget the frames are streamed to
pub const DISPLAY: Widget = Widget::at(Topology::Display, 0);

/// Why the process is asked to exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The render loop ended normally
    UiClosed,
    /// A required resource could not be acquired
    StartupFailed,
}

/// Process lifecycle capability
pub trait Lifecycle: Send + Sync {
    /// Global "is the application still running" flag
    fn is_running(&self) -> bool;

    /// Request process exit
    fn exit(&self, reason: ExitReason);
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to acquire canvas: {0:#}")]
    Canvas(anyhow::Error),
    #[error("transport has no render medium for {0}")]
    NoRenderMedium(Widget),
    #[error("invalid frame settings: {0}")]
    InvalidSettings(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    WindowClosed,
    RunFlagCleared,
}

/// Outcome of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub reason: StopReason,
}

/// Timing and placement of streamed frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSettings {
    pub rate_hz: u32,
    /// Destination rectangle on the remote display; its size is the canvas resolution
    pub dest: Rect,
}

impl FrameSettings {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.rate_hz.max(1)))
    }

    fn validate(&self) -> Result<(), SchedulerError> {
        if self.rate_hz == 0 {
            return Err(SchedulerError::InvalidSettings("rate_hz must be > 0".into()));
        }
        if self.dest.size.is_empty() {
            return Err(SchedulerError::InvalidSettings(format!(
                "canvas size {}x{} is empty",
                self.dest.size.width, self.dest.size.height
            )));
        }
        Ok(())
    }
}

/// Time left to sleep after a tick that took `elapsed`. Never negative.
pub fn pacing_delay(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

/// Signals process exit when dropped, so the signal fires exactly once on
/// every path out of the loop
struct ExitGuard {
    lifecycle: Arc<dyn Lifecycle>,
    reason: ExitReason,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.lifecycle.exit(self.reason);
    }
}

pub struct FrameScheduler<C, U, T> {
    settings: FrameSettings,
    canvas: C,
    ui: U,
    transport: T,
    lifecycle: Arc<dyn Lifecycle>,
    state: SchedulerState,
    pixels: Vec<u8>,
}

impl<C, U, T> FrameScheduler<C, U, T>
where
    C: Canvas,
    U: UiLayer,
    T: ControllerTransport,
{
    /// Acquire the canvas and check the transport
    ///
    /// Any failure here is fatal: it is logged, process exit is requested with
    /// [`ExitReason::StartupFailed`], and the error is returned.
    pub fn start(
        settings: FrameSettings,
        open_canvas: impl FnOnce() -> Result<C>,
        ui: U,
        mut transport: T,
        lifecycle: Arc<dyn Lifecycle>,
    ) -> Result<Self, SchedulerError> {
        let acquired = settings
            .validate()
            .and_then(|_| open_canvas().map_err(SchedulerError::Canvas))
            .and_then(|canvas| {
                if transport.render_medium(&DISPLAY).is_some() {
                    Ok(canvas)
                } else {
                    Err(SchedulerError::NoRenderMedium(DISPLAY))
                }
            });

        let canvas = match acquired {
            Ok(canvas) => canvas,
            Err(e) => {
                error!("Frame scheduler startup failed: {}", e);
                lifecycle.exit(ExitReason::StartupFailed);
                return Err(e);
            }
        };

        Ok(Self {
            settings,
            canvas,
            ui,
            transport,
            lifecycle,
            state: SchedulerState::Idle,
            pixels: Vec::new(),
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Run until the canvas closes or the run flag is cleared
    ///
    /// Consumes the scheduler: a stopped scheduler cannot be restarted
    /// without acquiring its resources again.
    pub async fn run(mut self) -> RunSummary {
        let _exit = ExitGuard {
            lifecycle: self.lifecycle.clone(),
            reason: ExitReason::UiClosed,
        };

        let period = self.settings.period();
        self.pixels = vec![0; self.settings.dest.size.buffer_len()];
        self.state = SchedulerState::Running;
        info!(
            "Frame loop running at {} Hz ({:?} period), {}x{} canvas",
            self.settings.rate_hz,
            period,
            self.settings.dest.size.width,
            self.settings.dest.size.height
        );

        let mut ticks = 0u64;
        let mut failed_ticks = 0u64;

        let reason = loop {
            if let Some(reason) = self.stop_requested() {
                break reason;
            }

            let started = Instant::now();
            if let Err(e) = self.tick() {
                failed_ticks += 1;
                warn!("Frame tick {} failed: {:#}", ticks, e);
            }
            ticks += 1;

            let delay = pacing_delay(period, started.elapsed());
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        };

        self.state = SchedulerState::Stopping;
        info!("Frame loop stopping ({:?}) after {} ticks", reason, ticks);
        self.pixels = Vec::new();
        self.state = SchedulerState::Stopped;
        debug!("Frame loop stopped");

        RunSummary {
            ticks,
            failed_ticks,
            reason,
        }
    }

    fn stop_requested(&self) -> Option<StopReason> {
        if self.canvas.should_close() {
            Some(StopReason::WindowClosed)
        } else if !self.lifecycle.is_running() {
            Some(StopReason::RunFlagCleared)
        } else {
            None
        }
    }

    /// One tick: every step runs to completion before the next one starts.
    /// Input is pumped even when drawing failed.
    fn tick(&mut self) -> Result<()> {
        let drawn = self.draw();

        self.canvas.poll_events();
        let handled = self.transport.poll_events();
        if handled > 0 {
            debug!("Dispatched {} controller events", handled);
        }

        drawn?;
        self.transfer()
    }

    fn draw(&mut self) -> Result<()> {
        self.canvas.begin_frame()?;
        let drawn = self.ui.draw(self.canvas.surface());
        // The frame is closed even if the UI failed halfway through
        self.canvas.end_frame()?;
        drawn
    }

    fn transfer(&mut self) -> Result<()> {
        let dest = self.settings.dest;
        self.canvas.read_pixels(dest.size, &mut self.pixels)?;

        let medium = self
            .transport
            .render_medium(&DISPLAY)
            .ok_or_else(|| anyhow!("render medium for {} went away", DISPLAY))?;
        medium.stream_to_sub_window(dest, &self.pixels)?;
        medium.flush_frame_buffer()
    }
}
