//! Beacon blink engine
//!
//! A periodic hardware alarm rings a [`HandOff`] from interrupt context.
//! One consumer task waits on it, flips the phase and repaints the strip.
//! The interrupt side does nothing else: no I/O, no allocation, no locks
//! a task could be holding.
//!
//! Rings coalesce. If the consumer is slow, extra ticks are dropped rather
//! than queued, so the strip always shows the latest phase and never
//! replays a burst of stale blinks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use log::*;

use crate::config::Rgb;
use crate::error::SwitchError;
use crate::light::Switch;

/// Single-slot notification from an interrupt to one waiting task
pub trait HandOff: Send + Sync {
    /// Mark the slot pending and wake the waiter. Must be callable from
    /// interrupt context; ringing an already pending slot does nothing.
    fn ring(&self);

    /// Block until rung, consuming the pending signal. Returns `false`
    /// once closed.
    fn wait(&self) -> bool;

    /// Wake the waiter for good
    fn close(&self);
}

#[derive(Default)]
struct Bell {
    pending: bool,
    closed: bool,
}

/// [`HandOff`] for hosts with real threads
#[derive(Default)]
pub struct Doorbell {
    bell: Mutex<Bell>,
    cvar: Condvar,
}

impl Doorbell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.bell.lock().unwrap_or_else(PoisonError::into_inner).pending
    }
}

impl HandOff for Doorbell {
    fn ring(&self) {
        let mut bell = self.bell.lock().unwrap_or_else(PoisonError::into_inner);
        bell.pending = true;
        self.cvar.notify_one();
    }

    fn wait(&self) -> bool {
        let mut bell = self.bell.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if bell.closed {
                return false;
            }
            if bell.pending {
                bell.pending = false;
                return true;
            }
            bell = self.cvar.wait(bell).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn close(&self) {
        let mut bell = self.bell.lock().unwrap_or_else(PoisonError::into_inner);
        bell.closed = true;
        self.cvar.notify_all();
    }
}

/// Periodic hardware alarm. Each expiry rings the hand-off it was built
/// with.
pub trait Alarm: Send {
    fn start(&mut self) -> Result<(), SwitchError>;
    fn stop(&mut self) -> Result<(), SwitchError>;
}

/// Addressable pixel strip
pub trait PixelStrip: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) -> Result<(), SwitchError>;

    /// Push the buffered colours out to the LEDs
    fn refresh(&mut self) -> Result<(), SwitchError>;
}

/// Paint every pixel `color` and refresh
pub fn fill<S: PixelStrip + ?Sized>(strip: &mut S, color: Rgb) -> Result<(), SwitchError> {
    for i in 0..strip.len() {
        strip.set_pixel(i, color)?;
    }
    strip.refresh()
}

/// Power-up pattern: odd pixels `color`, even pixels off
pub fn idle_pattern<S: PixelStrip + ?Sized>(strip: &mut S, color: Rgb) -> Result<(), SwitchError> {
    for i in 0..strip.len() {
        strip.set_pixel(i, if i % 2 == 1 { color } else { Rgb::OFF })?;
    }
    strip.refresh()
}

/// The consumer side: owns the strip, never touches settings
pub struct BlinkTask<S> {
    handoff: Arc<dyn HandOff>,
    strip: S,
    lit: Arc<AtomicBool>,
    color: Rgb,
}

impl<S: PixelStrip> BlinkTask<S> {
    pub fn new(handoff: Arc<dyn HandOff>, strip: S, lit: Arc<AtomicBool>, color: Rgb) -> Self {
        Self {
            handoff,
            strip,
            lit,
            color,
        }
    }

    /// Flip the phase and repaint. Returns the new phase.
    pub fn step(&mut self) -> Result<bool, SwitchError> {
        let on = !self.lit.fetch_xor(true, Ordering::AcqRel);
        fill(&mut self.strip, if on { self.color } else { Rgb::OFF })?;
        debug!("Beacon now {}", if on { "ON" } else { "OFF" });
        Ok(on)
    }

    pub fn run(mut self) {
        while self.handoff.wait() {
            if let Err(e) = self.step() {
                error!("Failed to paint beacon: {}", e);
            }
        }
        info!("Beacon task stopped");
    }
}

struct Engine {
    alarm: Box<dyn Alarm>,
    handoff: Arc<dyn HandOff>,
    task: Option<JoinHandle<()>>,
}

/// `Stopped -> Running` on start, back on stop. Starting before
/// [`BlinkEngine::init`] fails with [`SwitchError::NotInitialized`].
#[derive(Default)]
pub struct BlinkEngine {
    engine: Option<Engine>,
    lit: Arc<AtomicBool>,
    running: bool,
}

impl BlinkEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of the alarm and strip and spawn the consumer task
    pub fn init<S: PixelStrip + 'static>(
        &mut self,
        alarm: Box<dyn Alarm>,
        handoff: Arc<dyn HandOff>,
        strip: S,
        color: Rgb,
    ) -> Result<(), SwitchError> {
        let task = BlinkTask::new(handoff.clone(), strip, self.lit.clone(), color);
        let handle = thread::Builder::new()
            .name("beacon".into())
            .spawn(move || task.run())
            .inspect_err(|e| error!("Failed to create beacon task: {}", e))?;

        self.engine = Some(Engine {
            alarm,
            handoff,
            task: Some(handle),
        });
        info!("Beacon initialized");
        Ok(())
    }

    /// Current phase, as last painted
    pub fn is_lit(&self) -> bool {
        self.lit.load(Ordering::Acquire)
    }

    /// Stop the alarm and join the consumer task
    pub fn deinit(&mut self) {
        let Some(mut engine) = self.engine.take() else {
            return;
        };
        if let Err(e) = engine.alarm.stop() {
            warn!("Failed to stop beacon alarm: {}", e);
        }
        self.running = false;
        engine.handoff.close();
        if let Some(task) = engine.task.take() {
            if task.join().is_err() {
                error!("Beacon task panicked");
            }
        }
    }

    fn engine(&mut self) -> Result<&mut Engine, SwitchError> {
        self.engine.as_mut().ok_or_else(|| {
            error!("Beacon alarm not initialized");
            SwitchError::NotInitialized
        })
    }
}

impl Switch for BlinkEngine {
    fn start(&mut self) -> Result<(), SwitchError> {
        self.engine()?.alarm.start().inspect_err(|e| {
            error!("Failed to start beacon alarm: {}", e);
        })?;
        self.running = true;
        info!("Beacon alarm started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SwitchError> {
        self.engine()?.alarm.stop().inspect_err(|e| {
            error!("Failed to stop beacon alarm: {}", e);
        })?;
        self.running = false;
        info!("Beacon alarm stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

impl Drop for BlinkEngine {
    fn drop(&mut self) {
        self.deinit();
    }
}
