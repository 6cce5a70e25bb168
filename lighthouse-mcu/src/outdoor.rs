//! Outdoor lamp
//!
//! Two PWM channels, each driven by its own worker that imitates a worn
//! bulb: steady at 90% most of the time, with an occasional burst of
//! random dips.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SwitchError;
use crate::light::Switch;

/// Percent chance per cycle that a burst starts
pub const FLICKER_CHANCE: u32 = 2;
/// Duty changes per burst
pub const FLICKER_STEPS: usize = 8;
/// Steady-state cycle length
pub const CYCLE: Duration = Duration::from_millis(100);

/// A PWM output with a fixed resolution
pub trait Dimmer: Send {
    fn max_duty(&self) -> u32;
    fn set_duty(&mut self, duty: u32) -> Result<(), SwitchError>;
}

/// Flicker parameters derived from a channel's resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flicker {
    normal: u32,
}

impl Flicker {
    pub fn new(max_duty: u32) -> Self {
        Self {
            normal: (u64::from(max_duty) * 9 / 10) as u32,
        }
    }

    /// Steady duty, 90% of max
    pub fn normal(&self) -> u32 {
        self.normal
    }

    pub fn should_flicker<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.gen_range(0..100) < FLICKER_CHANCE
    }

    /// One burst: each step a duty in [30%, 70%) of normal, held 20-69 ms
    pub fn burst<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<(u32, Duration)> {
        let low = self.normal * 3 / 10;
        let span = self.normal * 4 / 10;
        (0..FLICKER_STEPS)
            .map(|_| {
                let duty = low + if span > 0 { rng.gen_range(0..span) } else { 0 };
                let hold = Duration::from_millis(20 + rng.gen_range(0..50));
                (duty, hold)
            })
            .collect()
    }
}

fn run_channel<D: Dimmer>(mut dimmer: D, stop: Arc<AtomicBool>, mut rng: StdRng) -> D {
    let flicker = Flicker::new(dimmer.max_duty());

    while !stop.load(Ordering::Acquire) {
        if let Err(e) = dimmer.set_duty(flicker.normal()) {
            error!("Failed to set outdoor duty: {}", e);
        }

        if flicker.should_flicker(&mut rng) {
            for (duty, hold) in flicker.burst(&mut rng) {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                if let Err(e) = dimmer.set_duty(duty) {
                    error!("Failed to set outdoor duty: {}", e);
                }
                thread::sleep(hold);
            }
        }

        thread::sleep(CYCLE);
    }

    if let Err(e) = dimmer.set_duty(0) {
        warn!("Failed to switch outdoor channel off: {}", e);
    }
    dimmer
}

struct Channel<D> {
    name: &'static str,
    dimmer: Option<D>,
    worker: Option<JoinHandle<D>>,
}

pub struct OutdoorLamp<D> {
    channels: Vec<Channel<D>>,
    stop: Arc<AtomicBool>,
}

impl<D: Dimmer + 'static> OutdoorLamp<D> {
    pub fn new(left: D, right: D) -> Self {
        let channel = |name, dimmer| Channel {
            name,
            dimmer: Some(dimmer),
            worker: None,
        };
        Self {
            channels: vec![channel("left", left), channel("right", right)],
            stop: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<D: Dimmer + 'static> Switch for OutdoorLamp<D> {
    fn start(&mut self) -> Result<(), SwitchError> {
        if self.is_running() {
            return Ok(());
        }

        self.stop = Arc::new(AtomicBool::new(false));
        for channel in &mut self.channels {
            let Some(dimmer) = channel.dimmer.take() else {
                continue;
            };
            let stop = self.stop.clone();
            let rng = StdRng::from_entropy();
            let handle = thread::Builder::new()
                .name(format!("outdoor-{}", channel.name))
                .spawn(move || run_channel(dimmer, stop, rng))
                .inspect_err(|e| error!("Failed to create outdoor task {}: {}", channel.name, e))?;
            channel.worker = Some(handle);
        }

        info!("Outdoor lamp started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SwitchError> {
        self.stop.store(true, Ordering::Release);

        let mut result = Ok(());
        for channel in &mut self.channels {
            let Some(worker) = channel.worker.take() else {
                continue;
            };
            match worker.join() {
                Ok(dimmer) => channel.dimmer = Some(dimmer),
                Err(_) => {
                    error!("Outdoor task {} panicked", channel.name);
                    result = Err(SwitchError::Dimmer(format!("{} channel lost", channel.name)));
                }
            }
        }

        info!("Outdoor lamp stopped");
        result
    }

    fn is_running(&self) -> bool {
        self.channels.iter().any(|c| c.worker.is_some())
    }
}

impl<D> Drop for OutdoorLamp<D> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        for channel in &mut self.channels {
            if let Some(worker) = channel.worker.take() {
                let _ = worker.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDimmer;
    use std::time::Instant;

    #[test]
    fn normal_duty_is_ninety_percent() {
        assert_eq!(Flicker::new(1023).normal(), 920);
        assert_eq!(Flicker::new(1000).normal(), 900);
        assert_eq!(Flicker::new(0).normal(), 0);
    }

    #[test]
    fn burst_stays_in_range() {
        let flicker = Flicker::new(1023);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..20 {
            let burst = flicker.burst(&mut rng);
            assert_eq!(burst.len(), FLICKER_STEPS);
            for (duty, hold) in burst {
                assert!((276..276 + 368).contains(&duty), "duty {}", duty);
                assert!((20..70).contains(&(hold.as_millis() as u64)));
            }
        }
    }

    #[test]
    fn burst_on_dark_channel_does_not_panic() {
        let burst = Flicker::new(1).burst(&mut StdRng::seed_from_u64(1));
        assert!(burst.iter().all(|(duty, _)| *duty == 0));
    }

    #[test]
    fn flicker_is_rare() {
        let flicker = Flicker::new(1023);
        let mut rng = StdRng::seed_from_u64(42);
        let bursts = (0..10_000).filter(|_| flicker.should_flicker(&mut rng)).count();
        assert!((100..300).contains(&bursts), "bursts {}", bursts);
    }

    #[test]
    fn start_drives_both_channels_and_stop_turns_them_off() {
        let left = FakeDimmer::new(1023);
        let right = FakeDimmer::new(255);
        let mut lamp = OutdoorLamp::new(left.clone(), right.clone());

        lamp.start().unwrap();
        assert!(lamp.is_running());

        let deadline = Instant::now() + Duration::from_secs(5);
        while (left.duties().is_empty() || right.duties().is_empty()) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(left.duties()[0], 920);
        assert_eq!(right.duties()[0], 229);

        lamp.stop().unwrap();
        assert!(!lamp.is_running());
        assert_eq!(left.duties().last(), Some(&0));
        assert_eq!(right.duties().last(), Some(&0));
    }

    #[test]
    fn lamp_can_restart_after_stop() {
        let left = FakeDimmer::new(100);
        let mut lamp = OutdoorLamp::new(left.clone(), FakeDimmer::new(100));

        lamp.start().unwrap();
        lamp.stop().unwrap();
        let after_first = left.duties().len();

        lamp.start().unwrap();
        assert!(lamp.is_running());
        lamp.stop().unwrap();
        assert!(left.duties().len() > after_first);
    }
}
