//! Beacon tick source: a general purpose timer whose interrupt gives a
//! FreeRTOS binary semaphore.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use esp_idf_svc::hal::delay::BLOCK;
use esp_idf_svc::hal::interrupt;
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::task;
use esp_idf_svc::hal::timer::config::Config as TimerConfig;
use esp_idf_svc::hal::timer::{Timer, TimerDriver};
use esp_idf_svc::sys::{self, EspError};
use lighthouse_mcu::blink::{Alarm, HandOff};
use lighthouse_mcu::error::SwitchError;

fn alarm_error(e: EspError) -> SwitchError {
    SwitchError::Alarm(e.to_string())
}

/// [`HandOff`] backed by a binary semaphore; a give on a full semaphore
/// is a no-op, so ticks coalesce.
pub struct Semaphore {
    handle: sys::QueueHandle_t,
    closed: AtomicBool,
}

// SAFETY: FreeRTOS queue handles may be used from any task or ISR
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub fn new() -> Result<Self, SwitchError> {
        let handle = unsafe { sys::xQueueGenericCreate(1, 0, sys::queueQUEUE_TYPE_BINARY_SEMAPHORE as u8) };
        if handle.is_null() {
            return Err(SwitchError::Alarm("failed to create semaphore".into()));
        }
        Ok(Self {
            handle,
            closed: AtomicBool::new(false),
        })
    }

    fn give(&self) {
        if interrupt::active() {
            let mut woken: sys::BaseType_t = 0;
            unsafe { sys::xQueueGiveFromISR(self.handle, &mut woken) };
            if woken != 0 {
                task::do_yield();
            }
        } else {
            unsafe {
                sys::xQueueGenericSend(self.handle, std::ptr::null(), 0, sys::queueSEND_TO_BACK as i32);
            }
        }
    }
}

impl HandOff for Semaphore {
    fn ring(&self) {
        self.give();
    }

    fn wait(&self) -> bool {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return false;
            }
            if unsafe { sys::xQueueSemaphoreTake(self.handle, BLOCK) } != 0 {
                return !self.closed.load(Ordering::Acquire);
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.give();
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { sys::vQueueDelete(self.handle) };
    }
}

/// Auto-reloading alarm ringing `handoff` once per period
pub struct TimerAlarm {
    timer: TimerDriver<'static>,
}

impl TimerAlarm {
    pub fn new<T: Timer>(
        timer: impl Peripheral<P = T> + 'static,
        period_ms: u64,
        handoff: Arc<dyn HandOff>,
    ) -> Result<Self, EspError> {
        let mut timer = TimerDriver::new(timer, &TimerConfig::new().auto_reload(true))?;
        timer.set_alarm(timer.tick_hz() * period_ms / 1000)?;
        // SAFETY: the callback only gives a semaphore, which is ISR safe
        unsafe { timer.subscribe(move || handoff.ring())? };
        timer.enable_interrupt()?;
        timer.enable_alarm(true)?;
        Ok(Self { timer })
    }
}

impl Alarm for TimerAlarm {
    fn start(&mut self) -> Result<(), SwitchError> {
        self.timer.set_counter(0).map_err(alarm_error)?;
        self.timer.enable(true).map_err(alarm_error)
    }

    fn stop(&mut self) -> Result<(), SwitchError> {
        self.timer.enable(false).map_err(alarm_error)
    }
}
