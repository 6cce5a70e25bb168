//! Outdoor lamp channels on LEDC

use std::sync::Arc;

use esp_idf_svc::hal::gpio::OutputPin;
use esp_idf_svc::hal::ledc::config::TimerConfig;
use esp_idf_svc::hal::ledc::{LedcChannel, LedcDriver, LedcTimer, LedcTimerDriver, Resolution};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::sys::EspError;
use lighthouse_mcu::error::SwitchError;
use lighthouse_mcu::outdoor::Dimmer;

/// Shared 10-bit timer for both lamp channels
pub fn timer<T: LedcTimer + 'static>(
    timer: impl Peripheral<P = T> + 'static,
    frequency_hz: u32,
) -> Result<Arc<LedcTimerDriver<'static, T>>, EspError> {
    let config = TimerConfig::new()
        .frequency(Hertz(frequency_hz))
        .resolution(Resolution::Bits10);
    Ok(Arc::new(LedcTimerDriver::new(timer, &config)?))
}

pub struct LedcDimmer {
    driver: LedcDriver<'static>,
}

impl LedcDimmer {
    pub fn new<C: LedcChannel, T: LedcTimer<SpeedMode = C::SpeedMode> + 'static>(
        channel: impl Peripheral<P = C> + 'static,
        timer: Arc<LedcTimerDriver<'static, T>>,
        pin: impl Peripheral<P = impl OutputPin> + 'static,
    ) -> Result<Self, EspError> {
        let mut driver = LedcDriver::new(channel, timer, pin)?;
        driver.set_duty(0)?;
        Ok(Self { driver })
    }
}

impl Dimmer for LedcDimmer {
    fn max_duty(&self) -> u32 {
        self.driver.get_max_duty()
    }

    fn set_duty(&mut self, duty: u32) -> Result<(), SwitchError> {
        self.driver
            .set_duty(duty)
            .map_err(|e| SwitchError::Dimmer(e.to_string()))
    }
}
