//! WS2812 pixel strip clocked out over SPI

use esp_idf_svc::hal::gpio::{AnyIOPin, OutputPin};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::spi::config::{Config as SpiConfig, DriverConfig};
use esp_idf_svc::hal::spi::{SpiAnyPins, SpiBusDriver, SpiDriver};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::sys::EspError;
use lighthouse_mcu::blink::PixelStrip;
use lighthouse_mcu::config::Rgb;
use lighthouse_mcu::error::SwitchError;
use smart_leds::{SmartLedsWrite, RGB8};
use ws2812_spi::prerendered::Ws2812;

/// Four SPI bits per data bit at 3.2 MHz give the 1.25 us WS2812 slot
const SPI_CLOCK: Hertz = Hertz(3_200_000);

/// Pre-rendered SPI bytes per pixel
const BYTES_PER_PIXEL: usize = 12;

type Bus = SpiBusDriver<'static, SpiDriver<'static>>;

pub struct Ws2812Strip {
    leds: Ws2812<'static, Bus>,
    pixels: Vec<RGB8>,
}

impl Ws2812Strip {
    pub fn new<S: SpiAnyPins>(
        spi: impl Peripheral<P = S> + 'static,
        data: impl Peripheral<P = impl OutputPin> + 'static,
        len: usize,
    ) -> Result<Self, EspError> {
        let driver = SpiDriver::new_without_sclk(spi, data, Option::<AnyIOPin>::None, &DriverConfig::new())?;
        let bus = SpiBusDriver::new(driver, &SpiConfig::new().baudrate(SPI_CLOCK))?;

        // the strip lives for the whole run
        let render = Box::leak(vec![0u8; len * BYTES_PER_PIXEL].into_boxed_slice());

        Ok(Self {
            leds: Ws2812::new(bus, render),
            pixels: vec![RGB8::default(); len],
        })
    }
}

// SAFETY: the bus is only driven by whichever task owns the strip, and the
// ESP-IDF SPI device handle is not tied to the task that created it
unsafe impl Send for Ws2812Strip {}

impl PixelStrip for Ws2812Strip {
    fn len(&self) -> usize {
        self.pixels.len()
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) -> Result<(), SwitchError> {
        let pixel = self
            .pixels
            .get_mut(index)
            .ok_or_else(|| SwitchError::Strip(format!("pixel {} out of range", index)))?;
        *pixel = RGB8 {
            r: color.r,
            g: color.g,
            b: color.b,
        };
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), SwitchError> {
        self.leds
            .write(self.pixels.iter().copied())
            .map_err(|e| SwitchError::Strip(format!("{:?}", e)))
    }
}
