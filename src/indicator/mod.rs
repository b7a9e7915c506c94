use anyhow::Error;
use log::{debug, error};
use rgb::RGB8;

#[cfg(feature = "pi")]
use rppal::gpio::{Gpio, OutputPin};

#[cfg(feature = "pi")]
use crate::config::{IndicatorConfig, Pin};

/// Connectivity status shown on the strip. Idle doubles as the boot color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndicatorColor {
    Idle,
    Connected,
    Disconnected,
}

impl IndicatorColor {
    /// Fixed palette, dim on purpose so the strip is readable indoors
    pub fn rgb(self) -> RGB8 {
        match self {
            IndicatorColor::Idle => RGB8::new(0x08, 0x00, 0x00),
            IndicatorColor::Connected => RGB8::new(0x00, 0x08, 0x00),
            IndicatorColor::Disconnected => RGB8::new(0x08, 0x00, 0x00),
        }
    }
}

/// Boundary to whatever drives the physical pixels. A single atomic write of
/// one color across the whole strip.
pub trait IndicatorDriver: Send {
    fn update(&mut self, color: RGB8, pixels: usize) -> Result<(), Error>;
}

/// Driver that only logs. Used on platforms without indicator hardware.
pub struct NullIndicator;

impl IndicatorDriver for NullIndicator {
    fn update(&mut self, color: RGB8, pixels: usize) -> Result<(), Error> {
        debug!(
            "Indicator: ({}, {}, {}) across {} pixels",
            color.r, color.g, color.b, pixels
        );
        Ok(())
    }
}

/// RGB status LED on three GPIO lines
#[cfg(feature = "pi")]
pub struct GpioIndicator {
    red: OutputPin,
    green: OutputPin,
    blue: OutputPin,
}

#[cfg(feature = "pi")]
impl GpioIndicator {
    pub fn new(config: &IndicatorConfig) -> Result<Self, Error> {
        let gpio = Gpio::new()?;
        let get = |pin: &Pin| -> Result<OutputPin, Error> {
            let pin = match *pin {
                Pin::Physical(pin) => pin.into(),
                Pin::Gpio(pin) => pin,
                Pin::WiringPi(pin) => pin.into(),
            };
            Ok(gpio.get(pin.0)?.into_output())
        };
        Ok(Self {
            red: get(&config.red_pin)?,
            green: get(&config.green_pin)?,
            blue: get(&config.blue_pin)?,
        })
    }
}

#[cfg(feature = "pi")]
impl IndicatorDriver for GpioIndicator {
    fn update(&mut self, color: RGB8, _pixels: usize) -> Result<(), Error> {
        // Note; the LED is common-anode, so channels are inverted
        for (pin, level) in [
            (&mut self.red, color.r),
            (&mut self.green, color.g),
            (&mut self.blue, color.b),
        ] {
            match level {
                0 => pin.set_high(),
                _ => pin.set_low(),
            }
        }
        Ok(())
    }
}

/// Owns the driver and the fixed pixel count. `set` is best-effort: a driver
/// failure is logged and the caller carries on.
pub struct Indicator {
    driver: Box<dyn IndicatorDriver>,
    pixels: usize,
}

impl Indicator {
    pub fn new(driver: Box<dyn IndicatorDriver>, pixels: usize) -> Self {
        Self { driver, pixels }
    }

    pub fn set(&mut self, color: IndicatorColor) {
        // The write goes out even if the color is unchanged; the driver call
        // is idempotent at the hardware level
        if let Err(e) = self.driver.update(color.rgb(), self.pixels) {
            error!("Indicator: failed to set {:?}: {}", color, e);
        }
    }
}
