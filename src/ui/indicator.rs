//! Indicator light outputs.
//!
//! The badge lit several LEDs together while someone was transmitting; here
//! that is any number of GPIO pins switched as one.

use color_eyre::eyre::{eyre, Result};
use rppal::gpio::{Gpio, OutputPin};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::Indicator;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// BCM pin numbers switched together
    pub pins: Vec<u8>,
    /// Drive pins low for "on"
    pub active_low: bool,
}

/// GPIO pins switched together through `rppal`.
pub struct GpioIndicator {
    pins: Vec<OutputPin>,
    active_low: bool,
}

impl GpioIndicator {
    pub fn new(config: &IndicatorConfig) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| eyre!("Failed to open GPIO: {}", e))?;
        let mut pins = Vec::with_capacity(config.pins.len());
        for &number in &config.pins {
            let pin = gpio
                .get(number)
                .map_err(|e| eyre!("Failed to claim GPIO {}: {}", number, e))?;
            pins.push(pin.into_output());
        }
        info!("Indicator on GPIO {:?}", config.pins);

        let mut indicator = Self {
            pins,
            active_low: config.active_low,
        };
        indicator.off();
        Ok(indicator)
    }

    fn set(&mut self, lit: bool) {
        let high = lit != self.active_low;
        for pin in &mut self.pins {
            if high {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }
    }
}

impl Indicator for GpioIndicator {
    fn on(&mut self) {
        self.set(true);
    }

    fn off(&mut self) {
        self.set(false);
    }
}

/// Used when no pins are configured.
#[derive(Debug, Default)]
pub struct NullIndicator;

impl Indicator for NullIndicator {
    fn on(&mut self) {
        debug!("Indicator on");
    }

    fn off(&mut self) {
        debug!("Indicator off");
    }
}

/// Picks GPIO when pins are configured, otherwise a no-op light.
pub fn from_config(config: &IndicatorConfig) -> Result<Box<dyn Indicator>> {
    if config.pins.is_empty() {
        Ok(Box::new(NullIndicator))
    } else {
        Ok(Box::new(GpioIndicator::new(config)?))
    }
}

impl<T: Indicator + ?Sized> Indicator for Box<T> {
    fn on(&mut self) {
        (**self).on();
    }

    fn off(&mut self) {
        (**self).off();
    }
}
