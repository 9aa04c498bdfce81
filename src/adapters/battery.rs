//! Battery voltage adapter.
//!
//! Implements [`BatteryPort`].  The divider is only powered while a sample
//! is taken: the enable pin is driven high, the ADC read, and the pin
//! driven low again.  The divider halves the battery voltage and the ADC
//! returns calibrated millivolts, so volts = mV / 500.
//!
//! The enable pin is any `embedded_hal` [`OutputPin`]; the converter is
//! anything that yields millivolts (on the device, a closure over an
//! `esp_idf_hal` one-shot ADC channel).

use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use crate::app::ports::BatteryPort;

/// Divider ratio times 1000 mV/V.
const MILLIVOLTS_PER_VOLT: f32 = 500.0;

/// One calibrated ADC conversion.
pub trait MillivoltSource {
    /// `None` when the conversion failed.
    fn read_millivolts(&mut self) -> Option<u16>;
}

impl<F> MillivoltSource for F
where
    F: FnMut() -> Option<u16>,
{
    fn read_millivolts(&mut self) -> Option<u16> {
        self()
    }
}

pub struct BatteryMonitor<EN: OutputPin, A: MillivoltSource> {
    enable: EN,
    adc: A,
}

impl<EN: OutputPin, A: MillivoltSource> BatteryMonitor<EN, A> {
    /// Takes ownership of the pin and leaves the divider unpowered.
    pub fn new(mut enable: EN, adc: A) -> Self {
        if enable.set_low().is_err() {
            warn!("Battery: cannot drive enable pin low");
        }
        Self { enable, adc }
    }
}

impl<EN: OutputPin, A: MillivoltSource> BatteryPort for BatteryMonitor<EN, A> {
    fn read_voltage(&mut self) -> f32 {
        if self.enable.set_high().is_err() {
            warn!("Battery: cannot power the divider");
        }
        let mv = self.adc.read_millivolts();
        if self.enable.set_low().is_err() {
            warn!("Battery: cannot drive enable pin low");
        }

        match mv {
            Some(mv) => {
                let volts = f32::from(mv) / MILLIVOLTS_PER_VOLT;
                debug!("Battery: {} mV -> {:.2} V", mv, volts);
                volts
            }
            None => {
                warn!("Battery: ADC conversion failed");
                0.0
            }
        }
    }

    fn prepare_for_deep_sleep(&mut self) {
        if self.enable.set_low().is_err() {
            warn!("Battery: cannot drive enable pin low");
        }
    }
}
