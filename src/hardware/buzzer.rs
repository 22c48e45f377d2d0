use super::{HardwareError, Tone};
use rppal::gpio::{Gpio, OutputPin};
use tracing::{debug, info};

pub trait Buzzer: Send {
    fn start(&mut self, tone: Tone) -> Result<(), HardwareError>;
    fn stop(&mut self) -> Result<(), HardwareError>;
}

/// Piezo buzzer driven by software PWM on a GPIO pin.
pub struct GpioBuzzer {
    pin: OutputPin,
}

impl GpioBuzzer {
    pub fn open(bcm_pin: u8) -> Result<Self, HardwareError> {
        let pin = Gpio::new()?.get(bcm_pin)?.into_output_low();
        info!("Buzzer on GPIO {}", bcm_pin);
        Ok(Self { pin })
    }
}

impl Buzzer for GpioBuzzer {
    fn start(&mut self, tone: Tone) -> Result<(), HardwareError> {
        self.pin.set_pwm_frequency(tone.frequency_hz, 0.5)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HardwareError> {
        self.pin.clear_pwm()?;
        self.pin.set_low();
        Ok(())
    }
}

/// Used when no buzzer is wired up.
#[derive(Debug, Default)]
pub struct SilentBuzzer;

impl Buzzer for SilentBuzzer {
    fn start(&mut self, tone: Tone) -> Result<(), HardwareError> {
        debug!("Beep {} Hz for {:?}", tone.frequency_hz, tone.duration);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }
}
