use super::HardwareError;
use rppal::gpio::{Gpio, InputPin};
use tracing::info;

pub trait ButtonInput: Send {
    /// Current level of the (already debounced) button.
    fn is_pressed(&mut self) -> bool;
}

/// Push button between a GPIO pin and ground, using the internal pull-up.
pub struct GpioButton {
    pin: InputPin,
}

impl GpioButton {
    pub fn open(bcm_pin: u8) -> Result<Self, HardwareError> {
        let pin = Gpio::new()?.get(bcm_pin)?.into_input_pullup();
        info!("Ticket button on GPIO {}", bcm_pin);
        Ok(Self { pin })
    }
}

impl ButtonInput for GpioButton {
    fn is_pressed(&mut self) -> bool {
        self.pin.is_low()
    }
}

/// Stand-in when GPIO is unavailable; never pressed.
#[derive(Debug, Default)]
pub struct NoButton;

impl ButtonInput for NoButton {
    fn is_pressed(&mut self) -> bool {
        false
    }
}
