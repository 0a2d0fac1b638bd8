use crate::ftdaye::{ChipType, FtdiContext, FtdiError, Interface};

/// Byte-wide GPIO port as seen by the SWD executor.
///
/// The executor is written against this trait rather than the FTDI plumbing
/// so the clocking engine can be exercised against a scripted port in tests.
/// Semantics follow the bridge hardware: `set_direction` reconfigures the
/// pins selected by `mask` (1 = output), `write_port` latches a full output
/// byte, `read_port` samples the instantaneous pin levels.
pub trait GpioPort {
    fn set_direction(&mut self, mask: u8, value: u8) -> Result<(), FtdiError>;
    fn write_port(&mut self, value: u8) -> Result<(), FtdiError>;
    fn read_port(&mut self) -> Result<u8, FtdiError>;
}

/// An FTDI bridge interface in asynchronous bitbang mode.
///
/// Owns the claimed USB interface for its lifetime. All eight pins of the
/// selected port are driven as one byte; per-pin direction is tracked here
/// and pushed to the chip whenever it changes.
pub struct FtdiGpio {
    ft: FtdiContext,
    /// Direction mask currently programmed into the chip (1 = output).
    direction: u8,
}

impl FtdiGpio {
    /// Open `usb_device` and put `interface` into bitbang mode with the
    /// given initial direction mask.
    pub fn open(
        usb_device: &nusb::DeviceInfo,
        interface: Interface,
        direction: u8,
    ) -> Result<Self, FtdiError> {
        let handle = usb_device.open()?;
        let chip_type = match (
            usb_device.device_version(),
            usb_device.serial_number().unwrap_or(""),
        ) {
            (0x500, _) => ChipType::FT2232C,
            (0x700, _) => ChipType::FT2232H,
            (0x800, _) => ChipType::FT4232H,
            (0x900, _) => ChipType::FT232H,
            (version, _) => {
                return Err(FtdiError::Other(format!(
                    "Unknown ChipType version:0x{version:x}"
                )));
            }
        };
        if !chip_type.interface_list().contains(&interface) {
            return Err(FtdiError::Other(format!(
                "{chip_type:?} do not has {interface:?}"
            )));
        }

        let handle = handle.detach_and_claim_interface(interface.interface_number())?;

        log::debug!("Setting up {chip_type:?} for bitbang GPIO");
        let context = FtdiContext::new(handle, interface).into_bitbang(direction)?;

        Ok(Self {
            ft: context,
            direction,
        })
    }
}

impl GpioPort for FtdiGpio {
    fn set_direction(&mut self, mask: u8, value: u8) -> Result<(), FtdiError> {
        let direction = (self.direction & !mask) | (value & mask);
        if direction != self.direction {
            self.ft.set_bitbang_direction(direction)?;
            self.direction = direction;
        }
        Ok(())
    }

    fn write_port(&mut self, value: u8) -> Result<(), FtdiError> {
        self.ft.write_data(&[value])
    }

    fn read_port(&mut self) -> Result<u8, FtdiError> {
        self.ft.read_pins()
    }
}
