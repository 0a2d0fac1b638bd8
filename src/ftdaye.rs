use futures_lite::future::block_on;
use nusb::transfer::{Control, ControlType, Recipient};
use std::time::Duration;

const CONTROL_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum FtdiError {
    #[error("A USB transport error occurred.")]
    ///
    /// This variant is used for all errors reported by the operating system when performing a USB
    /// operation. It may indicate that the USB device was unplugged, that another application or an
    /// operating system driver is currently using it, or that the current user does not have
    /// permission to access it.
    Usb(#[from] std::io::Error),

    #[error("Unsupported chip type: {0:?}")]
    /// The connected device is not supported by the driver.
    UnsupportedChipType(ChipType),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipType {
    Am,
    Bm,
    FT2232C,
    R,
    FT2232H,
    FT4232H,
    FT232H,
    FT230X,
}
impl ChipType {
    pub fn interface_list(self) -> &'static [Interface] {
        match self {
            ChipType::FT232H => &[Interface::A],
            ChipType::FT2232C | ChipType::FT2232H => &[Interface::A, Interface::B],
            ChipType::FT4232H => &[Interface::A, Interface::B, Interface::C, Interface::D],
            _ => &[],
        }
    }
}

#[repr(C)]
#[expect(unused)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum BitMode {
    Reset = 0,
    Bitbang = 1,
    Mpsse = 2,
    SyncBb = 4,
    Mcu = 8,
    Opto = 16,
    Cbus = 32,
    SyncFf = 64,
    Ft1284 = 128,
}

#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Interface {
    A = 1,
    B = 2,
    C = 3,
    D = 4,
}

impl Interface {
    fn write_ep(self) -> u8 {
        match self {
            Interface::A => 0x02,
            Interface::B => 0x04,
            Interface::C => 0x06,
            Interface::D => 0x08,
        }
    }

    fn index(&self) -> u16 {
        *self as u16
    }

    pub(crate) fn interface_number(&self) -> u8 {
        (*self as u8) - 1
    }
}

pub(crate) struct FtdiContext {
    /// USB device handle
    handle: nusb::Interface,
    /// FTDI device interface
    interface: Interface,
    write_ep: u8,
}

impl FtdiContext {
    pub(crate) fn new(handle: nusb::Interface, interface: Interface) -> Self {
        Self {
            handle,
            interface,
            write_ep: interface.write_ep(),
        }
    }

    /// Reset the chip and enter asynchronous bitbang mode.
    ///
    /// In this mode every byte written to the bulk OUT endpoint becomes the
    /// new output-latch state of the 8-bit port, and the instantaneous pin
    /// levels can be sampled with [`FtdiContext::read_pins`].
    pub(crate) fn into_bitbang(mut self, direction: u8) -> Result<Self, FtdiError> {
        self.usb_reset()?;
        self.usb_purge_buffers()?;
        self.set_latency_timer(16)?;
        self.set_bitmode(direction, BitMode::Bitbang)?;
        Ok(self)
    }

    fn sio_write(&mut self, request: u8, value: u16) -> Result<(), FtdiError> {
        self.handle
            .control_out_blocking(
                Control {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index: self.interface.index(),
                },
                &[],
                CONTROL_TIMEOUT,
            )
            .map_err(std::io::Error::from)?;

        Ok(())
    }

    fn usb_reset(&mut self) -> Result<(), FtdiError> {
        const SIO_RESET_REQUEST: u8 = 0;
        const SIO_RESET_SIO: u16 = 0;

        self.sio_write(SIO_RESET_REQUEST, SIO_RESET_SIO)
    }

    /// Clears the write buffer on the chip.
    fn usb_purge_tx_buffer(&mut self) -> Result<(), FtdiError> {
        const SIO_RESET_REQUEST: u8 = 0;
        const SIO_RESET_PURGE_TX: u16 = 2;

        self.sio_write(SIO_RESET_REQUEST, SIO_RESET_PURGE_TX)
    }

    fn usb_purge_rx_buffer(&mut self) -> Result<(), FtdiError> {
        const SIO_RESET_REQUEST: u8 = 0;
        const SIO_RESET_PURGE_RX: u16 = 1;

        self.sio_write(SIO_RESET_REQUEST, SIO_RESET_PURGE_RX)?;

        Ok(())
    }

    fn usb_purge_buffers(&mut self) -> Result<(), FtdiError> {
        self.usb_purge_tx_buffer()?;
        self.usb_purge_rx_buffer()?;

        Ok(())
    }

    fn set_latency_timer(&mut self, value: u8) -> Result<(), FtdiError> {
        const SIO_SET_LATENCY_TIMER_REQUEST: u8 = 0x09;

        self.sio_write(SIO_SET_LATENCY_TIMER_REQUEST, value as u16)
    }

    /// Reprogram the port direction mask without leaving bitbang mode.
    ///
    /// The direction byte travels in the low half of the bitmode request
    /// (1 = output), so a direction change is just a repeated mode set.
    pub(crate) fn set_bitbang_direction(&mut self, direction: u8) -> Result<(), FtdiError> {
        self.set_bitmode(direction, BitMode::Bitbang)
    }

    fn set_bitmode(&mut self, bitmask: u8, mode: BitMode) -> Result<(), FtdiError> {
        const SIO_SET_BITMODE_REQUEST: u8 = 0x0B;

        self.sio_write(
            SIO_SET_BITMODE_REQUEST,
            u16::from_le_bytes([bitmask, mode as u8]),
        )?;

        Ok(())
    }

    /// Latch a new output state onto the port.
    pub(crate) fn write_data(&self, data: &[u8]) -> Result<(), FtdiError> {
        block_on(async {
            self.handle
                .bulk_out(self.write_ep, Vec::from(data))
                .await
                .into_result()
                .map_err(std::io::Error::from)?;
            Result::<(), FtdiError>::Ok(())
        })
    }

    /// Sample the instantaneous pin levels of the port.
    ///
    /// Uses the vendor pin-state request rather than the bulk IN stream, so
    /// the returned byte reflects the wire at the moment of the call.
    pub(crate) fn read_pins(&self) -> Result<u8, FtdiError> {
        const SIO_READ_PINS_REQUEST: u8 = 0x0C;

        let mut pins = [0u8; 1];
        let read = self
            .handle
            .control_in_blocking(
                Control {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: SIO_READ_PINS_REQUEST,
                    value: 0,
                    index: self.interface.index(),
                },
                &mut pins,
                CONTROL_TIMEOUT,
            )
            .map_err(std::io::Error::from)?;
        if read != 1 {
            return Err(FtdiError::Other("short pin-state response".into()));
        }
        Ok(pins[0])
    }
}
