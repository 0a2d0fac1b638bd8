//! Dump STM32F103-style SRAM (0x2000_0000 -> 0x4000_0000) a word at a time.
//!
//! Run with:
//! ```bash
//! RUST_LOG=info cargo run --example sramread
//! ```

use ftdi_swd::{ExecutorConfig, FtdiGpio, SwdHost, all_devices, swd};

fn main() -> anyhow::Result<()> {
    // NOTE: enabling debug logging has an impact on clock jitter!
    env_logger::init();

    let devices = all_devices()?;
    assert!(!devices.is_empty(), "Not found Ftdi devices");

    log::info!("Setting up SWD");
    let gpio = FtdiGpio::open(&devices[0].usb_device, devices[0].interfaces[0], 0xFF)?;
    let host = SwdHost::spawn(gpio, ExecutorConfig::default())?;

    // Bring the interface up.
    host.transfer(swd::resync())?;
    host.read_word(swd::idr()?)?;
    host.transfer(swd::abort()?)?;

    let mut addr: u32 = 0x2000_0000;
    while addr <= 0x4000_0000 {
        host.transfer(swd::tar(addr)?)?;

        // DRW reads the word at the address just written to TAR; the value
        // arrives on the following RDBUFF read.
        host.read_word(swd::drw()?)?;
        let word = host.read_word(swd::rdbuff()?)?;
        log::info!("-> {addr:#010x} :: {word:#010x}");

        addr += 0x4;
    }

    Ok(())
}
