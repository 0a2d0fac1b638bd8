//! SWD interface bring-up smoke test.
//!
//! Resets the line, switches the target from JTAG to SWD, reads and decodes
//! the DP IDR, clears sticky errors, then reads AP0's IDR and ROM table
//! pointer.
//!
//! Run with:
//! ```bash
//! RUST_LOG=info cargo run --example swdinit
//! ```

use ftdi_swd::{ExecutorConfig, FtdiGpio, SwdHost, all_devices, bits, decode, swd};

fn main() -> anyhow::Result<()> {
    // NOTE: enabling debug logging has an impact on clock jitter!
    env_logger::init();

    let devices = all_devices()?;
    assert!(!devices.is_empty(), "Not found Ftdi devices");

    log::info!("Setting up SWD");
    // All eight pins start as outputs; the executor turns SWDIO around as
    // the protocol phases require.
    let gpio = FtdiGpio::open(&devices[0].usb_device, devices[0].interfaces[0], 0xFF)?;
    let host = SwdHost::spawn(gpio, ExecutorConfig::default())?;

    // Line reset plus JTAG-to-SWD switch; the target answers nothing.
    host.transfer(swd::resync())?;

    let word = host.read_word(swd::idr()?)?;
    log::info!("DP IDR {word:#010x}");
    let idr = decode::dp_idr(&bits::to_bits_lsb(word, 32))?;
    log::info!("-> DP Designer: {}", idr.designer_name());
    log::info!("-> DP Version: {}", idr.version_name());
    log::info!("-> DP Minimal Debug Port Implemented: {}", idr.minimal_name());
    log::info!("-> DP Part Number: {:#x}", idr.partno());
    log::info!("-> DP Revision: {:#x}", idr.revision());

    let stat = host.read_word(swd::stat()?)?;
    log::info!("CTRL/STAT {stat:#010x}");

    // Clear any sticky errors left over from the mode switch.
    host.transfer(swd::abort()?)?;
    let stat = host.read_word(swd::stat()?)?;
    log::info!("CTRL/STAT after ABORT {stat:#010x}");

    // Select the 0xF0 bank on AP0, then read IDR (0xFC) and BASE (0xF8).
    // The first AP read returns stale data; the real value lands in RDBUFF.
    host.transfer(swd::select(0, 0b1111, 0, false)?)?;
    host.read_word(swd::read(0b11, true)?)?;
    let word = host.read_word(swd::rdbuff()?)?;
    log::info!("AP IDR {word:#010x}");

    host.read_word(swd::read(0b10, true)?)?;
    let word = host.read_word(swd::rdbuff()?)?;
    let base = decode::base_address(&bits::to_bits_lsb(word, 32))?;
    log::info!("AP ROMTABLE {base:#010x}");

    Ok(())
}
