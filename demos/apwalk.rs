//! Enumerate every AP behind a compatible SWD DAP.
//!
//! Walks all 256 APSEL values, decoding the AP IDR and ROM table base of
//! every AP that answers with something non-zero.
//!
//! Run with:
//! ```bash
//! RUST_LOG=info cargo run --example apwalk
//! ```

use ftdi_swd::{ExecutorConfig, FtdiGpio, SwdHost, all_devices, bits, decode, swd};

fn main() -> anyhow::Result<()> {
    // NOTE: enabling debug logging has an impact on clock jitter!
    env_logger::init();

    let devices = all_devices()?;
    assert!(!devices.is_empty(), "Not found Ftdi devices");

    log::info!("Setting up SWD");
    let gpio = FtdiGpio::open(&devices[0].usb_device, devices[0].interfaces[0], 0xFF)?;
    let host = SwdHost::spawn(gpio, ExecutorConfig::default())?;

    for apsel in 0..=255u8 {
        // Reset the interface state before poking each AP.
        host.transfer(swd::resync())?;
        host.read_word(swd::idr()?)?;
        host.transfer(swd::abort()?)?;
        host.read_word(swd::stat()?)?;

        // On the first pass, also decode the DP IDR.
        if apsel == 0 {
            log::info!("Querying for DP IDR");
            let word = host.read_word(swd::idr()?)?;
            log::info!("-> DP IDR {word:#x}");
            let idr = decode::dp_idr(&bits::to_bits_lsb(word, 32))?;
            log::info!("-> DP Designer: {}", idr.designer_name());
            log::info!("-> DP Version: {}", idr.version_name());
            log::info!("-> DP Minimal Debug Port Implemented: {}", idr.minimal_name());
            log::info!("-> DP Part Number: {:#x}", idr.partno());
            log::info!("-> DP Revision: {:#x}", idr.revision());
        }

        log::info!("Querying for AP {apsel:#04x} IDR");
        host.transfer(swd::select(apsel, 0b1111, 0, false)?)?;

        // Read 0xFC (IDR) from the AP. The first AP read returns stale
        // data, so the real value is fetched from RDBUFF.
        host.read_word(swd::read(0b11, true)?)?;
        let word = host.read_word(swd::rdbuff()?)?;
        if word != 0 {
            log::info!("-> AP IDR {word:#x}");
            let idr = decode::ap_idr(&bits::to_bits_lsb(word, 32))?;
            log::info!("-> AP Class: {}", idr.class_name());
            log::info!("-> AP Type: {:#x}", idr.ap_type());
            log::info!("-> AP Variant: {:#x}", idr.variant());
            log::info!("-> AP JEP106 Identity: {:#x}", idr.jep106_identity());
            log::info!("-> AP JEP106 Continuation: {:#x}", idr.jep106_continuation());
            log::info!("-> AP Revision: {:#x}", idr.revision());
        }

        // Read 0xF8 (BASE) from the AP, again through RDBUFF.
        host.read_word(swd::read(0b10, true)?)?;
        let word = host.read_word(swd::rdbuff()?)?;
        let base = decode::base_address(&bits::to_bits_lsb(word, 32))?;
        if base != 0 {
            log::info!("-> AP ROMTABLE {base:#x}");
        }
    }

    Ok(())
}
