//! SWD request construction.
//!
//! Builders are pure: each returns a [`Request`] describing one wire
//! operation for the executor to clock out. Payload-carrying builders
//! append the trailing parity bit themselves, so a `Request` is always
//! wire-complete.

use crate::bits;
use crate::ftdaye::FtdiError;

/// Swd ACK (3 bits), LSB[2:0] on the wire.
pub const ACK_OK: u8 = 0b001;
pub const ACK_WAIT: u8 = 0b010;
pub const ACK_FAULT: u8 = 0b100;

/// JTAG-to-SWD switch code, sent LSb first per byte.
const JTAG_TO_SWD: [u8; 2] = [0x79, 0xE7];

/// ABORT write value: clear all sticky error flags, no DAPABORT.
/// ORUNERRCLR | WDERRCLR | STKERRCLR | STKCMPCLR.
const ABORT_CLEAR_FLAGS: u32 = 0b11110;

/// CTRL/STAT power-up request bits.
const CTRL_CDBGPWRUPREQ: u32 = 1 << 28;
const CTRL_CSYSPWRUPREQ: u32 = 1 << 30;

#[derive(Debug, thiserror::Error)]
pub enum SwdError {
    #[error("Invalid argument: {0}.")]
    InvalidArgument(&'static str),
    #[error("Swd ack wait.")]
    AckWait,
    #[error("Swd ack fault.")]
    AckFault,
    #[error("Swd unknown ack LSB[{0:#05b}].")]
    UnknownAck(u8),
    #[error("Swd parity error.")]
    ParityError,
    #[error("Executor is gone.")]
    Disconnected,
    #[error("Ftdi inner error")]
    FtdiInner(#[from] FtdiError),
}

/// Request header wire format.
/// Timing Sequence: [Start(1), APnDP, RnW, A[2:3], Parity, Stop(0), Park(1)]
/// LSB Format: [Park(1), Stop(0), Parity, A[3:2], RnW, APnDP, Start(1)]
#[bitfield_struct::bitfield(u8, order = Lsb)]
struct RequestHeader {
    #[bits(default = true)]
    start: bool,
    apndp: bool,
    rnw: bool,
    #[bits(2)]
    addr: u8,
    parity: bool,
    #[bits(default = false)]
    stop: bool,
    #[bits(default = true)]
    park: bool,
}

/// What follows the header on the wire.
///
/// The three shapes are mutually exclusive: a raw sequence has no ACK phase
/// at all, and an acknowledged operation either reads or writes, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Raw line sequence. No ACK phase, no payload.
    Sequence,
    /// ACK phase, then 32 data bits plus parity read from the target.
    Read,
    /// ACK phase, then the contained 33 bits (data plus trailing parity)
    /// written to the target.
    Write(Vec<bool>),
}

/// One SWD wire operation, ready for the executor queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    cmd: Vec<bool>,
    action: Action,
}

impl Request {
    /// Header (or raw sequence) bits, in transmission order.
    pub fn cmd(&self) -> &[bool] {
        &self.cmd
    }

    pub fn action(&self) -> &Action {
        &self.action
    }
}

/// Build an 8-bit request header, LSb first so the Start bit is clocked out
/// first.
fn header(apndp: bool, rnw: bool, addr: u8) -> Result<Vec<bool>, SwdError> {
    if addr > 0b11 {
        return Err(SwdError::InvalidArgument("register address exceeds two bits"));
    }

    // The parity check is made over the APnDP, RnW and A[2:3] bits. If, of these four bits:
    // • the number of bits set to 1 is odd, then the parity bit is set to 1
    // • the number of bits set to 1 is even, then the parity bit is set to 0.
    let ones = apndp as u32 + rnw as u32 + (addr as u32).count_ones();
    let header = RequestHeader::new()
        .with_apndp(apndp)
        .with_rnw(rnw)
        .with_addr(addr)
        .with_parity(ones % 2 == 1);

    Ok(bits::to_bits_lsb(u8::from(header) as u32, 8))
}

/// 32-bit register value as a wire payload: LSb first, parity appended.
fn payload(value: u32) -> Vec<bool> {
    let mut data = bits::to_bits_lsb(value, 32);
    data.push(bits::parity(&data));
    data
}

/// Read the register at 2-bit address `addr` (bank offsets 0x0/0x4/0x8/0xC),
/// from the AP when `apndp` is set, the DP otherwise.
pub fn read(addr: u8, apndp: bool) -> Result<Request, SwdError> {
    Ok(Request {
        cmd: header(apndp, true, addr)?,
        action: Action::Read,
    })
}

/// DP IDR read (DP 0x0).
pub fn idr() -> Result<Request, SwdError> {
    read(0b00, false)
}

/// CTRL/STAT read (DP 0x4).
pub fn stat() -> Result<Request, SwdError> {
    read(0b01, false)
}

/// RDBUFF read (DP 0xC).
pub fn rdbuff() -> Result<Request, SwdError> {
    read(0b11, false)
}

/// DRW read (AP 0xC). Reads the word addressed by TAR.
pub fn drw() -> Result<Request, SwdError> {
    read(0b11, true)
}

/// TAR write (AP 0x4). Sets the transfer address for DRW accesses.
pub fn tar(addr: u32) -> Result<Request, SwdError> {
    Ok(Request {
        cmd: header(true, false, 0b01)?,
        action: Action::Write(payload(addr)),
    })
}

/// SELECT write (DP 0x8, or the AP register bank when `apndp` is set).
///
/// Layout per ADIv5: APSEL in [31:24], APBANKSEL in [7:4], DPBANKSEL in
/// [3:0], everything between reserved zero.
pub fn select(apsel: u8, apbanksel: u8, dpbanksel: u8, apndp: bool) -> Result<Request, SwdError> {
    if apbanksel > 0b1111 {
        return Err(SwdError::InvalidArgument("AP bank select exceeds four bits"));
    }
    if dpbanksel > 0b1111 {
        return Err(SwdError::InvalidArgument("DP bank select exceeds four bits"));
    }

    let value = (apsel as u32) << 24 | (apbanksel as u32) << 4 | dpbanksel as u32;
    Ok(Request {
        cmd: header(apndp, false, 0b10)?,
        action: Action::Write(payload(value)),
    })
}

/// ABORT write (DP 0x0). Clears every sticky error flag.
pub fn abort() -> Result<Request, SwdError> {
    Ok(Request {
        cmd: header(false, false, 0b00)?,
        action: Action::Write(payload(ABORT_CLEAR_FLAGS)),
    })
}

/// CTRL/STAT write (DP 0x4) carrying only the power-up request bits.
pub fn ctrl(cdbgpwrupreq: bool, csyspwrupreq: bool) -> Result<Request, SwdError> {
    let mut value = 0;
    if cdbgpwrupreq {
        value |= CTRL_CDBGPWRUPREQ;
    }
    if csyspwrupreq {
        value |= CTRL_CSYSPWRUPREQ;
    }
    Ok(Request {
        cmd: header(false, false, 0b01)?,
        action: Action::Write(payload(value)),
    })
}

/// Line reset plus JTAG-to-SWD switch.
///
/// 50 ones, the switch code, 50 more ones, then two idle cycles. No ACK
/// phase follows; the target answers nothing to a reset.
pub fn resync() -> Request {
    let mut cmd = vec![true; 50];
    cmd.extend(bits::bytes_to_bits_lsb(&JTAG_TO_SWD));
    cmd.extend(std::iter::repeat_n(true, 50));
    cmd.extend([false, false]);
    Request {
        cmd,
        action: Action::Sequence,
    }
}
