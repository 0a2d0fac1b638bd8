//! DP and AP register payload decoding.
//!
//! Every decoder takes the 32 data bits of a response in wire (LSb-first)
//! order, after the controller has popped and checked the parity bit.

use crate::bits;
use crate::swd::SwdError;

/// JEDEC JEP106 designer codes seen in the wild.
const JEP106: &[(u16, &str)] = &[(0x23B, "ARM (0x23B)")];

fn designer_name(code: u16) -> String {
    JEP106
        .iter()
        .find(|&&(known, _)| known == code)
        .map(|&(_, name)| name.to_string())
        .unwrap_or_else(|| format!("Unknown ({code:#x})"))
}

fn word(data: &[bool]) -> Result<u32, SwdError> {
    if data.len() != 32 {
        return Err(SwdError::InvalidArgument("payload must be exactly 32 bits"));
    }
    Ok(bits::from_bits(data))
}

/// DP IDR fields, per ARM IHI0031 section 2.3.5.
#[bitfield_struct::bitfield(u32, order = Lsb)]
pub struct DpIdr {
    pub rao: bool,
    #[bits(11)]
    pub designer: u16,
    #[bits(4)]
    pub version: u8,
    min: bool,
    #[bits(3)]
    _reserved: u8,
    #[bits(8)]
    pub partno: u8,
    #[bits(4)]
    pub revision: u8,
}

impl DpIdr {
    pub fn designer_name(&self) -> String {
        designer_name(self.designer())
    }

    pub fn version_name(&self) -> &'static str {
        match self.version() {
            0 => "Reserved",
            1 => "DPv1",
            2 => "DPv2",
            _ => "Unknown",
        }
    }

    /// Whether a full debug port is present, reading the MINDP flag.
    pub fn minimal_name(&self) -> &'static str {
        if self.min() { "No" } else { "Yes" }
    }
}

/// AP IDR fields, per ARM IHI0031 section 6.3.1.
#[bitfield_struct::bitfield(u32, order = Lsb)]
pub struct ApIdr {
    #[bits(4)]
    pub ap_type: u8,
    #[bits(4)]
    pub variant: u8,
    #[bits(5)]
    _reserved: u8,
    #[bits(4)]
    pub class: u8,
    #[bits(7)]
    pub jep106_identity: u8,
    #[bits(4)]
    pub jep106_continuation: u8,
    #[bits(4)]
    pub revision: u8,
}

impl ApIdr {
    /// Memory APs set the top class bit.
    pub fn is_mem_ap(&self) -> bool {
        self.class() & 0b1000 != 0
    }

    pub fn class_name(&self) -> String {
        if self.is_mem_ap() {
            "Memory AP (MEM-AP)".to_string()
        } else {
            format!("No Defined Class ({:#x})", self.class())
        }
    }
}

/// Decode a DP IDR payload.
pub fn dp_idr(data: &[bool]) -> Result<DpIdr, SwdError> {
    Ok(DpIdr::from(word(data)?))
}

/// Decode an AP IDR payload.
pub fn ap_idr(data: &[bool]) -> Result<ApIdr, SwdError> {
    Ok(ApIdr::from(word(data)?))
}

/// Decode a BASE payload: the ROM table lives at the upper 20 bits, 4 KiB
/// aligned, per ARM IHI0031 section 7.6.1.
pub fn base_address(data: &[bool]) -> Result<u32, SwdError> {
    Ok(word(data)? & 0xFFFF_F000)
}
