//! The COFF file header and the PE header that follows the signature: the
//! common fields plus the magic-driven optional header (§4.B).
//!
//! The DOS header/stub are *not* modeled here -- an `Image` preserves the
//! bytes before the PE signature verbatim rather than parsing their
//! individual fields, since nothing downstream of `pe_pointer` depends on
//! them (see `pe::image`).

use crate::error::{Error, Result};
use crate::pe::optional_header::OptionalHeader;
use scroll::{Pread, Pwrite, SizeWith, LE};

pub const SIZEOF_COFF_HEADER: usize = 20;
/// `PE\0\0`, little endian.
pub const PE_MAGIC: u32 = 0x0000_4550;
pub const SIZEOF_PE_MAGIC: usize = 4;

pub const COFF_MACHINE_UNKNOWN: u16 = 0x0;
pub const COFF_MACHINE_AM33: u16 = 0x1d3;
pub const COFF_MACHINE_X86_64: u16 = 0x8664;
pub const COFF_MACHINE_ARM: u16 = 0x1c0;
pub const COFF_MACHINE_ARM64: u16 = 0xaa64;
pub const COFF_MACHINE_ARMNT: u16 = 0x1c4;
pub const COFF_MACHINE_EBC: u16 = 0xebc;
pub const COFF_MACHINE_X86: u16 = 0x14c;
pub const COFF_MACHINE_IA64: u16 = 0x200;
pub const COFF_MACHINE_M32R: u16 = 0x9041;
pub const COFF_MACHINE_MIPS16: u16 = 0x266;
pub const COFF_MACHINE_MIPSFPU: u16 = 0x366;
pub const COFF_MACHINE_MIPSFPU16: u16 = 0x466;
pub const COFF_MACHINE_POWERPC: u16 = 0x1f0;
pub const COFF_MACHINE_POWERPCFP: u16 = 0x1f1;
pub const COFF_MACHINE_R4000: u16 = 0x166;
pub const COFF_MACHINE_RISCV32: u16 = 0x5032;
pub const COFF_MACHINE_RISCV64: u16 = 0x5064;
pub const COFF_MACHINE_RISCV128: u16 = 0x5128;
pub const COFF_MACHINE_SH3: u16 = 0x1a2;
pub const COFF_MACHINE_SH3DSP: u16 = 0x1a3;
pub const COFF_MACHINE_SH4: u16 = 0x1a6;
pub const COFF_MACHINE_SH5: u16 = 0x1a8;
pub const COFF_MACHINE_THUMB: u16 = 0x1c2;
pub const COFF_MACHINE_WCEMIPSV2: u16 = 0x169;

/// The 20-byte COFF file header: the fields common to both optional-header
/// variants.
#[repr(C)]
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone, Pread, Pwrite, SizeWith)]
pub struct CoffHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    /// Legacy COFF symbol table pointer; zero in practice for PE images.
    pub pointer_to_symbol_table: u32,
    pub number_of_symbol_table: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl CoffHeader {
    pub fn parse(buf: &[u8], offset: &mut usize) -> Result<Self> {
        if buf.len() < *offset + SIZEOF_COFF_HEADER {
            return Err(Error::BufferTooShort {
                what: "common COFF headers",
                offset: *offset,
                needed: SIZEOF_COFF_HEADER,
                available: buf.len().saturating_sub(*offset),
            });
        }
        Ok(buf.gread_with(offset, LE)?)
    }
}

/// The COFF header followed by the magic-dispatched optional header and its
/// data directory array.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub coff: CoffHeader,
    pub optional: OptionalHeader,
}

impl Header {
    /// Parses the common COFF fields, then dispatches to the PE32/PE32+
    /// optional header variant driven by the magic field (§4.B).
    pub fn parse(buf: &[u8], offset: &mut usize) -> Result<Self> {
        let coff = CoffHeader::parse(buf, offset)?;
        let optional = OptionalHeader::parse(buf, offset)?;
        Ok(Header { coff, optional })
    }

    /// Total on-disk size of the COFF header plus the optional header
    /// (standard fields, windows fields, and data directories).
    pub fn size(&self) -> usize {
        SIZEOF_COFF_HEADER + self.optional.size()
    }

    pub fn write_into(&self, buf: &mut [u8], offset: &mut usize) -> Result<()> {
        buf.gwrite_with(self.coff, offset, LE)?;
        self.optional.write_into(buf, offset)
    }
}

pub fn machine_to_str(machine: u16) -> &'static str {
    match machine {
        COFF_MACHINE_UNKNOWN => "UNKNOWN",
        COFF_MACHINE_AM33 => "AM33",
        COFF_MACHINE_X86_64 => "X86_64",
        COFF_MACHINE_ARM => "ARM",
        COFF_MACHINE_ARM64 => "ARM64",
        COFF_MACHINE_ARMNT => "ARM_NT",
        COFF_MACHINE_EBC => "EBC",
        COFF_MACHINE_X86 => "X86",
        COFF_MACHINE_IA64 => "IA64",
        COFF_MACHINE_M32R => "M32R",
        COFF_MACHINE_MIPS16 => "MIPS_16",
        COFF_MACHINE_MIPSFPU => "MIPS_FPU",
        COFF_MACHINE_MIPSFPU16 => "MIPS_FPU_16",
        COFF_MACHINE_POWERPC => "POWERPC",
        COFF_MACHINE_POWERPCFP => "POWERCFP",
        COFF_MACHINE_R4000 => "R4000",
        COFF_MACHINE_RISCV32 => "RISC-V_32",
        COFF_MACHINE_RISCV64 => "RISC-V_64",
        COFF_MACHINE_RISCV128 => "RISC-V_128",
        COFF_MACHINE_SH3 => "SH3",
        COFF_MACHINE_SH3DSP => "SH3DSP",
        COFF_MACHINE_SH4 => "SH4",
        COFF_MACHINE_SH5 => "SH5",
        COFF_MACHINE_THUMB => "THUMB",
        COFF_MACHINE_WCEMIPSV2 => "WCE_MIPS_V2",
        _ => "COFF_UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_coff() -> CoffHeader {
        CoffHeader {
            machine: COFF_MACHINE_X86,
            number_of_sections: 1,
            size_of_optional_header: 224,
            characteristics: 0x0102,
            ..Default::default()
        }
    }

    #[test]
    fn machine_name_lookup() {
        assert_eq!(machine_to_str(COFF_MACHINE_X86), "X86");
        assert_eq!(machine_to_str(0xffff), "COFF_UNKNOWN");
    }

    #[test]
    fn coff_header_round_trip() {
        let mut buf = [0u8; SIZEOF_COFF_HEADER];
        let mut off = 0;
        buf.gwrite_with(sample_coff(), &mut off, LE).unwrap();
        let mut off = 0;
        let parsed = CoffHeader::parse(&buf, &mut off).unwrap();
        assert_eq!(parsed, sample_coff());
        assert_eq!(off, SIZEOF_COFF_HEADER);
    }

    #[test]
    fn short_buffer_fails_cleanly() {
        let buf = [0u8; SIZEOF_COFF_HEADER - 1];
        let mut off = 0;
        assert!(CoffHeader::parse(&buf, &mut off).is_err());
    }
}
