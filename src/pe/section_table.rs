//! The 40-byte section header record, and the owned section it describes.
//!
//! A section's payload is copied out of the source buffer at load time, not
//! borrowed -- an `Image` owns everything it parsed, so the buffer it was
//! built from can be dropped right after `parse` returns.

use crate::error::{Error, Result};
use crate::pe::cursor;
use alloc::string::String;
use alloc::vec::Vec;
use scroll::{Pread, Pwrite, SizeWith, LE};

pub const SECTION_HEADER_SIZE: usize = 40;

pub const IMAGE_SCN_CNT_CODE: u32 = 0x0000_0020;
pub const IMAGE_SCN_CNT_INITIALIZED_DATA: u32 = 0x0000_0040;
pub const IMAGE_SCN_CNT_UNINITIALIZED_DATA: u32 = 0x0000_0080;
pub const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;
pub const IMAGE_SCN_MEM_READ: u32 = 0x4000_0000;
pub const IMAGE_SCN_MEM_WRITE: u32 = 0x8000_0000;

#[repr(C)]
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone, Pread, Pwrite, SizeWith)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_line_numbers: u32,
    pub number_of_relocations: u16,
    pub number_of_line_numbers: u16,
    pub characteristics: u32,
}

impl SectionHeader {
    /// The name, truncated at the first NUL. Not guaranteed to be valid
    /// UTF-8 in the wild; callers that need the raw bytes should use `name`.
    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn is_code(&self) -> bool {
        self.characteristics & IMAGE_SCN_CNT_CODE != 0
    }

    pub fn is_initialized_data(&self) -> bool {
        self.characteristics & IMAGE_SCN_CNT_INITIALIZED_DATA != 0
    }

    pub fn is_uninitialized_data(&self) -> bool {
        self.characteristics & IMAGE_SCN_CNT_UNINITIALIZED_DATA != 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub header: SectionHeader,
    pub data: Vec<u8>,
}

impl Section {
    /// Parses the header at `*offset` and copies out its raw payload.
    /// Returns the section along with the on-disk offset immediately past
    /// its payload, so callers can track where the section table ends.
    pub fn parse(buf: &[u8], offset: &mut usize) -> Result<(Self, usize)> {
        if buf.len() < *offset + SECTION_HEADER_SIZE {
            return Err(Error::BufferTooShort {
                what: "section header",
                offset: *offset,
                needed: SECTION_HEADER_SIZE,
                available: buf.len().saturating_sub(*offset),
            });
        }
        let header: SectionHeader = buf.gread_with(offset, LE)?;

        let start = header.pointer_to_raw_data as usize;
        let len = header.size_of_raw_data as usize;
        let data = if len == 0 {
            Vec::new()
        } else {
            cursor::read_bytes(buf, start, len)?.to_vec()
        };
        let end_on_disk = start.saturating_add(len);

        Ok((Section { header, data }, end_on_disk))
    }

    pub fn write_into(&self, buf: &mut [u8], header_offset: usize) -> Result<()> {
        let mut off = header_offset;
        buf.gwrite_with(self.header, &mut off, LE)?;
        if !self.data.is_empty() {
            cursor::write_bytes(buf, self.header.pointer_to_raw_data as usize, &self.data)?;
        }
        Ok(())
    }
}
