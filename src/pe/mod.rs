//! A fault-tolerant PE32/PE32+ (COFF) codec: header, section table, data
//! directories, and the attribute certificate table.
//!
//! [`Image::parse`] builds the object model from a byte slice; edit
//! sections through [`Image::sections_mut`], call [`Image::recalculate`] to
//! re-derive the geometry fields that follow from those edits, then
//! [`Image::store`] to serialize back to bytes.

pub mod certificate_table;
pub mod cursor;
pub mod data_directories;
pub mod header;
pub mod image;
pub mod optional_header;
pub mod options;
pub mod recalculate;
pub mod section_table;

pub use data_directories::{DataDirectories, DataDirectory};
pub use header::{CoffHeader, Header};
pub use image::{DirectoryBinding, Image};
pub use options::ParseOptions;
pub use section_table::{Section, SectionHeader};

use crate::error::Result;

pub const PE_SIGNATURE_OFFSET: usize = image::PE_SIGNATURE_OFFSET;
pub const PE_SIGNATURE: u32 = header::PE_MAGIC;
pub const PE32_MAGIC: u16 = optional_header::MAGIC_32;
pub const PE32PLUS_MAGIC: u16 = optional_header::MAGIC_64;
pub const SECTION_HEADER_SIZE: usize = section_table::SECTION_HEADER_SIZE;
pub const DATA_DIRECTORY_SIZE: usize = data_directories::SIZEOF_DATA_DIRECTORY;
pub const CERTIFICATE_TABLE_DIRECTORY_INDEX: usize =
    data_directories::CERTIFICATE_TABLE_DIRECTORY_INDEX;

/// Free-function analogue of [`Image::parse`], kept for readers coming from
/// the C API naming (`ppelib_create_from_buffer`) described in spec.md §6.
pub fn load(bytes: &[u8]) -> Result<Image> {
    Image::parse(bytes)
}
