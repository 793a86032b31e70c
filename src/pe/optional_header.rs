//! The optional header: a magic-tagged union of 32-bit (PE32) and 64-bit
//! (PE32+) field layouts, unified into one shape applications can read
//! without caring which variant was on disk, followed by the data directory
//! array.

use crate::container::Container;
use crate::error::{Error, Result};
use crate::pe::data_directories::DataDirectories;
use scroll::{Pread, Pwrite, LE};

pub const MAGIC_32: u16 = 0x10b;
pub const MAGIC_64: u16 = 0x20b;

pub const SIZEOF_STANDARD_FIELDS_32: usize = 28;
pub const SIZEOF_STANDARD_FIELDS_64: usize = 24;
pub const SIZEOF_WINDOWS_FIELDS_32: usize = 68;
pub const SIZEOF_WINDOWS_FIELDS_64: usize = 88;

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pread, Pwrite)]
pub struct StandardFields32 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub base_of_data: u32,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pread, Pwrite)]
pub struct StandardFields64 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
}

/// Unified 32/64-bit standard fields. PE32+ has no `base_of_data`; it reads
/// as zero and is not written back out for that variant.
#[derive(Debug, Default, PartialEq, Copy, Clone)]
pub struct StandardFields {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u64,
    pub size_of_initialized_data: u64,
    pub size_of_uninitialized_data: u64,
    pub address_of_entry_point: u64,
    pub base_of_code: u64,
    pub base_of_data: u32,
}

impl From<StandardFields32> for StandardFields {
    fn from(f: StandardFields32) -> Self {
        StandardFields {
            magic: f.magic,
            major_linker_version: f.major_linker_version,
            minor_linker_version: f.minor_linker_version,
            size_of_code: f.size_of_code as u64,
            size_of_initialized_data: f.size_of_initialized_data as u64,
            size_of_uninitialized_data: f.size_of_uninitialized_data as u64,
            address_of_entry_point: f.address_of_entry_point as u64,
            base_of_code: f.base_of_code as u64,
            base_of_data: f.base_of_data,
        }
    }
}

impl From<StandardFields64> for StandardFields {
    fn from(f: StandardFields64) -> Self {
        StandardFields {
            magic: f.magic,
            major_linker_version: f.major_linker_version,
            minor_linker_version: f.minor_linker_version,
            size_of_code: f.size_of_code as u64,
            size_of_initialized_data: f.size_of_initialized_data as u64,
            size_of_uninitialized_data: f.size_of_uninitialized_data as u64,
            address_of_entry_point: f.address_of_entry_point as u64,
            base_of_code: f.base_of_code as u64,
            base_of_data: 0,
        }
    }
}

impl From<&StandardFields> for StandardFields32 {
    fn from(f: &StandardFields) -> Self {
        StandardFields32 {
            magic: f.magic,
            major_linker_version: f.major_linker_version,
            minor_linker_version: f.minor_linker_version,
            size_of_code: f.size_of_code as u32,
            size_of_initialized_data: f.size_of_initialized_data as u32,
            size_of_uninitialized_data: f.size_of_uninitialized_data as u32,
            address_of_entry_point: f.address_of_entry_point as u32,
            base_of_code: f.base_of_code as u32,
            base_of_data: f.base_of_data,
        }
    }
}

impl From<&StandardFields> for StandardFields64 {
    fn from(f: &StandardFields) -> Self {
        StandardFields64 {
            magic: f.magic,
            major_linker_version: f.major_linker_version,
            minor_linker_version: f.minor_linker_version,
            size_of_code: f.size_of_code as u32,
            size_of_initialized_data: f.size_of_initialized_data as u32,
            size_of_uninitialized_data: f.size_of_uninitialized_data as u32,
            address_of_entry_point: f.address_of_entry_point as u32,
            base_of_code: f.base_of_code as u32,
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pread, Pwrite)]
pub struct WindowsFields32 {
    pub image_base: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u32,
    pub size_of_stack_commit: u32,
    pub size_of_heap_reserve: u32,
    pub size_of_heap_commit: u32,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pread, Pwrite)]
pub struct WindowsFields64 {
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

/// Unified 32/64-bit windows-specific fields.
#[derive(Debug, Default, PartialEq, Copy, Clone)]
pub struct WindowsFields {
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

impl From<WindowsFields32> for WindowsFields {
    fn from(w: WindowsFields32) -> Self {
        WindowsFields {
            image_base: w.image_base as u64,
            section_alignment: w.section_alignment,
            file_alignment: w.file_alignment,
            major_operating_system_version: w.major_operating_system_version,
            minor_operating_system_version: w.minor_operating_system_version,
            major_image_version: w.major_image_version,
            minor_image_version: w.minor_image_version,
            major_subsystem_version: w.major_subsystem_version,
            minor_subsystem_version: w.minor_subsystem_version,
            win32_version_value: w.win32_version_value,
            size_of_image: w.size_of_image,
            size_of_headers: w.size_of_headers,
            check_sum: w.check_sum,
            subsystem: w.subsystem,
            dll_characteristics: w.dll_characteristics,
            size_of_stack_reserve: w.size_of_stack_reserve as u64,
            size_of_stack_commit: w.size_of_stack_commit as u64,
            size_of_heap_reserve: w.size_of_heap_reserve as u64,
            size_of_heap_commit: w.size_of_heap_commit as u64,
            loader_flags: w.loader_flags,
            number_of_rva_and_sizes: w.number_of_rva_and_sizes,
        }
    }
}

impl From<WindowsFields64> for WindowsFields {
    fn from(w: WindowsFields64) -> Self {
        WindowsFields {
            image_base: w.image_base,
            section_alignment: w.section_alignment,
            file_alignment: w.file_alignment,
            major_operating_system_version: w.major_operating_system_version,
            minor_operating_system_version: w.minor_operating_system_version,
            major_image_version: w.major_image_version,
            minor_image_version: w.minor_image_version,
            major_subsystem_version: w.major_subsystem_version,
            minor_subsystem_version: w.minor_subsystem_version,
            win32_version_value: w.win32_version_value,
            size_of_image: w.size_of_image,
            size_of_headers: w.size_of_headers,
            check_sum: w.check_sum,
            subsystem: w.subsystem,
            dll_characteristics: w.dll_characteristics,
            size_of_stack_reserve: w.size_of_stack_reserve,
            size_of_stack_commit: w.size_of_stack_commit,
            size_of_heap_reserve: w.size_of_heap_reserve,
            size_of_heap_commit: w.size_of_heap_commit,
            loader_flags: w.loader_flags,
            number_of_rva_and_sizes: w.number_of_rva_and_sizes,
        }
    }
}

impl From<&WindowsFields> for WindowsFields32 {
    fn from(w: &WindowsFields) -> Self {
        WindowsFields32 {
            image_base: w.image_base as u32,
            section_alignment: w.section_alignment,
            file_alignment: w.file_alignment,
            major_operating_system_version: w.major_operating_system_version,
            minor_operating_system_version: w.minor_operating_system_version,
            major_image_version: w.major_image_version,
            minor_image_version: w.minor_image_version,
            major_subsystem_version: w.major_subsystem_version,
            minor_subsystem_version: w.minor_subsystem_version,
            win32_version_value: w.win32_version_value,
            size_of_image: w.size_of_image,
            size_of_headers: w.size_of_headers,
            check_sum: w.check_sum,
            subsystem: w.subsystem,
            dll_characteristics: w.dll_characteristics,
            size_of_stack_reserve: w.size_of_stack_reserve as u32,
            size_of_stack_commit: w.size_of_stack_commit as u32,
            size_of_heap_reserve: w.size_of_heap_reserve as u32,
            size_of_heap_commit: w.size_of_heap_commit as u32,
            loader_flags: w.loader_flags,
            number_of_rva_and_sizes: w.number_of_rva_and_sizes,
        }
    }
}

impl From<&WindowsFields> for WindowsFields64 {
    fn from(w: &WindowsFields) -> Self {
        WindowsFields64 {
            image_base: w.image_base,
            section_alignment: w.section_alignment,
            file_alignment: w.file_alignment,
            major_operating_system_version: w.major_operating_system_version,
            minor_operating_system_version: w.minor_operating_system_version,
            major_image_version: w.major_image_version,
            minor_image_version: w.minor_image_version,
            major_subsystem_version: w.major_subsystem_version,
            minor_subsystem_version: w.minor_subsystem_version,
            win32_version_value: w.win32_version_value,
            size_of_image: w.size_of_image,
            size_of_headers: w.size_of_headers,
            check_sum: w.check_sum,
            subsystem: w.subsystem,
            dll_characteristics: w.dll_characteristics,
            size_of_stack_reserve: w.size_of_stack_reserve,
            size_of_stack_commit: w.size_of_stack_commit,
            size_of_heap_reserve: w.size_of_heap_reserve,
            size_of_heap_commit: w.size_of_heap_commit,
            loader_flags: w.loader_flags,
            number_of_rva_and_sizes: w.number_of_rva_and_sizes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionalHeader {
    pub standard_fields: StandardFields,
    pub windows_fields: WindowsFields,
    pub data_directories: DataDirectories,
}

impl OptionalHeader {
    pub fn container(&self) -> Result<Container> {
        match self.standard_fields.magic {
            MAGIC_32 => Ok(Container::Little),
            MAGIC_64 => Ok(Container::Big),
            magic => Err(Error::BadMagic(magic as u64)),
        }
    }

    pub fn parse(buf: &[u8], offset: &mut usize) -> Result<Self> {
        let magic = crate::pe::cursor::read_u16(buf, *offset)?;
        let (standard_fields, windows_fields): (StandardFields, WindowsFields) = match magic {
            MAGIC_32 => {
                let needed = SIZEOF_STANDARD_FIELDS_32 + SIZEOF_WINDOWS_FIELDS_32;
                if buf.len() < *offset + needed {
                    return Err(Error::BufferTooShort {
                        what: "PE32 optional header",
                        offset: *offset,
                        needed,
                        available: buf.len().saturating_sub(*offset),
                    });
                }
                let sf: StandardFields32 = buf.gread_with(offset, LE)?;
                let wf: WindowsFields32 = buf.gread_with(offset, LE)?;
                (sf.into(), wf.into())
            }
            MAGIC_64 => {
                let needed = SIZEOF_STANDARD_FIELDS_64 + SIZEOF_WINDOWS_FIELDS_64;
                if buf.len() < *offset + needed {
                    return Err(Error::BufferTooShort {
                        what: "PE32+ optional header",
                        offset: *offset,
                        needed,
                        available: buf.len().saturating_sub(*offset),
                    });
                }
                let sf: StandardFields64 = buf.gread_with(offset, LE)?;
                let wf: WindowsFields64 = buf.gread_with(offset, LE)?;
                (sf.into(), wf.into())
            }
            magic => return Err(Error::BadMagic(magic as u64)),
        };

        let data_directories =
            DataDirectories::parse(buf, windows_fields.number_of_rva_and_sizes as usize, offset)?;
        Ok(OptionalHeader { standard_fields, windows_fields, data_directories })
    }

    pub fn size(&self) -> usize {
        let base = if self.container().is_ok_and(Container::is_big) {
            SIZEOF_STANDARD_FIELDS_64 + SIZEOF_WINDOWS_FIELDS_64
        } else {
            SIZEOF_STANDARD_FIELDS_32 + SIZEOF_WINDOWS_FIELDS_32
        };
        base + self.data_directories.size()
    }

    pub fn write_into(&self, buf: &mut [u8], offset: &mut usize) -> Result<()> {
        if self.container().is_ok_and(Container::is_big) {
            let sf: StandardFields64 = (&self.standard_fields).into();
            let wf: WindowsFields64 = (&self.windows_fields).into();
            buf.gwrite_with(sf, offset, LE)?;
            buf.gwrite_with(wf, offset, LE)?;
        } else {
            let sf: StandardFields32 = (&self.standard_fields).into();
            let wf: WindowsFields32 = (&self.windows_fields).into();
            buf.gwrite_with(sf, offset, LE)?;
            buf.gwrite_with(wf, offset, LE)?;
        }
        self.data_directories.write_into(buf, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizeof_standards32() {
        assert_eq!(core::mem::size_of::<StandardFields32>(), SIZEOF_STANDARD_FIELDS_32);
    }

    #[test]
    fn sizeof_windows32() {
        assert_eq!(core::mem::size_of::<WindowsFields32>(), SIZEOF_WINDOWS_FIELDS_32);
    }

    #[test]
    fn sizeof_standards64() {
        assert_eq!(core::mem::size_of::<StandardFields64>(), SIZEOF_STANDARD_FIELDS_64);
    }

    #[test]
    fn sizeof_windows64() {
        assert_eq!(core::mem::size_of::<WindowsFields64>(), SIZEOF_WINDOWS_FIELDS_64);
    }

    #[test]
    fn container_reports_bad_magic() {
        let oh = OptionalHeader {
            standard_fields: StandardFields { magic: 0x1234, ..Default::default() },
            windows_fields: WindowsFields::default(),
            data_directories: DataDirectories::default(),
        };
        assert!(oh.container().is_err());
    }
}
