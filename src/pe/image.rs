//! Top-level load/store orchestration (§4.E): validates the DOS stub offset,
//! the PE signature, and dispatches to the header/section/certificate
//! codecs, then reassembles everything back into bytes.

use crate::error::{Error, Result};
use crate::pe::certificate_table::CertificateTable;
use crate::pe::cursor;
use crate::pe::data_directories::CERTIFICATE_TABLE_DIRECTORY_INDEX;
use crate::pe::header::{Header, PE_MAGIC, SIZEOF_PE_MAGIC};
use crate::pe::options::ParseOptions;
use crate::pe::section_table::{Section, SECTION_HEADER_SIZE};
use alloc::vec::Vec;
use log::debug;

/// Offset of the `u32` pointer to the PE signature, read out of the DOS
/// stub's `e_lfanew` field.
pub const PE_SIGNATURE_OFFSET: usize = 0x3c;

/// Where data directory `d` is anchored: an index into `Image::sections`
/// rather than a reference, so reordering sections can't dangle it
/// (REDESIGN FLAGS §9, "directory-to-section binding").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryBinding {
    pub section_index: usize,
    pub offset: u32,
    pub size: u32,
    pub orig_rva: u32,
    pub orig_size: u32,
}

/// A parsed, editable PE image. Owns every byte it needs to round-trip: the
/// stub, each section's payload, any trailing data, and the certificate
/// table. Not `Clone` -- one `Image` is the sole owner of its buffers.
#[derive(Debug)]
pub struct Image {
    pub(crate) stub: Vec<u8>,
    pub(crate) pe_header_offset: usize,
    pub(crate) header: Header,
    pub(crate) sections: Vec<Section>,
    pub(crate) directory_bindings: Vec<Option<DirectoryBinding>>,
    pub(crate) certificate_table: Option<CertificateTable>,
    pub(crate) trailing_data: Vec<u8>,
    pub(crate) start_of_sections: u32,
}

impl Image {
    /// Parses `buf` with the default [`ParseOptions`].
    pub fn parse(buf: &[u8]) -> Result<Self> {
        Self::parse_with(buf, ParseOptions::default())
    }

    /// Parses `buf`, validating the chained offsets stub -> PE signature ->
    /// COFF header -> optional header -> data directories -> section table
    /// -> certificate table, never reading out of bounds (§4.E).
    pub fn parse_with(buf: &[u8], options: ParseOptions) -> Result<Self> {
        if buf.len() < PE_SIGNATURE_OFFSET + 4 {
            return Err(Error::BufferTooShort {
                what: "DOS stub (file too small)",
                offset: 0,
                needed: PE_SIGNATURE_OFFSET + 4,
                available: buf.len(),
            });
        }
        let pe_header_offset = cursor::read_u32(buf, PE_SIGNATURE_OFFSET)? as usize;

        if buf.len() < pe_header_offset + SIZEOF_PE_MAGIC {
            return Err(Error::BufferTooShort {
                what: "PE signature",
                offset: pe_header_offset,
                needed: SIZEOF_PE_MAGIC,
                available: buf.len().saturating_sub(pe_header_offset),
            });
        }
        let signature = cursor::read_u32(buf, pe_header_offset)?;
        if signature != PE_MAGIC {
            return Err(Error::BadSignature { found: signature });
        }

        let coff_header_offset = pe_header_offset + SIZEOF_PE_MAGIC;
        let mut offset = coff_header_offset;
        let header = Header::parse(buf, &mut offset)?;
        let section_offset = offset;

        let nsections = header.coff.number_of_sections as usize;
        let mut sections = Vec::with_capacity(nsections);
        let mut section_cursor = section_offset;
        let mut end_of_sections: usize = 0;
        for _ in 0..nsections {
            let (section, end_on_disk) = Section::parse(buf, &mut section_cursor)?;
            if end_on_disk > end_of_sections {
                end_of_sections = end_on_disk;
            }
            sections.push(section);
        }

        let directory_bindings = resolve_directory_bindings(&header, &sections);

        let certificate_table = match header
            .optional
            .data_directories
            .get(CERTIFICATE_TABLE_DIRECTORY_INDEX)
        {
            Some(dd) if options.parse_attribute_certificates && dd.size != 0 => Some(
                CertificateTable::parse(buf, dd.virtual_address, dd.size)?,
            ),
            _ => None,
        };

        let stub = buf[..pe_header_offset].to_vec();
        let trailing_data = if buf.len() > end_of_sections {
            buf[end_of_sections..].to_vec()
        } else {
            Vec::new()
        };

        let start_of_sections = sections
            .first()
            .map(|s| s.header.virtual_address)
            .unwrap_or(0);

        Ok(Image {
            stub,
            pe_header_offset,
            header,
            sections,
            directory_bindings,
            certificate_table,
            trailing_data,
            start_of_sections,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Replaces the header, rejecting edits to the fields that the rest of
    /// the model depends on structurally: `magic`, `number_of_sections`, and
    /// `number_of_rva_and_sizes`. Leaves the header untouched on error (see
    /// DESIGN.md's resolution of open question (a): a hard error, not the
    /// C API's "set but proceed anyway").
    pub fn set_header(&mut self, header: Header) -> Result<()> {
        if header.optional.standard_fields.magic != self.header.optional.standard_fields.magic {
            return Err(Error::InvalidMutation(
                "cannot change the optional header's magic after parsing".into(),
            ));
        }
        if header.coff.number_of_sections != self.header.coff.number_of_sections {
            return Err(Error::InvalidMutation(
                "number_of_sections must match the current section count".into(),
            ));
        }
        if header.optional.data_directories.len() != self.header.optional.data_directories.len() {
            return Err(Error::InvalidMutation(
                "number_of_rva_and_sizes must match the current data directory count".into(),
            ));
        }
        self.header = header;
        Ok(())
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn sections_mut(&mut self) -> &mut [Section] {
        &mut self.sections
    }

    pub fn certificate_table(&self) -> Option<&CertificateTable> {
        self.certificate_table.as_ref()
    }

    pub fn certificate_table_mut(&mut self) -> &mut Option<CertificateTable> {
        &mut self.certificate_table
    }

    pub fn trailing_data(&self) -> &[u8] {
        &self.trailing_data
    }

    /// The resolved directory-to-section bindings, one slot per data
    /// directory, parallel to `header().optional.data_directories` (§3).
    pub fn directory_bindings(&self) -> &[Option<DirectoryBinding>] {
        &self.directory_bindings
    }

    /// Re-derives geometry fields from the current section list (§4.F). The
    /// only mutator that touches the header's derived fields.
    pub fn recalculate(&mut self) {
        crate::pe::recalculate::recalculate(self);
    }

    /// Computes the final size and, if `out` is `Some`, writes the image
    /// into it. Passing `None` is the size-only query: `store(None)` and
    /// `store(Some(buf))` must agree on the byte count (§8 property 4).
    pub fn store(&self, out: Option<&mut [u8]>) -> Result<usize> {
        let header_size = self.header.size();
        let mut size = self.pe_header_offset + SIZEOF_PE_MAGIC + header_size;

        let section_offset = self.pe_header_offset + SIZEOF_PE_MAGIC + header_size;
        let mut end_of_sections: usize = 0;
        for section in &self.sections {
            let end = section.header.pointer_to_raw_data as usize
                + section.header.size_of_raw_data as usize;
            if end > end_of_sections {
                end_of_sections = end;
            }
        }
        // Sections may physically precede the header on disk.
        if end_of_sections > size {
            size = end_of_sections;
        }

        size += self.trailing_data.len();

        if let Some(cert_table) = &self.certificate_table {
            if !cert_table.is_empty() {
                let cert_end = cert_table.file_offset as usize + cert_table.size();
                if cert_end > size {
                    size = cert_end;
                }
            }
        }

        let Some(buf) = out else {
            return Ok(size);
        };
        if buf.len() < size {
            return Err(Error::OutputBufferTooShort {
                needed: size,
                available: buf.len(),
            });
        }

        for byte in buf.iter_mut() {
            *byte = 0;
        }

        buf[..self.pe_header_offset].copy_from_slice(&self.stub);
        cursor::write_u32(buf, self.pe_header_offset, PE_MAGIC)?;
        let mut off = self.pe_header_offset + SIZEOF_PE_MAGIC;
        self.header.write_into(buf, &mut off)?;

        for (i, section) in self.sections.iter().enumerate() {
            let header_offset = section_offset + i * SECTION_HEADER_SIZE;
            section.write_into(buf, header_offset)?;
        }

        if !self.trailing_data.is_empty() {
            cursor::write_bytes(buf, end_of_sections, &self.trailing_data)?;
        }

        if let Some(cert_table) = &self.certificate_table {
            cert_table.write_into(buf)?;
        }

        Ok(size)
    }
}

/// Implements the §4.5 resolution rule: outer loop over sections in
/// section-table order, inner loop over directories; a section binds
/// directory `d` when `section.virtual_address <= d.virtual_address <=
/// section.virtual_address + section.size_of_raw_data`. The certificate
/// table directory is addressed by file offset, not RVA, and is never
/// resolved to a section.
///
/// Because the loop simply overwrites the binding on every hit, **the last
/// matching section wins** -- kept verbatim from the reference
/// implementation for round-trip parity (REDESIGN FLAGS §9, open question c).
fn resolve_directory_bindings(
    header: &Header,
    sections: &[Section],
) -> Vec<Option<DirectoryBinding>> {
    let mut bindings = alloc::vec![None; header.optional.data_directories.len()];

    for (i, section) in sections.iter().enumerate() {
        let section_va = section.header.virtual_address as u64;
        let section_end = section_va + section.header.size_of_raw_data as u64;

        for (d, binding) in bindings.iter_mut().enumerate() {
            if d == CERTIFICATE_TABLE_DIRECTORY_INDEX {
                continue;
            }
            let Some(dd) = header.optional.data_directories.0.get(d) else {
                continue;
            };
            if !dd.is_present() {
                continue;
            }
            let directory_va = dd.virtual_address as u64;
            if section_va <= directory_va && section_end >= directory_va {
                if binding.is_some() {
                    debug!(
                        "directory {d} binding overwritten: section {i} (\"{}\") supersedes an earlier match",
                        section.header.name_str()
                    );
                }
                *binding = Some(DirectoryBinding {
                    section_index: i,
                    offset: (directory_va - section_va) as u32,
                    size: dd.size,
                    orig_rva: dd.virtual_address,
                    orig_size: dd.size,
                });
            }
        }
    }

    bindings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::data_directories::{DataDirectories, DataDirectory};
    use crate::pe::optional_header::{OptionalHeader, StandardFields, WindowsFields};
    use crate::pe::section_table::SectionHeader;

    fn section_with(va: u32, raw_size: u32) -> Section {
        Section {
            header: SectionHeader {
                virtual_address: va,
                size_of_raw_data: raw_size,
                ..Default::default()
            },
            data: Vec::new(),
        }
    }

    fn header_with_dirs(dirs: Vec<DataDirectory>) -> Header {
        Header {
            coff: Default::default(),
            optional: OptionalHeader {
                standard_fields: StandardFields::default(),
                windows_fields: WindowsFields::default(),
                data_directories: DataDirectories(dirs),
            },
        }
    }

    #[test]
    fn last_matching_section_wins() {
        let sections = alloc::vec![section_with(0x1000, 0x1000), section_with(0x1800, 0x1000)];
        let header = header_with_dirs(alloc::vec![DataDirectory {
            virtual_address: 0x1900,
            size: 0x10
        }]);
        // 0x1900 falls in both (start <= 0x1900 and overlapping end for both
        // sections given how size_of_raw_data is used), last section wins.
        let bindings = resolve_directory_bindings(&header, &sections);
        assert_eq!(bindings[0].unwrap().section_index, 1);
    }

    #[test]
    fn certificate_directory_is_never_bound() {
        let sections = alloc::vec![section_with(0, 0x10000)];
        let mut dirs = alloc::vec![DataDirectory::default(); CERTIFICATE_TABLE_DIRECTORY_INDEX + 1];
        dirs[CERTIFICATE_TABLE_DIRECTORY_INDEX] = DataDirectory {
            virtual_address: 0x200,
            size: 0x100,
        };
        let header = header_with_dirs(dirs);
        let bindings = resolve_directory_bindings(&header, &sections);
        assert!(bindings[CERTIFICATE_TABLE_DIRECTORY_INDEX].is_none());
    }
}
