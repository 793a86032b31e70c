//! The recalculator (§4.F): given a possibly reordered/edited section list,
//! re-derives the geometry fields that follow from it -- virtual addresses,
//! raw-data pointers, the four `size_of_*` fields, `base_of_code`/
//! `base_of_data`, and the data-directory RVA/size pairs that track
//! sections.
//!
//! Grounded directly on `ppelib_recalculate` in the C sources this crate's
//! PE codec distills: rounding order, the `.bind` section-name special
//! case, and the PE32-vs-PE32+ divergence in `size_of_initialized_data`
//! accumulation are all kept verbatim from there.

use crate::container::Container;
use crate::pe::data_directories::CERTIFICATE_TABLE_DIRECTORY_INDEX;
use crate::pe::image::Image;
use crate::pe::section_table::{
    IMAGE_SCN_CNT_CODE, IMAGE_SCN_CNT_INITIALIZED_DATA, IMAGE_SCN_CNT_UNINITIALIZED_DATA,
    SECTION_HEADER_SIZE,
};
use log::{debug, trace};

fn round_up(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    value.div_ceil(align) * align
}

pub(crate) fn recalculate(image: &mut Image) {
    let file_alignment = image.header.optional.windows_fields.file_alignment as u64;
    let section_alignment = image.header.optional.windows_fields.section_alignment as u64;
    let is_pe32 = image.header.optional.container().is_ok_and(Container::is_little);
    debug!(
        "recalculating geometry for {} sections (file_alignment={file_alignment:#x}, \
         section_alignment={section_alignment:#x})",
        image.sections.len()
    );

    // Seeded from the *old* size_of_headers, which is recomputed below --
    // matches ppelib_recalculate reading pe->header.size_of_headers before
    // overwriting it.
    let mut next_virtual = image.start_of_sections as u64;
    let mut next_physical = image.header.optional.windows_fields.size_of_headers as u64;

    let mut base_of_code: u64 = 0;
    let mut base_of_data: Option<u32> = None;
    let mut size_of_code: u64 = 0;
    let mut size_of_initialized_data: u64 = 0;
    let mut size_of_uninitialized_data: u64 = 0;

    for section in image.sections.iter_mut() {
        let header = &mut section.header;

        if header.size_of_raw_data > 0 && header.virtual_size as u64 <= header.size_of_raw_data as u64 {
            header.size_of_raw_data = round_up(header.virtual_size as u64, file_alignment) as u32;
        }

        header.virtual_address = next_virtual as u32;
        if header.size_of_raw_data > 0 {
            header.pointer_to_raw_data = next_physical as u32;
        }

        next_virtual += round_up(header.virtual_size as u64, section_alignment);
        next_physical += round_up(header.size_of_raw_data as u64, file_alignment);

        trace!(
            "laid out section {} at va={:#x} raw={:#x} (size_of_raw_data={:#x})",
            header.name_str(),
            header.virtual_address,
            header.pointer_to_raw_data,
            header.size_of_raw_data
        );

        let is_code = header.characteristics & IMAGE_SCN_CNT_CODE != 0;
        if is_code {
            if base_of_code == 0 {
                base_of_code = header.virtual_address as u64;
            }
            // Empirically holds across real-world images (ppelib_recalculate).
            if header.name_str() != ".bind" {
                size_of_code += round_up(header.virtual_size as u64, file_alignment);
            }
        }
        if base_of_data.is_none() && !is_code {
            base_of_data = Some(header.virtual_address);
        }

        if header.characteristics & IMAGE_SCN_CNT_INITIALIZED_DATA != 0 {
            if is_pe32 {
                let vs = round_up(header.virtual_size as u64, file_alignment);
                let rs = header.size_of_raw_data as u64;
                size_of_initialized_data += vs.max(rs);
            } else {
                size_of_initialized_data += round_up(header.size_of_raw_data as u64, file_alignment);
            }
        }
        if header.characteristics & IMAGE_SCN_CNT_UNINITIALIZED_DATA != 0 {
            size_of_uninitialized_data += round_up(header.virtual_size as u64, file_alignment);
        }
    }

    let standard = &mut image.header.optional.standard_fields;
    // PE images with only data can have base_of_code set to garbage; keep it
    // as-is unless there's actually code, matching ppelib_recalculate.
    if size_of_code > 0 {
        standard.base_of_code = base_of_code;
    }
    standard.base_of_data = base_of_data.unwrap_or(0);
    standard.size_of_initialized_data = round_up(size_of_initialized_data, file_alignment);
    standard.size_of_uninitialized_data = round_up(size_of_uninitialized_data, file_alignment);
    standard.size_of_code = round_up(size_of_code, file_alignment);
    debug!(
        "derived size_of_code={:#x} size_of_initialized_data={:#x} \
         size_of_uninitialized_data={:#x} base_of_code={:#x}",
        standard.size_of_code, standard.size_of_initialized_data,
        standard.size_of_uninitialized_data, standard.base_of_code
    );

    if let Some(last) = image.sections.last() {
        let virtual_end = last.header.virtual_address as u64 + last.header.virtual_size as u64;
        image.header.optional.windows_fields.size_of_image =
            round_up(virtual_end, section_alignment) as u32;
    }

    let size_of_headers = image.pe_header_offset as u64
        + 4
        + image.header.size() as u64
        + image.sections.len() as u64 * SECTION_HEADER_SIZE as u64;
    image.header.optional.windows_fields.size_of_headers =
        round_up(size_of_headers, file_alignment) as u32;

    for d in 0..image.directory_bindings.len() {
        let binding = image.directory_bindings[d];
        let resolved = binding.map(|b| (image.sections[b.section_index].header.virtual_address, b));
        let Some(dd) = image.header.optional.data_directories.0.get_mut(d) else {
            continue;
        };
        match resolved {
            None => {
                dd.virtual_address = 0;
                dd.size = 0;
            }
            Some((section_va, b)) => {
                dd.virtual_address = section_va + b.offset;
                dd.size = b.size;
                trace!(
                    "directory {d} now at {:#x} (section {} moved to {:#x})",
                    dd.virtual_address, b.section_index, section_va
                );
            }
        }
    }

    if let Some(cert_table) = &image.certificate_table {
        if !cert_table.is_empty() {
            if let Some(dd) = image
                .header
                .optional
                .data_directories
                .0
                .get_mut(CERTIFICATE_TABLE_DIRECTORY_INDEX)
            {
                dd.virtual_address = cert_table.file_offset;
                dd.size = cert_table.total_length();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::header::{CoffHeader, Header};
    use crate::pe::optional_header::{OptionalHeader, StandardFields, WindowsFields, MAGIC_32};
    use crate::pe::data_directories::DataDirectories;
    use crate::pe::section_table::{Section, SectionHeader};
    use alloc::vec;

    fn image_with_one_code_section() -> Image {
        let mut name = [0u8; 8];
        name[..5].copy_from_slice(b".text");
        let section = Section {
            header: SectionHeader {
                name,
                virtual_size: 0x123,
                size_of_raw_data: 0x123,
                characteristics: IMAGE_SCN_CNT_CODE,
                ..Default::default()
            },
            data: vec![0u8; 0x200],
        };
        let header = Header {
            coff: CoffHeader {
                number_of_sections: 1,
                ..Default::default()
            },
            optional: OptionalHeader {
                standard_fields: StandardFields {
                    magic: MAGIC_32,
                    ..Default::default()
                },
                windows_fields: WindowsFields {
                    file_alignment: 0x200,
                    section_alignment: 0x1000,
                    size_of_headers: 0x400,
                    ..Default::default()
                },
                data_directories: DataDirectories(vec![Default::default(); 16]),
            },
        };
        Image {
            stub: vec![0u8; 0x80],
            pe_header_offset: 0x80,
            header,
            sections: vec![section],
            directory_bindings: vec![None; 16],
            certificate_table: None,
            trailing_data: Vec::new(),
            start_of_sections: 0x1000,
        }
    }

    #[test]
    fn rounds_raw_data_up_to_file_alignment() {
        let mut image = image_with_one_code_section();
        recalculate(&mut image);
        assert_eq!(image.sections[0].header.size_of_raw_data, 0x200);
        assert_eq!(image.sections[0].header.virtual_address, 0x1000);
        assert_eq!(image.sections[0].header.pointer_to_raw_data, 0x400);
    }

    #[test]
    fn derives_base_of_code_and_size_of_code() {
        let mut image = image_with_one_code_section();
        recalculate(&mut image);
        assert_eq!(image.header.optional.standard_fields.base_of_code, 0x1000);
        assert_eq!(image.header.optional.standard_fields.size_of_code, 0x200);
    }

    #[test]
    fn recalculate_is_idempotent() {
        let mut image = image_with_one_code_section();
        recalculate(&mut image);
        let first = image.header.clone();
        let first_sections: Vec<_> = image.sections.iter().map(|s| s.header).collect();
        recalculate(&mut image);
        assert_eq!(image.header, first);
        let second_sections: Vec<_> = image.sections.iter().map(|s| s.header).collect();
        assert_eq!(first_sections, second_sections);
    }

    #[test]
    fn bind_section_excluded_from_size_of_code() {
        let mut image = image_with_one_code_section();
        let mut name = [0u8; 8];
        name[..5].copy_from_slice(b".bind");
        image.sections[0].header.name = name;
        recalculate(&mut image);
        assert_eq!(image.header.optional.standard_fields.size_of_code, 0);
        // base_of_code is only written when size_of_code > 0.
        assert_eq!(image.header.optional.standard_fields.base_of_code, 0);
    }
}
