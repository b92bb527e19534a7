#![no_main]

use libfuzzer_sys::fuzz_target;
use peview::{DataDirectoryType, Layout, PeImage};

fuzz_target!(|data: &[u8]| {
    for layout in [Layout::File, Layout::Mapped] {
        let image = PeImage::new(data, layout);
        let _ = image.image_type();
        let _ = image.dos_stub();

        if let Ok(nt) = image.nt_header() {
            for entry in nt.data_directories().iter() {
                let _ = image.rva_to_data(entry.virtual_address);
            }
        }
        for ty in [DataDirectoryType::Export, DataDirectoryType::ClrRuntime] {
            let _ = image.has_directory(ty);
        }

        if let Ok(sections) = image.sections() {
            for section in sections {
                let rva = section.virtual_address;
                let offset = image.rva_to_offset(rva).unwrap_or(0);
                let _ = image.offset_to_rva(offset);
                let _ = image.cstr_at_rva(rva.wrapping_add(section.virtual_size));
            }
        }
    }
});
