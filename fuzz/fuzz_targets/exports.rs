#![no_main]

use libfuzzer_sys::fuzz_target;
use peview::{ExportReader, Layout, PeImage};

fuzz_target!(|data: &[u8]| {
    for layout in [Layout::File, Layout::Mapped] {
        let image = PeImage::new(data, layout);
        let Ok(reader) = ExportReader::new(&image) else {
            continue;
        };

        let _ = reader.dll_name();
        let _ = reader.find("GetProcAddress");
        let _ = reader.find_by(|name| name.starts_with(b"Nt"));
        let _ = reader.find_by_ordinal(reader.directory().base);

        for export in reader.clone().take(256).flatten() {
            if let Some(name) = export.name() {
                let _ = reader.find(name);
            }
            let _ = export.forwarder();
        }
    }
});
