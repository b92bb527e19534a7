//! Synthetic PE images for integration tests.

#![allow(dead_code)]

use peview::DataDirectoryType;

pub const E_LFANEW: u32 = 0x80;
pub const SIZE_OF_HEADERS: u32 = 0x400;

/// A section and the bytes backing it.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: &'static str,
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub pointer_to_raw_data: u32,
    pub size_of_raw_data: u32,
    pub data: Vec<u8>,
}

impl Section {
    pub fn new(name: &'static str, virtual_address: u32, pointer_to_raw_data: u32, data: Vec<u8>) -> Self {
        let size = data.len() as u32;
        Self {
            name,
            virtual_address,
            virtual_size: size,
            pointer_to_raw_data,
            size_of_raw_data: size,
            data,
        }
    }

    pub fn virtual_size(mut self, size: u32) -> Self {
        self.virtual_size = size;
        self
    }
}

/// Builds a PE32 or PE32+ image in file or mapped layout.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    pe64: bool,
    e_lfanew: u32,
    number_of_rva_and_sizes: u32,
    directories: [(u32, u32); 16],
    sections: Vec<Section>,
}

impl ImageBuilder {
    pub fn pe64() -> Self {
        Self {
            pe64: true,
            e_lfanew: E_LFANEW,
            number_of_rva_and_sizes: 16,
            directories: [(0, 0); 16],
            sections: Vec::new(),
        }
    }

    pub fn pe32() -> Self {
        Self {
            pe64: false,
            ..Self::pe64()
        }
    }

    pub fn e_lfanew(mut self, e_lfanew: u32) -> Self {
        self.e_lfanew = e_lfanew;
        self
    }

    pub fn number_of_rva_and_sizes(mut self, count: u32) -> Self {
        self.number_of_rva_and_sizes = count;
        self
    }

    pub fn directory(mut self, ty: DataDirectoryType, rva: u32, size: u32) -> Self {
        self.directories[ty.as_index()] = (rva, size);
        self
    }

    pub fn section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    fn optional_base_size(&self) -> usize {
        if self.pe64 {
            112
        } else {
            96
        }
    }

    pub fn optional_header_offset(&self) -> usize {
        self.e_lfanew as usize + 4 + 20
    }

    pub fn section_table_offset(&self) -> usize {
        self.optional_header_offset()
            + self.optional_base_size()
            + self.number_of_rva_and_sizes as usize * 8
    }

    pub fn size_of_image(&self) -> u32 {
        self.sections
            .iter()
            .map(|s| s.virtual_address + s.virtual_size.max(s.size_of_raw_data))
            .max()
            .unwrap_or(0)
            .max(SIZE_OF_HEADERS)
    }

    fn headers(&self) -> Vec<u8> {
        let mut buf = vec![0u8; SIZE_OF_HEADERS as usize];

        // DOS header and stub
        buf[0..2].copy_from_slice(b"MZ");
        buf[60..64].copy_from_slice(&self.e_lfanew.to_le_bytes());
        buf[64..self.e_lfanew as usize].fill(0xCC);

        // PE signature and COFF header
        let nt = self.e_lfanew as usize;
        buf[nt..nt + 4].copy_from_slice(b"PE\0\0");
        let machine: u16 = if self.pe64 { 0x8664 } else { 0x014C };
        buf[nt + 4..nt + 6].copy_from_slice(&machine.to_le_bytes());
        buf[nt + 6..nt + 8].copy_from_slice(&(self.sections.len() as u16).to_le_bytes());
        let size_of_optional_header = self.section_table_offset() - self.optional_header_offset();
        buf[nt + 20..nt + 22].copy_from_slice(&(size_of_optional_header as u16).to_le_bytes());
        buf[nt + 22..nt + 24].copy_from_slice(&0x2022u16.to_le_bytes());

        // Optional header
        let opt = self.optional_header_offset();
        let magic: u16 = if self.pe64 { 0x20B } else { 0x10B };
        buf[opt..opt + 2].copy_from_slice(&magic.to_le_bytes());
        if self.pe64 {
            buf[opt + 24..opt + 32].copy_from_slice(&0x1_8000_0000u64.to_le_bytes());
        } else {
            buf[opt + 28..opt + 32].copy_from_slice(&0x1000_0000u32.to_le_bytes());
        }
        buf[opt + 32..opt + 36].copy_from_slice(&0x1000u32.to_le_bytes());
        buf[opt + 36..opt + 40].copy_from_slice(&0x200u32.to_le_bytes());
        buf[opt + 56..opt + 60].copy_from_slice(&self.size_of_image().to_le_bytes());
        buf[opt + 60..opt + 64].copy_from_slice(&SIZE_OF_HEADERS.to_le_bytes());
        let base = self.optional_base_size();
        buf[opt + base - 4..opt + base].copy_from_slice(&self.number_of_rva_and_sizes.to_le_bytes());
        let declared = (self.number_of_rva_and_sizes as usize).min(16);
        for (i, (rva, size)) in self.directories.iter().take(declared).enumerate() {
            let at = opt + base + i * 8;
            buf[at..at + 4].copy_from_slice(&rva.to_le_bytes());
            buf[at + 4..at + 8].copy_from_slice(&size.to_le_bytes());
        }

        // Section table
        for (i, s) in self.sections.iter().enumerate() {
            let at = self.section_table_offset() + i * 40;
            let name = s.name.as_bytes();
            buf[at..at + name.len()].copy_from_slice(name);
            buf[at + 8..at + 12].copy_from_slice(&s.virtual_size.to_le_bytes());
            buf[at + 12..at + 16].copy_from_slice(&s.virtual_address.to_le_bytes());
            buf[at + 16..at + 20].copy_from_slice(&s.size_of_raw_data.to_le_bytes());
            buf[at + 20..at + 24].copy_from_slice(&s.pointer_to_raw_data.to_le_bytes());
            buf[at + 36..at + 40].copy_from_slice(&0x4000_0040u32.to_le_bytes());
        }

        buf
    }

    /// On-disk layout: section bytes at their raw-data pointers.
    pub fn build_file(&self) -> Vec<u8> {
        let len = self
            .sections
            .iter()
            .map(|s| s.pointer_to_raw_data + s.size_of_raw_data)
            .max()
            .unwrap_or(0)
            .max(SIZE_OF_HEADERS) as usize;
        let mut buf = self.headers();
        buf.resize(len, 0);
        for s in &self.sections {
            let at = s.pointer_to_raw_data as usize;
            let n = s.data.len().min(s.size_of_raw_data as usize);
            buf[at..at + n].copy_from_slice(&s.data[..n]);
        }
        buf
    }

    /// Loaded layout: section bytes at their RVAs.
    pub fn build_mapped(&self) -> Vec<u8> {
        let mut buf = self.headers();
        buf.resize(self.size_of_image() as usize, 0);
        for s in &self.sections {
            let at = s.virtual_address as usize;
            let n = s.data.len().min(s.size_of_raw_data as usize);
            buf[at..at + n].copy_from_slice(&s.data[..n]);
        }
        buf
    }
}

/// Where an export address table slot points.
#[derive(Debug, Clone)]
pub enum Target {
    Rva(u32),
    Forward(&'static str),
    Empty,
}

/// Lays out an export directory with its tables and strings.
#[derive(Debug, Clone)]
pub struct ExportBuilder {
    dll_name: &'static str,
    base: u32,
    entries: Vec<(Option<&'static str>, Target)>,
    unsorted: bool,
}

impl ExportBuilder {
    pub fn new(dll_name: &'static str) -> Self {
        Self {
            dll_name,
            base: 1,
            entries: Vec::new(),
            unsorted: false,
        }
    }

    pub fn base(mut self, base: u32) -> Self {
        self.base = base;
        self
    }

    pub fn export(mut self, name: &'static str, rva: u32) -> Self {
        self.entries.push((Some(name), Target::Rva(rva)));
        self
    }

    pub fn forward(mut self, name: &'static str, target: &'static str) -> Self {
        self.entries.push((Some(name), Target::Forward(target)));
        self
    }

    pub fn unnamed(mut self, rva: u32) -> Self {
        self.entries.push((None, Target::Rva(rva)));
        self
    }

    pub fn empty_slot(mut self) -> Self {
        self.entries.push((None, Target::Empty));
        self
    }

    /// Write the name table in descending instead of ascending order.
    pub fn unsorted(mut self) -> Self {
        self.unsorted = true;
        self
    }

    /// Bytes for a section starting at `rva`, directory first; the
    /// directory size covers everything, so forwarder strings fall inside it.
    pub fn build(&self, rva: u32) -> Vec<u8> {
        let mut named: Vec<(&str, u16)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, (name, _))| name.map(|n| (n, i as u16)))
            .collect();
        named.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
        if self.unsorted {
            named.reverse();
        }

        let functions_at = 40;
        let names_at = functions_at + self.entries.len() * 4;
        let ordinals_at = names_at + named.len() * 4;
        let strings_at = ordinals_at + named.len() * 2;

        let mut buf = vec![0u8; strings_at];
        let push = |buf: &mut Vec<u8>, s: &str| -> u32 {
            let at = buf.len();
            buf.extend_from_slice(s.as_bytes());
            buf.push(0);
            rva + at as u32
        };

        let dll_name_rva = push(&mut buf, self.dll_name);
        for (i, (_, target)) in self.entries.iter().enumerate() {
            let value = match target {
                Target::Rva(r) => *r,
                Target::Forward(t) => push(&mut buf, t),
                Target::Empty => 0,
            };
            let at = functions_at + i * 4;
            buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        for (i, (name, ordinal)) in named.iter().enumerate() {
            let name_rva = push(&mut buf, name);
            let at = names_at + i * 4;
            buf[at..at + 4].copy_from_slice(&name_rva.to_le_bytes());
            let at = ordinals_at + i * 2;
            buf[at..at + 2].copy_from_slice(&ordinal.to_le_bytes());
        }

        let fields: [(usize, u32); 8] = [
            (12, dll_name_rva),
            (16, self.base),
            (20, self.entries.len() as u32),
            (24, named.len() as u32),
            (28, rva + functions_at as u32),
            (32, rva + names_at as u32),
            (36, rva + ordinals_at as u32),
            (4, 0x5F5E_1000),
        ];
        for (at, value) in fields {
            buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        buf
    }
}

pub const TEXT_RVA: u32 = 0x1000;
pub const TEXT_RAW: u32 = 0x400;
pub const EDATA_RVA: u32 = 0x3000;
pub const EDATA_RAW: u32 = 0x800;

/// An image with a `.text` section at 0x1000 (raw 0x400) and the exports in
/// `.edata` at 0x3000 (raw 0x800).
pub fn image_with_exports(builder: ImageBuilder, exports: &ExportBuilder) -> ImageBuilder {
    let mut edata = exports.build(EDATA_RVA);
    let size = edata.len() as u32;
    edata.resize(edata.len().next_multiple_of(0x200), 0);

    builder
        .section(Section::new(".text", TEXT_RVA, TEXT_RAW, vec![0xC3; 0x400]).virtual_size(0x1800))
        .section(Section::new(".edata", EDATA_RVA, EDATA_RAW, edata))
        .directory(DataDirectoryType::Export, EDATA_RVA, size)
}

/// Offset of `ptr` from the start of `buf`.
pub fn offset_in(buf: &[u8], ptr: *const u8) -> usize {
    ptr as usize - buf.as_ptr() as usize
}
