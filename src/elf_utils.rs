//! ELF32 loading. The loader populates an address space with the
//! loadable segments of an executable and reports the entry point; the
//! end of the loaded image is recorded as `text_end` so the program
//! break can never be moved down over the code.

use elf::abi::PT_LOAD;
use elf::endian::AnyEndian;
use elf::ElfBytes;
use thiserror::Error;

use crate::mem::AddressSpace;

#[derive(Debug, Error)]
pub enum ElfError {
    #[error("could not read executable: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse executable: {0}")]
    Parse(#[from] elf::ParseError),
    #[error("segment at 0x{0:x} does not fit in the address space")]
    SegmentOutOfRange(u32),
}

/// Copy every PT_LOAD segment into the address space and return the
/// entry point.
pub fn load_elf(mem: &mut AddressSpace, path: &str) -> Result<u32, ElfError> {
    let file_data = std::fs::read(path)?;
    let file = ElfBytes::<AnyEndian>::minimal_parse(file_data.as_slice())?;

    let mut image_end = 0;
    if let Some(segments) = file.segments() {
        for phdr in segments.iter() {
            if phdr.p_type != PT_LOAD {
                continue;
            }
            let base = phdr.p_vaddr as u32;
            let data = file.segment_data(&phdr)?;
            for (offset, byte) in data.iter().enumerate() {
                mem.store8(base + offset as u32, *byte)
                    .map_err(|_| ElfError::SegmentOutOfRange(base))?;
            }
            // p_memsz can exceed the file data (zero-initialised tail);
            // the backing store is already zeroed
            image_end = image_end.max(base + phdr.p_memsz as u32);
        }
    }
    mem.set_text_end(image_end);

    Ok(file.ehdr.e_entry as u32)
}
