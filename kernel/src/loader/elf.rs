//! ELF program loader
//!
//! Programs are registered by name as raw ELF64 images. Loading checks the
//! whole image and the argument layout before committing, so a bad program
//! leaves the caller running.

use super::{LoadError, LoadTarget, LoadedImage, ProgramLoader};
use crate::config::{
    HEAP_STACK_GAP_PAGES, INITIAL_STACK_FRAME_SIZE, REGION1_BASE, REGION1_LIMIT, REGION1_PAGES,
    WORD_SIZE,
};
use crate::mm::{user_page_ceil, user_page_of, Protection};
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::ops::Range;
use xmas_elf::header::Class;
use xmas_elf::program::Type;
use xmas_elf::ElfFile;

const PHDR64_SIZE: usize = 56;

/// A `PT_LOAD` segment, checked against the image and the user region
struct LoadSegment {
    vaddr: usize,
    mem_size: usize,
    file: Range<usize>,
    prot: Protection,
}

impl LoadSegment {
    fn pages(&self) -> Range<usize> {
        let first = user_page_of(self.vaddr).unwrap_or(0);
        let end = user_page_ceil(self.vaddr + self.mem_size).unwrap_or(REGION1_PAGES);
        first..end
    }
}

/// Initial stack contents: argument strings at the top of the user region,
/// then `argc`, the `argv` pointers and two NULL words below them
struct ArgLayout {
    strings_va: usize,
    strings: Vec<u8>,
    words_va: usize,
    words: Vec<u8>,
    stack_pointer: usize,
}

impl ArgLayout {
    fn new(args: &[String]) -> Result<Self, LoadError> {
        let mut strings = Vec::new();
        let mut offsets = Vec::with_capacity(args.len());
        for arg in args {
            offsets.push(strings.len());
            strings.extend_from_slice(arg.as_bytes());
            strings.push(0);
        }
        let too_big = LoadError::BadFormat("arguments do not fit");
        let strings_va = REGION1_LIMIT.checked_sub(strings.len()).ok_or(too_big)?;
        let words_va = strings_va
            .checked_sub((args.len() + 3) * WORD_SIZE)
            .ok_or(too_big)?
            & !(WORD_SIZE - 1);
        let stack_pointer = words_va.checked_sub(INITIAL_STACK_FRAME_SIZE).ok_or(too_big)?;
        if stack_pointer < REGION1_BASE {
            return Err(too_big);
        }

        let mut words = Vec::with_capacity((args.len() + 3) * WORD_SIZE);
        words.extend_from_slice(&(args.len() as u64).to_le_bytes());
        for offset in offsets {
            words.extend_from_slice(&((strings_va + offset) as u64).to_le_bytes());
        }
        words.extend_from_slice(&[0; 2 * WORD_SIZE]);

        Ok(Self {
            strings_va,
            strings,
            words_va,
            words,
            stack_pointer,
        })
    }

    fn stack_floor_page(&self) -> usize {
        user_page_of(self.stack_pointer).unwrap_or(0)
    }
}

#[derive(Default)]
pub struct ElfLoader {
    programs: BTreeMap<String, Vec<u8>>,
}

impl ElfLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `image` loadable under `name`, replacing any previous image
    pub fn register(&mut self, name: &str, image: Vec<u8>) {
        self.programs.insert(String::from(name), image);
    }

    pub fn with_program(mut self, name: &str, image: Vec<u8>) -> Self {
        self.register(name, image);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }
}

impl ProgramLoader for ElfLoader {
    fn load(
        &mut self,
        name: &str,
        args: &[String],
        target: &mut dyn LoadTarget,
    ) -> Result<LoadedImage, LoadError> {
        let image = self.programs.get(name).ok_or(LoadError::NotFound)?;
        let (entry, segments) = parse(image)?;

        let heap_start_page = segments.iter().map(|seg| seg.pages().end).max().unwrap_or(0);
        let layout = ArgLayout::new(args)?;
        let stack_floor_page = layout.stack_floor_page();
        if heap_start_page + HEAP_STACK_GAP_PAGES > stack_floor_page {
            return Err(LoadError::BadFormat("no room between heap and stack"));
        }

        target.commit().map_err(LoadError::Killed)?;

        for seg in &segments {
            let pages = seg.pages();
            target
                .map(pages.start, pages.len(), Protection::RW)
                .map_err(LoadError::Killed)?;
            if !seg.file.is_empty() {
                target.write(seg.vaddr, &image[seg.file.clone()]).map_err(LoadError::Killed)?;
            }
        }
        target
            .map(stack_floor_page, REGION1_PAGES - stack_floor_page, Protection::RW)
            .map_err(LoadError::Killed)?;
        target.write(layout.strings_va, &layout.strings).map_err(LoadError::Killed)?;
        target.write(layout.words_va, &layout.words).map_err(LoadError::Killed)?;

        // Pages shared by two segments get both protections
        let mut prot: BTreeMap<usize, Protection> = BTreeMap::new();
        for seg in &segments {
            for page in seg.pages() {
                *prot.entry(page).or_insert(Protection::empty()) |= seg.prot;
            }
        }
        for (page, prot) in prot {
            target.protect(page, 1, prot).map_err(LoadError::Killed)?;
        }

        log::debug!(
            "loaded '{}': entry {:#x}, sp {:#x}, heap page {}, stack page {}",
            name,
            entry,
            layout.stack_pointer,
            heap_start_page,
            stack_floor_page
        );
        Ok(LoadedImage {
            entry,
            stack_pointer: layout.stack_pointer,
            heap_start_page,
            stack_floor_page,
        })
    }
}

/// Validate `image` and collect its loadable segments
fn parse(image: &[u8]) -> Result<(usize, Vec<LoadSegment>), LoadError> {
    let elf = ElfFile::new(image).map_err(LoadError::BadFormat)?;
    if elf.header.pt1.class() != Class::SixtyFour {
        return Err(LoadError::BadFormat("not a 64-bit image"));
    }
    let ph_count = elf.header.pt2.ph_count() as usize;
    let ph_end = (elf.header.pt2.ph_offset() as usize).saturating_add(ph_count * PHDR64_SIZE);
    if elf.header.pt2.ph_entry_size() as usize != PHDR64_SIZE || ph_end > image.len() {
        return Err(LoadError::BadFormat("program headers out of bounds"));
    }

    let entry = elf.header.pt2.entry_point() as usize;
    if user_page_of(entry).is_none() {
        return Err(LoadError::BadFormat("entry point outside the user region"));
    }

    let mut segments = Vec::new();
    for i in 0..ph_count {
        let ph = elf.program_header(i as u16).map_err(LoadError::BadFormat)?;
        if ph.get_type().map_err(LoadError::BadFormat)? != Type::Load {
            continue;
        }
        let vaddr = ph.virtual_addr() as usize;
        let mem_size = ph.mem_size() as usize;
        let file_size = ph.file_size() as usize;
        let offset = ph.offset() as usize;
        if mem_size == 0 {
            continue;
        }
        if file_size > mem_size {
            return Err(LoadError::BadFormat("segment file size exceeds memory size"));
        }
        let file_end = offset.checked_add(file_size).filter(|&end| end <= image.len());
        let Some(file_end) = file_end else {
            return Err(LoadError::BadFormat("segment data out of bounds"));
        };
        let fits = vaddr >= REGION1_BASE
            && vaddr.checked_add(mem_size).map_or(false, |end| end <= REGION1_LIMIT);
        if !fits {
            return Err(LoadError::BadFormat("segment outside the user region"));
        }

        let flags = ph.flags();
        let mut prot = Protection::empty();
        if flags.is_read() {
            prot |= Protection::READ;
        }
        if flags.is_write() {
            prot |= Protection::WRITE;
        }
        if flags.is_execute() {
            prot |= Protection::EXEC;
        }
        if prot.is_empty() {
            prot = Protection::READ;
        }

        segments.push(LoadSegment {
            vaddr,
            mem_size,
            file: offset..file_end,
            prot,
        });
    }
    if segments.is_empty() {
        return Err(LoadError::BadFormat("no loadable segment"));
    }
    Ok((entry, segments))
}
