//! Minimal ELF64 writer
//!
//! Produces executables with only program headers, enough for
//! [`super::ElfLoader`]. Used to prepare programs for the simulated machine.

use crate::mm::Protection;
use alloc::vec::Vec;

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;
const EM_RISCV: u16 = 0xF3;
const ET_EXEC: u16 = 2;
const PT_LOAD: u32 = 1;
const PF_X: u32 = 1;
const PF_W: u32 = 2;
const PF_R: u32 = 4;

struct Segment {
    vaddr: usize,
    mem_size: usize,
    prot: Protection,
    data: Vec<u8>,
}

#[derive(Default)]
pub struct ImageBuilder {
    entry: usize,
    segments: Vec<Segment>,
}

impl ImageBuilder {
    pub fn new(entry: usize) -> Self {
        Self {
            entry,
            segments: Vec::new(),
        }
    }

    /// Add a loadable segment. `mem_size` below `data.len()` is raised to it.
    pub fn segment(mut self, vaddr: usize, prot: Protection, data: &[u8], mem_size: usize) -> Self {
        self.segments.push(Segment {
            vaddr,
            mem_size: mem_size.max(data.len()),
            prot,
            data: data.to_vec(),
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let phnum = self.segments.len();

        out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
        out.extend_from_slice(&[0; 8]);
        put16(&mut out, ET_EXEC);
        put16(&mut out, EM_RISCV);
        put32(&mut out, 1);
        put64(&mut out, self.entry);
        put64(&mut out, EHDR_SIZE);
        put64(&mut out, 0);
        put32(&mut out, 0);
        put16(&mut out, EHDR_SIZE as u16);
        put16(&mut out, PHDR_SIZE as u16);
        put16(&mut out, phnum as u16);
        put16(&mut out, 0);
        put16(&mut out, 0);
        put16(&mut out, 0);

        let mut offset = EHDR_SIZE + phnum * PHDR_SIZE;
        for seg in &self.segments {
            let mut flags = 0;
            if seg.prot.contains(Protection::READ) {
                flags |= PF_R;
            }
            if seg.prot.contains(Protection::WRITE) {
                flags |= PF_W;
            }
            if seg.prot.contains(Protection::EXEC) {
                flags |= PF_X;
            }
            put32(&mut out, PT_LOAD);
            put32(&mut out, flags);
            put64(&mut out, offset);
            put64(&mut out, seg.vaddr);
            put64(&mut out, seg.vaddr);
            put64(&mut out, seg.data.len());
            put64(&mut out, seg.mem_size);
            put64(&mut out, 0x1000);
            offset += align8(seg.data.len());
        }
        for seg in &self.segments {
            out.extend_from_slice(&seg.data);
            out.resize(align8(out.len()), 0);
        }
        out
    }
}

fn align8(n: usize) -> usize {
    (n + 7) & !7
}

fn put16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put64(out: &mut Vec<u8>, v: usize) {
    out.extend_from_slice(&(v as u64).to_le_bytes());
}
