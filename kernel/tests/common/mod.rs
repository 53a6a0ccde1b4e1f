#![allow(dead_code)]

use std::collections::BTreeSet;

use kairos::config::{PAGE_SIZE, REGION0_PAGES, REGION1_BASE};
use kairos::hal::sim::SimMachine;
use kairos::hal::Machine;
use kairos::loader::{ElfLoader, ImageBuilder, ProgramLoader};
use kairos::mm::Protection;
use kairos::syscall::{
    SYSCALL_BRK, SYSCALL_DELAY, SYSCALL_EXEC, SYSCALL_EXIT, SYSCALL_FORK, SYSCALL_GETPID,
    SYSCALL_WAIT,
};
use kairos::trap::FAULT_MAPERR;
use kairos::{BootParams, Kernel, Pid, TrapKind, UserContext};

pub type SimKernel = Kernel<SimMachine>;

/// Start of the text segment and entry point of every test program
pub const TEXT: usize = REGION1_BASE;
/// Start of the data segment; two pages long
pub const DATA: usize = REGION1_BASE + PAGE_SIZE;
/// Frames a freshly loaded test program owns: text, two data pages, one
/// stack page and the kernel stack
pub const FOOTPRINT: usize = 6;

/// Text page 0, data pages 1 and 2, heap from page 3
pub fn program() -> Vec<u8> {
    ImageBuilder::new(TEXT)
        .segment(TEXT, Protection::RX, &[0x13, 0, 0, 0, 0x73, 0, 0, 0], PAGE_SIZE)
        .segment(DATA, Protection::RW, b"initial data", 0x1800)
        .build()
}

pub fn loader() -> ElfLoader {
    ElfLoader::new()
        .with_program("init", program())
        .with_program("child", program())
}

pub fn boot(pool: usize) -> (SimKernel, UserContext) {
    boot_with(pool, loader(), BootParams::default())
}

pub fn boot_with(
    pool: usize,
    loader: impl ProgramLoader + 'static,
    params: BootParams,
) -> (SimKernel, UserContext) {
    let mut uc = UserContext::default();
    let kernel =
        Kernel::boot(SimMachine::new(REGION0_PAGES + pool), loader, params, &mut uc).expect("boot");
    (kernel, uc)
}

pub fn syscall(
    kernel: &mut SimKernel,
    uc: &mut UserContext,
    number: usize,
    args: &[usize],
) -> isize {
    uc.code = number;
    for (slot, arg) in uc.regs.iter_mut().zip(args) {
        *slot = *arg;
    }
    kernel.trap(TrapKind::Kernel, uc);
    uc.return_value()
}

pub fn fork(kernel: &mut SimKernel, uc: &mut UserContext) -> isize {
    syscall(kernel, uc, SYSCALL_FORK, &[])
}

pub fn exec(
    kernel: &mut SimKernel,
    uc: &mut UserContext,
    name_ptr: usize,
    argv_ptr: usize,
) -> isize {
    syscall(kernel, uc, SYSCALL_EXEC, &[name_ptr, argv_ptr])
}

pub fn exit(kernel: &mut SimKernel, uc: &mut UserContext, status: i32) -> isize {
    syscall(kernel, uc, SYSCALL_EXIT, &[status as isize as usize])
}

pub fn wait(kernel: &mut SimKernel, uc: &mut UserContext, status_ptr: usize) -> isize {
    syscall(kernel, uc, SYSCALL_WAIT, &[status_ptr])
}

pub fn getpid(kernel: &mut SimKernel, uc: &mut UserContext) -> isize {
    syscall(kernel, uc, SYSCALL_GETPID, &[])
}

pub fn brk(kernel: &mut SimKernel, uc: &mut UserContext, addr: usize) -> isize {
    syscall(kernel, uc, SYSCALL_BRK, &[addr])
}

pub fn delay(kernel: &mut SimKernel, uc: &mut UserContext, ticks: isize) -> isize {
    syscall(kernel, uc, SYSCALL_DELAY, &[ticks as usize])
}

pub fn tick(kernel: &mut SimKernel, uc: &mut UserContext) {
    kernel.trap(TrapKind::Clock, uc);
}

pub fn fault(kernel: &mut SimKernel, uc: &mut UserContext, addr: usize, code: usize) {
    uc.code = code;
    uc.addr = addr;
    kernel.trap(TrapKind::Memory, uc);
}

pub fn touch_stack(kernel: &mut SimKernel, uc: &mut UserContext, addr: usize) {
    fault(kernel, uc, addr, FAULT_MAPERR);
}

pub fn current(kernel: &SimKernel) -> Pid {
    kernel.current_pid().expect("a process is running")
}

/// Store bytes through the running process's user mapping
pub fn write_user(kernel: &mut SimKernel, va: usize, data: &[u8]) {
    kernel.machine_mut().write_virt(va, data).expect("user write");
}

pub fn read_user(kernel: &mut SimKernel, va: usize, len: usize) -> Vec<u8> {
    let mut buf = vec![0; len];
    kernel.machine_mut().read_virt(va, &mut buf).expect("user read");
    buf
}

pub fn read_i32(kernel: &mut SimKernel, va: usize) -> i32 {
    i32::from_le_bytes(read_user(kernel, va, 4).try_into().unwrap())
}

pub fn read_word(kernel: &mut SimKernel, va: usize) -> usize {
    u64::from_le_bytes(read_user(kernel, va, 8).try_into().unwrap()) as usize
}

/// Lay out a NUL-terminated string and a one- or more-entry argv in the
/// data segment; returns (name_ptr, argv_ptr)
pub fn stage_exec_args(kernel: &mut SimKernel, name: &str, args: &[&str]) -> (usize, usize) {
    let strings = DATA + 0x100;
    let vector = DATA + 0x400;
    let mut cursor = strings;
    let mut pointers = Vec::new();
    for s in std::iter::once(&name).chain(args) {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        write_user(kernel, cursor, &bytes);
        pointers.push(cursor);
        cursor += bytes.len();
    }
    let mut words = Vec::new();
    for ptr in pointers.iter().skip(1).chain(std::iter::once(&0)) {
        words.extend_from_slice(&(*ptr as u64).to_le_bytes());
    }
    write_user(kernel, vector, &words);
    (strings, vector)
}

/// Every frame is either free or owned by exactly one page of one process
pub fn assert_frames_conserved(kernel: &SimKernel) {
    let owned = kernel.owned_frames();
    let unique: BTreeSet<_> = owned.iter().copied().collect();
    assert_eq!(unique.len(), owned.len(), "a frame is mapped twice");
    assert_eq!(kernel.free_frames() + owned.len(), kernel.total_frames());
}
