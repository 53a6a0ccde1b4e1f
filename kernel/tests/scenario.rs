mod common;

use common::*;
use kairos::config::{
    DEFAULT_KERNEL_DATA_PAGES, DEFAULT_KERNEL_TEXT_PAGES, KERNEL_STACK_BASE_VPN, KERNEL_STACK_PAGES,
    STAGING_VPN,
};
use kairos::hal::Machine;
use kairos::mm::{user_page_va, Frame, Protection, Region};
use kairos::{Pid, ProcessState};

#[test]
fn boot_maps_the_kernel_and_starts_init() {
    let (kernel, uc) = boot(64);
    let machine = kernel.machine();

    assert_eq!(machine.region0_entry(0).protection(), Protection::RX);
    assert_eq!(machine.region0_entry(0).frame(), Some(Frame(0)));
    let data = DEFAULT_KERNEL_TEXT_PAGES;
    assert_eq!(machine.region0_entry(data).protection(), Protection::RW);
    assert!(!machine.region0_entry(data + DEFAULT_KERNEL_DATA_PAGES).is_valid());
    assert!(!machine.region0_entry(STAGING_VPN).is_valid());

    let init = kernel.process(Pid(0)).unwrap();
    for page in 0..KERNEL_STACK_PAGES {
        assert_eq!(
            machine.region0_entry(KERNEL_STACK_BASE_VPN + page).frame(),
            init.space.frame(Region::KernelStack, page)
        );
    }

    assert_eq!(uc.pc, TEXT);
    assert_eq!(kernel.current_pid(), Some(Pid(0)));
    assert_eq!(kernel.process_state(Pid(0)), Some(ProcessState::Running));
    assert_eq!(kernel.total_frames(), 64);
    assert_eq!(kernel.free_frames(), 64 - FOOTPRINT);
    assert_frames_conserved(&kernel);
}

#[test]
fn shell_style_life_cycle() {
    let (mut kernel, mut uc) = boot(64);
    write_user(&mut kernel, DATA, b"init");

    // A: fork, grow the heap, exec a new program, exit
    assert_eq!(fork(&mut kernel, &mut uc), 0);
    let a = current(&kernel);
    assert_eq!(brk(&mut kernel, &mut uc, user_page_va(6)), 0);
    assert_eq!(kernel.free_frames(), 64 - 2 * FOOTPRINT - 3);

    // B: forked by init while A is still alive
    tick(&mut kernel, &mut uc);
    assert_eq!(current(&kernel), Pid(0));
    assert_eq!(fork(&mut kernel, &mut uc), 0);
    let b = current(&kernel);
    assert_eq!(kernel.free_frames(), 64 - 3 * FOOTPRINT - 3);

    tick(&mut kernel, &mut uc);
    assert_eq!(current(&kernel), a);
    let (name, argv) = stage_exec_args(&mut kernel, "child", &["child", "x"]);
    assert_eq!(exec(&mut kernel, &mut uc, name, argv), 0);
    assert_eq!(kernel.free_frames(), 64 - 3 * FOOTPRINT);
    assert_frames_conserved(&kernel);

    exit(&mut kernel, &mut uc, 21);
    assert_eq!(kernel.free_frames(), 64 - 2 * FOOTPRINT);
    assert_eq!(kernel.process_state(a), Some(ProcessState::Zombie));

    // init collects A, then waits for B
    while current(&kernel) != Pid(0) {
        tick(&mut kernel, &mut uc);
    }
    assert_eq!(read_user(&mut kernel, DATA, 4), b"init");
    assert_eq!(wait(&mut kernel, &mut uc, DATA + 16), a.0 as isize);
    assert_eq!(read_i32(&mut kernel, DATA + 16), 21);

    wait(&mut kernel, &mut uc, DATA + 16);
    assert_eq!(current(&kernel), b);
    exit(&mut kernel, &mut uc, -2);

    assert_eq!(current(&kernel), Pid(0));
    assert_eq!(uc.return_value(), b.0 as isize);
    assert_eq!(read_i32(&mut kernel, DATA + 16), -2);
    assert_eq!(kernel.free_frames(), 64 - FOOTPRINT);
    assert_eq!(kernel.zombie_count(), 0);
    assert!(kernel.ready_queue().is_empty());
    assert!(kernel.blocked().is_empty());
    assert_frames_conserved(&kernel);
}

#[test]
fn switches_flush_stale_translations() {
    let (mut kernel, mut uc) = boot(64);
    write_user(&mut kernel, DATA, b"zero");
    fork(&mut kernel, &mut uc);
    write_user(&mut kernel, DATA, b"one!");

    for _ in 0..4 {
        tick(&mut kernel, &mut uc);
        let expected: &[u8] = if current(&kernel) == Pid(0) { b"zero" } else { b"one!" };
        assert_eq!(read_user(&mut kernel, DATA, 4), expected);
    }
    assert!(kernel.machine().stats().context_switches >= 5);
}
