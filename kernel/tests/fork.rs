mod common;

use common::*;
use kairos::config::{KERNEL_STACK_BASE_VPN, KERNEL_STACK_PAGES};
use kairos::hal::Machine;
use kairos::mm::Region;
use kairos::{KernelError, Pid, ProcessState};

#[test]
fn parent_gets_child_pid_and_child_gets_zero() {
    let (mut kernel, mut uc) = boot(64);
    uc.pc = 0x8_0040;
    uc.regs[3] = 0xfeed;

    assert_eq!(fork(&mut kernel, &mut uc), 0);
    assert_eq!(current(&kernel), Pid(1));
    assert_eq!(uc.pc, 0x8_0040);
    assert_eq!(uc.regs[3], 0xfeed);
    assert_eq!(getpid(&mut kernel, &mut uc), 1);

    tick(&mut kernel, &mut uc);
    assert_eq!(current(&kernel), Pid(0));
    assert_eq!(uc.return_value(), 1);
    assert_eq!(uc.regs[3], 0xfeed);
    assert_eq!(kernel.process(Pid(0)).unwrap().children, [Pid(1)]);
    assert_eq!(kernel.process(Pid(1)).unwrap().parent, Some(Pid(0)));
}

#[test]
fn child_memory_is_a_private_copy() {
    let (mut kernel, mut uc) = boot(64);
    write_user(&mut kernel, DATA, b"parent");

    fork(&mut kernel, &mut uc);
    assert_eq!(read_user(&mut kernel, DATA, 6), b"parent");
    write_user(&mut kernel, DATA, b"child!");

    exit(&mut kernel, &mut uc, 0);
    assert_eq!(current(&kernel), Pid(0));
    assert_eq!(read_user(&mut kernel, DATA, 6), b"parent");
}

#[test]
fn fork_duplicates_every_page() {
    let (mut kernel, mut uc) = boot(64);
    let before = kernel.free_frames();
    fork(&mut kernel, &mut uc);

    let parent = kernel.process(Pid(0)).unwrap();
    let child = kernel.process(Pid(1)).unwrap();
    assert_eq!(child.space.valid_pages(), parent.space.valid_pages());
    assert_eq!(kernel.free_frames(), before - FOOTPRINT);
    assert_eq!(
        (child.heap_base, child.brk, child.stack_floor),
        (parent.heap_base, parent.brk, parent.stack_floor)
    );
    for (page, _, prot) in parent.space.user_table().valid_entries() {
        assert_eq!(child.space.user_table().entry(page).protection(), prot);
    }
    assert_frames_conserved(&kernel);
}

#[test]
fn child_starts_from_a_clone_of_the_parent_kernel_stack() {
    let (mut kernel, mut uc) = boot(64);
    fork(&mut kernel, &mut uc);

    let parent = kernel.process(Pid(0)).unwrap();
    let child = kernel.process(Pid(1)).unwrap();
    assert!(parent.kernel_cx.is_some());
    assert_eq!(child.kernel_cx, parent.kernel_cx);
    assert_eq!(kernel.machine().running_context(), child.kernel_cx.unwrap());

    for page in 0..KERNEL_STACK_PAGES {
        let theirs = parent.space.frame(Region::KernelStack, page).unwrap();
        let ours = child.space.frame(Region::KernelStack, page).unwrap();
        assert_ne!(theirs, ours);
        assert_eq!(kernel.machine().physical(theirs), kernel.machine().physical(ours));
        // the window now shows the child's stack
        assert_eq!(
            kernel.machine().region0_entry(KERNEL_STACK_BASE_VPN + page).frame(),
            Some(ours)
        );
    }
}

#[test]
fn fork_without_memory_changes_nothing() {
    let (mut kernel, mut uc) = boot(FOOTPRINT + 3);
    assert_eq!(fork(&mut kernel, &mut uc), KernelError::OutOfMemory.code());
    assert_eq!(current(&kernel), Pid(0));
    assert_eq!(kernel.free_frames(), 3);
    assert_eq!(kernel.process_state(Pid(1)), None);
    assert_eq!(kernel.process_state(Pid(0)), Some(ProcessState::Running));
    assert!(kernel.ready_queue().is_empty());
    assert_frames_conserved(&kernel);
}
