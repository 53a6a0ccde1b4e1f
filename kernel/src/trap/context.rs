//! User context saved on trap entry

/// Number of general registers in a user context
pub const USER_REGS: usize = 8;

/// Memory trap code: no mapping for the address
pub const FAULT_MAPERR: usize = 1;

/// Memory trap code: mapping forbids the access
pub const FAULT_ACCERR: usize = 2;

/// User-mode state handed to the kernel on every trap and restored on return.
///
/// `vector` says which trap this is, `code` and `addr` carry the details
/// (syscall number, fault kind and address). System call arguments are in
/// `regs` and the result goes back in `regs[0]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct UserContext {
    pub vector: usize,
    pub code: usize,
    pub addr: usize,
    pub pc: usize,
    pub sp: usize,
    pub regs: [usize; USER_REGS],
}

impl UserContext {
    /// Initialize the context for a freshly loaded program
    pub fn app_init_context(entry: usize, sp: usize) -> Self {
        Self {
            pc: entry,
            sp,
            ..Self::default()
        }
    }

    /// Store a system call result in the return register
    pub fn set_return(&mut self, value: isize) {
        self.regs[0] = value as usize;
    }

    /// Return register read back as a signed value
    pub fn return_value(&self) -> isize {
        self.regs[0] as isize
    }
}
