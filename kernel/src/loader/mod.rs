//! Program loading
//!
//! The kernel does not know executable formats. Exec and boot hand a
//! [`ProgramLoader`] the program name, its arguments and a [`LoadTarget`]
//! through which the loader builds the new user image.

mod elf;
mod image;

pub use elf::ElfLoader;
pub use image::ImageBuilder;

use crate::mm::Protection;
use crate::{KernelError, KernelResult};
use alloc::string::String;
use core::fmt;

/// Where a freshly loaded image starts
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoadedImage {
    pub entry: usize,
    pub stack_pointer: usize,
    /// First user page above the loaded segments
    pub heap_start_page: usize,
    /// Lowest user page of the initial stack
    pub stack_floor_page: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// No program by that name
    NotFound,
    /// The image cannot be loaded; the caller's image is untouched
    BadFormat(&'static str),
    /// Failure after commit; the caller's image is already gone
    Killed(KernelError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::NotFound => write!(f, "program not found"),
            LoadError::BadFormat(why) => write!(f, "bad executable: {}", why),
            LoadError::Killed(err) => write!(f, "load failed after commit: {}", err),
        }
    }
}

impl From<LoadError> for KernelError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::NotFound => KernelError::NotFound,
            LoadError::BadFormat(_) => KernelError::BadFormat,
            LoadError::Killed(err) => err,
        }
    }
}

/// The process image under construction.
///
/// Nothing may be mapped or written before [`LoadTarget::commit`]. Pages are
/// numbered from the start of the user region.
pub trait LoadTarget {
    /// Discard the caller's user image. There is no way back after this.
    fn commit(&mut self) -> KernelResult<()>;

    /// Back `count` pages starting at `first_page` with zeroed frames.
    ///
    /// Pages that are already mapped keep their contents and gain `prot`.
    fn map(&mut self, first_page: usize, count: usize, prot: Protection) -> KernelResult<()>;

    /// Copy `data` to user address `va`; the pages must be mapped
    fn write(&mut self, va: usize, data: &[u8]) -> KernelResult<()>;

    /// Set the final protection of already mapped pages
    fn protect(&mut self, first_page: usize, count: usize, prot: Protection) -> KernelResult<()>;
}

pub trait ProgramLoader {
    /// Build program `name` into `target` with argument vector `args`
    fn load(
        &mut self,
        name: &str,
        args: &[String],
        target: &mut dyn LoadTarget,
    ) -> Result<LoadedImage, LoadError>;
}
