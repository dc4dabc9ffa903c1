//! Volatile cell that conforms to the RAL's register API
//!
//! Every register block in [`ral`](crate::ral) is made of `VCell`s. On the
//! target, a block is overlaid onto the peripheral's address. In tests,
//! the same block lives in ordinary memory, and the test plays the role of
//! the hardware by reading and writing the cells directly.

use core::cell::UnsafeCell;

#[repr(transparent)]
pub struct VCell<T>(UnsafeCell<T>);

impl<T> VCell<T> {
    pub const fn new(val: T) -> Self {
        VCell(UnsafeCell::new(val))
    }
}

impl<T: Copy> VCell<T> {
    /// Volatile load
    #[inline(always)]
    pub fn read(&self) -> T {
        // Safety: the pointer comes from a live UnsafeCell.
        unsafe { self.0.get().read_volatile() }
    }

    /// Volatile store
    #[inline(always)]
    pub fn write(&self, val: T) {
        // Safety: see read().
        unsafe { self.0.get().write_volatile(val) }
    }
}

impl<T: Copy + core::fmt::Debug> core::fmt::Debug for VCell<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("VCell").field(&self.read()).finish()
    }
}
