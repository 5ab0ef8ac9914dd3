//! Write-once storage for boot-time configuration.
//!
//! Boot discovery produces values (CPU topology, firmware addresses) that are
//! computed exactly once and then read for the rest of the kernel's life.
//! [`BootCell`] publishes such a value: the first [`BootCell::set`] wins and
//! every later reader sees the same immutable reference.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU8, Ordering};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;

/// A cell that can be written once and read many times.
pub struct BootCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: the value is written by exactly one caller (guarded by the
// EMPTY -> WRITING transition) and only shared after READY is published
// with Release ordering.
unsafe impl<T: Send + Sync> Sync for BootCell<T> {}
// SAFETY: moving the cell moves the owned `T`.
unsafe impl<T: Send> Send for BootCell<T> {}

impl<T> BootCell<T> {
    /// Creates an empty cell.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Stores `value` if the cell is empty and returns a reference to it.
    ///
    /// # Errors
    ///
    /// Returns `value` back if the cell was already written (or is being
    /// written).
    pub fn set(&self, value: T) -> Result<&T, T> {
        if self
            .state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(value);
        }

        // SAFETY: the successful EMPTY -> WRITING exchange gives us exclusive
        // access to the slot.
        let slot = unsafe { &mut *self.value.get() };
        slot.write(value);
        self.state.store(READY, Ordering::Release);

        // SAFETY: the slot was initialised just above.
        Ok(unsafe { slot.assume_init_ref() })
    }

    /// Returns the stored value, or `None` if the cell has not been written.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == READY {
            // SAFETY: READY is only published after the slot is initialised,
            // and the value is never mutated afterwards.
            Some(unsafe { (*self.value.get()).assume_init_ref() })
        } else {
            None
        }
    }

    /// Returns `true` once a value has been published.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }
}

impl<T> Default for BootCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for BootCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == READY {
            // SAFETY: READY means the slot holds an initialised value.
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cell_reads_none() {
        let cell: BootCell<u32> = BootCell::new();
        assert!(!cell.is_set());
        assert_eq!(cell.get(), None);
    }

    #[test]
    fn first_write_wins() {
        let cell = BootCell::new();
        assert_eq!(cell.set(7u32), Ok(&7));
        assert_eq!(cell.set(9), Err(9));
        assert_eq!(cell.get(), Some(&7));
        assert!(cell.is_set());
    }

    #[test]
    fn drops_stored_value() {
        use std::rc::Rc;

        let marker = Rc::new(());
        {
            let cell = BootCell::new();
            assert!(cell.set(Rc::clone(&marker)).is_ok());
            assert_eq!(Rc::strong_count(&marker), 2);
        }
        assert_eq!(Rc::strong_count(&marker), 1);
    }
}
