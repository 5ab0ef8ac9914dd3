//! The [`FromBytes`] trait and its primitive implementations.

use core::mem::size_of;
use core::ptr;

/// Types that can be read from any suitably sized byte sequence.
///
/// Values are read with an unaligned load in native (little-endian on every
/// supported target) byte order, matching how firmware lays tables out.
///
/// # Safety
///
/// Every bit pattern of `size_of::<Self>()` bytes must be a valid `Self`.
/// This holds for integers, byte arrays, and `#[repr(C)]` structs built only
/// from such fields. Use `#[derive(FromBytes)]` rather than implementing the
/// trait by hand.
pub unsafe trait FromBytes: Copy + Sized {
    /// Size of the encoded value in bytes.
    const SIZE: usize = size_of::<Self>();

    /// Reads a value from the start of `data`.
    ///
    /// Returns `None` if `data` is shorter than [`Self::SIZE`].
    #[inline]
    #[must_use]
    fn read_from(data: &[u8]) -> Option<Self> {
        Self::read_at(data, 0)
    }

    /// Reads a value starting `offset` bytes into `data`.
    ///
    /// Returns `None` if the value would extend past the end of `data`.
    #[inline]
    #[must_use]
    fn read_at(data: &[u8], offset: usize) -> Option<Self> {
        let end = offset.checked_add(Self::SIZE)?;
        let bytes = data.get(offset..end)?;
        // SAFETY: `bytes` holds exactly `SIZE` readable bytes and the trait
        // contract makes any bit pattern a valid `Self`.
        Some(unsafe { ptr::read_unaligned(bytes.as_ptr().cast::<Self>()) })
    }
}

macro_rules! impl_from_bytes {
    ($($ty:ty),* $(,)?) => {
        $(
            // SAFETY: every bit pattern is a valid integer.
            unsafe impl FromBytes for $ty {}
        )*
    };
}

impl_from_bytes!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

// SAFETY: an array of `FromBytes` elements has no padding and accepts any
// bit pattern element-wise.
unsafe impl<T: FromBytes, const N: usize> FromBytes for [T; N] {}
