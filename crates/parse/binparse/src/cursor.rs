//! Forward-only cursor over a bounded byte region.

use core::fmt;

use crate::FromBytes;

/// Error returned when a [`Cursor`] cannot advance as requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorError {
    /// The requested advance was zero bytes, which would never terminate a
    /// record walk.
    NoProgress,
    /// The requested advance runs past the end of the region.
    OutOfBounds {
        /// Bytes the caller asked to consume.
        requested: usize,
        /// Bytes left in the region.
        remaining: usize,
    },
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoProgress => f.write_str("cursor advance made no progress"),
            Self::OutOfBounds {
                requested,
                remaining,
            } => write!(
                f,
                "cursor advance of {requested} bytes exceeds {remaining} remaining"
            ),
        }
    }
}

/// A read position inside a byte region.
///
/// Reads are relative to the current position and never look outside the
/// region. The position only moves forward, through [`Cursor::advance`] or
/// [`Cursor::read`].
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor at the start of `data`.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Offset of the cursor from the start of the region.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes between the cursor and the end of the region.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns `true` once the cursor has reached the end of the region.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread part of the region.
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Reads a value `offset` bytes past the cursor without moving it.
    #[must_use]
    pub fn read_at<T: FromBytes>(&self, offset: usize) -> Option<T> {
        T::read_at(self.rest(), offset)
    }

    /// Reads a value at the cursor and moves past it.
    pub fn read<T: FromBytes>(&mut self) -> Option<T> {
        let value = T::read_from(self.rest())?;
        self.pos += T::SIZE;
        Some(value)
    }

    /// Consumes the next `len` bytes and returns them.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::NoProgress`] if `len` is zero, and
    /// [`CursorError::OutOfBounds`] if fewer than `len` bytes remain. The
    /// cursor does not move on error.
    pub fn advance(&mut self, len: usize) -> Result<&'a [u8], CursorError> {
        if len == 0 {
            return Err(CursorError::NoProgress);
        }
        let remaining = self.remaining();
        if len > remaining {
            return Err(CursorError::OutOfBounds {
                requested: len,
                remaining,
            });
        }
        let consumed = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_consumes_records_in_order() {
        let data = [0, 4, 0xaa, 0xbb, 1, 2];
        let mut cursor = Cursor::new(&data);

        let len = cursor.read_at::<u8>(1).unwrap();
        assert_eq!(cursor.advance(usize::from(len)), Ok(&data[..4]));
        assert_eq!(cursor.position(), 4);
        assert_eq!(cursor.read_at::<u8>(0), Some(1));
        assert_eq!(cursor.advance(2), Ok(&data[4..]));
        assert!(cursor.is_empty());
    }

    #[test]
    fn zero_advance_is_rejected() {
        let data = [0u8; 4];
        let mut cursor = Cursor::new(&data);
        assert_eq!(cursor.advance(0), Err(CursorError::NoProgress));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn advance_past_end_is_rejected() {
        let data = [0u8; 4];
        let mut cursor = Cursor::new(&data);
        cursor.advance(3).unwrap();
        assert_eq!(
            cursor.advance(2),
            Err(CursorError::OutOfBounds {
                requested: 2,
                remaining: 1
            })
        );
        assert_eq!(cursor.position(), 3);
    }

    #[test]
    fn reads_do_not_cross_the_region() {
        let data = [1, 0, 0, 0, 2];
        let mut cursor = Cursor::new(&data[..4]);
        assert_eq!(cursor.read::<u32>(), Some(1));
        assert_eq!(cursor.read::<u8>(), None);
        assert_eq!(cursor.read_at::<u8>(0), None);
    }
}
