//! `lumen-binparse` --- reading fixed-layout binary records out of byte slices.
//!
//! Firmware tables mix fixed-size structures with variable-length record
//! streams. This crate gives parsers two primitives:
//!
//! - [`FromBytes`]: read a plain-old-data value at a byte offset, returning
//!   `None` instead of reading past the end of the slice.
//! - [`Cursor`]: walk a region front to back, advancing by a caller-supplied
//!   length that must make forward progress and stay inside the region.
//!
//! `#[derive(FromBytes)]` implements the trait for `#[repr(C)]` structs and
//! rejects layouts with implicit padding at compile time.
//! `#[derive(TableEntries)]` turns an enum describing type-length records
//! into an iterator that decodes them in order, reporting broken records as
//! [`EntryError`].

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

// Lets the derive's `::lumen_binparse` paths resolve inside this crate's tests.
#[cfg(test)]
extern crate self as lumen_binparse;

mod cursor;
mod entries;
mod from_bytes;

pub use cursor::{Cursor, CursorError};
pub use entries::EntryError;
pub use from_bytes::FromBytes;
pub use lumen_binparse_macros::{FromBytes, TableEntries};
