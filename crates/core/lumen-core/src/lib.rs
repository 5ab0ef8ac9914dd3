//! Core support code shared by the Lumen boot crates.
//!
//! This crate holds the pieces every early-boot component needs but that do
//! not belong to any one subsystem: the leveled kernel log, a write-once
//! cell for boot-time configuration, and compile-time layout assertions for
//! firmware structures.
//!
//! Everything here is host-testable; the crate is only `no_std` outside of
//! `cargo test`.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod cell;
pub mod layout;
pub mod log;
