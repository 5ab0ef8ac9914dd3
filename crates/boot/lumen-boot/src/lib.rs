//! Early-boot orchestration for Lumen.
//!
//! The parsers in `lumen-acpi` report failures as values. This crate is the
//! layer that turns those values into boot decisions: it runs discovery,
//! logs the outcome, halts on fatal errors, and publishes the resulting
//! [`Topology`](lumen_acpi::Topology) as immutable boot configuration.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod acpi;

/// Fatal-halt primitive supplied by the architecture layer.
///
/// Receives a diagnostic message and never returns.
pub type HaltFn = fn(&str) -> !;
