//! `lumen-acpi` --- boot-time CPU and interrupt-controller discovery from ACPI.
//!
//! The crate runs the one-shot discovery pipeline a kernel needs before it
//! can bring up secondary cores or route device interrupts:
//!
//! 1. [`rsdp`] --- find the Root System Description Pointer in the EBDA or
//!    the BIOS ROM window and validate its checksums.
//! 2. [`rsdt`] --- walk the 32-bit Root System Description Table and locate
//!    the MADT by signature.
//! 3. [`madt`] --- iterate the MADT's interrupt controller structures.
//! 4. [`topology`] --- fold those structures into an immutable [`Topology`].
//!
//! Every checksum goes through [`sdt::validate_checksum`], and every table
//! body is read through a bounds-checked [`lumen_binparse::Cursor`] whose
//! limits come from the table's own length field.
//!
//! Physical memory is reached through an [`AcpiHandler`] supplied by the
//! kernel; the crate never allocates and never writes to firmware memory.
//!
//! # Usage
//!
//! ```ignore
//! let topology: Topology = lumen_acpi::discover(&handler, DiscoveryConfig::default())?;
//! for apic_id in topology.cpu_apic_ids() {
//!     // ...
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

use core::fmt;

pub mod madt;
pub mod rsdp;
pub mod rsdt;
pub mod sdt;
pub mod topology;

#[cfg(test)]
mod test_support;

pub use madt::{IoApic, LocalApicFlags, Madt, MadtEntry, MadtEntryIter, MadtFlags};
pub use rsdp::RsdpInfo;
pub use sdt::{MappedTable, SdtHeader};
pub use topology::{CpuList, DiscoveryConfig, MAX_CPUS, Topology, discover};

/// Errors that can occur while discovering the ACPI topology.
///
/// Every variant is fatal to discovery. Recoverable irregularities (CPU list
/// overflow, duplicate I/O APICs, unknown MADT entries) are logged and
/// counted in the [`Topology`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcpiError {
    /// Neither the EBDA nor the BIOS ROM window holds a valid RSDP.
    RsdpNotFound,
    /// The RSDP structure is inconsistent (bad signature, short extended
    /// length, or no root table address at all).
    InvalidRsdp,
    /// The RSDP only provides an XSDT address.
    ///
    /// Walking the 64-bit XSDT is deliberately out of scope: firmware must
    /// also provide a 32-bit RSDT.
    UnsupportedXsdt,
    /// The checksum of a table or the RSDP did not validate (sum != 0).
    InvalidChecksum,
    /// The table signature did not match the expected value.
    InvalidSignature,
    /// No table with the requested signature is listed in the RSDT.
    TableNotFound,
    /// A table or structure was too short to contain the expected data.
    TruncatedData,
    /// A MADT entry declared a length of zero or one too small for its type.
    MalformedEntry {
        /// Offset of the entry from the start of the MADT.
        offset: usize,
        /// Length byte declared by the entry.
        length: u8,
    },
    /// The MADT lists no enabled processor.
    NoEnabledCpus,
}

impl AcpiError {
    /// Diagnostic passed to the halt primitive when discovery fails.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::RsdpNotFound => "ACPI: RSDP not found",
            Self::InvalidRsdp => "ACPI: invalid RSDP",
            Self::UnsupportedXsdt => "ACPI: XSDT-only firmware is not supported",
            Self::InvalidChecksum => "ACPI: table checksum mismatch",
            Self::InvalidSignature => "ACPI: unexpected table signature",
            Self::TableNotFound => "ACPI: MADT not found",
            Self::TruncatedData => "ACPI: truncated table",
            Self::MalformedEntry { .. } => "ACPI: malformed MADT entry",
            Self::NoEnabledCpus => "ACPI: no enabled CPUs",
        }
    }
}

impl fmt::Display for AcpiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedEntry { offset, length } => write!(
                f,
                "{} (offset {offset:#x}, length {length})",
                self.message()
            ),
            _ => f.write_str(self.message()),
        }
    }
}

/// Trait for mapping physical memory regions so ACPI tables can be read.
///
/// This is the physical-to-virtual translator the kernel provides: an
/// identity map, a higher-half direct map, or temporary mappings all work.
/// The returned slice may be shorter than `size` if the region is not
/// backed; the parsers treat a short slice as [`AcpiError::TruncatedData`]
/// and never read past it.
///
/// # Safety
///
/// Implementors must ensure that the returned slice is valid, readable and
/// unaliased by writers for `'static`.
pub unsafe trait AcpiHandler {
    /// Map a physical memory region and return a byte slice over it.
    ///
    /// # Safety
    ///
    /// The caller guarantees that `phys` is an address firmware published
    /// (a fixed legacy BIOS location or a pointer read from an ACPI table).
    unsafe fn map_physical_region(&self, phys: u64, size: usize) -> &'static [u8];
}

// SAFETY: forwards to the underlying handler, which upholds the contract.
unsafe impl<H: AcpiHandler + ?Sized> AcpiHandler for &H {
    unsafe fn map_physical_region(&self, phys: u64, size: usize) -> &'static [u8] {
        // SAFETY: the caller's guarantee is passed through unchanged.
        unsafe { (**self).map_physical_region(phys, size) }
    }
}

/// Handle to the ACPI table hierarchy rooted at a validated RSDP.
///
/// Construct it with [`AcpiTables::locate`] to search the legacy BIOS areas,
/// or with [`AcpiTables::new`] when the bootloader already reported the RSDP
/// address. Tables are parsed lazily when requested.
pub struct AcpiTables<H: AcpiHandler> {
    /// Handler used to map physical memory.
    handler: H,
    /// The validated root pointer.
    rsdp: RsdpInfo,
    /// Validation policy for downstream tables.
    config: DiscoveryConfig,
}

impl<H: AcpiHandler> AcpiTables<H> {
    /// Search the EBDA and BIOS ROM for the RSDP.
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::RsdpNotFound`] if no valid RSDP exists in either
    /// window.
    pub fn locate(handler: H) -> Result<Self, AcpiError> {
        let rsdp = rsdp::locate(&handler)?;
        Ok(Self {
            handler,
            rsdp,
            config: DiscoveryConfig::default(),
        })
    }

    /// Validate the RSDP at a known physical address.
    ///
    /// # Errors
    ///
    /// Returns an [`AcpiError`] if the RSDP signature or checksums are
    /// invalid.
    pub fn new(rsdp_phys: u64, handler: H) -> Result<Self, AcpiError> {
        let rsdp = rsdp::parse_rsdp(&handler, rsdp_phys)?;
        Ok(Self {
            handler,
            rsdp,
            config: DiscoveryConfig::default(),
        })
    }

    /// Replace the validation policy used for downstream tables.
    #[must_use]
    pub fn with_config(mut self, config: DiscoveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Search the RSDT for a table with the given 4-byte signature.
    ///
    /// Returns the physical address of the first matching table.
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::UnsupportedXsdt`] if the firmware only provides
    /// an XSDT, [`AcpiError::TableNotFound`] if no table matches, or another
    /// variant if the RSDT itself is corrupt.
    pub fn find_table(&self, signature: &[u8; 4]) -> Result<u64, AcpiError> {
        let rsdt_addr = self.rsdp.rsdt_address()?;
        rsdt::find_table_in_rsdt(
            &self.handler,
            rsdt_addr,
            signature,
            self.config.verify_table_checksums,
        )
    }

    /// Locate and parse the MADT.
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::TableNotFound`] if no MADT exists, or another
    /// [`AcpiError`] variant if a table on the way is malformed.
    pub fn madt(&self) -> Result<Madt, AcpiError> {
        let phys = self.find_table(madt::MADT_SIGNATURE)?;
        Madt::parse(&self.handler, phys, self.config.verify_table_checksums)
    }

    /// Build the CPU and interrupt-controller topology from the MADT.
    ///
    /// # Errors
    ///
    /// Propagates [`AcpiTables::madt`] errors, and fails with
    /// [`AcpiError::MalformedEntry`] or [`AcpiError::NoEnabledCpus`] while
    /// walking the entries.
    pub fn topology<const N: usize>(&self) -> Result<Topology<N>, AcpiError> {
        Topology::from_madt(&self.madt()?)
    }

    /// Returns the validated RSDP.
    #[must_use]
    pub fn rsdp(&self) -> &RsdpInfo {
        &self.rsdp
    }

    /// Returns a reference to the underlying [`AcpiHandler`].
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }
}
