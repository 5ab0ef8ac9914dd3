//! Multiple APIC Description Table (MADT) parsing.
//!
//! The MADT describes the interrupt controller topology: the Local APIC
//! base address, then a stream of variable-length Interrupt Controller
//! Structures. Each structure starts with a type byte and a length byte
//! covering the whole record, so unknown types can be stepped over.

use bitflags::bitflags;
use lumen_binparse::{FromBytes, TableEntries};

use crate::sdt::{self, MappedTable, SdtHeader};
use crate::{AcpiError, AcpiHandler};

/// MADT table signature (`b"APIC"`).
pub const MADT_SIGNATURE: &[u8; 4] = b"APIC";

bitflags! {
    /// Flags in the MADT header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MadtFlags: u32 {
        /// The system also has dual 8259 PICs that must be masked.
        const PCAT_COMPAT = 1 << 0;
    }
}

bitflags! {
    /// Flags of a Processor Local APIC structure.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LocalApicFlags: u32 {
        /// The processor is usable.
        const ENABLED = 1 << 0;
        /// The processor can be brought online later (ACPI 6.3+).
        const ONLINE_CAPABLE = 1 << 1;
    }
}

/// Raw MADT header fields that follow the SDT header.
#[derive(Debug, Clone, Copy, FromBytes)]
#[repr(C, packed)]
struct MadtHeaderFields {
    local_apic_address: u32,
    flags: u32,
}

lumen_core::assert_layout!(MadtHeaderFields, size = 8, packed);

/// Parsed MADT.
///
/// The entry data is accessed through the [`MadtEntryIter`] returned by
/// [`Madt::entries`].
#[derive(Debug, Clone, Copy)]
pub struct Madt {
    /// Physical address of the Local APIC registers.
    pub local_apic_address: u32,
    /// MADT flags.
    pub flags: MadtFlags,
    /// Bytes after the fixed fields, bounded by the table length.
    entries_data: &'static [u8],
}

impl Madt {
    /// Offset of the first interrupt controller structure in the table.
    pub const ENTRIES_OFFSET: usize = SdtHeader::SIZE + MadtHeaderFields::SIZE;

    /// Parse a MADT from the given physical address.
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::InvalidSignature`] if the table signature is not
    /// `APIC`, [`AcpiError::InvalidChecksum`] if `verify_checksum` is set and
    /// the checksum fails, or [`AcpiError::TruncatedData`] if the table is
    /// too short for its fixed fields.
    pub fn parse(
        handler: &impl AcpiHandler,
        phys: u64,
        verify_checksum: bool,
    ) -> Result<Self, AcpiError> {
        let table = sdt::load_table(handler, phys, MADT_SIGNATURE, verify_checksum)?;
        Self::from_table(&table)
    }

    /// Parse the fixed fields of an already mapped MADT.
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::TruncatedData`] if the table is shorter than
    /// [`Madt::ENTRIES_OFFSET`].
    pub fn from_table(table: &MappedTable) -> Result<Self, AcpiError> {
        let fields = MadtHeaderFields::read_at(table.data, SdtHeader::SIZE)
            .ok_or(AcpiError::TruncatedData)?;

        Ok(Self {
            local_apic_address: fields.local_apic_address,
            flags: MadtFlags::from_bits_retain(fields.flags),
            entries_data: &table.data[Self::ENTRIES_OFFSET..],
        })
    }

    /// Returns an iterator over the interrupt controller structures.
    #[must_use]
    pub fn entries(&self) -> MadtEntryIter<'static> {
        MadtEntry::iter(self.entries_data)
    }
}

/// An I/O APIC as recorded in the discovered topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoApic {
    /// The I/O APIC ID.
    pub id: u8,
    /// Physical address of the I/O APIC registers.
    pub address: u32,
    /// First Global System Interrupt handled by this I/O APIC.
    pub gsi_base: u32,
}

/// A single MADT interrupt controller structure.
///
/// [`MadtEntry::iter`] walks the records in order, each record's length
/// byte locating the next. A record shorter than its header or than the
/// fixed size of its type yields [`lumen_binparse::EntryError::Malformed`];
/// one running past the end of the table yields
/// [`lumen_binparse::EntryError::Truncated`]. Iteration stops after either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TableEntries)]
pub enum MadtEntry {
    /// Type 0: Processor Local APIC.
    #[entry(type_id = 0, min_length = 8)]
    LocalApic {
        /// ACPI processor UID.
        #[field(offset = 2)]
        processor_id: u8,
        /// The processor's Local APIC ID.
        #[field(offset = 3)]
        apic_id: u8,
        /// Raw [`LocalApicFlags`].
        #[field(offset = 4)]
        flags: u32,
    },

    /// Type 1: I/O APIC.
    #[entry(type_id = 1, min_length = 12)]
    IoApic {
        /// The I/O APIC ID.
        #[field(offset = 2)]
        id: u8,
        /// Physical address of the I/O APIC registers.
        #[field(offset = 4)]
        address: u32,
        /// First Global System Interrupt handled by this I/O APIC.
        #[field(offset = 8)]
        gsi_base: u32,
    },

    /// Any other type, stepped over using its length byte.
    #[fallback]
    Unknown {
        /// The entry type byte.
        entry_type: u8,
        /// The entry length including the 2-byte header.
        length: u8,
    },
}

impl MadtEntry {
    /// Returns `true` for a Local APIC entry whose processor is usable.
    #[must_use]
    pub fn is_enabled_cpu(&self) -> bool {
        matches!(
            self,
            Self::LocalApic { flags, .. }
                if LocalApicFlags::from_bits_retain(*flags).contains(LocalApicFlags::ENABLED)
        )
    }
}
