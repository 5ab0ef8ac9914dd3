//! RSDT table enumeration.
//!
//! The Root System Description Table holds 32-bit physical pointers to all
//! other ACPI tables. Only the RSDT is walked; the 64-bit XSDT is out of
//! scope (see [`crate::AcpiError::UnsupportedXsdt`]).

use lumen_binparse::{Cursor, FromBytes};
use lumen_core::{kdebug, ktrace, kwarn};

use crate::sdt::{self, MappedTable, SdtHeader};
use crate::{AcpiError, AcpiHandler};

/// RSDT table signature (`b"RSDT"`).
pub const RSDT_SIGNATURE: &[u8; 4] = b"RSDT";

/// Size in bytes of a single table-pointer entry in the RSDT.
const RSDT_ENTRY_SIZE: usize = 4;

/// Iterator over the table pointers of an RSDT.
///
/// Yields `(length - 36) / 4` entries; trailing bytes that do not form a
/// whole pointer are ignored.
pub struct RsdtIterator<'a> {
    cursor: Cursor<'a>,
}

impl RsdtIterator<'static> {
    /// Iterate the entries of a mapped RSDT.
    #[must_use]
    pub fn new(rsdt: &MappedTable) -> Self {
        Self {
            cursor: Cursor::new(rsdt.body()),
        }
    }
}

impl<'a> RsdtIterator<'a> {
    /// Iterate raw entry bytes (the table body after the header).
    #[must_use]
    pub fn from_body(body: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(body),
        }
    }
}

impl Iterator for RsdtIterator<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.read::<u32>().map(u64::from)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.cursor.remaining() / RSDT_ENTRY_SIZE;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RsdtIterator<'_> {}

/// Search the RSDT for a table whose SDT header matches `signature`.
///
/// Entries are scanned in order and the first match is returned. With
/// `verify_checksums` set, the RSDT itself must checksum, and a matching
/// table whose checksum fails is logged and skipped so a later, intact copy
/// can still be found.
///
/// # Errors
///
/// Returns [`AcpiError::TableNotFound`] if no listed table matches, or the
/// [`sdt::load_table`] error if the RSDT itself is unusable.
pub fn find_table_in_rsdt(
    handler: &impl AcpiHandler,
    rsdt_addr: u64,
    signature: &[u8; 4],
    verify_checksums: bool,
) -> Result<u64, AcpiError> {
    let rsdt = sdt::load_table(handler, rsdt_addr, RSDT_SIGNATURE, verify_checksums)?;
    let entries = RsdtIterator::new(&rsdt);
    kdebug!(
        "ACPI: RSDT at {:#x}, {} entries",
        rsdt_addr,
        entries.len()
    );

    for (index, entry_phys) in entries.enumerate() {
        // SAFETY: entry_phys is a physical address listed in the RSDT.
        let candidate_data = unsafe { handler.map_physical_region(entry_phys, SdtHeader::SIZE) };
        let Some(candidate) = SdtHeader::read_from(candidate_data) else {
            kwarn!("ACPI: RSDT entry {index} at {entry_phys:#x} is unreadable");
            continue;
        };
        ktrace!(
            "ACPI: RSDT entry {index}: {} at {entry_phys:#x}",
            sdt::signature_str(&candidate.signature())
        );
        if &candidate.signature() != signature {
            continue;
        }

        if verify_checksums {
            if let Err(err) = sdt::load_table(handler, entry_phys, signature, true) {
                kwarn!(
                    "ACPI: {} at {entry_phys:#x} failed validation ({err}), skipping",
                    sdt::signature_str(signature)
                );
                continue;
            }
        }

        return Ok(entry_phys);
    }

    Err(AcpiError::TableNotFound)
}
