//! System Description Table (SDT) header and checksum utilities.

use lumen_binparse::FromBytes;

use crate::{AcpiError, AcpiHandler};

/// Standard ACPI System Description Table header.
///
/// This 36-byte header is present at the start of every ACPI table (RSDT,
/// MADT, ...). Its `length` bounds every read of the table body.
#[derive(Debug, Clone, Copy, FromBytes)]
#[repr(C, packed)]
pub struct SdtHeader {
    /// 4-byte ASCII signature identifying the table type.
    pub signature: [u8; 4],
    /// Total length of the table, including the header, in bytes.
    pub length: u32,
    /// Revision of the table structure.
    pub revision: u8,
    /// Checksum byte. The entire table, including the header, must sum to zero.
    pub checksum: u8,
    /// OEM-supplied identification string.
    pub oem_id: [u8; 6],
    /// OEM-supplied table identification string.
    pub oem_table_id: [u8; 8],
    /// OEM-supplied revision number.
    pub oem_revision: u32,
    /// Vendor ID of the utility that created the table.
    pub creator_id: u32,
    /// Revision of the utility that created the table.
    pub creator_revision: u32,
}

lumen_core::assert_layout!(SdtHeader, size = 36, packed);

impl SdtHeader {
    /// Returns the 4-byte signature.
    #[must_use]
    pub fn signature(&self) -> [u8; 4] {
        self.signature
    }

    /// Returns the total length of this table (header included).
    #[must_use]
    pub fn length(&self) -> usize {
        self.length as usize
    }
}

/// A mapped ACPI table whose signature and length have been checked.
#[derive(Debug, Clone, Copy)]
pub struct MappedTable {
    /// Physical address the table was mapped from.
    pub phys: u64,
    /// The table header.
    pub header: SdtHeader,
    /// The whole table, header included, cut to `header.length` bytes.
    pub data: &'static [u8],
}

impl MappedTable {
    /// The table contents after the 36-byte header.
    #[must_use]
    pub fn body(&self) -> &'static [u8] {
        self.data.get(SdtHeader::SIZE..).unwrap_or(&[])
    }
}

/// Maps and validates an ACPI table at the given physical address.
///
/// 1. Map the SDT header to learn the table length.
/// 2. Verify the signature matches `expected_signature`.
/// 3. Map the full table and cut it to the declared length.
/// 4. Validate the checksum, if `verify_checksum` is set.
///
/// # Errors
///
/// Returns [`AcpiError::TruncatedData`] if the header or the declared length
/// cannot be mapped, [`AcpiError::InvalidSignature`] if the signature doesn't
/// match, or [`AcpiError::InvalidChecksum`] if the checksum fails.
pub fn load_table(
    handler: &impl AcpiHandler,
    phys: u64,
    expected_signature: &[u8; 4],
    verify_checksum: bool,
) -> Result<MappedTable, AcpiError> {
    // SAFETY: caller provides a table address taken from firmware.
    let header_data = unsafe { handler.map_physical_region(phys, SdtHeader::SIZE) };
    let header = SdtHeader::read_from(header_data).ok_or(AcpiError::TruncatedData)?;

    if &header.signature() != expected_signature {
        return Err(AcpiError::InvalidSignature);
    }

    let total_len = header.length();
    if total_len < SdtHeader::SIZE {
        return Err(AcpiError::TruncatedData);
    }

    // SAFETY: phys is valid, total_len comes from the table's own header.
    let data = unsafe { handler.map_physical_region(phys, total_len) };
    let data = data.get(..total_len).ok_or(AcpiError::TruncatedData)?;

    if verify_checksum && !validate_checksum(data) {
        return Err(AcpiError::InvalidChecksum);
    }

    Ok(MappedTable { phys, header, data })
}

/// Wrapping sum of all bytes in `data`.
#[must_use]
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte))
}

/// Validate the checksum of a byte slice.
///
/// ACPI structures are laid out so that all their bytes sum to zero (mod
/// 256). An empty slice is trivially valid.
#[must_use]
pub fn validate_checksum(data: &[u8]) -> bool {
    checksum(data) == 0
}

/// Printable form of a table signature for log messages.
pub(crate) fn signature_str(signature: &[u8; 4]) -> &str {
    core::str::from_utf8(signature).unwrap_or("????")
}
