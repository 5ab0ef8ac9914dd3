//! Root System Description Pointer (RSDP) location and validation.
//!
//! On legacy BIOS systems the RSDP lives in one of two places: the first
//! KiB of the Extended BIOS Data Area, or the BIOS ROM window between
//! `0xE0000` and `0xFFFFF`. It is always 16-byte aligned. ACPI 1.0 defines
//! a 20-byte structure ([`Rsdp`]); ACPI 2.0+ extends it to 36 bytes
//! ([`Rsdp2`]) with an XSDT address and a second checksum.

use lumen_binparse::FromBytes;
use lumen_core::{kdebug, ktrace};

use crate::sdt::validate_checksum;
use crate::{AcpiError, AcpiHandler};

/// Physical address of the BIOS data area word holding the EBDA segment.
pub const EBDA_SEGMENT_PTR: u64 = 0x40e;
/// Number of EBDA bytes searched for the RSDP.
pub const EBDA_SEARCH_LEN: u64 = 1024;
/// Start of the BIOS ROM search window.
pub const BIOS_ROM_START: u64 = 0xe_0000;
/// End (exclusive) of the BIOS ROM search window.
pub const BIOS_ROM_END: u64 = 0x10_0000;
/// Alignment of every RSDP candidate.
pub const RSDP_ALIGN: usize = 16;

/// ACPI 1.0 RSDP --- 20 bytes.
#[derive(Debug, Clone, Copy, FromBytes)]
#[repr(C, packed)]
pub struct Rsdp {
    /// Must be `b"RSD PTR "` (8 bytes, note the trailing space).
    pub signature: [u8; 8],
    /// Checksum covering the first 20 bytes.
    pub checksum: u8,
    /// OEM identification string.
    pub oem_id: [u8; 6],
    /// ACPI revision: 0 for ACPI 1.0, 2 for ACPI 2.0+.
    pub revision: u8,
    /// Physical address of the RSDT (32-bit).
    pub rsdt_address: u32,
}

impl Rsdp {
    /// Expected signature bytes.
    pub const SIGNATURE: &[u8; 8] = b"RSD PTR ";
}

/// ACPI 2.0+ RSDP --- 36 bytes.
///
/// The first 20 bytes are identical to [`Rsdp`].
#[derive(Debug, Clone, Copy, FromBytes)]
#[repr(C, packed)]
pub struct Rsdp2 {
    /// The ACPI 1.0 portion.
    pub v1: Rsdp,
    /// Total length of this structure, covered by `extended_checksum`.
    pub length: u32,
    /// Physical address of the XSDT (64-bit).
    pub xsdt_address: u64,
    /// Checksum covering `length` bytes.
    pub extended_checksum: u8,
    /// Reserved bytes.
    pub reserved: [u8; 3],
}

lumen_core::assert_layout!(Rsdp, size = 20, packed);
lumen_core::assert_layout!(Rsdp2, size = 36, packed);

/// The fields of a validated RSDP that discovery needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RsdpInfo {
    /// Physical address the RSDP was found at.
    pub phys: u64,
    /// ACPI revision byte.
    pub revision: u8,
    /// OEM identification string.
    pub oem_id: [u8; 6],
    /// 32-bit RSDT address, zero if absent.
    pub rsdt_address: u32,
    /// XSDT address, present only for revision 2+ with a non-zero pointer.
    pub xsdt_address: Option<u64>,
}

impl RsdpInfo {
    /// Physical address of the root table to walk.
    ///
    /// Only the 32-bit RSDT is supported. An RSDP that provides an XSDT is
    /// fine as long as it also provides an RSDT; the XSDT is then ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::UnsupportedXsdt`] when the RSDP carries only an
    /// XSDT address, or [`AcpiError::InvalidRsdp`] when it carries neither.
    pub fn rsdt_address(&self) -> Result<u64, AcpiError> {
        match (self.rsdt_address, self.xsdt_address) {
            (0, Some(_)) => Err(AcpiError::UnsupportedXsdt),
            (0, None) => Err(AcpiError::InvalidRsdp),
            (rsdt, xsdt) => {
                if let Some(xsdt) = xsdt {
                    kdebug!("ACPI: ignoring XSDT at {xsdt:#x}, using RSDT at {rsdt:#x}");
                }
                Ok(u64::from(rsdt))
            }
        }
    }
}

/// Validate an RSDP candidate held in `data`.
///
/// The first 20 bytes must carry the signature and sum to zero. For revision
/// 2 and later the declared `length` bytes must also sum to zero; the
/// extended fields of a revision 0 structure are never looked at.
///
/// # Errors
///
/// Returns [`AcpiError::InvalidRsdp`] for a bad signature or an extended
/// length shorter than [`Rsdp2`], [`AcpiError::InvalidChecksum`] if either
/// checksum fails, or [`AcpiError::TruncatedData`] if `data` is too short.
pub fn validate_rsdp(phys: u64, data: &[u8]) -> Result<RsdpInfo, AcpiError> {
    let v1 = Rsdp::read_from(data).ok_or(AcpiError::TruncatedData)?;

    if v1.signature != *Rsdp::SIGNATURE {
        return Err(AcpiError::InvalidRsdp);
    }

    if !validate_checksum(&data[..Rsdp::SIZE]) {
        return Err(AcpiError::InvalidChecksum);
    }

    let xsdt_address = if v1.revision >= 2 {
        let v2 = Rsdp2::read_from(data).ok_or(AcpiError::TruncatedData)?;
        let length = v2.length as usize;
        if length < Rsdp2::SIZE {
            return Err(AcpiError::InvalidRsdp);
        }
        let extended = data.get(..length).ok_or(AcpiError::TruncatedData)?;
        if !validate_checksum(extended) {
            return Err(AcpiError::InvalidChecksum);
        }
        Some(v2.xsdt_address).filter(|&addr| addr != 0)
    } else {
        None
    };

    Ok(RsdpInfo {
        phys,
        revision: v1.revision,
        oem_id: v1.oem_id,
        rsdt_address: v1.rsdt_address,
        xsdt_address,
    })
}

/// Map and validate the RSDP at the given physical address.
///
/// # Errors
///
/// See [`validate_rsdp`].
pub fn parse_rsdp(handler: &impl AcpiHandler, phys: u64) -> Result<RsdpInfo, AcpiError> {
    // SAFETY: phys is a published or candidate RSDP location.
    let head = unsafe { handler.map_physical_region(phys, Rsdp::SIZE) };
    let v1 = Rsdp::read_from(head).ok_or(AcpiError::TruncatedData)?;

    let data = if v1.revision >= 2 {
        // SAFETY: as above; revision 2 structures are at least 36 bytes.
        let ext = unsafe { handler.map_physical_region(phys, Rsdp2::SIZE) };
        let length = Rsdp2::read_from(ext).map_or(Rsdp2::SIZE, |v2| v2.length as usize);
        // SAFETY: as above, widened to the declared extended length.
        unsafe { handler.map_physical_region(phys, length.max(Rsdp2::SIZE)) }
    } else {
        head
    };

    validate_rsdp(phys, data)
}

/// Physical base of the Extended BIOS Data Area, if the BIOS reports one.
#[must_use]
pub fn ebda_base(handler: &impl AcpiHandler) -> Option<u64> {
    // SAFETY: the BIOS data area is always present on PC-compatible systems.
    let word = unsafe { handler.map_physical_region(EBDA_SEGMENT_PTR, 2) };
    let segment = u16::read_from(word)?;
    let base = u64::from(segment) << 4;
    (base != 0).then_some(base)
}

/// Scan `[start, end)` at 16-byte-aligned addresses for a valid RSDP.
pub fn scan_window(handler: &impl AcpiHandler, start: u64, end: u64) -> Option<RsdpInfo> {
    let first = start.next_multiple_of(RSDP_ALIGN as u64);
    if first >= end {
        return None;
    }
    let len = usize::try_from(end - first).ok()?;
    // SAFETY: the search windows are fixed firmware regions.
    let window = unsafe { handler.map_physical_region(first, len) };

    for offset in (0..window.len()).step_by(RSDP_ALIGN) {
        if window.get(offset..offset + Rsdp::SIGNATURE.len()) != Some(&Rsdp::SIGNATURE[..]) {
            continue;
        }
        let phys = first + offset as u64;
        match parse_rsdp(handler, phys) {
            Ok(info) => return Some(info),
            Err(err) => ktrace!("ACPI: rejected RSDP candidate at {phys:#x}: {err}"),
        }
    }
    None
}

/// Locate the RSDP in the legacy BIOS areas.
///
/// The first KiB of the EBDA is searched before the BIOS ROM window; the
/// first candidate passing [`validate_rsdp`] wins.
///
/// # Errors
///
/// Returns [`AcpiError::RsdpNotFound`] if neither window holds a valid RSDP.
pub fn locate(handler: &impl AcpiHandler) -> Result<RsdpInfo, AcpiError> {
    if let Some(ebda) = ebda_base(handler) {
        kdebug!("ACPI: searching EBDA at {ebda:#x} for RSDP");
        if let Some(info) = scan_window(handler, ebda, ebda + EBDA_SEARCH_LEN) {
            return Ok(info);
        }
    }

    kdebug!("ACPI: searching BIOS ROM {BIOS_ROM_START:#x}-{BIOS_ROM_END:#x} for RSDP");
    scan_window(handler, BIOS_ROM_START, BIOS_ROM_END).ok_or(AcpiError::RsdpNotFound)
}
