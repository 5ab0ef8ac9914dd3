//! Synthetic firmware images for host tests.
//!
//! [`FirmwareImage`] is a zero-filled buffer standing in for the low 1 MiB
//! of physical memory plus some room above it for tables. Physical address
//! `n` is byte `n` of the buffer.

use crate::AcpiHandler;
use crate::sdt::checksum;

/// Size of the fake physical address space.
const IMAGE_SIZE: usize = 0x11_0000;

/// Physical address where tests conventionally place the RSDT.
pub const RSDT_PHYS: u64 = 0x10_0000;
/// Physical address where tests conventionally place the MADT.
pub const MADT_PHYS: u64 = 0x10_8000;

pub struct FirmwareImage {
    bytes: Vec<u8>,
}

impl FirmwareImage {
    pub fn new() -> Self {
        Self {
            bytes: vec![0; IMAGE_SIZE],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn write(&mut self, phys: u64, data: &[u8]) {
        let start = usize::try_from(phys).unwrap();
        self.bytes[start..start + data.len()].copy_from_slice(data);
    }

    /// Flips every bit of the byte at `phys`.
    pub fn corrupt(&mut self, phys: u64) {
        self.bytes[usize::try_from(phys).unwrap()] ^= 0xff;
    }

    /// Stores the EBDA segment in the BIOS data area word at 0x40E.
    pub fn set_ebda_segment(&mut self, segment: u16) {
        self.write(0x40e, &segment.to_le_bytes());
    }

    /// Places an RSDT listing `entries` at [`RSDT_PHYS`].
    pub fn put_rsdt(&mut self, entries: &[u32]) {
        let body: Vec<u8> = entries.iter().flat_map(|e| e.to_le_bytes()).collect();
        self.write(RSDT_PHYS, &table_bytes(b"RSDT", &body));
    }

    /// Lays out a complete RSDP -> RSDT -> MADT chain with the RSDP in the
    /// BIOS ROM window.
    pub fn with_madt(records: &[&[u8]]) -> Self {
        let mut image = Self::new();
        image.write(0xe_0000, &rsdp_v1(RSDT_PHYS as u32));
        image.put_rsdt(&[MADT_PHYS as u32]);
        image.write(MADT_PHYS, &madt_bytes(0xfee0_0000, 1, records));
        image
    }

    pub fn into_memory(self) -> FakeMemory {
        FakeMemory {
            bytes: Box::leak(self.bytes.into_boxed_slice()),
        }
    }
}

/// Identity-mapped view over a leaked [`FirmwareImage`].
pub struct FakeMemory {
    bytes: &'static [u8],
}

// SAFETY: the buffer is leaked and never written after construction.
unsafe impl AcpiHandler for FakeMemory {
    unsafe fn map_physical_region(&self, phys: u64, size: usize) -> &'static [u8] {
        let Ok(start) = usize::try_from(phys) else {
            return &[];
        };
        let end = start.saturating_add(size).min(self.bytes.len());
        self.bytes.get(start..end).unwrap_or(&[])
    }
}

/// Sets `bytes[at]` so that the whole slice sums to zero.
pub fn fix_checksum(bytes: &mut [u8], at: usize) {
    bytes[at] = 0;
    bytes[at] = checksum(bytes).wrapping_neg();
}

/// A 20-byte ACPI 1.0 RSDP.
pub fn rsdp_v1(rsdt: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(20);
    bytes.extend_from_slice(b"RSD PTR ");
    bytes.push(0);
    bytes.extend_from_slice(b"LUMEN ");
    bytes.push(0);
    bytes.extend_from_slice(&rsdt.to_le_bytes());
    fix_checksum(&mut bytes, 8);
    bytes
}

/// A 36-byte ACPI 2.0 RSDP with both checksums valid.
pub fn rsdp_v2(rsdt: u32, xsdt: u64) -> Vec<u8> {
    let mut bytes = rsdp_v1(rsdt);
    bytes[15] = 2;
    bytes.extend_from_slice(&36u32.to_le_bytes());
    bytes.extend_from_slice(&xsdt.to_le_bytes());
    bytes.extend_from_slice(&[0; 4]);
    fix_checksum(&mut bytes[..20], 8);
    fix_checksum(&mut bytes, 32);
    bytes
}

/// A complete table: SDT header followed by `body`, checksum fixed.
pub fn table_bytes(signature: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let length = u32::try_from(36 + body.len()).unwrap();
    let mut bytes = Vec::with_capacity(36 + body.len());
    bytes.extend_from_slice(signature);
    bytes.extend_from_slice(&length.to_le_bytes());
    bytes.push(1);
    bytes.push(0);
    bytes.extend_from_slice(b"LUMEN ");
    bytes.extend_from_slice(b"LUMENTBL");
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(b"LMN ");
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(body);
    fix_checksum(&mut bytes, 9);
    bytes
}

/// A MADT with the given LAPIC address, flags and raw entry records.
pub fn madt_bytes(local_apic_address: u32, flags: u32, records: &[&[u8]]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&local_apic_address.to_le_bytes());
    body.extend_from_slice(&flags.to_le_bytes());
    for record in records {
        body.extend_from_slice(record);
    }
    table_bytes(b"APIC", &body)
}

/// Type 0 Processor Local APIC record.
pub fn local_apic(processor_id: u8, apic_id: u8, enabled: bool) -> [u8; 8] {
    let flags = u32::from(enabled);
    let f = flags.to_le_bytes();
    [0, 8, processor_id, apic_id, f[0], f[1], f[2], f[3]]
}

/// Type 1 I/O APIC record.
pub fn io_apic(id: u8, address: u32, gsi_base: u32) -> [u8; 12] {
    let a = address.to_le_bytes();
    let g = gsi_base.to_le_bytes();
    [1, 12, id, 0, a[0], a[1], a[2], a[3], g[0], g[1], g[2], g[3]]
}
