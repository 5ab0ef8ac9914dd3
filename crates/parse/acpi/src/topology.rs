//! CPU and interrupt-controller topology built from the MADT.
//!
//! [`discover`] runs the whole pipeline (RSDP, RSDT, MADT) and returns a
//! [`Topology`]: the enabled CPUs' APIC IDs in MADT order, the I/O APIC and
//! the Local APIC base address. The value is computed once at boot and is
//! not modified afterwards.

use core::ops::Deref;

use lumen_binparse::EntryError;
use lumen_core::{kdebug, ktrace, kwarn};

use crate::madt::{IoApic, LocalApicFlags, Madt, MadtEntry, MadtFlags};
use crate::{AcpiError, AcpiHandler, AcpiTables};

/// Default capacity of the CPU list.
pub const MAX_CPUS: usize = 8;

/// Validation policy for discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Validate the checksum of the RSDT and of the MADT, not only of the
    /// RSDP. Turning this off trusts table contents as firmware wrote them.
    pub verify_table_checksums: bool,
}

impl DiscoveryConfig {
    /// Checksums are verified at every level.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            verify_table_checksums: true,
        }
    }

    /// Only the RSDP checksums are verified.
    #[must_use]
    pub const fn trusting() -> Self {
        Self {
            verify_table_checksums: false,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-capacity, insertion-ordered list of CPU APIC IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuList<const N: usize> {
    ids: [u8; N],
    len: usize,
}

impl<const N: usize> CpuList<N> {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self { ids: [0; N], len: 0 }
    }

    /// Appends `apic_id`. Returns `false`, leaving the list unchanged, if
    /// the list is already full.
    pub fn push(&mut self, apic_id: u8) -> bool {
        if self.len == N {
            return false;
        }
        self.ids[self.len] = apic_id;
        self.len += 1;
        true
    }

    /// Maximum number of IDs the list holds.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// The stored IDs in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.ids[..self.len]
    }
}

impl<const N: usize> Default for CpuList<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Deref for CpuList<N> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Result of ACPI topology discovery.
///
/// `N` bounds the number of CPUs recorded. Enabled processors beyond it are
/// dropped (see [`Topology::dropped_cpus`]) rather than treated as an error.
/// If the MADT lists several I/O APICs, the last one is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology<const N: usize = MAX_CPUS> {
    cpus: CpuList<N>,
    io_apic: Option<IoApic>,
    local_apic_address: u32,
    madt_flags: MadtFlags,
    dropped_cpus: usize,
    io_apic_count: usize,
    skipped_entries: usize,
}

impl<const N: usize> Topology<N> {
    /// Fold the MADT's entries into a topology.
    ///
    /// The Local APIC address is taken from the MADT header whether or not
    /// an I/O APIC is found. A record that runs past the end of the table
    /// ends the walk with a warning; the entries before it are kept.
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::MalformedEntry`] for a record whose length is
    /// zero or too short for its type, and [`AcpiError::NoEnabledCpus`] if
    /// no enabled processor is listed.
    pub fn from_madt(madt: &Madt) -> Result<Self, AcpiError> {
        let mut topology = Self {
            cpus: CpuList::new(),
            io_apic: None,
            local_apic_address: madt.local_apic_address,
            madt_flags: madt.flags,
            dropped_cpus: 0,
            io_apic_count: 0,
            skipped_entries: 0,
        };

        for entry in madt.entries() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(EntryError::Malformed { offset, length }) => {
                    return Err(AcpiError::MalformedEntry {
                        offset: Madt::ENTRIES_OFFSET + offset,
                        length,
                    });
                }
                Err(EntryError::Truncated { offset, remaining }) => {
                    kwarn!(
                        "ACPI: MADT record at {:#x} overruns the table ({} bytes left), ignoring the rest",
                        Madt::ENTRIES_OFFSET + offset,
                        remaining
                    );
                    break;
                }
            };

            match entry {
                MadtEntry::LocalApic {
                    processor_id,
                    apic_id,
                    flags,
                } => {
                    ktrace!(
                        "ACPI: LAPIC processor {} apic {} flags {:?}",
                        processor_id,
                        apic_id,
                        LocalApicFlags::from_bits_retain(flags)
                    );
                    if entry.is_enabled_cpu() && !topology.cpus.push(apic_id) {
                        topology.dropped_cpus += 1;
                        kwarn!("ACPI: more than {} CPUs, ignoring APIC id {}", N, apic_id);
                    }
                }
                MadtEntry::IoApic {
                    id,
                    address,
                    gsi_base,
                } => {
                    ktrace!("ACPI: I/O APIC id {id} at {address:#x}, GSI base {gsi_base}");
                    if let Some(previous) = topology.io_apic {
                        kwarn!(
                            "ACPI: multiple I/O APICs, id {} replaces id {}",
                            id,
                            previous.id
                        );
                    }
                    topology.io_apic = Some(IoApic {
                        id,
                        address,
                        gsi_base,
                    });
                    topology.io_apic_count += 1;
                }
                MadtEntry::Unknown { entry_type, length } => {
                    ktrace!("ACPI: skipping MADT entry type {entry_type} ({length} bytes)");
                    topology.skipped_entries += 1;
                }
            }
        }

        if topology.cpus.is_empty() {
            return Err(AcpiError::NoEnabledCpus);
        }
        Ok(topology)
    }

    /// APIC IDs of the enabled CPUs, in MADT order.
    #[must_use]
    pub fn cpu_apic_ids(&self) -> &[u8] {
        self.cpus.as_slice()
    }

    /// The CPU list itself.
    #[must_use]
    pub fn cpus(&self) -> &CpuList<N> {
        &self.cpus
    }

    /// Number of enabled CPUs recorded.
    #[must_use]
    pub fn cpu_count(&self) -> usize {
        self.cpus.len()
    }

    /// The I/O APIC, if the MADT lists one.
    #[must_use]
    pub fn io_apic(&self) -> Option<IoApic> {
        self.io_apic
    }

    /// ID of the I/O APIC, if the MADT lists one.
    #[must_use]
    pub fn io_apic_id(&self) -> Option<u8> {
        self.io_apic.map(|ioapic| ioapic.id)
    }

    /// Physical base address of the Local APIC registers.
    #[must_use]
    pub fn local_apic_address(&self) -> u32 {
        self.local_apic_address
    }

    /// MADT header flags.
    #[must_use]
    pub fn madt_flags(&self) -> MadtFlags {
        self.madt_flags
    }

    /// Returns `true` if legacy 8259 PICs are present and must be masked.
    #[must_use]
    pub fn has_legacy_pics(&self) -> bool {
        self.madt_flags.contains(MadtFlags::PCAT_COMPAT)
    }

    /// Enabled CPUs that did not fit in the list.
    #[must_use]
    pub fn dropped_cpus(&self) -> usize {
        self.dropped_cpus
    }

    /// Number of I/O APIC entries seen; only the last is kept.
    #[must_use]
    pub fn io_apic_count(&self) -> usize {
        self.io_apic_count
    }

    /// Number of MADT entries of types other than Local APIC and I/O APIC.
    #[must_use]
    pub fn skipped_entries(&self) -> usize {
        self.skipped_entries
    }
}

/// Run the full discovery pipeline.
///
/// Locates the RSDP in the legacy BIOS areas, follows it to the RSDT, finds
/// the MADT and builds the [`Topology`].
///
/// # Errors
///
/// Returns the first fatal [`AcpiError`] hit by any stage.
pub fn discover<H: AcpiHandler, const N: usize>(
    handler: &H,
    config: DiscoveryConfig,
) -> Result<Topology<N>, AcpiError> {
    let tables = AcpiTables::locate(handler)?.with_config(config);
    let rsdp = tables.rsdp();
    kdebug!(
        "ACPI: RSDP revision {} at {:#x}, RSDT at {:#x}",
        rsdp.revision,
        rsdp.phys,
        rsdp.rsdt_address
    );
    tables.topology()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FirmwareImage, MADT_PHYS, io_apic, local_apic, rsdp_v2};

    fn discover_from(image: FirmwareImage) -> Result<Topology, AcpiError> {
        discover(&image.into_memory(), DiscoveryConfig::default())
    }

    #[test]
    fn enabled_cpus_and_io_apic_are_collected_in_order() {
        let image = FirmwareImage::with_madt(&[
            &local_apic(0, 1, true),
            &local_apic(1, 2, false),
            &io_apic(5, 0xfec0_0000, 0),
            &local_apic(2, 3, true),
        ]);

        let topology = discover_from(image).unwrap();
        assert_eq!(topology.cpu_apic_ids(), &[1, 3]);
        assert_eq!(topology.cpu_count(), 2);
        assert_eq!(topology.io_apic_id(), Some(5));
        assert_eq!(
            topology.io_apic(),
            Some(IoApic {
                id: 5,
                address: 0xfec0_0000,
                gsi_base: 0,
            })
        );
        assert_eq!(topology.local_apic_address(), 0xfee0_0000);
        assert!(topology.has_legacy_pics());
    }

    #[test]
    fn no_enabled_cpus_is_fatal() {
        let image = FirmwareImage::with_madt(&[
            &local_apic(0, 0, false),
            &io_apic(1, 0xfec0_0000, 0),
        ]);
        assert_eq!(discover_from(image), Err(AcpiError::NoEnabledCpus));

        let empty = FirmwareImage::with_madt(&[]);
        assert_eq!(discover_from(empty), Err(AcpiError::NoEnabledCpus));
    }

    #[test]
    fn cpus_beyond_capacity_are_dropped() {
        let records: Vec<[u8; 8]> = (0..6).map(|i| local_apic(i, i * 2, true)).collect();
        let refs: Vec<&[u8]> = records.iter().map(|r| &r[..]).collect();
        let memory = FirmwareImage::with_madt(&refs).into_memory();

        let topology: Topology<4> = discover(&memory, DiscoveryConfig::default()).unwrap();
        assert_eq!(topology.cpu_apic_ids(), &[0, 2, 4, 6]);
        assert_eq!(topology.cpus().capacity(), 4);
        assert_eq!(topology.dropped_cpus(), 2);
    }

    #[test]
    fn last_io_apic_wins() {
        let image = FirmwareImage::with_madt(&[
            &io_apic(1, 0xfec0_0000, 0),
            &local_apic(0, 0, true),
            &io_apic(2, 0xfec1_0000, 24),
        ]);

        let topology = discover_from(image).unwrap();
        assert_eq!(topology.io_apic_id(), Some(2));
        assert_eq!(topology.io_apic().unwrap().gsi_base, 24);
        assert_eq!(topology.io_apic_count(), 2);
    }

    #[test]
    fn local_apic_address_is_published_without_io_apic() {
        let image = FirmwareImage::with_madt(&[&local_apic(0, 0, true)]);
        let topology = discover_from(image).unwrap();
        assert_eq!(topology.io_apic_id(), None);
        assert_eq!(topology.local_apic_address(), 0xfee0_0000);
    }

    #[test]
    fn unknown_entries_do_not_affect_discovery() {
        let iso: [u8; 10] = [2, 10, 0, 0, 2, 0, 0, 0, 0, 0];
        let image = FirmwareImage::with_madt(&[&iso, &local_apic(0, 7, true), &iso]);
        let topology = discover_from(image).unwrap();
        assert_eq!(topology.cpu_apic_ids(), &[7]);
        assert_eq!(topology.skipped_entries(), 2);
        assert_eq!(topology.io_apic_id(), None);
    }

    #[test]
    fn zero_length_entry_is_fatal() {
        let zero: [u8; 2] = [0x7f, 0];
        let image = FirmwareImage::with_madt(&[&local_apic(0, 0, true), &zero]);
        assert_eq!(
            discover_from(image),
            Err(AcpiError::MalformedEntry {
                offset: Madt::ENTRIES_OFFSET + 8,
                length: 0,
            })
        );
    }

    #[test]
    fn undersized_known_entry_is_fatal() {
        let short_io_apic: [u8; 8] = [1, 8, 3, 0, 0, 0, 0xc0, 0xfe];
        let image = FirmwareImage::with_madt(&[&local_apic(0, 1, true), &short_io_apic]);
        assert_eq!(
            discover_from(image),
            Err(AcpiError::MalformedEntry {
                offset: Madt::ENTRIES_OFFSET + 8,
                length: 8,
            })
        );
    }

    #[test]
    fn record_overrunning_the_table_ends_the_walk() {
        let mut overrun: [u8; 4] = [9, 16, 0, 0];
        let image = FirmwareImage::with_madt(&[&local_apic(0, 1, true), &overrun]);
        let topology = discover_from(image).unwrap();
        assert_eq!(topology.cpu_apic_ids(), &[1]);
        assert_eq!(topology.skipped_entries(), 0);

        // The walk stops at the overrun, so nothing after it is read.
        overrun[1] = 200;
        let image = FirmwareImage::with_madt(&[
            &local_apic(0, 1, true),
            &overrun,
            &local_apic(1, 2, true),
        ]);
        assert_eq!(discover_from(image).unwrap().cpu_apic_ids(), &[1]);
    }

    #[test]
    fn trailing_fragment_is_ignored() {
        let image = FirmwareImage::with_madt(&[&local_apic(0, 1, true), &[0u8]]);
        let topology = discover_from(image).unwrap();
        assert_eq!(topology.cpu_apic_ids(), &[1]);
    }

    #[test]
    fn overrun_without_enabled_cpus_is_still_fatal() {
        let overrun: [u8; 4] = [0, 16, 0, 1];
        let image = FirmwareImage::with_madt(&[&local_apic(0, 1, false), &overrun]);
        assert_eq!(discover_from(image), Err(AcpiError::NoEnabledCpus));
    }

    #[test]
    fn missing_rsdp_and_missing_madt_are_fatal() {
        assert_eq!(
            discover_from(FirmwareImage::new()),
            Err(AcpiError::RsdpNotFound)
        );

        let mut image = FirmwareImage::with_madt(&[&local_apic(0, 0, true)]);
        image.put_rsdt(&[]);
        assert_eq!(discover_from(image), Err(AcpiError::TableNotFound));
    }

    #[test]
    fn xsdt_only_firmware_is_unsupported() {
        let mut image = FirmwareImage::with_madt(&[&local_apic(0, 0, true)]);
        image.write(0xe_0000, &rsdp_v2(0, 0x10_f000));
        assert_eq!(discover_from(image), Err(AcpiError::UnsupportedXsdt));
    }

    #[test]
    fn corrupt_madt_is_only_accepted_when_trusting() {
        let mut image = FirmwareImage::with_madt(&[&local_apic(0, 9, true)]);
        image.corrupt(MADT_PHYS + 10);
        let memory = image.into_memory();

        assert_eq!(
            discover::<_, MAX_CPUS>(&memory, DiscoveryConfig::default()),
            Err(AcpiError::TableNotFound)
        );
        let topology: Topology = discover(&memory, DiscoveryConfig::trusting()).unwrap();
        assert_eq!(topology.cpu_apic_ids(), &[9]);
    }

    #[test]
    fn from_madt_matches_raw_iteration() {
        let image = FirmwareImage::with_madt(&[&local_apic(0, 1, true), &local_apic(1, 2, true)]);
        let memory = image.into_memory();
        let madt = AcpiTables::locate(&memory).unwrap().madt().unwrap();

        let raw: Vec<MadtEntry> = madt.entries().map(Result::unwrap).collect();
        assert_eq!(raw.len(), 2);
        assert_eq!(MadtEntry::iter(&[]).count(), 0);

        let topology: Topology<2> = Topology::from_madt(&madt).unwrap();
        assert_eq!(topology.cpu_apic_ids(), &[1, 2]);
        assert_eq!(topology.dropped_cpus(), 0);
    }
}
