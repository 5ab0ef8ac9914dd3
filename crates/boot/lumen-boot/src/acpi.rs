//! Kernel-side ACPI integration.
//!
//! Runs topology discovery once during boot and stores the result in a
//! write-once cell. The SMP and interrupt subsystems read it back through
//! [`topology`].

use lumen_acpi::{AcpiError, AcpiHandler, DiscoveryConfig, Topology};
use lumen_core::cell::BootCell;
use lumen_core::{kdebug, kfatal, kinfo, kwarn};

use crate::HaltFn;

/// Topology discovered at boot: empty before [`init`], set exactly once.
static TOPOLOGY: BootCell<Topology> = BootCell::new();

/// Discover the ACPI topology and publish it as boot configuration.
///
/// Halts through `halt` with the error's diagnostic if discovery fails.
/// Returns the published topology.
pub fn init<H: AcpiHandler>(handler: &H, halt: HaltFn) -> &'static Topology {
    init_in(&TOPOLOGY, handler, DiscoveryConfig::default(), halt)
}

/// Returns the topology published by [`init`], if it has run.
#[must_use]
pub fn topology() -> Option<&'static Topology> {
    TOPOLOGY.get()
}

/// Discover the topology and store it in `cell`.
///
/// # Errors
///
/// Returns the fatal [`AcpiError`] from discovery. The cell is left empty.
pub fn try_init_in<'c, H: AcpiHandler, const N: usize>(
    cell: &'c BootCell<Topology<N>>,
    handler: &H,
    config: DiscoveryConfig,
) -> Result<&'c Topology<N>, AcpiError> {
    if let Some(existing) = cell.get() {
        kwarn!("ACPI: topology already discovered, keeping the first result");
        return Ok(existing);
    }

    let topology = lumen_acpi::discover::<H, N>(handler, config)?;
    log_summary(&topology);

    if let Ok(stored) = cell.set(topology) {
        return Ok(stored);
    }
    // Another initialiser is publishing the same firmware data.
    loop {
        if let Some(stored) = cell.get() {
            return Ok(stored);
        }
        core::hint::spin_loop();
    }
}

/// Like [`try_init_in`], but halts on failure.
pub fn init_in<'c, H: AcpiHandler, const N: usize>(
    cell: &'c BootCell<Topology<N>>,
    handler: &H,
    config: DiscoveryConfig,
    halt: HaltFn,
) -> &'c Topology<N> {
    match try_init_in(cell, handler, config) {
        Ok(topology) => topology,
        Err(err) => {
            kfatal!("{err}");
            halt(err.message())
        }
    }
}

fn log_summary<const N: usize>(topology: &Topology<N>) {
    kinfo!(
        "ACPI: MADT: {} CPUs, LAPIC at {:#x}",
        topology.cpu_count(),
        topology.local_apic_address()
    );
    kdebug!("ACPI: CPU APIC ids {:?}", topology.cpu_apic_ids());

    match topology.io_apic() {
        Some(ioapic) => kinfo!(
            "ACPI: I/O APIC id {} at {:#x}, GSI base {}",
            ioapic.id,
            ioapic.address,
            ioapic.gsi_base
        ),
        None => kwarn!("ACPI: no I/O APIC listed in the MADT"),
    }

    if topology.dropped_cpus() > 0 {
        kwarn!(
            "ACPI: {} enabled CPUs ignored (limit {})",
            topology.dropped_cpus(),
            N
        );
    }
    if topology.io_apic_count() > 1 {
        kwarn!(
            "ACPI: {} I/O APICs listed, only the last is used",
            topology.io_apic_count()
        );
    }
}
