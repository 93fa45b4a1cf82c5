//! Drive two observation points through a synthetic commit stream and print
//! each region boundary plus the final per-thread snapshots.
//!
//! Run with `cargo run --example region_trace`.

use looppoint_engine::{
    AddrRange, CommitProbe, ConfigError, PrivilegeLevel, ProbeConfig, ProbeId, RegionConfig,
    RegionCoordinator,
};

fn main() -> Result<(), ConfigError> {
    let coordinator = RegionCoordinator::new(RegionConfig {
        region_length: 1_000,
        raise_exit_events: true,
    })?;
    let boundaries = coordinator.boundary_events();

    let probes: Vec<_> = (0..2u64)
        .map(|hw_thread| {
            CommitProbe::new(
                ProbeConfig {
                    id: ProbeId::new(hw_thread),
                    bb_valid_range: AddrRange::new(0x1000, 0x9000)?,
                    marker_valid_range: AddrRange::new(0x1000, 0x1100)?,
                    start_kernel_filter: false,
                    ..ProbeConfig::default()
                },
                coordinator.clone(),
            )
        })
        .collect::<Result<_, _>>()?;

    // A crude two-thread loop nest: each thread runs a hot inner loop with a
    // marker at its head, plus some cold kernel-side noise.
    for iteration in 0..2_500u64 {
        for (index, probe) in probes.iter().enumerate() {
            let base = 0x1000 + (index as u64) * 0x4000;
            probe.observe(base, PrivilegeLevel::User); // loop head marker
            probe.observe(base + 0x200 + (iteration % 4) * 8, PrivilegeLevel::User);
            if iteration % 64 == 0 {
                probe.observe(0xffff_8000_0000_0000, PrivilegeLevel::Kernel);
            }
        }

        for boundary in boundaries.try_iter() {
            println!(
                "region {:>3} | {} instructions | last pc {:#x}",
                boundary.region_index, boundary.global_inst_count, boundary.pc
            );
        }
    }

    for probe in &probes {
        let freq = probe.bb_freq();
        let mut blocks: Vec<_> = freq.iter().collect();
        blocks.sort_by(|a, b| b.1.cmp(a.1));
        println!("\nprobe {}: {} distinct blocks", probe.id(), blocks.len());
        for (pc, count) in blocks.iter().take(5) {
            println!("  {pc:#x}: {count}");
        }
        println!("  recent markers: {:?}", probe.recent_markers());
    }

    println!(
        "\nglobal: {} instructions, most recent pc {:#x}",
        coordinator.global_inst_count(),
        coordinator.global_most_recent_pc()
    );
    Ok(())
}
