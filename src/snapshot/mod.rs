//! Snapshot assembly and the process-wide published instance.
//!
//! A [`Snapshot`] is the finished, read-only description of the host:
//! logical processors, cores, packages, deduplicated per-level cache
//! arrays, and the decoded ISA feature set. Assembly runs once; after
//! publication nothing is ever mutated, so readers need no locking
//! beyond the one-time publish barrier.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::cache::{self, Cache};
use crate::error::{CoreInfoError, Result};
use crate::isa::{arm, x86, ArmIsaFeatures, X86IsaFeatures};
use crate::raw::{CoprocessorPort, CpuidPort, ProcCpuinfoRecord, SysConfigPort};
use crate::raw::{VALID_DCACHE, VALID_ICACHE};
use crate::topology::{self, CacheLevel, Core, Package, Processor};
use crate::uarch::{self, X86ModelInfo};

/// Decoded ISA feature set of the host, when the architecture exposes
/// one through register queries or kernel records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsaFeatures {
    #[default]
    None,
    X86(X86IsaFeatures),
    Arm(ArmIsaFeatures),
}

/// The published host description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub processors: Vec<Processor>,
    pub cores: Vec<Core>,
    pub packages: Vec<Package>,
    pub l1i: Vec<Cache>,
    pub l1d: Vec<Cache>,
    pub l2: Vec<Cache>,
    pub l3: Vec<Cache>,
    pub l4: Vec<Cache>,
    pub isa: IsaFeatures,
}

// Associativity is not exposed by the configuration queries, so the
// derived templates assume common values for each level.
const ASSUMED_L1_ASSOCIATIVITY: u32 = 8;
const ASSUMED_L2_ASSOCIATIVITY: u32 = 8;
const ASSUMED_L3_ASSOCIATIVITY: u32 = 16;

fn cache_template(size: u64, associativity: u32, line_size: u64, label: &str) -> Option<Cache> {
    if size == 0 {
        return None;
    }
    let line_size = if line_size == 0 {
        log::error!("unknown cache line size; assuming 64 bytes");
        64
    } else {
        line_size as u32
    };
    let size = size as u32;
    if size % (associativity * line_size) != 0 {
        log::error!(
            "{label} cache size {size} is not consistent with \
             {associativity}-way associativity and {line_size}-byte lines; \
             marking level as not present"
        );
        return None;
    }
    Some(Cache {
        size,
        associativity,
        sets: size / (associativity * line_size),
        partitions: 1,
        line_size,
        processor_start: 0,
        processor_count: 0,
    })
}

fn count_or(label: &str, value: Result<u32>, fallback: u32) -> u32 {
    match value {
        Ok(v) if v > 0 => v,
        Ok(v) => {
            log::error!("invalid {label} value {v}; assuming {fallback}");
            fallback
        }
        Err(err) => {
            log::error!("{label} query failed: {err}; assuming {fallback}");
            fallback
        }
    }
}

impl Snapshot {
    /// Assemble from register queries plus platform configuration
    /// (the x86 path).
    pub fn from_cpuid(port: &dyn CpuidPort, config: &dyn SysConfigPort) -> Result<Self> {
        let vendor = uarch::x86_vendor_from_id(&uarch::x86_vendor_string(port.cpuid(0)));
        let basic_info = port.cpuid(1);
        let model_info = X86ModelInfo::decode(basic_info);
        let microarch = uarch::classify_x86(vendor, &model_info);
        log::info!(
            "detected {vendor} processor, family {:#x} model {:#x}",
            model_info.family,
            model_info.model
        );
        let isa = x86::decode(basic_info, vendor, port);

        let packages = count_or("package count", config.package_count(), 1);
        let cores = count_or("physical core count", config.physical_core_count(), packages);
        let threads = count_or("logical thread count", config.logical_thread_count(), cores);
        let mut topology = topology::build_uniform(packages, cores, threads, vendor, microarch)?;
        for package in &mut topology.packages {
            package.model_info = Some(model_info);
        }
        let threads = topology.processors.len() as u32;

        // hw.cacheconfig index 0 describes memory; 1..=4 are L1..L4.
        let sharing = config.threads_per_cache().unwrap_or_else(|err| {
            log::error!("cache sharing query failed: {err}");
            Vec::new()
        });
        let share_at = |level: usize| sharing.get(level).copied().unwrap_or(0);

        let line = config.cache_line_size().unwrap_or_else(|err| {
            log::error!("cache line size query failed: {err}");
            0
        });
        let level_size = |label: &str, value: Result<u64>| {
            value.unwrap_or_else(|err| {
                log::error!("{label} cache size query failed: {err}");
                0
            })
        };

        let mut snapshot = Snapshot {
            isa: IsaFeatures::X86(isa),
            ..Default::default()
        };
        let levels = [
            (
                CacheLevel::L1I,
                level_size("L1I", config.l1i_cache_size()),
                ASSUMED_L1_ASSOCIATIVITY,
                share_at(1),
                "L1I",
            ),
            (
                CacheLevel::L1D,
                level_size("L1D", config.l1d_cache_size()),
                ASSUMED_L1_ASSOCIATIVITY,
                share_at(1),
                "L1D",
            ),
            (
                CacheLevel::L2,
                level_size("L2", config.l2_cache_size()),
                ASSUMED_L2_ASSOCIATIVITY,
                share_at(2),
                "L2",
            ),
            (
                CacheLevel::L3,
                level_size("L3", config.l3_cache_size()),
                ASSUMED_L3_ASSOCIATIVITY,
                share_at(3),
                "L3",
            ),
        ];
        for (level, size, associativity, share, label) in levels {
            if let Some(template) = cache_template(size, associativity, line, label) {
                let instances = topology::expand_cache_instances(threads, share, template);
                topology::link_caches(&mut topology.processors, level, &instances);
                *snapshot.level_mut(level) = instances;
            }
        }

        snapshot.processors = topology.processors;
        snapshot.cores = topology.cores;
        snapshot.packages = topology.packages;
        Ok(snapshot)
    }

    /// Assemble from kernel per-processor records (the ARM path).
    pub fn from_proc_records(
        records: &[ProcCpuinfoRecord],
        coprocessor: &dyn CoprocessorPort,
    ) -> Result<Self> {
        let mut topology = topology::build_from_records(records)?;
        let record_count = records.len() as u32;

        // The boot processor's record describes the ISA for the whole
        // system; big.LITTLE clusters share one instruction set.
        let boot = &records[0];
        let isa = arm::decode(boot, record_count, coprocessor);

        let mut snapshot = Snapshot {
            isa: IsaFeatures::Arm(isa),
            ..Default::default()
        };

        // One L1I/L1D per core, one L2 per cluster. A cluster is a run
        // of equal-microarchitecture cores within a package, so
        // heterogeneous (big.LITTLE) packages resolve each cluster's
        // geometry separately.
        for package_index in 0..topology.packages.len() {
            let package = topology.packages[package_index];
            let core_end = package.core_start + package.core_count;
            let mut run_start = package.core_start;
            while run_start < core_end {
                let cluster_uarch = topology.cores[run_start as usize].uarch;
                let mut run_end = run_start + 1;
                while run_end < core_end && topology.cores[run_end as usize].uarch == cluster_uarch
                {
                    run_end += 1;
                }
                let cluster_cores = run_end - run_start;

                let first_proc = topology.cores[run_start as usize].processor_start;
                let first_id = topology.processors[first_proc as usize].system_id;
                let first = records
                    .iter()
                    .find(|r| r.system_id == first_id)
                    .unwrap_or(boot);
                let caches = cache::resolve(
                    cluster_uarch,
                    cluster_cores,
                    first.part,
                    arm::effective_architecture(first),
                );
                let (l1i, l1d) = l1_templates(first, &caches);

                for core_index in run_start..run_end {
                    let core = topology.cores[core_index as usize];
                    for (level, template) in [(CacheLevel::L1I, l1i), (CacheLevel::L1D, l1d)] {
                        if let Some(template) = template {
                            snapshot.level_mut(level).push(Cache {
                                processor_start: core.processor_start,
                                processor_count: core.processor_count,
                                ..template
                            });
                        }
                    }
                }
                if let Some(template) = caches.l2 {
                    let last = topology.cores[(run_end - 1) as usize];
                    snapshot.l2.push(Cache {
                        processor_start: first_proc,
                        processor_count: last.processor_start + last.processor_count - first_proc,
                        ..template
                    });
                }
                run_start = run_end;
            }
        }

        for level in [CacheLevel::L1I, CacheLevel::L1D, CacheLevel::L2] {
            let instances = std::mem::take(snapshot.level_mut(level));
            topology::link_caches(&mut topology.processors, level, &instances);
            *snapshot.level_mut(level) = instances;
        }

        snapshot.processors = topology.processors;
        snapshot.cores = topology.cores;
        snapshot.packages = topology.packages;
        Ok(snapshot)
    }

    fn level_mut(&mut self, level: CacheLevel) -> &mut Vec<Cache> {
        match level {
            CacheLevel::L1I => &mut self.l1i,
            CacheLevel::L1D => &mut self.l1d,
            CacheLevel::L2 => &mut self.l2,
            CacheLevel::L3 => &mut self.l3,
            CacheLevel::L4 => &mut self.l4,
        }
    }

    /// Decoded x86 features, when this is an x86 snapshot.
    pub fn x86_isa(&self) -> Option<&X86IsaFeatures> {
        match &self.isa {
            IsaFeatures::X86(isa) => Some(isa),
            _ => None,
        }
    }

    /// Decoded ARM features, when this is an ARM snapshot.
    pub fn arm_isa(&self) -> Option<&ArmIsaFeatures> {
        match &self.isa {
            IsaFeatures::Arm(isa) => Some(isa),
            _ => None,
        }
    }
}

/// Per-core L1 templates for a cluster: kernel-reported geometry when
/// the record carries it, the microarchitecture table otherwise.
fn l1_templates(
    record: &ProcCpuinfoRecord,
    resolved: &cache::CacheHierarchy,
) -> (Option<Cache>, Option<Cache>) {
    let mut l1i = resolved.l1i;
    let mut l1d = resolved.l1d;
    if record.has(VALID_ICACHE) && record.cache.i_size != 0 {
        l1i = cache_template(
            record.cache.i_size as u64,
            record.cache.i_assoc.max(1),
            record.cache.i_line_length as u64,
            "kernel-reported L1I",
        )
        .or(l1i);
    }
    if record.has(VALID_DCACHE) && record.cache.d_size != 0 {
        l1d = cache_template(
            record.cache.d_size as u64,
            record.cache.d_assoc.max(1),
            record.cache.d_line_length as u64,
            "kernel-reported L1D",
        )
        .or(l1d);
    }
    (l1i, l1d)
}

static PUBLISHED: RwLock<Option<Arc<Snapshot>>> = RwLock::new(None);

/// Detect the host and publish the snapshot.
///
/// Idempotent and safe to call from multiple threads: exactly one
/// caller runs detection while the others wait, and every caller
/// observes either the fully published snapshot or an error.
pub fn initialize() -> Result<()> {
    let mut slot = PUBLISHED.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    if slot.is_some() {
        log::debug!("already initialized");
        return Ok(());
    }
    *slot = Some(Arc::new(detect_host()?));
    Ok(())
}

/// Publish a pre-assembled snapshot instead of detecting the host.
/// Idempotent like [`initialize`]; an already-published snapshot wins.
pub fn initialize_with(snapshot: Snapshot) -> Result<()> {
    let mut slot = PUBLISHED.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    if slot.is_some() {
        log::debug!("already initialized");
        return Ok(());
    }
    *slot = Some(Arc::new(snapshot));
    Ok(())
}

#[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), target_os = "macos"))]
fn detect_host() -> Result<Snapshot> {
    Snapshot::from_cpuid(&crate::raw::HostCpuid, &crate::raw::HostSysConfig)
}

#[cfg(not(all(any(target_arch = "x86", target_arch = "x86_64"), target_os = "macos")))]
fn detect_host() -> Result<Snapshot> {
    Err(CoreInfoError::UnsupportedPlatform(format!(
        "no host detection path for {}/{}",
        std::env::consts::ARCH,
        std::env::consts::OS
    )))
}

/// Release the published snapshot and return to the uninitialized
/// state. Outstanding [`Arc`] handles stay valid until dropped.
pub fn deinitialize() {
    let mut slot = PUBLISHED.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    if slot.take().is_none() {
        log::warn!("deinitialize called without a published snapshot");
    }
}

/// Whether a snapshot is currently published.
pub fn is_initialized() -> bool {
    PUBLISHED
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .is_some()
}

/// The published snapshot, or `None` before initialization.
pub fn snapshot() -> Option<Arc<Snapshot>> {
    PUBLISHED
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

// Array accessors; all return empty before initialization. Callers
// iterating repeatedly should hold the [`snapshot`] handle instead.

pub fn processors() -> Vec<Processor> {
    snapshot().map(|s| s.processors.clone()).unwrap_or_default()
}

pub fn cores() -> Vec<Core> {
    snapshot().map(|s| s.cores.clone()).unwrap_or_default()
}

pub fn packages() -> Vec<Package> {
    snapshot().map(|s| s.packages.clone()).unwrap_or_default()
}

pub fn l1i_caches() -> Vec<Cache> {
    snapshot().map(|s| s.l1i.clone()).unwrap_or_default()
}

pub fn l1d_caches() -> Vec<Cache> {
    snapshot().map(|s| s.l1d.clone()).unwrap_or_default()
}

pub fn l2_caches() -> Vec<Cache> {
    snapshot().map(|s| s.l2.clone()).unwrap_or_default()
}

pub fn l3_caches() -> Vec<Cache> {
    snapshot().map(|s| s.l3.clone()).unwrap_or_default()
}

pub fn l4_caches() -> Vec<Cache> {
    snapshot().map(|s| s.l4.clone()).unwrap_or_default()
}

/// The published ISA feature set; [`IsaFeatures::None`] before
/// initialization.
pub fn isa_features() -> IsaFeatures {
    snapshot().map(|s| s.isa).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::testutil::{FakeCoprocessor, FakeCpuid, FakeSysConfig};
    use crate::raw::CpuidRegs;
    use crate::raw::{VALID_ARCHITECTURE, VALID_FEATURES, VALID_IMPLEMENTER, VALID_PART};
    use crate::uarch::{Uarch, Vendor};

    fn intel_cpuid() -> FakeCpuid {
        let mut port = FakeCpuid::default();
        // "GenuineIntel", max basic leaf 13.
        port.set(
            0,
            0,
            CpuidRegs {
                eax: 13,
                ebx: 0x756E_6547,
                ecx: 0x6C65_746E,
                edx: 0x4965_6E69,
            },
        );
        // Family 6, model 0x3C (Haswell); FPU + MMX + SSE2.
        port.set(
            1,
            0,
            CpuidRegs {
                eax: 0x0003_06C3,
                ebx: 0,
                ecx: 0,
                edx: (1 << 0) | (1 << 23) | (1 << 26),
            },
        );
        port.set(0x8000_0000, 0, CpuidRegs { eax: 0x8000_0008, ..Default::default() });
        port
    }

    fn quad_core_config() -> FakeSysConfig {
        FakeSysConfig {
            packages: 1,
            cores: 4,
            threads: 8,
            cacheconfig: vec![8, 2, 2, 8],
            l1i: 32 * 1024,
            l1d: 32 * 1024,
            l2: 256 * 1024,
            l3: 8 * 1024 * 1024,
            line: 64,
            ..Default::default()
        }
    }

    fn a53_records(count: u32) -> Vec<ProcCpuinfoRecord> {
        (0..count)
            .map(|i| ProcCpuinfoRecord {
                architecture_version: 8,
                implementer: 0x41,
                part: 0xD03,
                system_id: i,
                core_key: i,
                package_key: 0,
                valid_mask: VALID_ARCHITECTURE
                    | VALID_IMPLEMENTER
                    | VALID_PART
                    | VALID_FEATURES,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_from_cpuid_assembles_topology_and_caches() {
        let snapshot = Snapshot::from_cpuid(&intel_cpuid(), &quad_core_config()).unwrap();
        assert_eq!(snapshot.processors.len(), 8);
        assert_eq!(snapshot.cores.len(), 4);
        assert_eq!(snapshot.packages.len(), 1);
        assert_eq!(snapshot.processors[0].vendor, Vendor::Intel);
        assert_eq!(snapshot.processors[0].uarch, Uarch::Haswell);

        // The decoded model identification rides on the package.
        let model_info = snapshot.packages[0].model_info.unwrap();
        assert_eq!(model_info.family, 0x6);
        assert_eq!(model_info.model, 0x3C);
        assert_eq!(model_info.stepping, 0x3);

        let isa = snapshot.x86_isa().unwrap();
        assert!(isa.fpu && isa.mmx && isa.sse2);
        assert!(!isa.avx);

        // Two threads per L1/L2 instance, all eight share the L3.
        assert_eq!(snapshot.l1i.len(), 4);
        assert_eq!(snapshot.l1d.len(), 4);
        assert_eq!(snapshot.l2.len(), 4);
        assert_eq!(snapshot.l3.len(), 1);
        assert_eq!(snapshot.l3[0].processor_count, 8);
        assert!(snapshot.l4.is_empty());

        let l2 = &snapshot.l2[0];
        assert_eq!(l2.size, l2.associativity * l2.sets * l2.line_size);
        assert_eq!(snapshot.processors[0].caches.l2, Some(0));
        assert_eq!(snapshot.processors[7].caches.l2, Some(3));
        assert_eq!(snapshot.processors[7].caches.l3, Some(0));
    }

    #[test]
    fn test_from_cpuid_survives_failed_count_queries() {
        let config = FakeSysConfig {
            fail_counts: true,
            ..quad_core_config()
        };
        let snapshot = Snapshot::from_cpuid(&intel_cpuid(), &config).unwrap();
        // Counts fall back to one package, one core, one thread.
        assert_eq!(snapshot.processors.len(), 1);
        assert_eq!(snapshot.cores.len(), 1);
        assert_eq!(snapshot.packages.len(), 1);
    }

    #[test]
    fn test_from_cpuid_skips_absent_cache_levels() {
        let mut config = quad_core_config();
        config.l3 = 0;
        let snapshot = Snapshot::from_cpuid(&intel_cpuid(), &config).unwrap();
        assert!(snapshot.l3.is_empty());
        assert_eq!(snapshot.processors[0].caches.l3, None);
    }

    #[test]
    fn test_from_proc_records_quad_a53() {
        let snapshot =
            Snapshot::from_proc_records(&a53_records(4), &FakeCoprocessor::default()).unwrap();
        assert_eq!(snapshot.processors.len(), 4);
        assert_eq!(snapshot.cores.len(), 4);
        assert_eq!(snapshot.packages.len(), 1);
        assert_eq!(snapshot.processors[0].uarch, Uarch::CortexA53);

        let isa = snapshot.arm_isa().unwrap();
        assert!(isa.neon && isa.idiv && isa.armv7mp);

        // One L1I/L1D per core, one cluster-wide L2.
        assert_eq!(snapshot.l1i.len(), 4);
        assert_eq!(snapshot.l1d.len(), 4);
        assert_eq!(snapshot.l2.len(), 1);
        let l2 = &snapshot.l2[0];
        assert_eq!(l2.size, 4 * 128 * 1024);
        assert_eq!(l2.associativity, 16);
        assert_eq!(l2.processor_count, 4);
        assert_eq!(l2.size, l2.associativity * l2.sets * l2.line_size);

        assert_eq!(snapshot.processors[2].caches.l1d, Some(2));
        assert_eq!(snapshot.processors[2].caches.l2, Some(0));
        assert_eq!(snapshot.processors[2].caches.l3, None);

        // Model identification is per record on this path.
        assert!(snapshot.packages[0].model_info.is_none());
    }

    #[test]
    fn test_from_proc_records_heterogeneous_clusters() {
        // One package: four Cortex-A53 cores then two Cortex-A57
        // cores. Each cluster resolves its own geometry.
        let mut records = a53_records(6);
        for record in &mut records[4..] {
            record.part = 0xD07;
        }
        let snapshot =
            Snapshot::from_proc_records(&records, &FakeCoprocessor::default()).unwrap();
        assert_eq!(snapshot.packages.len(), 1);
        assert_eq!(snapshot.cores.len(), 6);
        assert_eq!(snapshot.processors[0].uarch, Uarch::CortexA53);
        assert_eq!(snapshot.processors[5].uarch, Uarch::CortexA57);

        assert_eq!(snapshot.l2.len(), 2);
        let little = &snapshot.l2[0];
        assert_eq!(little.size, 4 * 128 * 1024);
        assert_eq!((little.processor_start, little.processor_count), (0, 4));
        let big = &snapshot.l2[1];
        assert_eq!(big.size, 2 * 512 * 1024);
        assert_eq!((big.processor_start, big.processor_count), (4, 2));

        // Per-cluster L1 geometry: A53 16K/2-way I, A57 48K/3-way I.
        assert_eq!(snapshot.l1i[0].size, 16 * 1024);
        assert_eq!(snapshot.l1i[4].size, 48 * 1024);
        assert_eq!(snapshot.l1i[4].associativity, 3);

        assert_eq!(snapshot.processors[0].caches.l2, Some(0));
        assert_eq!(snapshot.processors[3].caches.l2, Some(0));
        assert_eq!(snapshot.processors[4].caches.l2, Some(1));
        assert_eq!(snapshot.processors[5].caches.l2, Some(1));
    }

    #[test]
    fn test_from_proc_records_prefers_kernel_reported_l1() {
        let mut records = a53_records(2);
        for record in &mut records {
            record.valid_mask |= VALID_ICACHE | VALID_DCACHE;
            record.cache.i_size = 32 * 1024;
            record.cache.i_assoc = 2;
            record.cache.i_line_length = 64;
            record.cache.d_size = 32 * 1024;
            record.cache.d_assoc = 4;
            record.cache.d_line_length = 64;
        }
        let snapshot =
            Snapshot::from_proc_records(&records, &FakeCoprocessor::default()).unwrap();
        assert_eq!(snapshot.l1i[0].size, 32 * 1024);
        assert_eq!(snapshot.l1d[0].associativity, 4);
        assert_eq!(
            snapshot.l1i[0].sets,
            snapshot.l1i[0].size / (snapshot.l1i[0].associativity * snapshot.l1i[0].line_size)
        );
    }

    #[test]
    fn test_from_proc_records_empty_fails() {
        assert!(matches!(
            Snapshot::from_proc_records(&[], &FakeCoprocessor::default()),
            Err(CoreInfoError::TopologyInconsistent(_))
        ));
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot =
            Snapshot::from_proc_records(&a53_records(4), &FakeCoprocessor::default()).unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }

    // Global-state assertions share one test to avoid cross-test
    // interference on the process-wide slot.
    #[test]
    fn test_global_lifecycle() {
        let _ = env_logger::builder().is_test(true).try_init();
        deinitialize_quietly();
        assert!(!is_initialized());
        assert!(snapshot().is_none());
        assert!(processors().is_empty());
        assert!(l2_caches().is_empty());
        assert_eq!(isa_features(), IsaFeatures::None);

        let assembled =
            Snapshot::from_proc_records(&a53_records(4), &FakeCoprocessor::default()).unwrap();
        initialize_with(assembled.clone()).unwrap();
        assert!(is_initialized());
        let published = snapshot().unwrap();
        assert_eq!(*published, assembled);

        // A second publication is a no-op; the first snapshot stays.
        let other =
            Snapshot::from_proc_records(&a53_records(2), &FakeCoprocessor::default()).unwrap();
        initialize_with(other).unwrap();
        assert_eq!(snapshot().unwrap().processors.len(), 4);
        assert_eq!(processors().len(), 4);
        assert_eq!(cores().len(), 4);
        assert_eq!(packages().len(), 1);
        assert_eq!(l1i_caches().len(), 4);
        assert_eq!(l2_caches().len(), 1);
        assert!(matches!(isa_features(), IsaFeatures::Arm(_)));

        // Handles outlive teardown.
        deinitialize();
        assert!(!is_initialized());
        assert!(snapshot().is_none());
        assert_eq!(published.processors.len(), 4);

        // Racing publication from several threads: exactly one
        // candidate wins and every thread observes that same snapshot.
        let handles: Vec<_> = (1..=4u32)
            .map(|n| {
                std::thread::spawn(move || {
                    let candidate = Snapshot::from_proc_records(
                        &a53_records(n),
                        &FakeCoprocessor::default(),
                    )
                    .unwrap();
                    initialize_with(candidate).unwrap();
                    snapshot().unwrap()
                })
            })
            .collect();
        let observed: Vec<Arc<Snapshot>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winner = snapshot().unwrap();
        assert!(observed.iter().all(|s| **s == *winner));
        assert!((1..=4usize).any(|n| winner.processors.len() == n));
        deinitialize();
    }

    fn deinitialize_quietly() {
        let mut slot = PUBLISHED.write().unwrap_or_else(|p| p.into_inner());
        *slot = None;
    }
}
