//! Package/core/thread topology construction.
//!
//! Two builders produce the same three-level hierarchy: one consumes
//! ordered per-processor kernel records with explicit core/package
//! identity keys, the other expands plain counts (packages, physical
//! cores, logical threads) into uniform groups. Both guarantee that
//! every core's and package's processor range is contiguous, because
//! downstream consumers address cores and caches by range, and both
//! cross-validate the finished hierarchy before returning it. A failed
//! cross-validation is a hard error: silently corrupted topology would
//! mis-attribute cache sharing and affinity decisions.

use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::error::{CoreInfoError, Result};
use crate::raw::ProcCpuinfoRecord;
use crate::uarch::{self, Uarch, Vendor, X86ModelInfo};

/// Cache levels a logical processor can participate in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheLevel {
    L1I,
    L1D,
    L2,
    L3,
    L4,
}

/// Indices into the per-level deduplicated cache arrays. `None` means
/// the processor has no cache at that level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRefs {
    pub l1i: Option<u32>,
    pub l1d: Option<u32>,
    pub l2: Option<u32>,
    pub l3: Option<u32>,
    pub l4: Option<u32>,
}

impl CacheRefs {
    fn slot_mut(&mut self, level: CacheLevel) -> &mut Option<u32> {
        match level {
            CacheLevel::L1I => &mut self.l1i,
            CacheLevel::L1D => &mut self.l1d,
            CacheLevel::L2 => &mut self.l2,
            CacheLevel::L3 => &mut self.l3,
            CacheLevel::L4 => &mut self.l4,
        }
    }
}

/// One schedulable hardware thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Processor {
    pub vendor: Vendor,
    pub uarch: Uarch,
    /// Platform-assigned id (kernel processor number).
    pub system_id: u32,
    /// Index of the owning core.
    pub core_index: u32,
    /// Index of the owning package.
    pub package_index: u32,
    pub caches: CacheRefs,
}

/// One physical core; owns a contiguous processor range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Core {
    pub processor_start: u32,
    pub processor_count: u32,
    pub package_index: u32,
    pub vendor: Vendor,
    pub uarch: Uarch,
}

/// One physical package; owns contiguous processor and core ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub processor_start: u32,
    pub processor_count: u32,
    pub core_start: u32,
    pub core_count: u32,
    /// Decoded model identification on register-based architectures;
    /// `None` for text-record platforms, which carry the identity on
    /// each processor instead.
    pub model_info: Option<X86ModelInfo>,
}

/// The three-level hierarchy, before cache arrays are attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    pub processors: Vec<Processor>,
    pub cores: Vec<Core>,
    pub packages: Vec<Package>,
}

/// Build the hierarchy from kernel per-processor records.
///
/// Records are regrouped so that all processors of a core, and all
/// cores of a package, occupy contiguous index ranges; the original
/// kernel processor number is preserved in [`Processor::system_id`].
/// Vendor and microarchitecture are classified per record.
pub fn build_from_records(records: &[ProcCpuinfoRecord]) -> Result<Topology> {
    if records.is_empty() {
        return Err(CoreInfoError::TopologyInconsistent(
            "no processor records enumerated".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by_key(|&i| (records[i].package_key, records[i].core_key, i));

    let mut topology = Topology::default();
    for &index in &order {
        let record = &records[index];
        let (vendor, microarch) =
            uarch::classify_arm(record.implementer, record.part, record.variant);

        let new_package = match topology.packages.last() {
            Some(_) => {
                let prev = &records[order[topology.processors.len() - 1]];
                prev.package_key != record.package_key
            }
            None => true,
        };
        if new_package {
            topology.packages.push(Package {
                processor_start: topology.processors.len() as u32,
                processor_count: 0,
                core_start: topology.cores.len() as u32,
                core_count: 0,
                model_info: None,
            });
        }

        let new_core = new_package || {
            let prev = &records[order[topology.processors.len() - 1]];
            prev.core_key != record.core_key
        };
        if new_core {
            topology.cores.push(Core {
                processor_start: topology.processors.len() as u32,
                processor_count: 0,
                package_index: topology.packages.len() as u32 - 1,
                vendor,
                uarch: microarch,
            });
            topology.packages.last_mut().unwrap().core_count += 1;
        }

        topology.processors.push(Processor {
            vendor,
            uarch: microarch,
            system_id: record.system_id,
            core_index: topology.cores.len() as u32 - 1,
            package_index: topology.packages.len() as u32 - 1,
            caches: CacheRefs::default(),
        });
        topology.cores.last_mut().unwrap().processor_count += 1;
        topology.packages.last_mut().unwrap().processor_count += 1;
    }

    validate(&topology)?;
    Ok(topology)
}

/// Build a uniform hierarchy from platform counts.
///
/// Invalid counts (zero, or fewer threads than cores) are corrected to
/// the nearest sane value with an error diagnostic; a thread or core
/// count that does not divide evenly across the level above is a hard
/// error because no contiguous uniform grouping exists for it.
pub fn build_uniform(
    packages: u32,
    cores: u32,
    threads: u32,
    vendor: Vendor,
    microarch: Uarch,
) -> Result<Topology> {
    let packages = if packages == 0 {
        log::error!("invalid package count 0; assuming 1");
        1
    } else {
        packages
    };
    let cores = if cores == 0 {
        log::error!("invalid physical core count 0; assuming {packages}");
        packages
    } else {
        cores
    };
    let threads = if threads < cores {
        log::error!("invalid logical thread count {threads} (cores = {cores}); assuming {cores}");
        cores
    } else {
        threads
    };

    if cores % packages != 0 || threads % cores != 0 {
        return Err(CoreInfoError::TopologyInconsistent(format!(
            "counts do not divide uniformly: {packages} packages, {cores} cores, {threads} threads"
        )));
    }
    let cores_per_package = cores / packages;
    let threads_per_core = threads / cores;

    let mut topology = Topology::default();
    for package_index in 0..packages {
        topology.packages.push(Package {
            processor_start: package_index * cores_per_package * threads_per_core,
            processor_count: cores_per_package * threads_per_core,
            core_start: package_index * cores_per_package,
            core_count: cores_per_package,
            model_info: None,
        });
    }
    for core_index in 0..cores {
        topology.cores.push(Core {
            processor_start: core_index * threads_per_core,
            processor_count: threads_per_core,
            package_index: core_index / cores_per_package,
            vendor,
            uarch: microarch,
        });
    }
    for thread_index in 0..threads {
        topology.processors.push(Processor {
            vendor,
            uarch: microarch,
            system_id: thread_index,
            core_index: thread_index / threads_per_core,
            package_index: thread_index / (cores_per_package * threads_per_core),
            caches: CacheRefs::default(),
        });
    }

    validate(&topology)?;
    Ok(topology)
}

/// Cross-validate structural invariants of a finished hierarchy.
pub fn validate(topology: &Topology) -> Result<()> {
    let thread_total: u32 = topology.cores.iter().map(|c| c.processor_count).sum();
    if thread_total as usize != topology.processors.len() {
        return Err(CoreInfoError::TopologyInconsistent(format!(
            "core processor counts sum to {thread_total}, but {} processors exist",
            topology.processors.len()
        )));
    }

    let mut expected_core = 0u32;
    let mut expected_processor = 0u32;
    for (package_index, package) in topology.packages.iter().enumerate() {
        if package.core_start != expected_core || package.processor_start != expected_processor {
            return Err(CoreInfoError::TopologyInconsistent(format!(
                "package {package_index} ranges are not contiguous"
            )));
        }
        let owned_cores = topology
            .cores
            .iter()
            .filter(|core| {
                core.processor_start >= package.processor_start
                    && core.processor_start + core.processor_count
                        <= package.processor_start + package.processor_count
            })
            .count() as u32;
        if owned_cores != package.core_count {
            return Err(CoreInfoError::TopologyInconsistent(format!(
                "package {package_index} claims {} cores but owns {owned_cores}",
                package.core_count
            )));
        }
        expected_core += package.core_count;
        expected_processor += package.processor_count;
    }
    if expected_core as usize != topology.cores.len()
        || expected_processor as usize != topology.processors.len()
    {
        return Err(CoreInfoError::TopologyInconsistent(format!(
            "packages cover {expected_core} cores / {expected_processor} processors, \
             but {} / {} exist",
            topology.cores.len(),
            topology.processors.len()
        )));
    }
    Ok(())
}

/// Expand one cache level into shared instances.
///
/// `threads_per_instance` logical processors share each instance; the
/// returned instances tile `[0, threads)` with contiguous ranges. An
/// unusable sharing count is corrected with an error diagnostic.
pub fn expand_cache_instances(
    threads: u32,
    threads_per_instance: u32,
    template: Cache,
) -> Vec<Cache> {
    let mut share = threads_per_instance;
    if share == 0 || share > threads {
        log::error!(
            "invalid cache sharing count {threads_per_instance} for {threads} threads; \
             assuming one fully shared instance"
        );
        share = threads;
    }
    if threads % share != 0 {
        log::error!(
            "cache sharing count {share} does not divide {threads} threads; \
             assuming one fully shared instance"
        );
        share = threads;
    }
    (0..threads / share)
        .map(|i| Cache {
            processor_start: i * share,
            processor_count: share,
            ..template
        })
        .collect()
}

/// Point each processor covered by an instance range at that instance.
pub fn link_caches(processors: &mut [Processor], level: CacheLevel, instances: &[Cache]) {
    for (index, instance) in instances.iter().enumerate() {
        let start = instance.processor_start as usize;
        let end = start + instance.processor_count as usize;
        let end = end.min(processors.len());
        for processor in &mut processors[start..end] {
            *processor.caches.slot_mut(level) = Some(index as u32);
        }
    }
}
