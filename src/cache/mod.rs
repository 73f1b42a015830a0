//! Cache hierarchy resolution.
//!
//! ARM platforms rarely expose cache geometry directly, so geometry is
//! looked up by microarchitecture from vendor documentation. Several
//! parts implement the L2 as per-core physical slices behind a unified
//! logical cache, so those entries scale L2 size by the number of
//! cores in the cluster. Unrecognized microarchitectures fall back to
//! generic per-architecture-version profiles.

use serde::{Deserialize, Serialize};

use crate::uarch::Uarch;

/// One cache instance.
///
/// `processor_start` and `processor_count` describe the contiguous
/// range of logical processors sharing this instance; they are
/// assigned during topology construction, after geometry resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cache {
    /// Total size in bytes.
    pub size: u32,
    /// Ways of associativity.
    pub associativity: u32,
    /// Number of sets; always `size / (associativity * line_size)`.
    pub sets: u32,
    /// Number of physical partitions.
    pub partitions: u32,
    /// Line size in bytes.
    pub line_size: u32,
    /// Index of the first logical processor sharing this instance.
    pub processor_start: u32,
    /// Number of logical processors sharing this instance.
    pub processor_count: u32,
}

/// L1/L2 descriptors for one cluster. A `None` level is not present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheHierarchy {
    pub l1i: Option<Cache>,
    pub l1d: Option<Cache>,
    pub l2: Option<Cache>,
}

/// Size/associativity/line-size triple before set derivation.
///
/// A zero size marks the level as absent. `per_core` entries multiply
/// the size by the cluster core count.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    size: u32,
    associativity: u32,
    line_size: u32,
    per_core: bool,
}

const NO_CACHE: Geometry = Geometry {
    size: 0,
    associativity: 0,
    line_size: 0,
    per_core: false,
};

const fn fixed(size: u32, associativity: u32, line_size: u32) -> Geometry {
    Geometry {
        size,
        associativity,
        line_size,
        per_core: false,
    }
}

const fn per_core(size: u32, associativity: u32, line_size: u32) -> Geometry {
    Geometry {
        size,
        associativity,
        line_size,
        per_core: true,
    }
}

impl Geometry {
    fn resolve(&self, cluster_cores: u32) -> Option<Cache> {
        if self.size == 0 {
            return None;
        }
        let size = if self.per_core {
            self.size * cluster_cores
        } else {
            self.size
        };
        let sets = size / (self.associativity * self.line_size);
        Some(Cache {
            size,
            associativity: self.associativity,
            sets,
            partitions: 1,
            line_size: self.line_size,
            processor_start: 0,
            processor_count: 0,
        })
    }
}

/// One row of the geometry table.
///
/// `part_class` additionally matches `part >> 8` when set; XScale
/// generations share a microarchitecture value but differ in geometry.
struct GeometryRule {
    uarch: Uarch,
    part_class: Option<u32>,
    l1i: Geometry,
    l1d: Geometry,
    l2: Geometry,
}

/// Geometry per microarchitecture, from vendor technical reference
/// manuals and product briefs. First matching row wins.
static GEOMETRY_RULES: &[GeometryRule] = &[
    // XScale PXA 210/25X/26X
    GeometryRule {
        uarch: Uarch::Xscale,
        part_class: Some(2),
        l1i: fixed(16 * 1024, 32, 32),
        l1d: fixed(16 * 1024, 4, 64),
        l2: NO_CACHE,
    },
    // XScale PXA 27X
    GeometryRule {
        uarch: Uarch::Xscale,
        part_class: Some(4),
        l1i: fixed(32 * 1024, 32, 32),
        l1d: fixed(32 * 1024, 32, 32),
        l2: NO_CACHE,
    },
    // XScale PXA 3XX
    GeometryRule {
        uarch: Uarch::Xscale,
        part_class: Some(6),
        l1i: fixed(32 * 1024, 4, 32),
        l1d: fixed(32 * 1024, 4, 32),
        l2: fixed(256 * 1024, 8, 32),
    },
    GeometryRule {
        uarch: Uarch::Arm11,
        part_class: None,
        l1i: fixed(16 * 1024, 4, 32),
        l1d: fixed(16 * 1024, 4, 32),
        l2: NO_CACHE,
    },
    GeometryRule {
        uarch: Uarch::CortexA5,
        part_class: None,
        l1i: fixed(32 * 1024, 2, 32),
        l1d: fixed(32 * 1024, 4, 32),
        l2: fixed(256 * 1024, 8, 32),
    },
    GeometryRule {
        uarch: Uarch::CortexA7,
        part_class: None,
        l1i: fixed(32 * 1024, 2, 32),
        l1d: fixed(32 * 1024, 4, 64),
        l2: per_core(128 * 1024, 8, 64),
    },
    GeometryRule {
        uarch: Uarch::CortexA8,
        part_class: None,
        l1i: fixed(32 * 1024, 4, 64),
        l1d: fixed(32 * 1024, 4, 64),
        l2: fixed(256 * 1024, 8, 64),
    },
    GeometryRule {
        uarch: Uarch::CortexA9,
        part_class: None,
        l1i: fixed(32 * 1024, 4, 32),
        l1d: fixed(32 * 1024, 4, 32),
        l2: fixed(1024 * 1024, 16, 32),
    },
    GeometryRule {
        uarch: Uarch::CortexA15,
        part_class: None,
        l1i: fixed(32 * 1024, 2, 64),
        l1d: fixed(32 * 1024, 2, 64),
        l2: per_core(512 * 1024, 16, 64),
    },
    GeometryRule {
        uarch: Uarch::CortexA53,
        part_class: None,
        l1i: fixed(16 * 1024, 2, 64),
        l1d: fixed(16 * 1024, 4, 64),
        l2: per_core(128 * 1024, 16, 64),
    },
    GeometryRule {
        uarch: Uarch::CortexA57,
        part_class: None,
        l1i: fixed(48 * 1024, 3, 64),
        l1d: fixed(32 * 1024, 2, 64),
        l2: per_core(512 * 1024, 16, 64),
    },
    GeometryRule {
        uarch: Uarch::Scorpion,
        part_class: None,
        l1i: fixed(32 * 1024, 4, 32),
        l1d: fixed(32 * 1024, 4, 32),
        l2: per_core(256 * 1024, 4, 128),
    },
    GeometryRule {
        uarch: Uarch::Krait,
        part_class: None,
        l1i: fixed(16 * 1024, 4, 64),
        l1d: fixed(16 * 1024, 4, 64),
        l2: per_core(512 * 1024, 8, 128),
    },
    GeometryRule {
        uarch: Uarch::Kryo,
        part_class: None,
        l1i: fixed(32 * 1024, 4, 64),
        l1d: fixed(32 * 1024, 4, 64),
        l2: per_core(512 * 1024, 16, 64),
    },
    GeometryRule {
        uarch: Uarch::Denver,
        part_class: None,
        l1i: fixed(128 * 1024, 4, 64),
        l1d: fixed(64 * 1024, 4, 64),
        l2: fixed(2 * 1024 * 1024, 16, 64),
    },
    GeometryRule {
        uarch: Uarch::Mongoose,
        part_class: None,
        l1i: fixed(64 * 1024, 4, 128),
        l1d: fixed(32 * 1024, 8, 64),
        l2: fixed(2 * 1024 * 1024, 16, 64),
    },
    GeometryRule {
        uarch: Uarch::ThunderX,
        part_class: None,
        l1i: fixed(78 * 1024, 4, 64),
        l1d: fixed(32 * 1024, 4, 64),
        l2: fixed(16 * 1024 * 1024, 8, 64),
    },
];

/// Resolve L1/L2 geometry for one cluster.
///
/// `cluster_cores` is the number of cores sharing an L2 instance;
/// `part` disambiguates generations within a microarchitecture;
/// `architecture_version` drives the generic fallback profiles.
pub fn resolve(
    uarch: Uarch,
    cluster_cores: u32,
    part: u32,
    architecture_version: u32,
) -> CacheHierarchy {
    for rule in GEOMETRY_RULES {
        if rule.uarch != uarch {
            continue;
        }
        if let Some(class) = rule.part_class {
            if part >> 8 != class {
                continue;
            }
        }
        return CacheHierarchy {
            l1i: rule.l1i.resolve(cluster_cores),
            l1d: rule.l1d.resolve(cluster_cores),
            l2: rule.l2.resolve(cluster_cores),
        };
    }

    log::warn!(
        "no cache geometry known for microarchitecture {uarch:?}; \
         using generic ARMv{architecture_version} parameters"
    );
    let (l1, l2) = if architecture_version >= 8 {
        (fixed(32 * 1024, 4, 64), per_core(256 * 1024, 8, 64))
    } else if architecture_version >= 7 {
        (fixed(16 * 1024, 4, 32), per_core(128 * 1024, 8, 32))
    } else {
        (fixed(16 * 1024, 4, 32), NO_CACHE)
    };
    CacheHierarchy {
        l1i: l1.resolve(cluster_cores),
        l1d: l1.resolve(cluster_cores),
        l2: l2.resolve(cluster_cores),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_consistent(cache: &Cache) {
        assert_eq!(cache.size, cache.associativity * cache.sets * cache.line_size);
        assert_eq!(cache.partitions, 1);
    }

    #[test]
    fn test_cortex_a53_quad_cluster() {
        let caches = resolve(Uarch::CortexA53, 4, 0xD03, 8);
        let l1i = caches.l1i.unwrap();
        assert_eq!((l1i.size, l1i.associativity, l1i.line_size), (16 * 1024, 2, 64));
        let l1d = caches.l1d.unwrap();
        assert_eq!((l1d.size, l1d.associativity, l1d.line_size), (16 * 1024, 4, 64));

        let l2 = caches.l2.unwrap();
        assert_eq!(l2.size, 4 * 128 * 1024);
        assert_eq!(l2.associativity, 16);
        assert_eq!(l2.line_size, 64);
        assert_eq!(l2.sets, l2.size / (l2.associativity * l2.line_size));
        assert_consistent(&l2);
    }

    #[test]
    fn test_l2_scales_with_cluster_cores() {
        let dual = resolve(Uarch::CortexA15, 2, 0xC0F, 7).l2.unwrap();
        let quad = resolve(Uarch::CortexA15, 4, 0xC0F, 7).l2.unwrap();
        assert_eq!(dual.size, 2 * 512 * 1024);
        assert_eq!(quad.size, 2 * dual.size);
    }

    #[test]
    fn test_fixed_l2_ignores_cluster_cores() {
        let dual = resolve(Uarch::CortexA9, 2, 0xC09, 7).l2.unwrap();
        let quad = resolve(Uarch::CortexA9, 4, 0xC09, 7).l2.unwrap();
        assert_eq!(dual, quad);
        assert_eq!(dual.size, 1024 * 1024);
    }

    #[test]
    fn test_arm11_has_no_l2() {
        let caches = resolve(Uarch::Arm11, 1, 0xB76, 6);
        assert!(caches.l1i.is_some());
        assert!(caches.l1d.is_some());
        assert!(caches.l2.is_none());
    }

    #[test]
    fn test_xscale_generations_differ() {
        let pxa27x = resolve(Uarch::Xscale, 1, 0x400, 5);
        assert_eq!(pxa27x.l1i.unwrap().size, 32 * 1024);
        assert!(pxa27x.l2.is_none());

        let pxa3xx = resolve(Uarch::Xscale, 1, 0x600, 5);
        assert_eq!(pxa3xx.l2.unwrap().size, 256 * 1024);
    }

    #[test]
    fn test_generic_fallback_profiles() {
        let v8 = resolve(Uarch::CortexA72, 4, 0xD08, 8);
        assert_eq!(v8.l1i.unwrap().size, 32 * 1024);
        assert_eq!(v8.l2.unwrap().size, 4 * 256 * 1024);

        let v7 = resolve(Uarch::CortexA17, 2, 0xC0E, 7);
        assert_eq!(v7.l1d.unwrap().size, 16 * 1024);
        assert_eq!(v7.l2.unwrap().size, 2 * 128 * 1024);

        let v5 = resolve(Uarch::Unknown, 1, 0x926, 5);
        assert_eq!(v5.l1i.unwrap().size, 16 * 1024);
        assert!(v5.l2.is_none());
    }

    #[test]
    fn test_all_entries_are_set_consistent() {
        // Every table row and fallback must divide into whole sets.
        for uarch in [
            Uarch::Arm11,
            Uarch::CortexA5,
            Uarch::CortexA7,
            Uarch::CortexA8,
            Uarch::CortexA9,
            Uarch::CortexA15,
            Uarch::CortexA53,
            Uarch::CortexA57,
            Uarch::Scorpion,
            Uarch::Krait,
            Uarch::Kryo,
            Uarch::Denver,
            Uarch::Mongoose,
            Uarch::ThunderX,
            Uarch::Unknown,
        ] {
            for cores in [1, 2, 4, 8] {
                let caches = resolve(uarch, cores, 0, 8);
                for cache in [caches.l1i, caches.l1d, caches.l2].into_iter().flatten() {
                    assert_consistent(&cache);
                }
            }
        }
    }
}
