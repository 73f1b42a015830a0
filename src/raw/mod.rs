//! Raw data source boundary.
//!
//! Detection consumes three kinds of platform-native hardware
//! description primitives, each behind a small trait so the pipeline
//! can be driven by the host hardware or by recorded data:
//!
//! - [`CpuidPort`]: instruction-set query registers (x86 `CPUID` /
//!   `XGETBV`)
//! - [`ProcCpuinfoRecord`]: kernel-exposed per-logical-processor text
//!   records (`/proc/cpuinfo` on ARM Linux), one per hardware thread,
//!   with an explicit field-present bitmask
//! - [`SysConfigPort`]: platform configuration queries (`sysctlbyname`
//!   on Mach) returning small integers and per-cache-level sharing
//!   counts
//!
//! The fetch itself (syscalls, file I/O) is the platform's business;
//! everything in this crate treats these sources as opaque oracles.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Four 32-bit registers returned by one CPUID query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuidRegs {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

/// Register-based query primitive (x86 family).
pub trait CpuidPort {
    /// Query a basic or extended leaf (sub-leaf 0).
    fn cpuid(&self, leaf: u32) -> CpuidRegs;

    /// Query a leaf with an explicit sub-leaf index.
    fn cpuidex(&self, leaf: u32, subleaf: u32) -> CpuidRegs;

    /// Maximum supported basic leaf index (CPUID leaf 0, EAX).
    fn max_base_leaf(&self) -> u32;

    /// Maximum supported extended leaf index (CPUID leaf 0x80000000, EAX).
    fn max_extended_leaf(&self) -> u32;

    /// Extended-state-enable bitmask (XGETBV with XCR index 0).
    ///
    /// Only meaningful once the OSXSAVE precondition has been checked;
    /// implementations may return 0 when XSAVE is unavailable.
    fn xgetbv0(&self) -> u64;
}

/// ARM coprocessor identity registers, read through kernel-mediated
/// instructions. Used only to corroborate feature flags that the
/// kernel is known to over-report.
pub trait CoprocessorPort {
    /// Wireless MMX coprocessor ID register (WCID).
    fn wcid(&self) -> u32;

    /// Floating-point system ID register (FPSID).
    fn fpsid(&self) -> u32;
}

// Architecture-string suffix flags ("7TEJ" -> version 7, T|E|J set).
pub const ARCH_SUFFIX_T: u32 = 0x0000_0001;
pub const ARCH_SUFFIX_E: u32 = 0x0000_0002;
pub const ARCH_SUFFIX_J: u32 = 0x0000_0004;

// Feature-flag word bits, matching arch/arm/include/uapi/asm/hwcap.h.
pub const FEATURE_SWP: u32 = 0x0000_0001;
pub const FEATURE_HALF: u32 = 0x0000_0002;
pub const FEATURE_THUMB: u32 = 0x0000_0004;
pub const FEATURE_26BIT: u32 = 0x0000_0008;
pub const FEATURE_FASTMULT: u32 = 0x0000_0010;
pub const FEATURE_FPA: u32 = 0x0000_0020;
pub const FEATURE_VFP: u32 = 0x0000_0040;
pub const FEATURE_EDSP: u32 = 0x0000_0080;
pub const FEATURE_JAVA: u32 = 0x0000_0100;
pub const FEATURE_IWMMXT: u32 = 0x0000_0200;
pub const FEATURE_CRUNCH: u32 = 0x0000_0400;
pub const FEATURE_THUMBEE: u32 = 0x0000_0800;
pub const FEATURE_NEON: u32 = 0x0000_1000;
pub const FEATURE_VFPV3: u32 = 0x0000_2000;
/// Also set for VFPv4 with 16 double-precision registers.
pub const FEATURE_VFPV3D16: u32 = 0x0000_4000;
pub const FEATURE_TLS: u32 = 0x0000_8000;
pub const FEATURE_VFPV4: u32 = 0x0001_0000;
pub const FEATURE_IDIVA: u32 = 0x0002_0000;
pub const FEATURE_IDIVT: u32 = 0x0004_0000;
pub const FEATURE_IDIV: u32 = FEATURE_IDIVA | FEATURE_IDIVT;
pub const FEATURE_VFPD32: u32 = 0x0008_0000;
pub const FEATURE_LPAE: u32 = 0x0010_0000;
pub const FEATURE_EVTSTRM: u32 = 0x0020_0000;

// Second feature-flag word bits (HWCAP2).
pub const FEATURE2_AES: u32 = 0x0000_0001;
pub const FEATURE2_PMULL: u32 = 0x0000_0002;
pub const FEATURE2_SHA1: u32 = 0x0000_0004;
pub const FEATURE2_SHA2: u32 = 0x0000_0008;
pub const FEATURE2_CRC32: u32 = 0x0000_0010;

// Field-present bits for `ProcCpuinfoRecord::valid_mask`.
pub const VALID_ARCHITECTURE: u32 = 0x0000_0001;
pub const VALID_IMPLEMENTER: u32 = 0x0000_0002;
pub const VALID_VARIANT: u32 = 0x0000_0004;
pub const VALID_PART: u32 = 0x0000_0008;
pub const VALID_REVISION: u32 = 0x0000_0010;
pub const VALID_FEATURES: u32 = 0x0000_0020;
pub const VALID_ICACHE: u32 = 0x0000_0100;
pub const VALID_DCACHE: u32 = 0x0000_0200;

/// Per-record L1 cache geometry, present on some older kernels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCacheGeometry {
    pub i_size: u32,
    pub i_assoc: u32,
    pub i_line_length: u32,
    pub i_sets: u32,
    pub d_size: u32,
    pub d_assoc: u32,
    pub d_line_length: u32,
    pub d_sets: u32,
}

/// One kernel-exposed per-logical-processor record.
///
/// Fields not named by `valid_mask` hold zero and must be treated as
/// absent by decoders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcCpuinfoRecord {
    /// Reported base architecture version (6, 7, 8, ...).
    pub architecture_version: u32,
    /// Architecture-string suffix flags (`ARCH_SUFFIX_*`).
    pub architecture_flags: u32,
    /// First feature-flag word (`FEATURE_*`).
    pub features: u32,
    /// Second feature-flag word (`FEATURE2_*`).
    pub features2: u32,
    /// CPU implementer code (e.g. 0x41 = 'A' = ARM).
    pub implementer: u32,
    pub variant: u32,
    /// CPU part number (e.g. 0xD03 = Cortex-A53).
    pub part: u32,
    pub revision: u32,
    /// System-assigned logical processor number.
    pub system_id: u32,
    /// Platform core-identity key: records sharing a value share a
    /// physical core.
    pub core_key: u32,
    /// Platform package-identity key.
    pub package_key: u32,
    /// Optional per-record L1 geometry; meaningful only when the
    /// `VALID_ICACHE`/`VALID_DCACHE` bits are set.
    pub cache: RecordCacheGeometry,
    /// Field-present bitmask (`VALID_*`).
    pub valid_mask: u32,
}

impl ProcCpuinfoRecord {
    pub fn has(&self, valid_bit: u32) -> bool {
        self.valid_mask & valid_bit == valid_bit
    }
}

/// Platform configuration query (Mach `sysctlbyname` shape).
///
/// Every query can fail; callers log the failure at error severity and
/// substitute a documented default rather than aborting detection.
pub trait SysConfigPort {
    /// Number of physical packages (`hw.packages`).
    fn package_count(&self) -> Result<u32>;

    /// Number of physical cores (`hw.physicalcpu_max`).
    fn physical_core_count(&self) -> Result<u32>;

    /// Number of logical threads (`hw.logicalcpu_max`).
    fn logical_thread_count(&self) -> Result<u32>;

    /// Threads sharing one cache instance, indexed by level
    /// (`hw.cacheconfig`; index 0 describes memory, 1..=4 are L1..L4).
    fn threads_per_cache(&self) -> Result<Vec<u32>>;

    /// Cache sizes in bytes (`hw.l1icachesize` and friends); 0 = level
    /// not present.
    fn l1i_cache_size(&self) -> Result<u64>;
    fn l1d_cache_size(&self) -> Result<u64>;
    fn l2_cache_size(&self) -> Result<u64>;
    fn l3_cache_size(&self) -> Result<u64>;

    /// Cache line size in bytes (`hw.cachelinesize`).
    fn cache_line_size(&self) -> Result<u64>;
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod host_x86 {
    use super::{CpuidPort, CpuidRegs};

    /// CPUID/XGETBV port backed by the host processor.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct HostCpuid;

    impl HostCpuid {
        fn query(leaf: u32, subleaf: u32) -> CpuidRegs {
            #[cfg(target_arch = "x86_64")]
            use core::arch::x86_64::__cpuid_count;
            #[cfg(target_arch = "x86")]
            use core::arch::x86::__cpuid_count;

            // CPUID is unprivileged and always present on 64-bit parts.
            let r = unsafe { __cpuid_count(leaf, subleaf) };
            CpuidRegs {
                eax: r.eax,
                ebx: r.ebx,
                ecx: r.ecx,
                edx: r.edx,
            }
        }
    }

    impl CpuidPort for HostCpuid {
        fn cpuid(&self, leaf: u32) -> CpuidRegs {
            Self::query(leaf, 0)
        }

        fn cpuidex(&self, leaf: u32, subleaf: u32) -> CpuidRegs {
            Self::query(leaf, subleaf)
        }

        fn max_base_leaf(&self) -> u32 {
            Self::query(0, 0).eax
        }

        fn max_extended_leaf(&self) -> u32 {
            Self::query(0x8000_0000, 0).eax
        }

        fn xgetbv0(&self) -> u64 {
            // XGETBV faults unless CPUID reports OSXSAVE.
            let osxsave = Self::query(1, 0).ecx & 0x0800_0000 != 0;
            if !osxsave {
                return 0;
            }

            #[cfg(target_arch = "x86_64")]
            use core::arch::x86_64::_xgetbv;
            #[cfg(target_arch = "x86")]
            use core::arch::x86::_xgetbv;

            #[target_feature(enable = "xsave")]
            unsafe fn read() -> u64 {
                _xgetbv(0)
            }

            unsafe { read() }
        }
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use host_x86::HostCpuid;

#[cfg(target_os = "macos")]
mod host_mach {
    use super::SysConfigPort;
    use crate::error::{CoreInfoError, Result};

    /// Configuration port backed by `sysctlbyname`.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct HostSysConfig;

    fn sysctl_u64(name: &str) -> Result<u64> {
        let cname = std::ffi::CString::new(name)
            .map_err(|_| CoreInfoError::InvalidValue(name.to_string()))?;
        let mut value: u64 = 0;
        let mut size = std::mem::size_of::<u64>();
        let rc = unsafe {
            libc::sysctlbyname(
                cname.as_ptr(),
                &mut value as *mut u64 as *mut libc::c_void,
                &mut size,
                std::ptr::null_mut(),
                0,
            )
        };
        if rc != 0 {
            return Err(CoreInfoError::QueryFailed(format!(
                "sysctlbyname({name}): {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(value)
    }

    impl SysConfigPort for HostSysConfig {
        fn package_count(&self) -> Result<u32> {
            sysctl_u64("hw.packages").map(|v| v as u32)
        }

        fn physical_core_count(&self) -> Result<u32> {
            sysctl_u64("hw.physicalcpu_max").map(|v| v as u32)
        }

        fn logical_thread_count(&self) -> Result<u32> {
            sysctl_u64("hw.logicalcpu_max").map(|v| v as u32)
        }

        fn threads_per_cache(&self) -> Result<Vec<u32>> {
            let cname = std::ffi::CString::new("hw.cacheconfig").unwrap();
            let mut size: usize = 0;
            let rc = unsafe {
                libc::sysctlbyname(
                    cname.as_ptr(),
                    std::ptr::null_mut(),
                    &mut size,
                    std::ptr::null_mut(),
                    0,
                )
            };
            if rc != 0 {
                return Err(CoreInfoError::QueryFailed(format!(
                    "sysctlbyname(hw.cacheconfig): {}",
                    std::io::Error::last_os_error()
                )));
            }
            let count = size / std::mem::size_of::<u64>();
            let mut values = vec![0u64; count];
            let rc = unsafe {
                libc::sysctlbyname(
                    cname.as_ptr(),
                    values.as_mut_ptr() as *mut libc::c_void,
                    &mut size,
                    std::ptr::null_mut(),
                    0,
                )
            };
            if rc != 0 {
                return Err(CoreInfoError::QueryFailed(format!(
                    "sysctlbyname(hw.cacheconfig): {}",
                    std::io::Error::last_os_error()
                )));
            }
            Ok(values.into_iter().map(|v| v as u32).collect())
        }

        fn l1i_cache_size(&self) -> Result<u64> {
            sysctl_u64("hw.l1icachesize")
        }

        fn l1d_cache_size(&self) -> Result<u64> {
            sysctl_u64("hw.l1dcachesize")
        }

        fn l2_cache_size(&self) -> Result<u64> {
            sysctl_u64("hw.l2cachesize")
        }

        fn l3_cache_size(&self) -> Result<u64> {
            sysctl_u64("hw.l3cachesize")
        }

        fn cache_line_size(&self) -> Result<u64> {
            sysctl_u64("hw.cachelinesize")
        }
    }
}

#[cfg(target_os = "macos")]
pub use host_mach::HostSysConfig;

#[cfg(test)]
pub(crate) mod testutil {
    //! Recorded-data ports shared by the decoder and snapshot tests.

    use std::collections::HashMap;

    use super::*;
    use crate::error::{CoreInfoError, Result};

    /// CPUID port replaying a fixed leaf/sub-leaf table.
    #[derive(Debug, Default)]
    pub struct FakeCpuid {
        pub leaves: HashMap<(u32, u32), CpuidRegs>,
        pub xcr0: u64,
    }

    impl FakeCpuid {
        pub fn set(&mut self, leaf: u32, subleaf: u32, regs: CpuidRegs) -> &mut Self {
            self.leaves.insert((leaf, subleaf), regs);
            self
        }
    }

    impl CpuidPort for FakeCpuid {
        fn cpuid(&self, leaf: u32) -> CpuidRegs {
            self.cpuidex(leaf, 0)
        }

        fn cpuidex(&self, leaf: u32, subleaf: u32) -> CpuidRegs {
            self.leaves
                .get(&(leaf, subleaf))
                .copied()
                .unwrap_or_default()
        }

        fn max_base_leaf(&self) -> u32 {
            self.cpuid(0).eax
        }

        fn max_extended_leaf(&self) -> u32 {
            self.cpuid(0x8000_0000).eax
        }

        fn xgetbv0(&self) -> u64 {
            self.xcr0
        }
    }

    /// Coprocessor port with canned ID register values.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct FakeCoprocessor {
        pub wcid: u32,
        pub fpsid: u32,
    }

    impl CoprocessorPort for FakeCoprocessor {
        fn wcid(&self) -> u32 {
            self.wcid
        }

        fn fpsid(&self) -> u32 {
            self.fpsid
        }
    }

    /// Configuration port replaying fixed counts; `fail_counts`
    /// simulates query failures.
    #[derive(Debug, Default, Clone)]
    pub struct FakeSysConfig {
        pub packages: u32,
        pub cores: u32,
        pub threads: u32,
        pub cacheconfig: Vec<u32>,
        pub l1i: u64,
        pub l1d: u64,
        pub l2: u64,
        pub l3: u64,
        pub line: u64,
        pub fail_counts: bool,
    }

    impl SysConfigPort for FakeSysConfig {
        fn package_count(&self) -> Result<u32> {
            if self.fail_counts {
                return Err(CoreInfoError::QueryFailed("hw.packages".into()));
            }
            Ok(self.packages)
        }

        fn physical_core_count(&self) -> Result<u32> {
            if self.fail_counts {
                return Err(CoreInfoError::QueryFailed("hw.physicalcpu_max".into()));
            }
            Ok(self.cores)
        }

        fn logical_thread_count(&self) -> Result<u32> {
            if self.fail_counts {
                return Err(CoreInfoError::QueryFailed("hw.logicalcpu_max".into()));
            }
            Ok(self.threads)
        }

        fn threads_per_cache(&self) -> Result<Vec<u32>> {
            Ok(self.cacheconfig.clone())
        }

        fn l1i_cache_size(&self) -> Result<u64> {
            Ok(self.l1i)
        }

        fn l1d_cache_size(&self) -> Result<u64> {
            Ok(self.l1d)
        }

        fn l2_cache_size(&self) -> Result<u64> {
            Ok(self.l2)
        }

        fn l3_cache_size(&self) -> Result<u64> {
            Ok(self.l3)
        }

        fn cache_line_size(&self) -> Result<u64> {
            Ok(self.line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_valid_mask() {
        let mut record = ProcCpuinfoRecord::default();
        assert!(!record.has(VALID_ARCHITECTURE));
        record.valid_mask = VALID_ARCHITECTURE | VALID_PART;
        assert!(record.has(VALID_ARCHITECTURE));
        assert!(record.has(VALID_PART));
        assert!(!record.has(VALID_FEATURES));
    }

    #[test]
    fn test_idiv_is_both_flags() {
        assert_eq!(FEATURE_IDIV, FEATURE_IDIVA | FEATURE_IDIVT);
    }

    #[test]
    fn test_record_serialization() {
        let record = ProcCpuinfoRecord {
            architecture_version: 7,
            implementer: 0x41,
            part: 0xC09,
            valid_mask: VALID_ARCHITECTURE | VALID_IMPLEMENTER | VALID_PART,
            ..Default::default()
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: ProcCpuinfoRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
