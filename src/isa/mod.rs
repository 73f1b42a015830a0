//! Instruction-set capability detection.
//!
//! Turns raw register bit patterns and kernel feature-flag words into
//! typed sets of named capability booleans. Decoding never fails:
//! absent or contradictory raw data resolves to the conservative value
//! (feature absent), and anomalies are reported through the `log`
//! diagnostic channel. Feature sets are plain structs of named bools
//! rather than opaque bitmasks so consumers can inspect individual
//! capabilities without knowing hardware bit positions.

use serde::{Deserialize, Serialize};

pub mod arm;
pub mod x86;

/// x86/x86-64 instruction-set capabilities.
///
/// Every field defaults to `false`; a field is `true` only when the
/// documented capability bit is set for the detected vendor *and*
/// every precondition (e.g. OS-enabled extended register state for the
/// AVX family) holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct X86IsaFeatures {
    pub rdtsc: bool,
    pub rdtscp: bool,
    pub rdpid: bool,
    pub sysenter: bool,
    pub syscall: bool,
    pub msr: bool,
    pub clzero: bool,
    pub clflush: bool,
    pub clflushopt: bool,
    pub clwb: bool,
    pub mwait: bool,
    pub mwaitx: bool,
    /// Cyrix EMMX; reported from the same extended-info bit that means
    /// FXSAVE on other vendors.
    pub emmx: bool,
    pub fxsave: bool,
    pub xsave: bool,
    pub fpu: bool,
    pub mmx: bool,
    pub mmx_plus: bool,
    pub three_d_now: bool,
    pub three_d_now_plus: bool,
    pub three_d_now_prefetch: bool,
    pub sse: bool,
    pub sse2: bool,
    pub sse3: bool,
    pub ssse3: bool,
    pub sse4_1: bool,
    pub sse4_2: bool,
    pub sse4a: bool,
    pub misaligned_sse: bool,
    pub avx: bool,
    pub fma3: bool,
    pub fma4: bool,
    pub xop: bool,
    pub f16c: bool,
    pub avx2: bool,
    pub avx512f: bool,
    pub avx512pf: bool,
    pub avx512er: bool,
    pub avx512cd: bool,
    pub avx512bw: bool,
    pub avx512vl: bool,
    pub avx512vbmi: bool,
    pub avx512vpopcntdq: bool,
    pub avx512_4vnniw: bool,
    pub avx512_4fmaps: bool,
    pub hle: bool,
    pub rtm: bool,
    /// Derived: XTEST is usable when either HLE or RTM is present.
    pub xtest: bool,
    pub mpx: bool,
    pub cmov: bool,
    pub cmpxchg8b: bool,
    pub cmpxchg16b: bool,
    pub movbe: bool,
    pub lahf_sahf: bool,
    pub fs_gs_base: bool,
    pub lzcnt: bool,
    pub popcnt: bool,
    pub tbm: bool,
    pub bmi: bool,
    pub bmi2: bool,
    pub adx: bool,
    pub aes: bool,
    pub pclmulqdq: bool,
    pub rdrand: bool,
    pub rdseed: bool,
    pub sha: bool,
    /// VIA PadLock random number generator.
    pub rng: bool,
    /// VIA PadLock Advanced Cryptography Engine.
    pub ace: bool,
    pub ace2: bool,
    /// VIA PadLock Hash Engine.
    pub phe: bool,
    /// VIA PadLock Montgomery Multiplier.
    pub pmm: bool,
    pub lwp: bool,
}

/// ARM instruction-set capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmIsaFeatures {
    pub armv5e: bool,
    pub armv6: bool,
    pub armv6k: bool,
    pub armv7: bool,
    pub armv7mp: bool,
    pub thumb: bool,
    pub thumb2: bool,
    pub thumbee: bool,
    pub jazelle: bool,
    pub idiv: bool,
    pub vfpv2: bool,
    pub vfpv3: bool,
    /// 32 double-precision VFP registers.
    pub d32: bool,
    pub fp16: bool,
    pub fma: bool,
    pub wmmx: bool,
    pub wmmx2: bool,
    pub neon: bool,
    pub aes: bool,
    pub pmull: bool,
    pub sha1: bool,
    pub sha2: bool,
    pub crc32: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_all_false() {
        let x86 = X86IsaFeatures::default();
        assert!(!x86.fpu && !x86.avx && !x86.avx512f && !x86.xtest);
        let arm = ArmIsaFeatures::default();
        assert!(!arm.neon && !arm.idiv && !arm.armv7);
    }

    #[test]
    fn test_feature_set_serialization() {
        let features = X86IsaFeatures {
            fpu: true,
            mmx: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&features).unwrap();
        assert!(json.contains("\"fpu\":true"));
        let back: X86IsaFeatures = serde_json::from_str(&json).unwrap();
        assert_eq!(back, features);
    }
}
