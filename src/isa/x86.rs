//! x86 ISA decoding from CPUID registers.
//!
//! Bit positions follow the Intel SDM and AMD APM. Several features
//! live in vendor-specific leaves or in bit positions that are
//! reserved on the other vendor; the decoder only reads positions
//! documented for the detected vendor and leaves the rest `false`.

use crate::isa::X86IsaFeatures;
use crate::raw::{CpuidPort, CpuidRegs};
use crate::uarch::Vendor;

const STRUCTURED_FEATURE_LEAF: u32 = 0x7;
const XSTATE_LEAF: u32 = 0xD;
const EXTENDED_INFO_LEAF: u32 = 0x8000_0001;
const PROCESSOR_CAPACITY_LEAF: u32 = 0x8000_0008;
const PADLOCK_META_LEAF: u32 = 0xC000_0000;
const PADLOCK_INFO_LEAF: u32 = 0xC000_0001;

// Basic-info ECX bits 26 (XSAVE supported) and 27 (XSAVE enabled by OS).
const OSXSAVE_MASK: u32 = 0x0C00_0000;

// XCR0 component masks.
// AVX: bit 1 (low 128 bits of ymm) + bit 2 (high 128 bits of ymm).
const AVX_REGS_MASK: u64 = 0x0000_0006;
// AVX-512: AVX components + bit 5 (opmask k0-k7) + bit 6 (zmm0-15 high
// halves) + bit 7 (zmm16-31).
const AVX512_REGS_MASK: u64 = 0x0000_00E6;
// MPX: bit 3 (BNDREGS) + bit 4 (BNDCSR).
const MPX_REGS_MASK: u64 = 0x0000_0018;

fn bit(word: u32, mask: u32) -> bool {
    word & mask != 0
}

/// Decode the full x86 feature set.
///
/// `basic_info` is the already-fetched CPUID leaf 1; follow-up leaves
/// are queried through `port` only when the reported maximum leaf
/// index covers them, and default to all-zero registers otherwise so
/// absent data decodes as feature-absent.
pub fn decode(basic_info: CpuidRegs, vendor: Vendor, port: &dyn CpuidPort) -> X86IsaFeatures {
    let max_base = port.max_base_leaf();
    let max_extended = port.max_extended_leaf();

    let structured = if max_base >= STRUCTURED_FEATURE_LEAF {
        port.cpuidex(STRUCTURED_FEATURE_LEAF, 0)
    } else {
        CpuidRegs::default()
    };
    let extended = if max_extended >= EXTENDED_INFO_LEAF {
        port.cpuid(EXTENDED_INFO_LEAF)
    } else {
        CpuidRegs::default()
    };
    let capacity = if max_extended >= PROCESSOR_CAPACITY_LEAF {
        port.cpuid(PROCESSOR_CAPACITY_LEAF)
    } else {
        CpuidRegs::default()
    };

    // Extended-state gate: a vector-register feature bit counts only
    // when the OS saves/restores that register file. Both the XSAVE
    // and OSXSAVE bits must be set before XGETBV may even be issued;
    // after that, each component mask must be architecturally valid
    // (leaf 0xD) and enabled in XCR0.
    let mut avx_regs = false;
    let mut avx512_regs = false;
    let mut mpx_regs = false;
    if basic_info.ecx & OSXSAVE_MASK == OSXSAVE_MASK {
        let xcr0_valid_bits = if max_base >= XSTATE_LEAF {
            let regs = port.cpuidex(XSTATE_LEAF, 0);
            (u64::from(regs.edx) << 32) | u64::from(regs.eax)
        } else {
            0
        };
        let enabled = port.xgetbv0();
        log::debug!("XCR0 valid bits {xcr0_valid_bits:#x}, enabled {enabled:#x}");

        if xcr0_valid_bits & AVX_REGS_MASK == AVX_REGS_MASK {
            avx_regs = enabled & AVX_REGS_MASK == AVX_REGS_MASK;
        }
        if xcr0_valid_bits & AVX512_REGS_MASK == AVX512_REGS_MASK {
            avx512_regs = enabled & AVX512_REGS_MASK == AVX512_REGS_MASK;
        }
        if xcr0_valid_bits & MPX_REGS_MASK == MPX_REGS_MASK {
            mpx_regs = enabled & MPX_REGS_MASK == MPX_REGS_MASK;
        }
    }

    let mut isa = X86IsaFeatures {
        // RDTSC: basic edx[4]; AMD mirrors it in extended edx[4].
        rdtsc: bit(basic_info.edx | extended.edx, 0x0000_0010),
        // SYSENTER/SYSEXIT: basic edx[11].
        sysenter: bit(basic_info.edx, 0x0000_0800),
        // SYSCALL/SYSRET: extended edx[11].
        syscall: bit(extended.edx, 0x0000_0800),
        // RDMSR/WRMSR: basic edx[5]; AMD mirrors in extended edx[5].
        msr: bit(basic_info.edx | extended.edx, 0x0000_0020),
        // CLZERO: AMD processor-capacity ebx[0].
        clzero: bit(capacity.ebx, 0x0000_0001),
        // CLFLUSH: basic edx[19].
        clflush: bit(basic_info.edx, 0x0008_0000),
        // CLFLUSHOPT: structured ebx[23].
        clflushopt: bit(structured.ebx, 0x0080_0000),
        // CLWB: structured ebx[24].
        clwb: bit(structured.ebx, 0x0100_0000),
        // MWAIT/MONITOR: basic ecx[3].
        mwait: bit(basic_info.ecx, 0x0000_0008),
        // MWAITX/MONITORX: AMD extended ecx[29].
        mwaitx: bit(extended.ecx, 0x2000_0000),
        // XSAVE/XRSTOR: basic ecx[26].
        xsave: bit(basic_info.ecx, 0x0400_0000),
        // x87 FPU: basic edx[0]; AMD mirrors in extended edx[0].
        fpu: bit(basic_info.edx | extended.edx, 0x0000_0001),
        // MMX: basic edx[23]; AMD mirrors in extended edx[23].
        mmx: bit(basic_info.edx | extended.edx, 0x0080_0000),
        // MMX+/integer SSE: SSE flag (basic edx[25]) or pre-SSE AMD
        // extended edx[22].
        mmx_plus: bit(basic_info.edx, 0x0200_0000) || bit(extended.edx, 0x0040_0000),
        // 3dnow!: AMD extended edx[31]; 3dnow!+: extended edx[30].
        three_d_now: bit(extended.edx, 0x8000_0000),
        three_d_now_plus: bit(extended.edx, 0x4000_0000),
        // PREFETCH/PREFETCHW: extended ecx[8], or implied by any
        // 3dnow! level (extended edx[31:30]).
        three_d_now_prefetch: bit(extended.ecx, 0x0000_0100) || bit(extended.edx, 0xC000_0000),
        // SSE family: basic edx[25], edx[26], ecx[0], ecx[9], ecx[19],
        // ecx[20] (SSE4.2 is reserved on AMD pre-SSE4.2 parts).
        sse: bit(basic_info.edx, 0x0200_0000),
        sse2: bit(basic_info.edx, 0x0400_0000),
        sse3: bit(basic_info.ecx, 0x0000_0001),
        ssse3: bit(basic_info.ecx, 0x0000_0200),
        sse4_1: bit(basic_info.ecx, 0x0008_0000),
        sse4_2: bit(basic_info.ecx, 0x0010_0000),
        // SSE4A: AMD extended ecx[6]; misaligned SSE: extended ecx[7].
        sse4a: bit(extended.ecx, 0x0000_0040),
        misaligned_sse: bit(extended.ecx, 0x0000_0080),
        // AVX family, all gated on OS-enabled ymm state.
        avx: avx_regs && bit(basic_info.ecx, 0x1000_0000),
        fma3: avx_regs && bit(basic_info.ecx, 0x0000_1000),
        fma4: avx_regs && bit(extended.ecx, 0x0001_0000),
        xop: avx_regs && bit(extended.ecx, 0x0000_0800),
        f16c: avx_regs && bit(basic_info.ecx, 0x2000_0000),
        avx2: avx_regs && bit(structured.ebx, 0x0000_0020),
        // AVX-512 subsets, gated on OS-enabled zmm/opmask state.
        avx512f: avx512_regs && bit(structured.ebx, 0x0001_0000),
        avx512pf: avx512_regs && bit(structured.ebx, 0x0400_0000),
        avx512er: avx512_regs && bit(structured.ebx, 0x0800_0000),
        avx512cd: avx512_regs && bit(structured.ebx, 0x1000_0000),
        avx512bw: avx512_regs && bit(structured.ebx, 0x4000_0000),
        avx512vl: avx512_regs && bit(structured.ebx, 0x8000_0000),
        avx512vbmi: avx512_regs && bit(structured.ecx, 0x0000_0002),
        avx512vpopcntdq: avx512_regs && bit(structured.ecx, 0x0000_4000),
        avx512_4vnniw: avx512_regs && bit(structured.edx, 0x0000_0004),
        avx512_4fmaps: avx512_regs && bit(structured.edx, 0x0000_0008),
        // TSX: structured ebx[4] (HLE), ebx[11] (RTM).
        hle: bit(structured.ebx, 0x0000_0010),
        rtm: bit(structured.ebx, 0x0000_0800),
        // MPX: structured ebx[14], gated on OS-enabled bound registers.
        mpx: mpx_regs && bit(structured.ebx, 0x0000_4000),
        // CMOV: basic edx[15]; CMPXCHG8B: basic edx[8]; both mirrored
        // by AMD in extended edx.
        cmov: bit(basic_info.edx | extended.edx, 0x0000_8000),
        cmpxchg8b: bit(basic_info.edx | extended.edx, 0x0000_0100),
        // CMPXCHG16B: basic ecx[13].
        cmpxchg16b: bit(basic_info.ecx, 0x0000_2000),
        // MOVBE: basic ecx[22].
        movbe: bit(basic_info.ecx, 0x0040_0000),
        // LAHF/SAHF in 64-bit mode: extended ecx[0].
        lahf_sahf: bit(extended.ecx, 0x0000_0001),
        // RDFSBASE/WRGSBASE family: structured ebx[0].
        fs_gs_base: bit(structured.ebx, 0x0000_0001),
        // LZCNT: extended ecx[5]; POPCNT: basic ecx[23].
        lzcnt: bit(extended.ecx, 0x0000_0020),
        popcnt: bit(basic_info.ecx, 0x0080_0000),
        // TBM: AMD extended ecx[21].
        tbm: bit(extended.ecx, 0x0020_0000),
        // BMI: structured ebx[3]; BMI2: structured ebx[8]; ADX:
        // structured ebx[19].
        bmi: bit(structured.ebx, 0x0000_0008),
        bmi2: bit(structured.ebx, 0x0000_0100),
        adx: bit(structured.ebx, 0x0008_0000),
        // AES-NI: basic ecx[25]; PCLMULQDQ: basic ecx[1].
        aes: bit(basic_info.ecx, 0x0200_0000),
        pclmulqdq: bit(basic_info.ecx, 0x0000_0002),
        // RDRAND: basic ecx[30]; RDSEED: structured ebx[18].
        rdrand: bit(basic_info.ecx, 0x4000_0000),
        rdseed: bit(structured.ebx, 0x0004_0000),
        // SHA: structured ebx[29].
        sha: bit(structured.ebx, 0x2000_0000),
        // LWP: AMD extended ecx[15].
        lwp: bit(extended.ecx, 0x0000_8000),
        // RDTSCP: extended edx[27]; RDPID: structured ecx[22].
        rdtscp: bit(extended.edx, 0x0800_0000),
        rdpid: bit(structured.ecx, 0x0040_0000),
        ..Default::default()
    };

    // Extended edx[24] means FXSAVE everywhere except Cyrix/NSC parts,
    // where the same position reports EMMX.
    match vendor {
        Vendor::Cyrix | Vendor::Nsc => {
            isa.emmx = bit(extended.edx, 0x0100_0000);
        }
        _ => {
            isa.fxsave = bit(basic_info.edx | extended.edx, 0x0100_0000);
        }
    }

    // XTEST is usable when either transactional extension is present.
    isa.xtest = isa.hle || isa.rtm;

    // VIA PadLock: each engine pairs an exists bit with an OS-enabled
    // bit in leaf 0xC0000001 edx; both must be set.
    if vendor == Vendor::Via {
        let max_padlock = port.cpuid(PADLOCK_META_LEAF).eax;
        if max_padlock >= PADLOCK_INFO_LEAF {
            let padlock = port.cpuid(PADLOCK_INFO_LEAF).edx;
            // RNG: edx[3:2]; ACE: edx[7:6]; ACE2: edx[9:8];
            // PHE: edx[11:10]; PMM: edx[13:12].
            isa.rng = padlock & 0x0000_000C == 0x0000_000C;
            isa.ace = padlock & 0x0000_00C0 == 0x0000_00C0;
            isa.ace2 = padlock & 0x0000_0300 == 0x0000_0300;
            isa.phe = padlock & 0x0000_0C00 == 0x0000_0C00;
            isa.pmm = padlock & 0x0000_3000 == 0x0000_3000;
        }
    }

    isa
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::testutil::FakeCpuid;

    fn port_with_basic(basic: CpuidRegs) -> FakeCpuid {
        let mut port = FakeCpuid::default();
        port.set(0, 0, CpuidRegs { eax: 1, ..Default::default() });
        port.set(1, 0, basic);
        port
    }

    #[test]
    fn test_fpu_mmx_without_osxsave() {
        // Basic edx bit 0 (FPU) and bit 23 (MMX) set, extended info
        // all zero, no OSXSAVE.
        let basic = CpuidRegs {
            edx: (1 << 0) | (1 << 23),
            ..Default::default()
        };
        let port = port_with_basic(basic);
        let isa = decode(basic, Vendor::Intel, &port);

        assert!(isa.fpu);
        assert!(isa.mmx);
        assert!(!isa.avx);
        assert!(!isa.avx2);
        assert!(!isa.avx512f);
        assert!(!isa.fma3);
        assert!(!isa.f16c);
    }

    #[test]
    fn test_osxsave_gate_forces_vector_features_false() {
        // AVX and AVX2 capability bits present but OSXSAVE unset: the
        // raw bits must be ignored.
        let basic = CpuidRegs {
            ecx: 1 << 28,
            ..Default::default()
        };
        let mut port = FakeCpuid::default();
        port.set(0, 0, CpuidRegs { eax: 0xD, ..Default::default() });
        port.set(1, 0, basic);
        port.set(7, 0, CpuidRegs { ebx: 1 << 5, ..Default::default() });
        port.set(0xD, 0, CpuidRegs { eax: 0xFF, ..Default::default() });
        port.xcr0 = 0xFF;

        let isa = decode(basic, Vendor::Intel, &port);
        assert!(!isa.avx);
        assert!(!isa.avx2);
    }

    #[test]
    fn test_osxsave_gate_accepts_enabled_state() {
        let basic = CpuidRegs {
            ecx: (1 << 26) | (1 << 27) | (1 << 28) | (1 << 12),
            ..Default::default()
        };
        let mut port = FakeCpuid::default();
        port.set(0, 0, CpuidRegs { eax: 0xD, ..Default::default() });
        port.set(1, 0, basic);
        port.set(7, 0, CpuidRegs { ebx: 1 << 5, ..Default::default() });
        port.set(0xD, 0, CpuidRegs { eax: 0xE7, ..Default::default() });
        port.xcr0 = 0x7; // x87 + full ymm state enabled, no zmm

        let isa = decode(basic, Vendor::Intel, &port);
        assert!(isa.xsave);
        assert!(isa.avx);
        assert!(isa.fma3);
        assert!(isa.avx2);
        // zmm state not enabled: AVX-512 stays off even if flagged.
        assert!(!isa.avx512f);
    }

    #[test]
    fn test_avx512_requires_full_zmm_state() {
        let basic = CpuidRegs {
            ecx: (1 << 26) | (1 << 27) | (1 << 28),
            ..Default::default()
        };
        let mut port = FakeCpuid::default();
        port.set(0, 0, CpuidRegs { eax: 0xD, ..Default::default() });
        port.set(1, 0, basic);
        port.set(
            7,
            0,
            CpuidRegs { ebx: (1 << 16) | (1 << 28) | (1 << 30) | (1 << 31), ..Default::default() },
        );
        port.set(0xD, 0, CpuidRegs { eax: 0xE7, ..Default::default() });
        port.xcr0 = 0xE7;

        let isa = decode(basic, Vendor::Intel, &port);
        assert!(isa.avx512f);
        assert!(isa.avx512cd);
        assert!(isa.avx512bw);
        assert!(isa.avx512vl);
    }

    #[test]
    fn test_xtest_derived_from_hle_or_rtm() {
        let basic = CpuidRegs::default();
        let mut port = FakeCpuid::default();
        port.set(0, 0, CpuidRegs { eax: 7, ..Default::default() });
        port.set(1, 0, basic);
        port.set(7, 0, CpuidRegs { ebx: 1 << 11, ..Default::default() });

        let isa = decode(basic, Vendor::Intel, &port);
        assert!(!isa.hle);
        assert!(isa.rtm);
        assert!(isa.xtest);

        let mut port = FakeCpuid::default();
        port.set(0, 0, CpuidRegs { eax: 7, ..Default::default() });
        let isa = decode(basic, Vendor::Intel, &port);
        assert!(!isa.xtest);
    }

    #[test]
    fn test_cyrix_reports_emmx_not_fxsave() {
        let basic = CpuidRegs::default();
        let mut port = FakeCpuid::default();
        port.set(0, 0, CpuidRegs { eax: 1, ..Default::default() });
        port.set(
            0x8000_0000,
            0,
            CpuidRegs { eax: 0x8000_0001, ..Default::default() },
        );
        port.set(
            0x8000_0001,
            0,
            CpuidRegs { edx: 1 << 24, ..Default::default() },
        );

        let cyrix = decode(basic, Vendor::Cyrix, &port);
        assert!(cyrix.emmx);
        assert!(!cyrix.fxsave);

        let intel = decode(basic, Vendor::Intel, &port);
        assert!(intel.fxsave);
        assert!(!intel.emmx);
    }

    #[test]
    fn test_padlock_requires_exists_and_enabled_pair() {
        let basic = CpuidRegs::default();
        let mut port = FakeCpuid::default();
        port.set(0, 0, CpuidRegs { eax: 1, ..Default::default() });
        port.set(
            PADLOCK_META_LEAF,
            0,
            CpuidRegs { eax: PADLOCK_INFO_LEAF, ..Default::default() },
        );
        // RNG exists+enabled; ACE exists but not OS-enabled.
        port.set(
            PADLOCK_INFO_LEAF,
            0,
            CpuidRegs { edx: 0x0000_000C | 0x0000_0040, ..Default::default() },
        );

        let isa = decode(basic, Vendor::Via, &port);
        assert!(isa.rng);
        assert!(!isa.ace);

        // PadLock leaves are ignored for non-VIA vendors.
        let isa = decode(basic, Vendor::Intel, &port);
        assert!(!isa.rng);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let basic = CpuidRegs {
            edx: 0x1789_FBFF,
            ecx: 0x0000_0201,
            ..Default::default()
        };
        let port = port_with_basic(basic);
        let first = decode(basic, Vendor::Intel, &port);
        let second = decode(basic, Vendor::Intel, &port);
        assert_eq!(first, second);
    }

    #[test]
    fn test_leaves_beyond_maximum_are_not_queried() {
        // Structured-feature bits present in the fake, but max base
        // leaf 1 means leaf 7 must decode as absent.
        let basic = CpuidRegs::default();
        let mut port = FakeCpuid::default();
        port.set(0, 0, CpuidRegs { eax: 1, ..Default::default() });
        port.set(7, 0, CpuidRegs { ebx: 0xFFFF_FFFF, ..Default::default() });

        let isa = decode(basic, Vendor::Intel, &port);
        assert!(!isa.bmi);
        assert!(!isa.bmi2);
        assert!(!isa.sha);
    }
}
