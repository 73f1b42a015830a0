//! ARM ISA decoding from kernel-exposed per-processor records.
//!
//! The kernel's feature-flag words are known to be wrong in several
//! documented ways, so decoding layers corrections on top of the raw
//! flags: a reported architecture version is downgraded when the
//! implementer/part signature cannot truthfully support it, features
//! implied by the architecture version are asserted even when the flag
//! word omits them, and coprocessor-presence flags are cross-checked
//! against coprocessor ID registers before being believed.

use crate::isa::ArmIsaFeatures;
use crate::raw::{self, CoprocessorPort, ProcCpuinfoRecord};

/// Effective base architecture version for a record, with the ARM11
/// misreport corrected.
///
/// ARM11 parts (ARM 1136/1156/1176/11 MPCore) can report architecture
/// version 7 even though they only implement ARMv6. The signature is
/// implementer 'A' with part 0xBxx.
pub fn effective_architecture(record: &ProcCpuinfoRecord) -> u32 {
    let version = record.architecture_version;
    if version == 7 && record.implementer == 0x41 && record.part & 0xF00 == 0xB00 {
        log::warn!(
            "kernel-reported architecture ARMv7 ignored due to mismatch \
             with processor microarchitecture (ARM11)"
        );
        return 6;
    }
    version
}

/// Decode the ARM feature set from one representative record.
///
/// `record_count` is the number of records the platform enumerated;
/// multiprocessing extensions are only asserted when more than one
/// logical processor exists. Never fails: missing or contradictory
/// data decodes as feature-absent.
pub fn decode(
    record: &ProcCpuinfoRecord,
    record_count: u32,
    cp: &dyn CoprocessorPort,
) -> ArmIsaFeatures {
    let mut isa = ArmIsaFeatures::default();
    let part = record.part;
    let implementer = record.implementer;
    let architecture = effective_architecture(record);

    if architecture >= 8 {
        // ARMv7 code on an ARMv8 part: the baseline is unconditional,
        // and the flag words only describe ARMv8 optional features.
        isa.armv5e = true;
        isa.armv6 = true;
        isa.armv6k = true;
        isa.armv7 = true;
        isa.armv7mp = true;
        isa.thumb = true;
        isa.thumb2 = true;
        isa.idiv = true;
        isa.vfpv3 = true;
        isa.d32 = true;
        isa.fp16 = true;
        isa.fma = true;
        isa.neon = true;
    } else {
        let features = record.features;
        let arch_flags = record.architecture_flags;

        if architecture >= 6
            || features & raw::FEATURE_EDSP != 0
            || arch_flags & raw::ARCH_SUFFIX_E != 0
        {
            isa.armv5e = true;
        }
        if architecture >= 6 {
            isa.armv6 = true;
        }
        if architecture >= 7 {
            isa.armv6k = true;
            isa.armv7 = true;
            if record_count > 1 {
                isa.armv7mp = true;
            }
        }

        if features & raw::FEATURE_IWMMXT != 0 {
            // The iwmmxt flag alone is not sufficient evidence; the
            // WCID coprocessor type must confirm a WMMX unit.
            let wcid = cp.wcid();
            log::debug!("WCID = {wcid:#010x}");
            let coprocessor_type = (wcid >> 8) & 0xFF;
            if coprocessor_type >= 0x10 {
                isa.wmmx = true;
                if coprocessor_type >= 0x20 {
                    isa.wmmx2 = true;
                }
            } else {
                log::warn!(
                    "WMMX ISA disabled: OS reported iwmmxt feature, but WCID \
                     coprocessor type {coprocessor_type:#x} indicates no WMMX support"
                );
            }
        }

        if features & raw::FEATURE_THUMB != 0 || arch_flags & raw::ARCH_SUFFIX_T != 0 {
            isa.thumb = true;
            // No separate flag for Thumb 2: all ARMv7 processors and
            // ARM 1156 (part 0xB56) support it.
            if architecture >= 7 || (implementer == 0x41 && part == 0xB56) {
                isa.thumb2 = true;
            }
        }
        if features & raw::FEATURE_THUMBEE != 0 {
            isa.thumbee = true;
        }
        if features & raw::FEATURE_JAVA != 0 || arch_flags & raw::ARCH_SUFFIX_J != 0 {
            isa.jazelle = true;
        }

        if features & raw::FEATURE_IDIV == raw::FEATURE_IDIV {
            isa.idiv = true;
        } else if implementer == 0x51 {
            // Qualcomm Krait kernels may be configured without the
            // idiv flags even though the hardware supports it.
            match part {
                0x04D | 0x06F => {
                    isa.idiv = true;
                }
                _ => {}
            }
        }

        let vfp_mask = raw::FEATURE_VFP
            | raw::FEATURE_VFPV3
            | raw::FEATURE_VFPV3D16
            | raw::FEATURE_VFPD32
            | raw::FEATURE_VFPV4
            | raw::FEATURE_NEON;
        if features & vfp_mask != 0 {
            let vfpv3_mask = raw::FEATURE_VFPV3
                | raw::FEATURE_VFPV3D16
                | raw::FEATURE_VFPD32
                | raw::FEATURE_VFPV4
                | raw::FEATURE_NEON;
            if architecture >= 7 || features & vfpv3_mask != 0 {
                isa.vfpv3 = true;
                if features & (raw::FEATURE_VFPD32 | raw::FEATURE_NEON) != 0 {
                    isa.d32 = true;
                }
            } else {
                // Bare vfp flag on pre-v7: check the FPSID
                // subarchitecture for VFPv2.
                let fpsid = cp.fpsid();
                log::debug!("FPSID = {fpsid:#010x}");
                let subarchitecture = (fpsid >> 16) & 0x7F;
                if subarchitecture >= 0x01 {
                    isa.vfpv2 = true;
                }
            }
        }
        if features & raw::FEATURE_NEON != 0 {
            isa.neon = true;
        }

        // No separate FP16 flag: VFPv4 implies VFPv3-FP16, and ARM
        // Cortex-A9 (part 0xC09) supports it as well.
        if features & raw::FEATURE_VFPV4 != 0 || (implementer == 0x41 && part == 0xC09) {
            isa.fp16 = true;
        }
        if features & raw::FEATURE_VFPV4 != 0 {
            isa.fma = true;
        }
    }

    let features2 = record.features2;
    isa.aes = features2 & raw::FEATURE2_AES != 0;
    isa.pmull = features2 & raw::FEATURE2_PMULL != 0;
    isa.sha1 = features2 & raw::FEATURE2_SHA1 != 0;
    isa.sha2 = features2 & raw::FEATURE2_SHA2 != 0;
    isa.crc32 = features2 & raw::FEATURE2_CRC32 != 0;

    isa
}
