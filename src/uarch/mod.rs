//! Vendor and microarchitecture classification.
//!
//! Maps decoded identity fields — `(vendor, family, model, stepping)`
//! on register-based architectures, `(implementer, part, variant)` on
//! the text-record family — to a closed enumeration of known
//! microarchitectures. Classification is pure and total: an ordered
//! table of exact and ranged matches is scanned first-match-wins, and
//! anything unmatched falls back to [`Uarch::Unknown`] with a warning
//! diagnostic. Adding a new part is a data change, not a control-flow
//! change.

use serde::{Deserialize, Serialize};

use crate::raw::CpuidRegs;

/// Silicon vendor identity. Immutable once assigned to a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vendor {
    /// Vendor unknown, or the platform failed to report one.
    Unknown,
    Intel,
    Amd,
    Arm,
    Qualcomm,
    Apple,
    Samsung,
    Nvidia,
    Via,
    TexasInstruments,
    Marvell,
    Broadcom,
    Cavium,
    Motorola,
    Dec,
    Cyrix,
    Nsc,
    Transmeta,
}

impl Default for Vendor {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::Intel => "Intel",
            Self::Amd => "AMD",
            Self::Arm => "ARM",
            Self::Qualcomm => "Qualcomm",
            Self::Apple => "Apple",
            Self::Samsung => "Samsung",
            Self::Nvidia => "NVIDIA",
            Self::Via => "VIA",
            Self::TexasInstruments => "Texas Instruments",
            Self::Marvell => "Marvell",
            Self::Broadcom => "Broadcom",
            Self::Cavium => "Cavium",
            Self::Motorola => "Motorola",
            Self::Dec => "DEC",
            Self::Cyrix => "Cyrix",
            Self::Nsc => "NSC",
            Self::Transmeta => "Transmeta",
        };
        write!(f, "{name}")
    }
}

/// Known microarchitectures.
///
/// The discriminant is a stable numeric code grouping
/// vendor-family-generation; [`Uarch::code`] exposes it for consumers
/// that key tables by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Uarch {
    /// Microarchitecture unknown, or classification failed.
    Unknown = 0,

    // Intel x86
    /// Pentium and Pentium MMX.
    P5 = 0x0010_0100,
    /// Intel Quark.
    Quark = 0x0010_0101,
    /// Pentium Pro, Pentium II, Pentium III.
    P6 = 0x0010_0200,
    /// Pentium M.
    Dothan = 0x0010_0201,
    /// Intel Core.
    Yonah = 0x0010_0202,
    /// Intel Core 2 on 65 nm.
    Conroe = 0x0010_0203,
    /// Intel Core 2 on 45 nm.
    Penryn = 0x0010_0204,
    /// Nehalem and Westmere (Core i3/i5/i7 1st gen).
    Nehalem = 0x0010_0205,
    SandyBridge = 0x0010_0206,
    IvyBridge = 0x0010_0207,
    Haswell = 0x0010_0208,
    Broadwell = 0x0010_0209,
    SkyLake = 0x0010_020A,
    KabyLake = 0x0010_020B,
    /// Pentium 4 with Willamette, Northwood, or Foster cores.
    Willamette = 0x0010_0300,
    /// Pentium 4 with Prescott and later cores.
    Prescott = 0x0010_0301,
    /// Intel Atom on 45 nm.
    Bonnell = 0x0010_0400,
    /// Intel Atom on 32 nm.
    Saltwell = 0x0010_0401,
    /// 22 nm out-of-order Atom.
    Silvermont = 0x0010_0402,
    /// 14 nm out-of-order Atom.
    Airmont = 0x0010_0403,

    // AMD x86
    K5 = 0x0020_0100,
    K6 = 0x0020_0101,
    /// Athlon and Duron.
    K7 = 0x0020_0102,
    /// Athlon 64, Opteron 64.
    K8 = 0x0020_0103,
    /// Family 10h (Barcelona, Istanbul, Magny-Cours).
    K10 = 0x0020_0104,
    Bulldozer = 0x0020_0105,
    Piledriver = 0x0020_0106,
    Steamroller = 0x0020_0107,
    Excavator = 0x0020_0108,
    Zen = 0x0020_0109,
    /// NSC Geode and AMD Geode GX/LX.
    Geode = 0x0020_0200,
    Bobcat = 0x0020_0201,
    Jaguar = 0x0020_0202,

    // ARM
    Arm7 = 0x0030_0100,
    Arm9 = 0x0030_0101,
    /// ARM 1136, 1156, 1176, or 11 MPCore.
    Arm11 = 0x0030_0102,
    CortexA5 = 0x0030_0205,
    CortexA7 = 0x0030_0207,
    CortexA8 = 0x0030_0208,
    CortexA9 = 0x0030_0209,
    CortexA12 = 0x0030_0212,
    CortexA15 = 0x0030_0215,
    CortexA17 = 0x0030_0217,
    CortexA32 = 0x0030_0332,
    CortexA35 = 0x0030_0335,
    CortexA53 = 0x0030_0353,
    CortexA57 = 0x0030_0357,
    CortexA72 = 0x0030_0372,
    CortexA73 = 0x0030_0373,

    // Qualcomm
    Scorpion = 0x0040_0100,
    Krait = 0x0040_0101,
    Kryo = 0x0040_0102,

    // Samsung
    Mongoose = 0x0050_0100,

    // NVIDIA
    Denver = 0x0070_0100,

    // Cavium
    ThunderX = 0x0080_0100,

    // Intel/Marvell embedded ARM
    Xscale = 0x0090_0100,
}

impl Default for Uarch {
    fn default() -> Self {
        Self::Unknown
    }
}

impl Uarch {
    /// Stable numeric code for this microarchitecture.
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Decoded x86 model identification (CPUID leaf 1, EAX/EBX).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct X86ModelInfo {
    /// Effective model (base, extended by the extended-model nibble on
    /// families 6 and 15).
    pub model: u32,
    /// Effective family (base plus extended family on family 15).
    pub family: u32,
    pub base_model: u32,
    pub base_family: u32,
    pub stepping: u32,
    pub extended_model: u32,
    pub extended_family: u32,
    pub processor_type: u32,
}

impl X86ModelInfo {
    /// Decode the version-information register returned in EAX of
    /// CPUID leaf 1.
    pub fn decode(basic_info: CpuidRegs) -> Self {
        let eax = basic_info.eax;
        let base_model = (eax >> 4) & 0xF;
        let base_family = (eax >> 8) & 0xF;
        let extended_model = (eax >> 16) & 0xF;
        let extended_family = (eax >> 20) & 0xFF;

        // Extended fields only augment families 6 and 15.
        let family = if base_family == 0xF {
            base_family + extended_family
        } else {
            base_family
        };
        let model = if base_family == 0x6 || base_family == 0xF {
            base_model | (extended_model << 4)
        } else {
            base_model
        };

        Self {
            model,
            family,
            base_model,
            base_family,
            stepping: eax & 0xF,
            extended_model,
            extended_family,
            processor_type: (eax >> 12) & 0x3,
        }
    }
}

/// Identify the vendor from the 12-character CPUID vendor string
/// (leaf 0, EBX:EDX:ECX).
pub fn x86_vendor_from_id(vendor_id: &str) -> Vendor {
    match vendor_id {
        "GenuineIntel" => Vendor::Intel,
        "AuthenticAMD" | "AMDisbetter!" | "AMD ISBETTER" => Vendor::Amd,
        "CentaurHauls" | "VIA VIA VIA " => Vendor::Via,
        "CyrixInstead" => Vendor::Cyrix,
        "Geode by NSC" => Vendor::Nsc,
        "GenuineTMx86" | "TransmetaCPU" => Vendor::Transmeta,
        other => {
            log::warn!("unrecognized CPUID vendor string {other:?}");
            Vendor::Unknown
        }
    }
}

/// Assemble the vendor string from CPUID leaf 0 register bytes
/// (EBX, EDX, ECX in that order).
pub fn x86_vendor_string(regs: CpuidRegs) -> String {
    let mut bytes = Vec::with_capacity(12);
    bytes.extend_from_slice(&regs.ebx.to_le_bytes());
    bytes.extend_from_slice(&regs.edx.to_le_bytes());
    bytes.extend_from_slice(&regs.ecx.to_le_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

struct X86Rule {
    vendor: Vendor,
    family: u32,
    model_min: u32,
    model_max: u32,
    uarch: Uarch,
}

const fn x86(vendor: Vendor, family: u32, model_min: u32, model_max: u32, uarch: Uarch) -> X86Rule {
    X86Rule {
        vendor,
        family,
        model_min,
        model_max,
        uarch,
    }
}

/// Ordered signature table; the first matching row wins. Ranges are on
/// the effective (extended) model within one effective family.
const X86_RULES: &[X86Rule] = &[
    // Intel Atom lines come before the catch-all P6 range.
    x86(Vendor::Intel, 0x6, 0x1C, 0x1C, Uarch::Bonnell),
    x86(Vendor::Intel, 0x6, 0x26, 0x26, Uarch::Bonnell),
    x86(Vendor::Intel, 0x6, 0x27, 0x27, Uarch::Saltwell),
    x86(Vendor::Intel, 0x6, 0x35, 0x36, Uarch::Saltwell),
    x86(Vendor::Intel, 0x6, 0x37, 0x37, Uarch::Silvermont),
    x86(Vendor::Intel, 0x6, 0x4A, 0x4A, Uarch::Silvermont),
    x86(Vendor::Intel, 0x6, 0x4D, 0x4D, Uarch::Silvermont),
    x86(Vendor::Intel, 0x6, 0x5A, 0x5A, Uarch::Silvermont),
    x86(Vendor::Intel, 0x6, 0x5D, 0x5D, Uarch::Silvermont),
    x86(Vendor::Intel, 0x6, 0x4C, 0x4C, Uarch::Airmont),
    // Intel big cores.
    x86(Vendor::Intel, 0x6, 0x0D, 0x0D, Uarch::Dothan),
    x86(Vendor::Intel, 0x6, 0x0E, 0x0E, Uarch::Yonah),
    x86(Vendor::Intel, 0x6, 0x0F, 0x0F, Uarch::Conroe),
    x86(Vendor::Intel, 0x6, 0x16, 0x16, Uarch::Conroe),
    x86(Vendor::Intel, 0x6, 0x17, 0x17, Uarch::Penryn),
    x86(Vendor::Intel, 0x6, 0x1D, 0x1D, Uarch::Penryn),
    x86(Vendor::Intel, 0x6, 0x1A, 0x1A, Uarch::Nehalem),
    x86(Vendor::Intel, 0x6, 0x1E, 0x1F, Uarch::Nehalem),
    x86(Vendor::Intel, 0x6, 0x25, 0x25, Uarch::Nehalem),
    x86(Vendor::Intel, 0x6, 0x2C, 0x2C, Uarch::Nehalem),
    x86(Vendor::Intel, 0x6, 0x2E, 0x2F, Uarch::Nehalem),
    x86(Vendor::Intel, 0x6, 0x2A, 0x2A, Uarch::SandyBridge),
    x86(Vendor::Intel, 0x6, 0x2D, 0x2D, Uarch::SandyBridge),
    x86(Vendor::Intel, 0x6, 0x3A, 0x3A, Uarch::IvyBridge),
    x86(Vendor::Intel, 0x6, 0x3E, 0x3E, Uarch::IvyBridge),
    x86(Vendor::Intel, 0x6, 0x3C, 0x3C, Uarch::Haswell),
    x86(Vendor::Intel, 0x6, 0x3F, 0x3F, Uarch::Haswell),
    x86(Vendor::Intel, 0x6, 0x45, 0x46, Uarch::Haswell),
    x86(Vendor::Intel, 0x6, 0x3D, 0x3D, Uarch::Broadwell),
    x86(Vendor::Intel, 0x6, 0x47, 0x47, Uarch::Broadwell),
    x86(Vendor::Intel, 0x6, 0x4F, 0x4F, Uarch::Broadwell),
    x86(Vendor::Intel, 0x6, 0x56, 0x56, Uarch::Broadwell),
    x86(Vendor::Intel, 0x6, 0x4E, 0x4E, Uarch::SkyLake),
    x86(Vendor::Intel, 0x6, 0x55, 0x55, Uarch::SkyLake),
    x86(Vendor::Intel, 0x6, 0x5E, 0x5E, Uarch::SkyLake),
    x86(Vendor::Intel, 0x6, 0x8E, 0x8E, Uarch::KabyLake),
    x86(Vendor::Intel, 0x6, 0x9E, 0x9E, Uarch::KabyLake),
    // Remaining family-6 models are P6 class.
    x86(Vendor::Intel, 0x6, 0x01, 0x0B, Uarch::P6),
    x86(Vendor::Intel, 0x5, 0x09, 0x09, Uarch::Quark),
    x86(Vendor::Intel, 0x5, 0x00, 0x08, Uarch::P5),
    x86(Vendor::Intel, 0xF, 0x00, 0x02, Uarch::Willamette),
    x86(Vendor::Intel, 0xF, 0x03, 0x06, Uarch::Prescott),
    // AMD.
    x86(Vendor::Amd, 0x5, 0x0A, 0x0A, Uarch::Geode),
    x86(Vendor::Amd, 0x5, 0x00, 0x05, Uarch::K5),
    x86(Vendor::Amd, 0x5, 0x06, 0x0D, Uarch::K6),
    x86(Vendor::Amd, 0x6, 0x00, 0xFF, Uarch::K7),
    x86(Vendor::Amd, 0xF, 0x00, 0xFF, Uarch::K8),
    x86(Vendor::Amd, 0x10, 0x00, 0xFF, Uarch::K10),
    x86(Vendor::Amd, 0x14, 0x00, 0xFF, Uarch::Bobcat),
    x86(Vendor::Amd, 0x15, 0x00, 0x01, Uarch::Bulldozer),
    x86(Vendor::Amd, 0x15, 0x02, 0x02, Uarch::Piledriver),
    x86(Vendor::Amd, 0x15, 0x10, 0x1F, Uarch::Piledriver),
    x86(Vendor::Amd, 0x15, 0x30, 0x3F, Uarch::Steamroller),
    x86(Vendor::Amd, 0x15, 0x60, 0x7F, Uarch::Excavator),
    x86(Vendor::Amd, 0x16, 0x00, 0xFF, Uarch::Jaguar),
    x86(Vendor::Amd, 0x17, 0x00, 0xFF, Uarch::Zen),
    x86(Vendor::Nsc, 0x5, 0x00, 0xFF, Uarch::Geode),
];

/// Classify an x86 processor. Pure and total: unmatched signatures
/// return [`Uarch::Unknown`].
pub fn classify_x86(vendor: Vendor, model_info: &X86ModelInfo) -> Uarch {
    for rule in X86_RULES {
        if rule.vendor == vendor
            && rule.family == model_info.family
            && (rule.model_min..=rule.model_max).contains(&model_info.model)
        {
            return rule.uarch;
        }
    }
    log::warn!(
        "unrecognized {} signature: family {:#x} model {:#x} stepping {:#x}",
        vendor,
        model_info.family,
        model_info.model,
        model_info.stepping
    );
    Uarch::Unknown
}

struct ArmRule {
    implementer: u32,
    part_min: u32,
    part_max: u32,
    uarch: Uarch,
}

const fn arm(implementer: u32, part_min: u32, part_max: u32, uarch: Uarch) -> ArmRule {
    ArmRule {
        implementer,
        part_min,
        part_max,
        uarch,
    }
}

const ARM_RULES: &[ArmRule] = &[
    // ARM Ltd.
    arm(0x41, 0x700, 0x7FF, Uarch::Arm7),
    arm(0x41, 0x920, 0x966, Uarch::Arm9),
    arm(0x41, 0xB02, 0xB02, Uarch::Arm11),
    arm(0x41, 0xB36, 0xB36, Uarch::Arm11),
    arm(0x41, 0xB56, 0xB56, Uarch::Arm11),
    arm(0x41, 0xB76, 0xB76, Uarch::Arm11),
    arm(0x41, 0xC05, 0xC05, Uarch::CortexA5),
    arm(0x41, 0xC07, 0xC07, Uarch::CortexA7),
    arm(0x41, 0xC08, 0xC08, Uarch::CortexA8),
    arm(0x41, 0xC09, 0xC09, Uarch::CortexA9),
    arm(0x41, 0xC0D, 0xC0D, Uarch::CortexA12),
    arm(0x41, 0xC0E, 0xC0E, Uarch::CortexA17),
    arm(0x41, 0xC0F, 0xC0F, Uarch::CortexA15),
    arm(0x41, 0xD01, 0xD01, Uarch::CortexA32),
    arm(0x41, 0xD03, 0xD03, Uarch::CortexA53),
    arm(0x41, 0xD04, 0xD04, Uarch::CortexA35),
    arm(0x41, 0xD07, 0xD07, Uarch::CortexA57),
    arm(0x41, 0xD08, 0xD08, Uarch::CortexA72),
    arm(0x41, 0xD09, 0xD09, Uarch::CortexA73),
    // Qualcomm.
    arm(0x51, 0x00F, 0x00F, Uarch::Scorpion),
    arm(0x51, 0x02D, 0x02D, Uarch::Scorpion),
    arm(0x51, 0x04D, 0x04D, Uarch::Krait),
    arm(0x51, 0x06F, 0x06F, Uarch::Krait),
    arm(0x51, 0x201, 0x201, Uarch::Kryo),
    arm(0x51, 0x205, 0x205, Uarch::Kryo),
    arm(0x51, 0x211, 0x211, Uarch::Kryo),
    arm(0x51, 0x800, 0x801, Uarch::Kryo),
    // Samsung Mongoose.
    arm(0x53, 0x001, 0x001, Uarch::Mongoose),
    // NVIDIA Denver.
    arm(0x4E, 0x000, 0x000, Uarch::Denver),
    arm(0x4E, 0x003, 0x003, Uarch::Denver),
    // Cavium ThunderX.
    arm(0x43, 0x0A1, 0x0A1, Uarch::ThunderX),
    // Intel/Marvell XScale: part numbers 0x2xx, 0x4xx, 0x6xx.
    arm(0x69, 0x200, 0x2FF, Uarch::Xscale),
    arm(0x69, 0x400, 0x4FF, Uarch::Xscale),
    arm(0x69, 0x600, 0x6FF, Uarch::Xscale),
];

fn arm_vendor_from_implementer(implementer: u32) -> Vendor {
    match implementer {
        0x41 => Vendor::Arm,
        0x42 => Vendor::Broadcom,
        0x43 => Vendor::Cavium,
        0x44 => Vendor::Dec,
        0x4D => Vendor::Motorola,
        0x4E => Vendor::Nvidia,
        0x51 => Vendor::Qualcomm,
        0x53 => Vendor::Samsung,
        0x54 => Vendor::TexasInstruments,
        0x56 => Vendor::Marvell,
        0x61 => Vendor::Apple,
        0x69 => Vendor::Intel,
        other => {
            log::warn!("unrecognized CPU implementer {other:#04x}");
            Vendor::Unknown
        }
    }
}

/// Classify a text-record processor from its implementer and part
/// fields. Pure and total.
pub fn classify_arm(implementer: u32, part: u32, _variant: u32) -> (Vendor, Uarch) {
    let vendor = arm_vendor_from_implementer(implementer);
    for rule in ARM_RULES {
        if rule.implementer == implementer && (rule.part_min..=rule.part_max).contains(&part) {
            return (vendor, rule.uarch);
        }
    }
    if vendor != Vendor::Unknown {
        log::warn!("unrecognized CPU part {part:#05x} for implementer {implementer:#04x}");
    }
    (vendor, Uarch::Unknown)
}
