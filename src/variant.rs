//! Hardware variants
//!
//! Every simulated ASIC family has a short code (`CS`, `D`, ...) and an
//! operator-facing label (`DopplerCS`). Either form is accepted on input.

use std::fmt;
use std::str::FromStr;
use crate::error::RegressError;

const LABEL_PREFIX: &str = "Doppler";

/// A simulated hardware variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HardwareVariant {
    CS,
    D,
    G,
    GStub,
    E,
    DL,
}

/// Default simulator release shipped for a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Directory holding all releases of this family
    pub prefix: &'static str,
    /// Known-stable release name
    pub release: &'static str,
    /// Patch directory applied on top of the stable release only
    pub patch: Option<&'static str>,
    /// Simulator executable name inside the release
    pub executable: &'static str,
}

impl HardwareVariant {
    pub const ALL: [HardwareVariant; 6] = [
        HardwareVariant::CS,
        HardwareVariant::D,
        HardwareVariant::G,
        HardwareVariant::GStub,
        HardwareVariant::E,
        HardwareVariant::DL,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            HardwareVariant::CS => "CS",
            HardwareVariant::D => "D",
            HardwareVariant::G => "G",
            HardwareVariant::GStub => "GStub",
            HardwareVariant::E => "E",
            HardwareVariant::DL => "DL",
        }
    }

    /// `Doppler<code>`
    pub fn label(&self) -> String {
        format!("{}{}", LABEL_PREFIX, self.code())
    }

    /// Stem of the `<stem>_paq.regress` catalogue, if the variant has one.
    pub fn catalogue_stem(&self) -> Option<&'static str> {
        match self {
            HardwareVariant::CS => Some("dopplercs"),
            HardwareVariant::D | HardwareVariant::DL => Some("dopplerd"),
            HardwareVariant::E => Some("dopplere"),
            HardwareVariant::G | HardwareVariant::GStub => None,
        }
    }

    pub fn release(&self) -> ReleaseInfo {
        match self {
            HardwareVariant::CS => ReleaseInfo {
                prefix: "/auto/dopplercs_cima/releases/paq/RELEASE/DvppInfra",
                release: "dopplercs_cima_S0101_R2014_07_27",
                patch: None,
                executable: "DopplercsMdlPaq_64BIT",
            },
            HardwareVariant::D => ReleaseInfo {
                prefix: "/auto/dopplerd/releases/paq/DvppInfra",
                release: "dopplerd_T0097_2_R2015_07_01",
                patch: Some("P1_R2015_07_02"),
                executable: "DopplerDMdlPaq_64BIT",
            },
            HardwareVariant::G | HardwareVariant::GStub => ReleaseInfo {
                prefix: "/auto/dopplerg/releases/paq/DvppInfra",
                release: "dopplerg_T0071_R2015_07_30",
                patch: None,
                executable: "DopplerGMdlPaq_64BIT",
            },
            HardwareVariant::E => ReleaseInfo {
                prefix: "/auto/dopplere/releases/paq/DvppInfra",
                release: "dopplere_S1347_R2015_12_01_P2",
                patch: None,
                executable: "DopplerEMdlPaq_64BIT",
            },
            HardwareVariant::DL => ReleaseInfo {
                prefix: "/auto/dopplerdl/releases/paq/DvppInfra",
                release: "dopplerdl_S0010_R2015_09_30",
                patch: None,
                executable: "DopplerDMdlPaq_64BIT",
            },
        }
    }
}

impl FromStr for HardwareVariant {
    type Err = RegressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.strip_prefix(LABEL_PREFIX).unwrap_or(s);
        HardwareVariant::ALL
            .into_iter()
            .find(|v| v.code() == code)
            .ok_or_else(|| RegressError::config(format!("asic [{}] not supported", s)))
    }
}

impl fmt::Display for HardwareVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
