//! Vendor status mapping
//!
//! SolaX reports its operating state through two unrelated code spaces: the
//! cloud `inverterStatus` (100..113) and the field-bus run mode (0..10). Both
//! fold onto [`CanonicalStatus`], which in turn maps onto the Victron
//! `/StatusCode` enumeration.

use std::fmt;

/// Normalized inverter operating state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalStatus {
    /// Starting up; the sub code is the Victron startup stage (0..=6)
    Startup(u8),
    Running,
    Standby,
    BootLoading,
    Error,
}

impl CanonicalStatus {
    /// Victron `/StatusCode` value
    pub fn code(&self) -> i32 {
        match self {
            CanonicalStatus::Startup(n) => i32::from(*n),
            CanonicalStatus::Running => 7,
            CanonicalStatus::Standby => 8,
            CanonicalStatus::BootLoading => 9,
            CanonicalStatus::Error => 10,
        }
    }

    /// Text shown for `/StatusCode`
    pub fn label(&self) -> String {
        match self {
            CanonicalStatus::Startup(n) => format!("Startup {}", n),
            CanonicalStatus::Running => "Running".to_string(),
            CanonicalStatus::Standby => "Standby".to_string(),
            CanonicalStatus::BootLoading => "Boot loading".to_string(),
            CanonicalStatus::Error => "Error".to_string(),
        }
    }

    /// Inverse of [`CanonicalStatus::code`], used for bus text rendering
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0..=6 => Some(CanonicalStatus::Startup(code as u8)),
            7 => Some(CanonicalStatus::Running),
            8 => Some(CanonicalStatus::Standby),
            9 => Some(CanonicalStatus::BootLoading),
            10 => Some(CanonicalStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Map a SolaX Cloud `inverterStatus` code
pub fn map_cloud_status(code: i64) -> CanonicalStatus {
    match code {
        100 | 101 => CanonicalStatus::Startup(0),
        102 => CanonicalStatus::Running,
        103 | 104 => CanonicalStatus::Error,
        105..=108 => CanonicalStatus::BootLoading,
        109 | 110 => CanonicalStatus::Standby,
        // Degraded operation (EPS, parallel) still produces power
        111..=113 => CanonicalStatus::Startup(5),
        _ => CanonicalStatus::Error,
    }
}

/// Map a SolaX field-bus run mode register value
pub fn map_run_mode(code: i64) -> CanonicalStatus {
    match code {
        0 => CanonicalStatus::Standby,
        1 => CanonicalStatus::Startup(0),
        2 => CanonicalStatus::Running,
        3..=5 => CanonicalStatus::Error,
        6 | 7 => CanonicalStatus::Standby,
        8 => CanonicalStatus::Startup(1),
        9 | 10 => CanonicalStatus::Standby,
        _ => CanonicalStatus::Error,
    }
}
