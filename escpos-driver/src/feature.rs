//! Hardware feature set
//!
//! Optional hardware (cutter, cash drawer) is consulted before emitting the
//! commands that need it. A missing feature turns those commands into
//! no-ops rather than errors.

use serde::{Deserialize, Serialize};

/// Characters per line in each text mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Columns {
    pub normal: usize,
    pub expanded: usize,
    pub condensed: usize,
}

impl Columns {
    pub const fn new(normal: usize, expanded: usize, condensed: usize) -> Self {
        Self {
            normal,
            expanded,
            condensed,
        }
    }
}

/// A single feature override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "feature", content = "value")]
pub enum Feature {
    Columns(Columns),
    Cutter(bool),
    CashDrawerPorts(bool),
    CashDrawerAvailablePorts(u8),
    Portable(bool),
}

/// Hardware features of one printer instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareFeatures {
    pub columns: Columns,
    pub cutter: bool,
    pub cashdrawer_ports: bool,
    pub cashdrawer_available_ports: u8,
    pub portable: bool,
}

impl Default for HardwareFeatures {
    fn default() -> Self {
        Self {
            columns: Columns::new(48, 24, 64),
            cutter: false,
            cashdrawer_ports: true,
            cashdrawer_available_ports: 2,
            portable: false,
        }
    }
}

impl HardwareFeatures {
    pub fn apply(&mut self, feature: Feature) {
        match feature {
            Feature::Columns(columns) => self.columns = columns,
            Feature::Cutter(v) => self.cutter = v,
            Feature::CashDrawerPorts(v) => self.cashdrawer_ports = v,
            Feature::CashDrawerAvailablePorts(n) => self.cashdrawer_available_ports = n,
            Feature::Portable(v) => self.portable = v,
        }
    }

    /// Copy with `features` applied in order (later entries win)
    pub fn with(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        for feature in features {
            self.apply(feature);
        }
        self
    }
}
