//! Printer models
//!
//! A [`Model`] composes one implementation of each capability trait with
//! the model's hardware features. [`ModelId`] enumerates the built-in
//! catalog.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::PrintError;
use crate::feature::{Feature, HardwareFeatures};
use crate::vendor::epson::EscPos;
use crate::vendor::{
    BarcodeEncoder, Cutter, DrawerController, TextFormatter, bematech, controlid, daruma, elgin,
    epson, unknown,
};

/// Model and vendor names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ModelInfo {
    pub name: &'static str,
    pub vendor: &'static str,
}

impl ModelInfo {
    pub const fn new(name: &'static str, vendor: &'static str) -> Self {
        Self { name, vendor }
    }
}

impl fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.vendor, self.name)
    }
}

/// Command set and hardware description of one printer model
#[derive(Clone, Copy)]
pub struct Model {
    pub info: ModelInfo,
    pub features: HardwareFeatures,
    pub text: &'static dyn TextFormatter,
    pub cutter: &'static dyn Cutter,
    pub drawer: &'static dyn DrawerController,
    pub barcodes: &'static dyn BarcodeEncoder,
}

impl Model {
    /// Plain ESC/POS for every capability and the default feature set
    pub fn escpos(info: ModelInfo) -> Self {
        Self {
            info,
            features: HardwareFeatures::default(),
            text: &EscPos,
            cutter: &EscPos,
            drawer: &EscPos,
            barcodes: &EscPos,
        }
    }

    /// Copy with feature overrides applied in order
    pub fn with_features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        self.features = self.features.with(features);
        self
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("info", &self.info)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

/// Built-in printer catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelId {
    GenericEscPos,
    EpsonTmT20,
    BematechMp4200Th,
    DarumaGeneric,
    DarumaDr700,
    DarumaDr800,
    ElginGeneric,
    ElginI9,
    ElginI7,
    ElginRm22,
    ControlIdPrintIdTouch,
    UnknownCb55c,
    NitereNpdv1020,
}

impl ModelId {
    pub const ALL: [ModelId; 13] = [
        ModelId::GenericEscPos,
        ModelId::EpsonTmT20,
        ModelId::BematechMp4200Th,
        ModelId::DarumaGeneric,
        ModelId::DarumaDr700,
        ModelId::DarumaDr800,
        ModelId::ElginGeneric,
        ModelId::ElginI9,
        ModelId::ElginI7,
        ModelId::ElginRm22,
        ModelId::ControlIdPrintIdTouch,
        ModelId::UnknownCb55c,
        ModelId::NitereNpdv1020,
    ];

    pub fn model(self) -> Model {
        match self {
            ModelId::GenericEscPos => epson::generic(),
            ModelId::EpsonTmT20 => epson::tmt20(),
            ModelId::BematechMp4200Th => bematech::mp4200th(),
            ModelId::DarumaGeneric => daruma::generic(),
            ModelId::DarumaDr700 => daruma::dr700(),
            ModelId::DarumaDr800 => daruma::dr800(),
            ModelId::ElginGeneric => elgin::generic(),
            ModelId::ElginI9 => elgin::i9(),
            ModelId::ElginI7 => elgin::i7(),
            ModelId::ElginRm22 => elgin::rm22(),
            ModelId::ControlIdPrintIdTouch => controlid::print_id_touch(),
            ModelId::UnknownCb55c => unknown::cb55c(),
            ModelId::NitereNpdv1020 => unknown::nitere_npdv1020(),
        }
    }

    /// Short lowercase identifier, e.g. `elgin-i9`
    pub fn as_str(self) -> &'static str {
        match self {
            ModelId::GenericEscPos => "generic",
            ModelId::EpsonTmT20 => "epson-tmt20",
            ModelId::BematechMp4200Th => "bematech-mp4200th",
            ModelId::DarumaGeneric => "daruma-generic",
            ModelId::DarumaDr700 => "daruma-dr700",
            ModelId::DarumaDr800 => "daruma-dr800",
            ModelId::ElginGeneric => "elgin-generic",
            ModelId::ElginI9 => "elgin-i9",
            ModelId::ElginI7 => "elgin-i7",
            ModelId::ElginRm22 => "elgin-rm22",
            ModelId::ControlIdPrintIdTouch => "controlid-printidtouch",
            ModelId::UnknownCb55c => "unknown-cb55c",
            ModelId::NitereNpdv1020 => "nitere-npdv1020",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = PrintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| PrintError::InvalidConfig(format!("Unknown printer model: {}", s)))
    }
}

/// Ordering for [`find_implementations`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Vendor,
    Model,
}

/// One catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Implementation {
    pub id: &'static str,
    pub model: ModelInfo,
}

/// List the catalog in declaration order, or sorted by vendor or model name
pub fn find_implementations(sort_by: Option<SortBy>) -> Vec<Implementation> {
    let mut impls: Vec<Implementation> = ModelId::ALL
        .into_iter()
        .map(|id| Implementation {
            id: id.as_str(),
            model: id.model().info,
        })
        .collect();

    match sort_by {
        Some(SortBy::Vendor) => impls.sort_by_key(|i| (i.model.vendor, i.model.name)),
        Some(SortBy::Model) => impls.sort_by_key(|i| i.model.name),
        None => {}
    }
    impls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_are_unique() {
        let impls = find_implementations(None);
        assert_eq!(impls.len(), ModelId::ALL.len());
        let mut names: Vec<_> = impls.iter().map(|i| i.model.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), impls.len());
        assert_eq!(impls[0].model.name, "Generic ESC/POS");
    }

    #[test]
    fn test_sorted_by_vendor() {
        let impls = find_implementations(Some(SortBy::Vendor));
        assert!(impls.windows(2).all(|w| w[0].model.vendor <= w[1].model.vendor));

        let impls = find_implementations(Some(SortBy::Model));
        assert!(impls.windows(2).all(|w| w[0].model.name <= w[1].model.name));
    }

    #[test]
    fn test_model_id_round_trip() {
        for id in ModelId::ALL {
            assert_eq!(id.as_str().parse::<ModelId>().unwrap(), id);
        }
        assert_eq!("Elgin-I9".parse::<ModelId>().unwrap(), ModelId::ElginI9);
        assert!(matches!(
            "tmt88".parse::<ModelId>(),
            Err(PrintError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_caller_overrides_win() {
        let model = ModelId::BematechMp4200Th
            .model()
            .with_features([Feature::CashDrawerAvailablePorts(2)]);
        assert_eq!(model.features.cashdrawer_available_ports, 2);
        assert!(model.features.cutter);
    }
}
