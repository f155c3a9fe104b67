//! Adduct ion types and conversions between neutral mass and m/z.
use std::fmt::Display;

pub use mzdeisotope::isotopic_model::PROTON;

use crate::raw::IonMode;

pub const ELECTRON: f64 = 0.00054858;

/// An adduct ion type, like `[M+H]+` or `[2M+Na]+`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdductIon {
    pub name: String,
    /// The mass added to the `x_mer` neutral molecules
    pub accurate_mass: f64,
    pub x_mer: u32,
    pub charge: i32,
    pub ion_mode: IonMode,
}

impl Default for AdductIon {
    fn default() -> Self {
        Self::default_for(IonMode::Positive)
    }
}

impl Display for AdductIon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

const KNOWN_ADDUCTS: &[(&str, f64, u32, i32, IonMode)] = &[
    ("[M+H]+", PROTON, 1, 1, IonMode::Positive),
    ("[M+Na]+", 22.989218, 1, 1, IonMode::Positive),
    ("[M+K]+", 38.963158, 1, 1, IonMode::Positive),
    ("[M+NH4]+", 18.033823, 1, 1, IonMode::Positive),
    ("[M+H-H2O]+", -17.003289, 1, 1, IonMode::Positive),
    ("[M]+", -ELECTRON, 1, 1, IonMode::Positive),
    ("[M+2H]2+", 2.0 * PROTON, 1, 2, IonMode::Positive),
    ("[2M+H]+", PROTON, 2, 1, IonMode::Positive),
    ("[2M+Na]+", 22.989218, 2, 1, IonMode::Positive),
    ("[M-H]-", -PROTON, 1, 1, IonMode::Negative),
    ("[M+Cl]-", 34.969402, 1, 1, IonMode::Negative),
    ("[M+FA-H]-", 44.998201, 1, 1, IonMode::Negative),
    ("[M+CH3COO]-", 59.013851, 1, 1, IonMode::Negative),
    ("[M-H2O-H]-", -19.01839, 1, 1, IonMode::Negative),
    ("[M]-", ELECTRON, 1, 1, IonMode::Negative),
    ("[M-2H]2-", -2.0 * PROTON, 1, 2, IonMode::Negative),
    ("[2M-H]-", -PROTON, 2, 1, IonMode::Negative),
];

impl AdductIon {
    pub fn new(name: impl Into<String>, accurate_mass: f64, x_mer: u32, charge: i32, ion_mode: IonMode) -> Self {
        Self {
            name: name.into(),
            accurate_mass,
            x_mer,
            charge,
            ion_mode,
        }
    }

    /// The protonated or deprotonated molecule
    pub fn default_for(ion_mode: IonMode) -> Self {
        match ion_mode {
            IonMode::Positive => Self::new("[M+H]+", PROTON, 1, 1, ion_mode),
            IonMode::Negative => Self::new("[M-H]-", -PROTON, 1, 1, ion_mode),
        }
    }

    /// Look up a known adduct by name, ignoring whitespace
    pub fn parse(name: &str) -> Option<Self> {
        let normalized: String = name.chars().filter(|c| !c.is_whitespace()).collect();
        KNOWN_ADDUCTS
            .iter()
            .find(|(n, ..)| *n == normalized)
            .map(|(n, mass, x_mer, charge, mode)| Self::new(*n, *mass, *x_mer, *charge, *mode))
    }

    pub fn neutral_mass(&self, mz: f64) -> f64 {
        (mz * self.charge as f64 - self.accurate_mass) / self.x_mer as f64
    }

    pub fn mz(&self, neutral_mass: f64) -> f64 {
        (neutral_mass * self.x_mer as f64 + self.accurate_mass) / self.charge as f64
    }
}
