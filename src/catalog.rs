//! Categorical design space Γ: material + stiffener records keyed by choice.

use crate::types::{Catalog, CatalogEntry, Choice, ElementProperties, Error, Result, Stiffener};
use ndarray::Array1;
use std::collections::BTreeMap;

/// Stiffener section shared by the reference catalog entries.
const REFERENCE_I: Stiffener = Stiffener::I {
    thickness: 5.0,
    height: 50.0,
    width: 40.0,
};

impl Catalog {
    pub fn new(entries: BTreeMap<Choice, CatalogEntry>) -> Result<Self> {
        let catalog = Self { entries };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Reject empty catalogs and non-physical material data.
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(Error::InvalidArgument("catalog must contain at least one choice".into()));
        }
        for (choice, entry) in &self.entries {
            let positive = [
                entry.density,
                entry.young_modulus,
                entry.allow_comp,
                entry.allow_tens,
            ];
            if positive.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
                return Err(Error::InvalidArgument(format!(
                    "catalog choice {choice} ({}) has non-positive material data",
                    entry.name
                )));
            }
            if !(0.0..0.5).contains(&entry.poisson_coeff) {
                return Err(Error::InvalidArgument(format!(
                    "catalog choice {choice} ({}) has Poisson coefficient {} outside [0, 0.5)",
                    entry.name, entry.poisson_coeff
                )));
            }
        }
        Ok(())
    }

    /// Γ = {1, 2, 3}: AL2139, AL2024 and TA6V, each with the same I stiffener.
    pub fn reference() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            1,
            CatalogEntry {
                name: "AL2139".into(),
                density: 2.8e-6,
                young_modulus: 7.1e4,
                allow_comp: 2.0e2,
                allow_tens: 1.5e2,
                poisson_coeff: 0.3,
                stiffener: REFERENCE_I,
            },
        );
        entries.insert(
            2,
            CatalogEntry {
                name: "AL2024".into(),
                density: 2.77e-6,
                young_modulus: 7.4e4,
                allow_comp: 2.1e2,
                allow_tens: 1.6e2,
                poisson_coeff: 0.33,
                stiffener: REFERENCE_I,
            },
        );
        entries.insert(
            3,
            CatalogEntry {
                name: "TA6V".into(),
                density: 4.43e-6,
                young_modulus: 11.0e4,
                allow_comp: 8.6e2,
                allow_tens: 11.0e2,
                poisson_coeff: 0.33,
                stiffener: REFERENCE_I,
            },
        );
        Self { entries }
    }

    pub fn get(&self, choice: Choice) -> Result<&CatalogEntry> {
        self.entries.get(&choice).ok_or(Error::UnknownChoice(choice))
    }

    /// All keys in ascending order.
    pub fn choices(&self) -> Vec<Choice> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Choice, &CatalogEntry)> {
        self.entries.iter()
    }

    /// Gather per-element properties for the categorical vector `c`.
    pub fn properties(&self, c: &[Choice]) -> Result<ElementProperties> {
        let entries = c.iter().map(|&ci| self.get(ci)).collect::<Result<Vec<_>>>()?;
        let column = |f: fn(&CatalogEntry) -> f64| -> Array1<f64> {
            entries.iter().map(|e| f(e)).collect()
        };
        Ok(ElementProperties {
            densities: column(|e| e.density),
            young_moduli: column(|e| e.young_modulus),
            allow_comp: column(|e| e.allow_comp),
            allow_tens: column(|e| e.allow_tens),
            poisson_coeffs: column(|e| e.poisson_coeff),
            stiffeners: entries.iter().map(|e| e.stiffener).collect(),
        })
    }
}
