//! Run configuration: catalog, problem data, solver and coordinator options.
//!
//! Every section has a `Default` reproducing the reference three-bar run,
//! and missing JSON fields fall back to those defaults.

use crate::types::{BilevelOptions, Catalog, ProblemParams, Result, SolverOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub catalog: Catalog,
    pub problem: ProblemParams,
    pub solver: SolverOptions,
    pub bilevel: BilevelOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            catalog: Catalog::reference(),
            problem: ProblemParams::default(),
            solver: SolverOptions::default(),
            bilevel: BilevelOptions::default(),
        }
    }
}

impl RunConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.catalog.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
