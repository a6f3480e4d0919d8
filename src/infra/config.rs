// src/infra/config.rs — Settings loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::infra::errors::{CycleError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub cycle: CycleSettings,

    #[serde(default)]
    pub pricing: Option<PricingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSettings {
    /// Hard ceiling on rounds for the automatic driver.
    pub max_rounds: u32,
    /// Score at which the automatic driver stops (0-100 scale).
    pub target_score: f64,
    /// Persist the session after every round.
    pub auto_save: bool,
    /// Bump the prompt version when suggestions are applied.
    pub bump_version: bool,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            target_score: 90.0,
            auto_save: true,
            bump_version: true,
        }
    }
}

/// Per-component $/Mtok pricing, mirrored into `core::cost::PricingConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    pub agent: ComponentPricing,
    pub judge: ComponentPricing,
    pub improver: ComponentPricing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl Settings {
    /// Load settings from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CycleError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;
        toml::from_str(&raw).map_err(|e| CycleError::InvalidConfig(format!("{path:?}: {e}")))
    }

    /// Load from the standard settings location (see `infra::paths`).
    pub async fn load_default() -> Result<Self> {
        Self::load(&crate::infra::paths::settings_file_path()).await
    }
}

impl CycleSettings {
    /// The termination list these settings describe: target score first,
    /// round ceiling as the backstop.
    pub fn termination_conditions(
        &self,
    ) -> Result<Vec<crate::core::termination::TerminationCondition>> {
        Ok(vec![
            crate::core::termination::target_score(self.target_score)?,
            crate::core::termination::max_rounds(self.max_rounds)?,
        ])
    }
}
