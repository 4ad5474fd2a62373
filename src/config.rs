//! Session configuration, read from TOML.
//!
//! ```toml
//! [settings]
//! cloud_enabled = true
//! book_enabled = true
//! show_suggestions = true
//! suggestion_level = 3
//! book_randomness = 0.25
//!
//! [settings.opponent]
//! side = "black"
//! level = 2
//!
//! [catalog]
//! path = "openings.toml"
//! ```

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shakmaty::Color;
use tracing::{info, warn};

use crate::curriculum::OpeningCatalog;
use crate::engine::EngineConfig;
use crate::error::ConfigError;
use crate::suggest::SuggestionSettings;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "OPENING_COACH_CONFIG";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    pub settings: CoachSettings,
    pub catalog: Option<CatalogConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachSettings {
    pub cloud_enabled: bool,
    pub book_enabled: bool,
    /// When off, no advice is requested at all.
    pub show_suggestions: bool,
    /// Engine level used for the suggestion fallback.
    pub suggestion_level: u8,
    /// 0 always plays the heaviest book move, 1 always samples by weight.
    pub book_randomness: f32,
    pub opponent: Option<OpponentConfig>,
}

impl Default for CoachSettings {
    fn default() -> Self {
        CoachSettings {
            cloud_enabled: true,
            book_enabled: true,
            show_suggestions: true,
            suggestion_level: 3,
            book_randomness: 0.25,
            opponent: None,
        }
    }
}

impl CoachSettings {
    pub fn suggestion_settings(&self) -> SuggestionSettings {
        SuggestionSettings {
            cloud_enabled: self.cloud_enabled,
            book_enabled: self.book_enabled,
        }
    }

    pub fn suggestion_engine(&self) -> EngineConfig {
        EngineConfig::level(self.suggestion_level)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl From<Side> for Color {
    fn from(side: Side) -> Color {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

/// A computer opponent that moves automatically for one colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpponentConfig {
    pub side: Side,
    #[serde(default = "default_level")]
    pub level: u8,
}

impl OpponentConfig {
    pub fn engine(&self) -> EngineConfig {
        EngineConfig::level(self.level)
    }
}

fn default_level() -> u8 {
    3
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

impl CoachConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load the file named by `OPENING_COACH_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    /// The configured catalog, or the built-in one.
    pub fn catalog(&self) -> Result<OpeningCatalog, ConfigError> {
        match &self.catalog {
            Some(catalog) => OpeningCatalog::load(&catalog.path),
            None => OpeningCatalog::builtin(),
        }
    }

    /// Clamp values a hand-edited file may get wrong.
    pub fn sanitized(mut self) -> Self {
        let settings = &mut self.settings;
        if !(0.0..=1.0).contains(&settings.book_randomness) {
            warn!(value = settings.book_randomness, "book_randomness out of range, clamping");
            settings.book_randomness = settings.book_randomness.clamp(0.0, 1.0);
        }
        settings.suggestion_level = settings
            .suggestion_level
            .clamp(EngineConfig::MIN_LEVEL, EngineConfig::MAX_LEVEL);
        self
    }
}
