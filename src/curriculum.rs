//! Authored opening lines and the catalog that holds them.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const BUILTIN_CATALOG: &str = include_str!("../data/openings.toml");

/// A difficulty bucket of practice lines within an opening.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Beginner,
    /// Beginner lines plus the opening's master add-on lines.
    Master,
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Tier::Beginner),
            "master" | "advanced" => Ok(Tier::Master),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Beginner => f.write_str("beginner"),
            Tier::Master => f.write_str("master"),
        }
    }
}

/// A single authored line: SAN moves from the opening's start, with one
/// optional note per ply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub moves: Vec<String>,
    /// Aligned with `moves`; an empty string means no note.
    #[serde(default)]
    pub notes: Vec<String>,
}

impl TrainingItem {
    pub fn new(id: impl Into<String>, moves: &[&str]) -> Self {
        TrainingItem {
            id: id.into(),
            tags: Vec::new(),
            moves: moves.iter().map(|m| m.to_string()).collect(),
            notes: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_notes(mut self, notes: &[&str]) -> Self {
        self.notes = notes.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn note(&self, ply: usize) -> Option<&str> {
        self.notes
            .get(ply)
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opening {
    pub id: String,
    pub title: String,
    /// Position the lines start from. Defaults to the standard start.
    #[serde(default)]
    pub start_fen: Option<String>,
    #[serde(default)]
    pub beginner: Vec<TrainingItem>,
    #[serde(default)]
    pub master: Vec<TrainingItem>,
}

impl Opening {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Opening {
            id: id.into(),
            title: title.into(),
            start_fen: None,
            beginner: Vec::new(),
            master: Vec::new(),
        }
    }

    /// The lines practised at `tier`, in authoring order.
    pub fn items(&self, tier: Tier) -> impl Iterator<Item = &TrainingItem> {
        let addon: &[TrainingItem] = match tier {
            Tier::Beginner => &[],
            Tier::Master => &self.master,
        };
        self.beginner.iter().chain(addon.iter())
    }
}

/// Ordered collection of openings, loaded from TOML.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningCatalog {
    #[serde(rename = "opening", default)]
    pub openings: Vec<Opening>,
}

impl OpeningCatalog {
    /// The catalog shipped with the crate.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn get(&self, id: &str) -> Option<&Opening> {
        self.openings.iter().find(|o| o.id == id)
    }

    /// `(title, id)` pairs in catalog order, for menus.
    pub fn options(&self) -> Vec<(&str, &str)> {
        self.openings
            .iter()
            .map(|o| (o.title.as_str(), o.id.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_parses() {
        let catalog = OpeningCatalog::builtin().unwrap();
        assert!(catalog.openings.len() >= 5);
        let kg = catalog.get("kings_gambit").unwrap();
        assert_eq!(kg.title, "King's Gambit");
        assert_eq!(kg.items(Tier::Beginner).count(), kg.beginner.len());
        assert_eq!(
            kg.items(Tier::Master).count(),
            kg.beginner.len() + kg.master.len()
        );
    }

    #[test]
    fn notes_skip_blank_entries() {
        let item = TrainingItem::new("x", &["e4", "e5", "Nf3"]).with_notes(&["center", "", " "]);
        assert_eq!(item.note(0), Some("center"));
        assert_eq!(item.note(1), None);
        assert_eq!(item.note(2), None);
        assert_eq!(item.note(7), None);
    }

    #[test]
    fn tier_parsing_accepts_advanced_alias() {
        assert_eq!("Master".parse::<Tier>().unwrap(), Tier::Master);
        assert_eq!("advanced".parse::<Tier>().unwrap(), Tier::Master);
        assert_eq!("beginner".parse::<Tier>().unwrap(), Tier::Beginner);
        assert!("grandmaster".parse::<Tier>().is_err());
    }

    #[test]
    fn parses_inline_toml() {
        let text = r#"
            [[opening]]
            id = "vienna"
            title = "Vienna Game"

            [[opening.beginner]]
            moves = ["e4", "e5", "Nc3"]
        "#;
        let catalog = OpeningCatalog::from_toml_str(text).unwrap();
        let vienna = catalog.get("vienna").unwrap();
        assert_eq!(vienna.beginner[0].moves.len(), 3);
        assert!(vienna.beginner[0].id.is_empty());
        assert!(vienna.master.is_empty());
        assert_eq!(catalog.options(), vec![("Vienna Game", "vienna")]);
    }
}
