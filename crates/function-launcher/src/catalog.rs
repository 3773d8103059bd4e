// ABOUTME: Function catalog loader.
// ABOUTME: Reads the JSON file of function descriptions and filters it by minimum stability mode.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::error::LauncherError;
use crate::function::Function;

/// Stability of a function. Ordered by label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FunctionMode {
    #[default]
    Undefined = 0,
    Development = 1,
    Alpha = 2,
    Beta = 3,
    ReleaseCandidate = 4,
    Stable = 5,
    Deprecated = 6,
}

impl FunctionMode {
    pub const ALL: [FunctionMode; 7] = [
        FunctionMode::Undefined,
        FunctionMode::Development,
        FunctionMode::Alpha,
        FunctionMode::Beta,
        FunctionMode::ReleaseCandidate,
        FunctionMode::Stable,
        FunctionMode::Deprecated,
    ];

    pub fn label(self) -> u8 {
        self as u8
    }

    pub fn from_label(label: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| u64::from(mode.label()) == label)
    }

    pub fn name(self) -> &'static str {
        match self {
            FunctionMode::Undefined => "UNDEFINED",
            FunctionMode::Development => "DEVELOPMENT",
            FunctionMode::Alpha => "ALPHA",
            FunctionMode::Beta => "BETA",
            FunctionMode::ReleaseCandidate => "RELEASE_CANDIDATE",
            FunctionMode::Stable => "STABLE",
            FunctionMode::Deprecated => "DEPRECATED",
        }
    }

    /// Minimum mode from configuration; anything unparsable means UNDEFINED.
    pub fn minimum_from(raw: Option<&str>) -> Self {
        match raw {
            None => FunctionMode::Undefined,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(configured = %raw, "Unknown minimum function mode, using UNDEFINED");
                FunctionMode::Undefined
            }),
        }
    }
}

impl fmt::Display for FunctionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FunctionMode {
    type Err = String;

    /// Accepts the name (any case) or the numeric label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(label) = s.parse::<u64>() {
            return Self::from_label(label).ok_or_else(|| format!("unknown function mode {label}"));
        }
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown function mode {s:?}"))
    }
}

impl<'de> Deserialize<'de> for FunctionMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Label(u64),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Label(label) => FunctionMode::from_label(label)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown function mode {label}"))),
            Raw::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// One catalog entry. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FunctionDescription {
    pub name: String,
    pub signature: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: Option<String>,
    /// Executor kind, the first path segment of the start URL.
    pub executor: String,
    /// Runtime id sent to the executor.
    pub runtime: String,
    #[serde(default)]
    pub mode: FunctionMode,
}

/// Parse catalog JSON, keeping functions at or above `minimum`.
pub fn parse(json: &str, minimum: FunctionMode) -> Result<Vec<Function>, LauncherError> {
    let entries: BTreeMap<Uuid, FunctionDescription> =
        serde_json::from_str(json).map_err(|e| LauncherError::Catalog(e.to_string()))?;

    let mut functions = Vec::with_capacity(entries.len());
    for (id, description) in entries {
        if description.mode < minimum {
            tracing::debug!(
                function_id = %id,
                name = %description.name,
                version = %description.version,
                mode = %description.mode,
                "Skipping function below minimum mode"
            );
            continue;
        }
        tracing::debug!(
            function_id = %id,
            name = %description.name,
            version = %description.version,
            "Found function"
        );
        functions.push(Function::new(id, description));
    }
    Ok(functions)
}

/// Load the catalog file.
pub fn load(path: &Path, minimum: FunctionMode) -> Result<Vec<Function>, LauncherError> {
    tracing::debug!(path = %path.display(), minimum = %minimum, "Loading function catalog");
    let json = std::fs::read_to_string(path)
        .map_err(|e| LauncherError::Catalog(format!("{}: {}", path.display(), e)))?;
    let functions = parse(&json, minimum)?;
    tracing::info!(count = functions.len(), minimum = %minimum, "Loaded functions");
    Ok(functions)
}
