use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use vss_core::{normalize_drive_name, Ensure, Percent, ResourceSpec, RuleError, ScheduleRule};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("drive `{drive}`: {source}")]
    Rule {
        drive: String,
        #[source]
        source: RuleError,
    },
    #[error("drive `{drive}`: schedule rule {position} has no start_time")]
    MissingStartTime { drive: String, position: usize },
    #[error("drive `{drive}` is declared more than once")]
    Duplicate { drive: String },
    #[error("drive name `{0}` is not a drive letter")]
    DriveName(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub name: String,
    pub ensure: Ensure,
    pub storage_volume: Option<String>,
    pub storage_space: Option<Percent>,
    /// `None` leaves the snapshot triggers unmanaged.
    pub schedule: Option<Vec<ScheduleRule>>,
}

impl DesiredState {
    pub fn new(name: &str, ensure: Ensure) -> Self {
        Self {
            name: normalize_drive_name(name),
            ensure,
            storage_volume: None,
            storage_space: None,
            schedule: None,
        }
    }

    pub fn from_spec(name: &str, spec: &ResourceSpec) -> Result<Self, ManifestError> {
        let drive = normalize_drive_name(name);
        if drive.len() != 1 || !drive.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ManifestError::DriveName(name.to_string()));
        }
        let schedule = spec.desired_schedule().map_err(|source| ManifestError::Rule {
            drive: drive.clone(),
            source,
        })?;
        if let Some(rules) = &schedule {
            if let Some(position) = rules.iter().position(|rule| rule.start_time.is_none()) {
                return Err(ManifestError::MissingStartTime { drive, position });
            }
        }
        Ok(Self {
            name: drive,
            ensure: spec.ensure,
            storage_volume: spec.storage_volume.as_deref().map(normalize_drive_name),
            storage_space: spec.storage_space,
            schedule,
        })
    }
}

impl Manifest {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parse YAML manifest")
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parse JSON manifest")
    }

    pub fn resources(&self) -> Result<Vec<DesiredState>, ManifestError> {
        let mut seen = BTreeMap::new();
        for (name, spec) in &self.resources {
            let desired = DesiredState::from_spec(name, spec)?;
            if seen.contains_key(&desired.name) {
                return Err(ManifestError::Duplicate { drive: desired.name });
            }
            seen.insert(desired.name.clone(), desired);
        }
        Ok(seen.into_values().collect())
    }
}

/// Reads a manifest, choosing JSON for `.json` files and YAML otherwise.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Vec<DesiredState>> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("read manifest {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let parsed = if is_json {
        Manifest::from_json(&data)
    } else {
        Manifest::from_yaml(&data)
    };
    let manifest = parsed.with_context(|| format!("load manifest {}", path.display()))?;
    let resources = manifest
        .resources()
        .with_context(|| format!("validate manifest {}", path.display()))?;
    Ok(resources)
}
