use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use vss_core::{now_utc_rfc3339, StorageRecord, STORAGE_SCHEMA_VERSION};

#[derive(Debug, Serialize)]
pub struct ReportPaths {
    pub run_id: String,
    pub root: PathBuf,
    pub run_json: PathBuf,
    pub storage_json: PathBuf,
}

#[derive(Debug, Serialize)]
struct RunMetadata {
    run_id: String,
    created_at_utc: String,
    storage_schema_version: String,
    summary: Option<Value>,
}

pub fn create_report_bundle(
    base: impl AsRef<Path>,
    records: &[StorageRecord],
    summary: Option<Value>,
) -> Result<ReportPaths> {
    let run_id = Uuid::new_v4().to_string();
    let root = base.as_ref().join("reports").join(&run_id);
    std::fs::create_dir_all(&root)
        .with_context(|| format!("create report directory {}", root.display()))?;

    let run_json = root.join("run.json");
    let storage_json = root.join("storage.json");

    std::fs::write(&storage_json, serde_json::to_string_pretty(records)?)
        .with_context(|| format!("write {}", storage_json.display()))?;

    let run_meta = RunMetadata {
        run_id: run_id.clone(),
        created_at_utc: now_utc_rfc3339(),
        storage_schema_version: STORAGE_SCHEMA_VERSION.to_string(),
        summary,
    };
    std::fs::write(&run_json, serde_json::to_string_pretty(&run_meta)?)
        .with_context(|| format!("write {}", run_json.display()))?;

    Ok(ReportPaths {
        run_id,
        root,
        run_json,
        storage_json,
    })
}
