use std::io;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::debug;
use vss_core::Percent;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} {verb} failed ({status}): {message}")]
    Failed {
        program: String,
        verb: String,
        status: String,
        message: String,
    },
}

pub trait ShadowStorageAdmin {
    fn list_shadow_storage(&self) -> Result<String, CommandError>;

    /// Changes the quota of an existing association. Zero removes the allocation.
    fn resize_shadow_storage(&self, drive: &str, storage_volume: &str, max_size: Percent) -> Result<(), CommandError>;

    fn add_shadow_storage(&self, drive: &str, storage_volume: &str, max_size: Percent) -> Result<(), CommandError>;
}

pub fn quota_args(verb: &str, drive: &str, storage_volume: &str, max_size: Percent) -> Vec<String> {
    vec![
        verb.to_string(),
        "shadowstorage".to_string(),
        format!("/For={}:", drive),
        format!("/On={}:", storage_volume),
        format!("/MaxSize={}", max_size),
    ]
}

#[derive(Debug, Clone)]
pub struct VssAdmin {
    program: PathBuf,
}

impl Default for VssAdmin {
    fn default() -> Self {
        Self::new("vssadmin.exe")
    }
}

impl VssAdmin {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[String]) -> Result<String, CommandError> {
        let program = self.program.display().to_string();
        debug!(%program, ?args, "running");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| CommandError::Spawn {
                program: program.clone(),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }
        // vssadmin reports most errors on stdout.
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
        Err(CommandError::Failed {
            program,
            verb: args.iter().take(2).cloned().collect::<Vec<_>>().join(" "),
            status: output.status.to_string(),
            message: message.to_string(),
        })
    }
}

impl ShadowStorageAdmin for VssAdmin {
    fn list_shadow_storage(&self) -> Result<String, CommandError> {
        self.run(&["list".to_string(), "shadowstorage".to_string()])
    }

    fn resize_shadow_storage(&self, drive: &str, storage_volume: &str, max_size: Percent) -> Result<(), CommandError> {
        self.run(&quota_args("resize", drive, storage_volume, max_size))
            .map(|_| ())
    }

    fn add_shadow_storage(&self, drive: &str, storage_volume: &str, max_size: Percent) -> Result<(), CommandError> {
        self.run(&quota_args("add", drive, storage_volume, max_size)).map(|_| ())
    }
}
