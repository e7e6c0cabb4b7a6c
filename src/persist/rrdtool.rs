use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::{PersistError, RoundRobinStore, RrdSchema};

/// Backend that drives the `rrdtool` command-line utility.
///
/// Every create and update spawns one short-lived process in the data
/// directory. The database step equals the slice interval.
#[derive(Debug, Clone)]
pub struct RrdTool {
    tool: PathBuf,
    data_dir: PathBuf,
    step: u64,
}

impl RrdTool {
    pub fn new(tool: impl Into<PathBuf>, data_dir: impl Into<PathBuf>, step: u64) -> Self {
        Self {
            tool: tool.into(),
            data_dir: data_dir.into(),
            step: step.max(1),
        }
    }

    /// Arguments for `rrdtool create`.
    pub fn create_args(&self, path: &Path, start: i64, schema: &RrdSchema) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            path.display().to_string(),
            "--step".to_string(),
            self.step.to_string(),
            "--start".to_string(),
            start.to_string(),
        ];
        args.extend(schema.definitions(self.step));
        args
    }

    /// Arguments for `rrdtool update`: `time:v1:v2:...`.
    pub fn update_args(path: &Path, time: i64, values: &[i64]) -> Vec<String> {
        let mut point = time.to_string();
        for value in values {
            point.push(':');
            point.push_str(&value.to_string());
        }
        vec!["update".to_string(), path.display().to_string(), point]
    }

    async fn run(&self, command: &'static str, path: &Path, args: Vec<String>) -> Result<(), PersistError> {
        debug!(tool = %self.tool.display(), args = ?args, "running rrdtool");

        let status = Command::new(&self.tool)
            .args(&args)
            .current_dir(&self.data_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| PersistError::Spawn {
                tool: self.tool.clone(),
                source,
            })?;

        if !status.success() {
            return Err(PersistError::Failed {
                command,
                file: path.to_path_buf(),
                status,
            });
        }

        Ok(())
    }
}

impl RoundRobinStore for RrdTool {
    fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    async fn create(&self, path: &Path, start: i64, schema: &RrdSchema) -> Result<(), PersistError> {
        let args = self.create_args(path, start, schema);
        self.run("create", path, args).await
    }

    async fn update(&self, path: &Path, time: i64, values: &[i64]) -> Result<(), PersistError> {
        self.run("update", path, Self::update_args(path, time, values)).await
    }
}
