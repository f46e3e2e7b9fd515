use std::path::{Path, PathBuf};
use std::process::Command;

use crate::domain::FaceAnalysisResult;
use crate::error::{RelayError, Result};

/// Face analysis of an assembled file. Blocking.
pub trait FaceAnalyzer: Send + Sync {
    fn analyze(&self, path: &Path) -> Result<Vec<FaceAnalysisResult>>;
}

/// Runs an external program with the file path as its last argument and
/// reads a JSON array of face results from its stdout.
#[derive(Clone, Debug)]
pub struct CommandAnalyzer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandAnalyzer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Whitespace separated `program arg...`; `None` when blank.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl FaceAnalyzer for CommandAnalyzer {
    fn analyze(&self, path: &Path) -> Result<Vec<FaceAnalysisResult>> {
        let out = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .output()
            .map_err(|e| {
                RelayError::Analysis(format!("spawn {}: {e}", self.program.display()))
            })?;
        if !out.status.success() {
            return Err(RelayError::Analysis(format!(
                "{} exited with {}: {}",
                self.program.display(),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        serde_json::from_slice(&out.stdout)
            .map_err(|e| RelayError::Analysis(format!("bad analyzer output: {e}")))
    }
}

/// Used when no analyzer is configured: every file has zero faces.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledAnalyzer;

impl FaceAnalyzer for DisabledAnalyzer {
    fn analyze(&self, _path: &Path) -> Result<Vec<FaceAnalysisResult>> {
        Ok(Vec::new())
    }
}
