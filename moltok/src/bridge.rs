use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use log::{debug, info};
use tempfile::{Builder, TempDir};
use thiserror::Error;

use crate::config::BridgeConfig;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("{program} failed with {status}: {stderr}")]
    ConversionFailure {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("can't run {0}, is it installed and in PATH?")]
    ToolNotFound(String, #[source] std::io::Error),

    #[error("{0} finished but did not produce {1}")]
    MissingOutput(String, PathBuf),

    #[error("unexpected io error")]
    Io(#[from] std::io::Error),
}

/// External program driven by an input script: `<program> <args...> <script>`.
///
/// The run succeeds only on zero exit status.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    program: String,
    args: Vec<String>,
}

impl ExternalTool {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn run_script(&self, script: &Path) -> Result<(), BridgeError> {
        debug!(
            "Running {} {} {}",
            self.program,
            self.args.join(" "),
            script.display()
        );
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(script)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => BridgeError::ToolNotFound(self.program.clone(), e),
                _ => BridgeError::Io(e),
            })?;

        if !output.status.success() {
            return Err(BridgeError::ConversionFailure {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }
}

/// Input script converting `traj` with topology `top` into DCD file `out`.
pub fn cpptraj_script(top: &Path, traj: &Path, out: &Path) -> String {
    format!(
        "parm {}\ntrajin {}\ntrajout {} dcd\ngo\n",
        top.display(),
        traj.display(),
        out.display()
    )
}

/// Conversion of arbitrary trajectory formats into DCD by an external tool.
pub struct FormatBridge {
    tool: ExternalTool,
    script_dir: Option<PathBuf>,
}

impl FormatBridge {
    pub fn new(tool: ExternalTool) -> Self {
        Self {
            tool,
            script_dir: None,
        }
    }

    pub fn from_config(cfg: &BridgeConfig) -> Self {
        Self::new(ExternalTool::new(&cfg.program, &cfg.args))
    }

    /// Directory for the input script, system temporary directory by default.
    pub fn with_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_dir = Some(dir.into());
        self
    }

    /// Path of the converted trajectory inside `workdir`.
    pub fn temporary_output(workdir: &TempDir) -> PathBuf {
        workdir.path().join("converted.dcd")
    }

    /// Converts the trajectory. The input script is removed afterwards in any case.
    pub fn convert(&self, top: &Path, traj: &Path, output: &Path) -> Result<(), BridgeError> {
        let mut builder = Builder::new();
        builder.prefix("moltok_").suffix(".in");
        let mut script = match &self.script_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        script.write_all(cpptraj_script(top, traj, output).as_bytes())?;
        script.flush()?;

        info!(
            "Converting '{}' to '{}' with {}...",
            traj.display(),
            output.display(),
            self.tool.program()
        );
        self.tool.run_script(script.path())?;

        if !output.exists() {
            return Err(BridgeError::MissingOutput(
                self.tool.program().to_owned(),
                output.to_owned(),
            ));
        }
        Ok(())
    }
}
