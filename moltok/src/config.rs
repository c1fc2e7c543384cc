use std::{collections::BTreeMap, path::{Path, PathBuf}};

use serde::Deserialize;
use thiserror::Error;

use crate::core::{ResidueMappingError, ResidueNameMapping};
use crate::encoder::AlignmentPolicy;

/// Default distance between sampled frames.
pub const DEFAULT_STRIDE: usize = 25;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("stride must be positive")]
    ZeroStride,

    #[error("number of workers must be positive")]
    ZeroWorkers,

    #[error("{0} path is not set")]
    MissingPath(&'static str),

    #[error("credential is not set in environment variable {0}")]
    MissingCredential(String),

    #[error("can't read config file {0}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("malformed config")]
    Toml(#[from] toml::de::Error),

    #[error("invalid residue name mapping")]
    ResidueMapping(#[from] ResidueMappingError),
}

/// External conversion tool.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub program: String,
    /// Arguments placed before the script path.
    pub args: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: "cpptraj".into(),
            args: vec!["-i".into()],
        }
    }
}

/// Structural encoding service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderConfig {
    pub url: String,
    pub model: String,
    /// Environment variable holding the access token.
    pub token_env: String,
    pub timeout_secs: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            url: "https://forge.evolutionaryscale.ai".into(),
            model: "esm3-open-2024-03".into(),
            token_env: "ESM_FORGE_TOKEN".into(),
            timeout_secs: 120,
        }
    }
}

/// Settings of one tokenization run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub topology: PathBuf,
    pub trajectory: PathBuf,
    pub token_map: PathBuf,
    pub stride: usize,
    pub workers: usize,
    pub pdb_output_dir: Option<PathBuf>,
    pub alignment: AlignmentPolicy,
    pub bridge: BridgeConfig,
    pub encoder: EncoderConfig,
    /// Extra residue renamings merged over the built-in table.
    pub residue_names: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topology: PathBuf::new(),
            trajectory: PathBuf::new(),
            token_map: "tokens.json".into(),
            stride: DEFAULT_STRIDE,
            workers: 1,
            pdb_output_dir: None,
            alignment: AlignmentPolicy::default(),
            bridge: BridgeConfig::default(),
            encoder: EncoderConfig::default(),
            residue_names: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn new(
        topology: impl Into<PathBuf>,
        trajectory: impl Into<PathBuf>,
        token_map: impl Into<PathBuf>,
    ) -> Self {
        Self {
            topology: topology.into(),
            trajectory: trajectory.into(),
            token_map: token_map.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_owned(), e))?;
        Self::from_toml_str(&s)
    }

    /// Checks everything that can be checked before the run starts.
    /// Paths may still be empty when they come from the command line later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stride == 0 {
            return Err(ConfigError::ZeroStride);
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        self.residue_mapping()?;
        Ok(())
    }

    /// Like [validate](Self::validate) but also requires all paths to be set.
    pub fn validate_for_run(&self) -> Result<(), ConfigError> {
        self.validate()?;
        for (name, p) in [
            ("topology", &self.topology),
            ("trajectory", &self.trajectory),
            ("token map", &self.token_map),
        ] {
            if p.as_os_str().is_empty() {
                return Err(ConfigError::MissingPath(name));
            }
        }
        Ok(())
    }

    pub fn residue_mapping(&self) -> Result<ResidueNameMapping, ConfigError> {
        Ok(ResidueNameMapping::with_extra(
            self.residue_names
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn full_config() -> Result<()> {
        let cfg = PipelineConfig::from_toml_str(
            r#"
            topology = "/data/sys.parm7"
            trajectory = "/data/sys.nc"
            token_map = "out/tokens.json"
            stride = 10
            workers = 4
            pdb_output_dir = "pdb"
            alignment = "fail"

            [bridge]
            program = "/opt/amber/bin/cpptraj"

            [encoder]
            url = "http://localhost:8000"
            timeout_secs = 5

            [residue_names]
            HSD = "HIS"
            "#,
        )?;
        assert_eq!(cfg.stride, 10);
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.alignment, AlignmentPolicy::Fail);
        assert_eq!(cfg.bridge.args, vec!["-i".to_string()]);
        assert_eq!(cfg.encoder.token_env, "ESM_FORGE_TOKEN");
        assert_eq!(cfg.encoder.timeout_secs, 5);
        assert_eq!(cfg.pdb_output_dir, Some(PathBuf::from("pdb")));
        assert_eq!(cfg.residue_mapping()?.canonical("HSD"), Some("HIS"));
        cfg.validate_for_run()?;
        Ok(())
    }

    #[test]
    fn defaults() -> Result<()> {
        let cfg = PipelineConfig::from_toml_str("")?;
        assert_eq!(cfg.stride, DEFAULT_STRIDE);
        assert_eq!(cfg.workers, 1);
        assert_eq!(cfg.alignment, AlignmentPolicy::Truncate);
        assert_eq!(cfg.bridge.program, "cpptraj");
        assert!(matches!(
            cfg.validate_for_run(),
            Err(ConfigError::MissingPath("topology"))
        ));
        Ok(())
    }

    #[test]
    fn rejected_configs() {
        assert!(matches!(
            PipelineConfig::from_toml_str("stride = 0"),
            Err(ConfigError::ZeroStride)
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("workers = 0"),
            Err(ConfigError::ZeroWorkers)
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("[residue_names]\nXXX = \"HIP\""),
            Err(ConfigError::ResidueMapping(_))
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("strid = 3"),
            Err(ConfigError::Toml(_))
        ));
    }
}
