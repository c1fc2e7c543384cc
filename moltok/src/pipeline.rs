use std::{
    error::Error,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Table};
use log::{info, warn};
use rayon::prelude::*;
use tempfile::TempDir;
use thiserror::Error;

use crate::{
    bridge::{BridgeError, FormatBridge},
    config::{BridgeConfig, ConfigError, PipelineConfig},
    core::*,
    encoder::{encoded_residue_numbers, EncodeError, StructureEncoder},
    io::{is_loadable_trajectory, read_topology, FileIoError, Trajectory},
    normalize::Normalizer,
    sampler::FrameSampler,
};

/// Failure of a single frame. The frame is skipped and the run goes on.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("can't read frame {0}")]
    Read(usize, #[source] FileIoError),

    #[error("can't create temporary structure file")]
    Scratch(#[source] std::io::Error),

    #[error("can't write structure")]
    WriteStructure(#[source] FileIoError),

    #[error("can't parse structure of the frame")]
    StructuralParseFailure(#[source] FileIoError),

    #[error("can't save structure to {0}")]
    Export(PathBuf, #[source] std::io::Error),

    #[error("chain {0} is not found")]
    ChainNotFound(ChainId),

    #[error("encoding failed")]
    Encoding(#[from] EncodeError),
}

/// Failure of the whole run. No token map is written.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("trajectory conversion failed")]
    Bridge(#[from] BridgeError),

    #[error("can't load trajectory")]
    Trajectory(#[from] FileIoError),

    #[error("no chain found in the first frame")]
    NoChainFound,

    #[error("can't process the first frame")]
    Bootstrap(#[source] FrameError),

    #[error("trajectory has no frames")]
    EmptyTrajectory,

    #[error("can't create working directory")]
    Workdir(#[source] std::io::Error),

    #[error("can't create output directory {0}")]
    OutputDir(PathBuf, #[source] std::io::Error),

    #[error("can't start worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("can't save token map")]
    TokenMap(#[from] TokenMapError),
}

/// Message of the error followed by all its sources.
pub fn error_chain(err: &dyn Error) -> String {
    let mut s = err.to_string();
    let mut cur = err.source();
    while let Some(e) = cur {
        s.push_str(": ");
        s.push_str(&e.to_string());
        cur = e.source();
    }
    s
}

/// Creates a per-run working directory.
pub fn workdir() -> Result<TempDir, PipelineError> {
    tempfile::Builder::new()
        .prefix("moltok_")
        .tempdir()
        .map_err(PipelineError::Workdir)
}

/// Loads the trajectory, converting it with the external tool first if it is not
/// in a directly readable format. The converted file lives in `workdir`.
pub fn load_trajectory(
    topology: &Path,
    trajectory: &Path,
    bridge: &BridgeConfig,
    workdir: &TempDir,
) -> Result<Trajectory, PipelineError> {
    let top = read_topology(topology)?;
    info!(
        "Topology loaded from '{}': {} atoms, {} residues",
        topology.display(),
        top.len(),
        top.num_residues()
    );

    let traj_file = if is_loadable_trajectory(trajectory) {
        info!(
            "Trajectory '{}' is read directly, conversion is skipped",
            trajectory.display()
        );
        trajectory.to_owned()
    } else {
        let out = FormatBridge::temporary_output(workdir);
        FormatBridge::from_config(bridge)
            .with_script_dir(workdir.path())
            .convert(topology, trajectory, &out)?;
        out
    };

    let traj = Trajectory::open(top, &traj_file)?;
    info!("Trajectory has {} frames", traj.num_frames());
    Ok(traj)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFrame {
    pub index: usize,
    pub reason: String,
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub total_frames: usize,
    pub stride: usize,
    pub chain: Option<ChainId>,
    pub encoded: Vec<usize>,
    pub skipped: Vec<SkippedFrame>,
    pub token_map: PathBuf,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn num_sampled(&self) -> usize {
        self.encoded.len() + self.skipped.len()
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![Cell::new("Frames"), Cell::new("Count")])
            .add_row(vec!["total".to_string(), self.total_frames.to_string()])
            .add_row(vec![
                format!("sampled (stride {})", self.stride),
                self.num_sampled().to_string(),
            ])
            .add_row(vec!["encoded".to_string(), self.encoded.len().to_string()])
            .add_row(vec!["skipped".to_string(), self.skipped.len().to_string()])
            .add_row(vec!["time".to_string(), format!("{:.3?}", self.elapsed)]);
        for sk in &self.skipped {
            table.add_row(vec![format!("  frame {}", sk.index), sk.reason.clone()]);
        }
        table
    }
}

/// Tokenization of sampled trajectory frames.
pub struct Pipeline<'a, E: StructureEncoder + ?Sized> {
    config: &'a PipelineConfig,
    encoder: &'a E,
}

impl<'a, E: StructureEncoder + ?Sized> Pipeline<'a, E> {
    pub fn new(config: &'a PipelineConfig, encoder: &'a E) -> Self {
        Self { config, encoder }
    }

    /// Runs all stages and writes the token map. Frames that fail are skipped
    /// and reported. Nothing is written if the run fails as a whole.
    pub fn run(&self) -> Result<RunReport, PipelineError> {
        let cfg = self.config;
        cfg.validate_for_run()?;
        let sampler = FrameSampler::new(cfg.stride)?;

        let start = Instant::now();
        let workdir = workdir()?;
        let traj = load_trajectory(&cfg.topology, &cfg.trajectory, &cfg.bridge, &workdir)?;

        let mut normalizer =
            Normalizer::new(cfg.residue_mapping()?).with_scratch_dir(workdir.path());
        if let Some(dir) = &cfg.pdb_output_dir {
            std::fs::create_dir_all(dir).map_err(|e| PipelineError::OutputDir(dir.clone(), e))?;
            normalizer = normalizer.with_pdb_output_dir(dir);
        }

        let chain = normalizer.bootstrap(&traj)?;
        info!("Tokenizing chain {chain}");

        let indices: Vec<usize> = sampler.indices(traj.num_frames()).collect();
        info!(
            "Processing {} of {} frames with stride {} on {} worker(s)...",
            indices.len(),
            traj.num_frames(),
            sampler.stride(),
            cfg.workers
        );

        let process = |i: &usize| (*i, self.process_frame(&normalizer, &traj, &chain, *i));
        let results: Vec<(usize, Result<FrameTokenMap, FrameError>)> = if cfg.workers > 1 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(cfg.workers)
                .build()?
                .install(|| indices.par_iter().map(process).collect())
        } else {
            indices.iter().map(process).collect()
        };

        let mut report = RunReport {
            total_frames: traj.num_frames(),
            stride: sampler.stride(),
            chain: Some(chain),
            token_map: cfg.token_map.clone(),
            ..Default::default()
        };
        let mut token_map = TokenMap::new();
        for (i, res) in results {
            match res {
                Ok(tokens) => {
                    token_map.insert_frame(i, tokens);
                    report.encoded.push(i);
                }
                Err(e) => {
                    let reason = error_chain(&e);
                    warn!("Frame {i} is skipped: {reason}");
                    report.skipped.push(SkippedFrame { index: i, reason });
                }
            }
        }

        token_map.save(&cfg.token_map)?;
        report.elapsed = start.elapsed();
        info!("Total run time: {:.3?}", report.elapsed);
        Ok(report)
    }

    fn process_frame(
        &self,
        normalizer: &Normalizer,
        traj: &Trajectory,
        chain: &ChainId,
        i: usize,
    ) -> Result<FrameTokenMap, FrameError> {
        let start = Instant::now();
        let frame = normalizer.normalize(traj, i)?;
        let residues = frame
            .record()
            .chain(chain)
            .map(encoded_residue_numbers)
            .ok_or(FrameError::ChainNotFound(*chain))?;
        let tokens = self.encoder.encode(&frame, chain)?;
        let map = self.config.alignment.align(i, &residues, &tokens)?;
        info!(
            "Processed frame {i} in {:.3?}, collected {} tokens",
            start.elapsed(),
            map.len()
        );
        Ok(map)
    }
}
