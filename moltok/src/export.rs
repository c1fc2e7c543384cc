use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use log::info;
use thiserror::Error;

use crate::{
    core::StructureRecord,
    io::{write_pdb_record, DcdFileHandler, FileFormatError, FileIoError, Trajectory, XyzFileHandler},
    sampler::FrameSampler,
};

/// Format of exported structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One `frame_<index>.xyz` per frame.
    Xyz,
    /// One `frame_<index>.pdb` per frame.
    Pdb,
    /// All frames in a single `frames.dcd`.
    Dcd,
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("unknown export format '{0}', expected xyz, pdb or dcd")]
    UnknownFormat(String),

    #[error("can't create output directory {0}")]
    OutputDir(PathBuf, #[source] std::io::Error),

    #[error("can't read frame {0}")]
    Read(usize, #[source] FileIoError),

    #[error(transparent)]
    Write(#[from] FileIoError),
}

impl FromStr for ExportFormat {
    type Err = ExportError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xyz" => Ok(Self::Xyz),
            "pdb" => Ok(Self::Pdb),
            "dcd" => Ok(Self::Dcd),
            _ => Err(ExportError::UnknownFormat(s.to_owned())),
        }
    }
}

impl Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Xyz => "xyz",
            Self::Pdb => "pdb",
            Self::Dcd => "dcd",
        };
        write!(f, "{s}")
    }
}

fn file_error<E: Into<FileFormatError>>(path: &Path, e: E) -> FileIoError {
    FileIoError(path.display().to_string(), e.into())
}

/// Writes sampled frames of the trajectory to `out_dir`, at most `limit` of them.
/// Returns the written files.
pub fn export_frames(
    traj: &Trajectory,
    sampler: &FrameSampler,
    format: ExportFormat,
    out_dir: &Path,
    limit: Option<usize>,
) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(out_dir).map_err(|e| ExportError::OutputDir(out_dir.to_owned(), e))?;

    let indices = sampler
        .indices(traj.num_frames())
        .take(limit.unwrap_or(usize::MAX));

    let mut written = vec![];
    let mut dcd: Option<(PathBuf, DcdFileHandler)> = None;

    for i in indices {
        let st = traj.read_frame(i).map_err(|e| ExportError::Read(i, e))?;
        match format {
            ExportFormat::Xyz => {
                let path = out_dir.join(format!("frame_{i}.xyz"));
                let comment = format!(
                    "Frame {i} from {}, converted to XYZ",
                    traj.file_name().display()
                );
                XyzFileHandler::create(&path)
                    .and_then(|mut h| h.write_frame(traj.topology(), &st, &comment))
                    .map_err(|e| file_error(&path, e))?;
                written.push(path);
            }
            ExportFormat::Pdb => {
                let path = out_dir.join(format!("frame_{i}.pdb"));
                write_pdb_record(&path, &StructureRecord::from_frame(traj.topology(), &st))?;
                written.push(path);
            }
            ExportFormat::Dcd => {
                if dcd.is_none() {
                    let path = out_dir.join("frames.dcd");
                    let h = DcdFileHandler::create(&path).map_err(|e| file_error(&path, e))?;
                    dcd = Some((path, h));
                }
                if let Some((path, h)) = dcd.as_mut() {
                    h.write_state(&st).map_err(|e| file_error(path, e))?;
                }
            }
        }
    }

    if let Some((path, _)) = dcd {
        written.push(path);
    }
    info!(
        "Exported {} {format} file(s) to '{}'",
        written.len(),
        out_dir.display()
    );
    Ok(written)
}
