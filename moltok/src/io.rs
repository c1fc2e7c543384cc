use crate::core::*;
use log::debug;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod dcd_handler;
mod parm7_handler;
mod pdb_handler;
mod xyz_handler;

// Reexports
pub use dcd_handler::{DcdFileHandler, DcdHandlerError};
pub use parm7_handler::{Parm7FileHandler, Parm7HandlerError};
pub use pdb_handler::{PdbFileHandler, PdbHandlerError};
pub use xyz_handler::{xyz_element, XyzFileHandler, XyzHandlerError};

// There are the following kinds of files:
// (1)  Topology only (parm7, prmtop)
// (2)  Coordinates only, random access by frame (DCD)
// (3)  Topology + multiple models (PDB), random access via model offsets

/// Error of any file operation. Carries the file name.
#[derive(Error, Debug)]
#[error("in file {0}:")]
pub struct FileIoError(pub String, #[source] pub FileFormatError);

#[derive(Error, Debug)]
pub enum FileFormatError {
    #[error("in dcd format handler")]
    Dcd(#[from] DcdHandlerError),

    #[error("in pdb format handler")]
    Pdb(#[from] PdbHandlerError),

    #[error("in parm7 format handler")]
    Parm7(#[from] Parm7HandlerError),

    #[error("in xyz format handler")]
    Xyz(#[from] XyzHandlerError),

    #[error("file has no extension")]
    NoExtension,

    #[error("not a topology reading format")]
    NotTopologyReadFormat,

    #[error("not a trajectory reading format")]
    NotTrajectoryReadFormat,

    #[error("topology has {0} atoms but trajectory has {1}")]
    DifferentSizes(usize, usize),
}

pub(crate) fn get_ext(fname: &Path) -> Result<String, FileFormatError> {
    fname
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or(FileFormatError::NoExtension)
}

fn with_name<T>(fname: &Path, res: Result<T, FileFormatError>) -> Result<T, FileIoError> {
    res.map_err(|e| FileIoError(fname.display().to_string(), e))
}

fn topology_from_file(fname: &Path) -> Result<Topology, FileFormatError> {
    match get_ext(fname)?.as_str() {
        "parm7" | "prmtop" => Ok(Parm7FileHandler::open(fname)?.read_topology()?),
        "pdb" => Ok(PdbFileHandler::open(fname)?.read_topology()?),
        _ => Err(FileFormatError::NotTopologyReadFormat),
    }
}

/// Reads topology from `parm7`, `prmtop` or `pdb` file.
pub fn read_topology(fname: impl AsRef<Path>) -> Result<Topology, FileIoError> {
    let fname = fname.as_ref();
    let top = with_name(fname, topology_from_file(fname))?;
    debug!("Read topology of {} atoms from '{}'", top.len(), fname.display());
    Ok(top)
}

/// Writes a structure record as a single-model PDB file.
pub fn write_pdb_record(fname: impl AsRef<Path>, rec: &StructureRecord) -> Result<(), FileIoError> {
    let fname = fname.as_ref();
    let res = PdbFileHandler::create(fname).and_then(|mut h| h.write_record(rec));
    with_name(fname, res.map_err(FileFormatError::from))
}

/// Reads the first model of a PDB file as a structure record.
pub fn read_pdb_record(fname: impl AsRef<Path>) -> Result<StructureRecord, FileIoError> {
    let fname = fname.as_ref();
    let res = PdbFileHandler::open(fname).and_then(|h| h.read_model(0));
    let (top, st) = with_name(fname, res.map_err(FileFormatError::from))?;
    Ok(StructureRecord::from_frame(&top, &st))
}

/// Whether the trajectory can be read without conversion.
pub fn is_loadable_trajectory(fname: impl AsRef<Path>) -> bool {
    matches!(
        get_ext(fname.as_ref()).as_deref(),
        Ok("dcd") | Ok("pdb")
    )
}

enum TrajectorySource {
    Dcd(DcdFileHandler),
    Pdb(PdbFileHandler),
}

impl TrajectorySource {
    fn open(fname: &Path, natoms: usize) -> Result<Self, FileFormatError> {
        match get_ext(fname)?.as_str() {
            "dcd" => {
                let h = DcdFileHandler::open(fname)?;
                if h.num_atoms() != natoms {
                    return Err(FileFormatError::DifferentSizes(natoms, h.num_atoms()));
                }
                Ok(Self::Dcd(h))
            }
            "pdb" => Ok(Self::Pdb(PdbFileHandler::open(fname)?)),
            _ => Err(FileFormatError::NotTrajectoryReadFormat),
        }
    }

    fn read_frame(&self, fr: usize, natoms: usize) -> Result<State, FileFormatError> {
        Ok(match self {
            Self::Dcd(h) => h.read_frame(fr)?,
            Self::Pdb(h) => h.read_state(fr, natoms)?,
        })
    }
}

/// Topology plus random-access frames of a loadable trajectory file.
///
/// Frames are read on demand, each call opens its own read handle, so a
/// trajectory can be shared between worker threads.
pub struct Trajectory {
    topology: Topology,
    source: TrajectorySource,
    file_name: PathBuf,
}

impl Trajectory {
    pub fn open(top: Topology, traj_file: impl AsRef<Path>) -> Result<Self, FileIoError> {
        let traj_file = traj_file.as_ref();
        let source = with_name(traj_file, TrajectorySource::open(traj_file, top.len()))?;

        let traj = Self {
            topology: top,
            source,
            file_name: traj_file.to_owned(),
        };
        debug!(
            "Opened trajectory '{}' with {} frames",
            traj.file_name.display(),
            traj.num_frames()
        );
        Ok(traj)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn file_name(&self) -> &Path {
        &self.file_name
    }

    pub fn num_frames(&self) -> usize {
        match &self.source {
            TrajectorySource::Dcd(h) => h.num_frames(),
            TrajectorySource::Pdb(h) => h.num_models(),
        }
    }

    pub fn read_frame(&self, fr: usize) -> Result<State, FileIoError> {
        with_name(
            &self.file_name,
            self.source.read_frame(fr, self.topology.len()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn top(n: usize) -> Topology {
        Topology::new(
            (0..n)
                .map(|i| Atom {
                    name: "CA".into(),
                    resname: "ALA".into(),
                    resid: i as i32 + 1,
                    chain: 'A',
                    ..Atom::new()
                })
                .collect(),
        )
    }

    #[test]
    fn dcd_trajectory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("t.dcd");
        let mut w = DcdFileHandler::create(&path)?;
        for i in 0..3 {
            w.write_state(&State::new(vec![Pos::new(i as f32, 0.0, 0.0); 2]))?;
        }
        drop(w);

        let traj = Trajectory::open(top(2), &path)?;
        assert_eq!(traj.num_frames(), 3);
        assert_eq!(traj.read_frame(2)?.coords[1].x, 2.0);
        assert!(traj.read_frame(3).is_err());

        let err = Trajectory::open(top(5), &path).err().unwrap();
        assert!(matches!(err.1, FileFormatError::DifferentSizes(5, 2)));
        Ok(())
    }

    #[test]
    fn formats_by_extension() {
        assert!(is_loadable_trajectory("a/b.DCD"));
        assert!(is_loadable_trajectory("b.pdb"));
        assert!(!is_loadable_trajectory("b.nc"));
        assert!(!is_loadable_trajectory("noext"));
        assert!(matches!(
            read_topology("x.gro"),
            Err(FileIoError(_, FileFormatError::NotTopologyReadFormat))
        ));
        assert!(matches!(
            read_topology("x"),
            Err(FileIoError(_, FileFormatError::NoExtension))
        ));
    }
}
