use std::path::{Path, PathBuf};

use log::debug;
use tempfile::{Builder, NamedTempFile};

use crate::{
    core::*,
    io::{read_pdb_record, write_pdb_record, Trajectory},
    pipeline::{FrameError, PipelineError},
};

/// Turns trajectory frames into structure records with canonical residue names.
///
/// Each frame goes through a transient PDB file which is parsed back, renamed and
/// written out again as a corrected PDB.
pub struct Normalizer {
    mapping: ResidueNameMapping,
    scratch_dir: Option<PathBuf>,
    pdb_output_dir: Option<PathBuf>,
}

/// Normalized structure of one frame.
///
/// Owns the temporary PDB files of the frame, they are removed when it is dropped.
pub struct NormalizedFrame {
    index: usize,
    record: StructureRecord,
    renamed: usize,
    _raw_pdb: NamedTempFile,
    corrected_pdb: NamedTempFile,
}

impl NormalizedFrame {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn record(&self) -> &StructureRecord {
        &self.record
    }

    /// Number of residues renamed in this frame.
    pub fn num_renamed(&self) -> usize {
        self.renamed
    }

    pub fn corrected_pdb_path(&self) -> &Path {
        self.corrected_pdb.path()
    }
}

impl Normalizer {
    pub fn new(mapping: ResidueNameMapping) -> Self {
        Self {
            mapping,
            scratch_dir: None,
            pdb_output_dir: None,
        }
    }

    /// Directory for temporary files, system temporary directory by default.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Corrected structures are also kept there as `frame_<index>.pdb`.
    pub fn with_pdb_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pdb_output_dir = Some(dir.into());
        self
    }

    fn temp_pdb(&self, prefix: &str) -> Result<NamedTempFile, FrameError> {
        let mut b = Builder::new();
        b.prefix(prefix).suffix(".pdb");
        match &self.scratch_dir {
            Some(dir) => b.tempfile_in(dir),
            None => b.tempfile(),
        }
        .map_err(FrameError::Scratch)
    }

    /// Resolves the chain to tokenize from frame 0: the first chain of its structure.
    pub fn bootstrap(&self, traj: &Trajectory) -> Result<ChainId, PipelineError> {
        if traj.num_frames() == 0 {
            return Err(PipelineError::EmptyTrajectory);
        }
        // A frame without atoms has no chains, and no PDB to parse back
        if traj.topology().is_empty() {
            return Err(PipelineError::NoChainFound);
        }
        let frame = self.normalize(traj, 0).map_err(PipelineError::Bootstrap)?;
        let chain = frame
            .record()
            .first_chain()
            .ok_or(PipelineError::NoChainFound)?;
        debug!("Chain {chain} is taken from frame 0");
        Ok(chain)
    }

    pub fn normalize(&self, traj: &Trajectory, index: usize) -> Result<NormalizedFrame, FrameError> {
        let state = traj
            .read_frame(index)
            .map_err(|e| FrameError::Read(index, e))?;

        let raw_pdb = self.temp_pdb("moltok_raw_")?;
        write_pdb_record(
            raw_pdb.path(),
            &StructureRecord::from_frame(traj.topology(), &state),
        )
        .map_err(FrameError::WriteStructure)?;

        let mut record =
            read_pdb_record(raw_pdb.path()).map_err(FrameError::StructuralParseFailure)?;
        let renamed = self.mapping.apply(&mut record);

        let corrected_pdb = self.temp_pdb("moltok_corrected_")?;
        write_pdb_record(corrected_pdb.path(), &record).map_err(FrameError::WriteStructure)?;

        if let Some(dir) = &self.pdb_output_dir {
            let dest = dir.join(format!("frame_{index}.pdb"));
            std::fs::copy(corrected_pdb.path(), &dest).map_err(|e| FrameError::Export(dest, e))?;
        }

        debug!("Frame {index}: {renamed} residues renamed");
        Ok(NormalizedFrame {
            index,
            record,
            renamed,
            _raw_pdb: raw_pdb,
            corrected_pdb,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::DcdFileHandler;
    use anyhow::Result;

    fn atom(name: &str, resname: &str, resid: i32) -> Atom {
        let mut at = Atom {
            name: name.into(),
            resname: resname.into(),
            resid,
            chain: 'A',
            ..Atom::new()
        };
        at.guess_element_from_name();
        at
    }

    fn trajectory(dir: &Path, nframes: usize) -> Result<Trajectory> {
        let top = Topology::new(vec![
            atom("N", "AS4", 5),
            atom("CA", "AS4", 5),
            atom("N", "HIE", 6),
            atom("CA", "HIE", 6),
            atom("N", "GLY", 7),
        ]);
        let path = dir.join("t.dcd");
        let mut w = DcdFileHandler::create(&path)?;
        for i in 0..nframes.max(1) {
            let coords = (0..top.len())
                .map(|j| Pos::new(i as f32, j as f32, 1.5))
                .collect();
            w.write_state(&State::new(coords))?;
        }
        drop(w);
        if nframes == 0 {
            // Header only: strip the single frame of three coordinate records
            let f = std::fs::OpenOptions::new().write(true).open(&path)?;
            let len = f.metadata()?.len();
            f.set_len(len - 3 * (4 * top.len() as u64 + 8))?;
        }
        Ok(Trajectory::open(top, &path)?)
    }

    #[test]
    fn normalize_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let scratch = tempfile::tempdir()?;
        let out = tempfile::tempdir()?;
        let traj = trajectory(dir.path(), 3)?;
        let norm = Normalizer::new(ResidueNameMapping::default())
            .with_scratch_dir(scratch.path())
            .with_pdb_output_dir(out.path());

        let fr = norm.normalize(&traj, 2)?;
        assert_eq!(fr.index(), 2);
        assert_eq!(fr.num_renamed(), 2);
        let res: Vec<_> = fr
            .record()
            .iter_residues()
            .map(|r| (r.name.to_string(), r.number))
            .collect();
        assert_eq!(
            res,
            vec![("ASP".into(), 5), ("HIS".into(), 6), ("GLY".into(), 7)]
        );
        assert_eq!(fr.record().chains[0].residues[1].atoms[0].pos.x, 2.0);

        let corrected = std::fs::read_to_string(fr.corrected_pdb_path())?;
        assert!(corrected.contains("HIS A   6"));
        assert!(!corrected.contains("HIE"));
        assert!(out.path().join("frame_2.pdb").exists());

        // Temporary files go away with the frame
        assert_eq!(std::fs::read_dir(scratch.path())?.count(), 2);
        drop(fr);
        assert_eq!(std::fs::read_dir(scratch.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn bootstrap_chain() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let norm = Normalizer::new(ResidueNameMapping::default());
        assert_eq!(norm.bootstrap(&trajectory(dir.path(), 2)?)?, ChainId('A'));

        let empty_dir = tempfile::tempdir()?;
        assert!(matches!(
            norm.bootstrap(&trajectory(empty_dir.path(), 0)?),
            Err(PipelineError::EmptyTrajectory)
        ));

        // Frame without atoms
        let no_atoms_dir = tempfile::tempdir()?;
        let path = no_atoms_dir.path().join("empty.dcd");
        let mut w = DcdFileHandler::create(&path)?;
        w.write_state(&State::default())?;
        drop(w);
        let traj = Trajectory::open(Topology::default(), &path)?;
        assert_eq!(traj.num_frames(), 1);
        assert!(matches!(
            norm.bootstrap(&traj),
            Err(PipelineError::NoChainFound)
        ));
        Ok(())
    }

    #[test]
    fn frame_out_of_range() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let traj = trajectory(dir.path(), 1)?;
        let res = Normalizer::new(ResidueNameMapping::default()).normalize(&traj, 5);
        assert!(matches!(res, Err(FrameError::Read(5, _))));
        Ok(())
    }
}
