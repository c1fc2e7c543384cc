use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write},
    num::{ParseFloatError, ParseIntError},
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::core::*;

/// Reader and writer of PDB files.
///
/// Multi-model files are read as trajectories: the topology comes from the first model
/// and every model is a frame. Byte offsets of models are indexed when the file is opened.
pub enum PdbFileHandler {
    Reader(PdbReader),
    Writer(BufWriter<File>),
}

pub struct PdbReader {
    path: PathBuf,
    model_offsets: Vec<u64>,
}

#[derive(Debug, Error)]
pub enum PdbHandlerError {
    #[error("unexpected io error")]
    Io(#[from] std::io::Error),

    #[error("can't open pdb file for reading")]
    OpenRead(#[source] std::io::Error),

    #[error("can't open pdb file for writing")]
    OpenWrite(#[source] std::io::Error),

    #[error("line {0}: incomplete {1} entry")]
    AtomEntry(usize, &'static str),

    #[error("line {0}: invalid integer")]
    ParseInt(usize, #[source] ParseIntError),

    #[error("line {0}: invalid coordinate")]
    ParseFloat(usize, #[source] ParseFloatError),

    #[error("model {0} is out of range 0:{1}")]
    ModelOutOfRange(usize, usize),

    #[error("model {0} has {1} atoms instead of {2}")]
    ModelSize(usize, usize, usize),

    #[error("no atoms found")]
    NoAtoms,
}

enum PdbRecord {
    Atom,
    Hetatm,
    Model,
    EndModel,
    End,
    Other,
}

fn get_pdb_record(line: &str) -> PdbRecord {
    if line.starts_with("ATOM") {
        PdbRecord::Atom
    } else if line.starts_with("HETATM") {
        PdbRecord::Hetatm
    } else if line.starts_with("MODEL") {
        PdbRecord::Model
    } else if line.starts_with("ENDMDL") {
        PdbRecord::EndModel
    } else if line.starts_with("END") {
        PdbRecord::End
    } else {
        PdbRecord::Other
    }
}

fn field<'a>(line: &'a str, lnum: usize, r: std::ops::Range<usize>, what: &'static str) -> Result<&'a str, PdbHandlerError> {
    line.get(r).ok_or(PdbHandlerError::AtomEntry(lnum, what))
}

fn char_at(line: &str, i: usize) -> char {
    line.as_bytes().get(i).map_or(' ', |b| *b as char)
}

fn parse_atom_line(line: &str, lnum: usize) -> Result<(Atom, Pos), PdbHandlerError> {
    let coord = |r, what| -> Result<f32, PdbHandlerError> {
        field(line, lnum, r, what)?
            .trim()
            .parse::<f32>()
            .map_err(|e| PdbHandlerError::ParseFloat(lnum, e))
    };

    let mut at = Atom {
        name: field(line, lnum, 12..16, "name")?.trim().into(),
        resname: field(line, lnum, 17..20, "resname")?.trim().into(),
        chain: char_at(line, 21),
        resid: field(line, lnum, 22..26, "resid")?
            .trim()
            .parse::<i32>()
            .map_err(|e| PdbHandlerError::ParseInt(lnum, e))?,
        icode: char_at(line, 26),
        hetero: line.starts_with("HETATM"),
        ..Atom::new()
    };

    // Element column is optional
    match line.get(76..78).and_then(atomic_number_from_symbol) {
        Some(an) => at.atomic_number = an,
        None => at.guess_element_from_name(),
    }

    let pos = Pos::new(coord(30..38, "x")?, coord(38..46, "y")?, coord(46..54, "z")?);
    Ok((at, pos))
}

/// Reads atoms of one model starting at the current position of `reader`.
fn read_model<R: BufRead>(reader: &mut R) -> Result<(Vec<Atom>, Vec<Pos>), PdbHandlerError> {
    let mut atoms = vec![];
    let mut coords = vec![];
    let mut line = String::new();
    let mut lnum = 0;
    let mut seen_model = false;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        lnum += 1;
        match get_pdb_record(&line) {
            PdbRecord::Atom | PdbRecord::Hetatm => {
                // Keep only the first alternative location
                if !matches!(char_at(&line, 16), ' ' | 'A') {
                    continue;
                }
                let (at, pos) = parse_atom_line(line.trim_end_matches(['\n', '\r']), lnum)?;
                atoms.push(at);
                coords.push(pos);
            }
            PdbRecord::Model => {
                if seen_model || !atoms.is_empty() {
                    break;
                }
                seen_model = true;
            }
            PdbRecord::EndModel | PdbRecord::End => break,
            PdbRecord::Other => {}
        }
    }
    Ok((atoms, coords))
}

impl PdbFileHandler {
    pub fn open(fname: impl AsRef<Path>) -> Result<Self, PdbHandlerError> {
        let path = fname.as_ref().to_owned();
        let mut reader = BufReader::new(File::open(&path).map_err(PdbHandlerError::OpenRead)?);

        // Index MODEL records
        let mut model_offsets = vec![];
        let mut offset = 0u64;
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            if line.starts_with("MODEL") {
                model_offsets.push(offset);
            }
            offset += n as u64;
        }
        // A file without MODEL records is a single model
        if model_offsets.is_empty() {
            model_offsets.push(0);
        }

        Ok(Self::Reader(PdbReader {
            path,
            model_offsets,
        }))
    }

    pub fn create(fname: impl AsRef<Path>) -> Result<Self, PdbHandlerError> {
        Ok(Self::Writer(BufWriter::new(
            File::create(fname).map_err(PdbHandlerError::OpenWrite)?,
        )))
    }

    pub fn num_models(&self) -> usize {
        match self {
            Self::Reader(r) => r.model_offsets.len(),
            Self::Writer(_) => 0,
        }
    }

    /// Reads topology and coordinates of model `i`.
    pub fn read_model(&self, i: usize) -> Result<(Topology, State), PdbHandlerError> {
        let Self::Reader(r) = self else {
            unreachable!()
        };
        let offset = *r
            .model_offsets
            .get(i)
            .ok_or(PdbHandlerError::ModelOutOfRange(i, r.model_offsets.len()))?;

        let mut reader = BufReader::new(File::open(&r.path).map_err(PdbHandlerError::OpenRead)?);
        reader.seek(SeekFrom::Start(offset))?;
        let (atoms, coords) = read_model(&mut reader)?;
        if atoms.is_empty() {
            return Err(PdbHandlerError::NoAtoms);
        }
        Ok((Topology::new(atoms), State::new(coords)))
    }

    pub fn read_topology(&self) -> Result<Topology, PdbHandlerError> {
        Ok(self.read_model(0)?.0)
    }

    /// Reads coordinates of model `i` and checks that it has `natoms` atoms.
    pub fn read_state(&self, i: usize, natoms: usize) -> Result<State, PdbHandlerError> {
        let (_, st) = self.read_model(i)?;
        if st.len() != natoms {
            return Err(PdbHandlerError::ModelSize(i, st.len(), natoms));
        }
        Ok(st)
    }

    /// Writes the record as a single structure terminated by END.
    pub fn write_record(&mut self, rec: &StructureRecord) -> Result<(), PdbHandlerError> {
        let Self::Writer(buf) = self else {
            unreachable!()
        };

        let mut serial = 0usize;
        for ch in &rec.chains {
            let mut last = None;
            for res in &ch.residues {
                for at in &res.atoms {
                    serial += 1;
                    let ind = serial % 100000; // Prevents overflow of the serial field
                    let resid = res.number % 10000;
                    // Names shorter than 4 characters start at column 14
                    let name = if at.name.len() < 4 {
                        format!(" {:<3}", at.name)
                    } else {
                        format!("{:<4.4}", at.name)
                    };
                    writeln!(
                        buf,
                        "{:<6}{:>5} {}{}{:>3} {}{:>4}{}   {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}",
                        if at.hetero { "HETATM" } else { "ATOM" },
                        ind,
                        name,
                        ' ',
                        res.name,
                        ch.id.0,
                        resid,
                        res.icode,
                        at.pos.x,
                        at.pos.y,
                        at.pos.z,
                        1.0,
                        0.0,
                        element_symbol(at.atomic_number).to_ascii_uppercase(),
                    )?;
                }
                last = Some(res);
            }
            if let Some(res) = last {
                writeln!(
                    buf,
                    "TER   {:>5}      {:>3} {}{:>4}{}",
                    (serial + 1) % 100000,
                    res.name,
                    ch.id.0,
                    res.number % 10000,
                    res.icode
                )?;
            }
        }
        writeln!(buf, "END")?;
        buf.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const PDB: &str = "\
REMARK   test structure
ATOM      1  N   ALA A   1      11.104   6.134  -6.504  1.00  0.00           N
ATOM      2  CA  ALA A   1      11.639   6.071  -5.147  1.00  0.00           C
ATOM      3  CA BALA A   1      11.639   6.071  -5.147  1.00  0.00           C
ATOM      4  N   HIP A   2       9.530   5.222  -4.416  1.00  0.00           N
ATOM      5  CA  HIP A   2       8.200   4.700  -4.000  1.00  0.00
HETATM    6 ZN    ZN A 301       1.000   2.000   3.000  1.00  0.00          ZN
END
";

    #[test]
    fn read_single_model() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("s.pdb");
        std::fs::write(&path, PDB)?;

        let h = PdbFileHandler::open(&path)?;
        assert_eq!(h.num_models(), 1);
        let (top, st) = h.read_model(0)?;
        assert_eq!(top.len(), 5);
        assert_eq!(top.num_residues(), 3);
        assert_eq!(st.coords[2], Pos::new(9.53, 5.222, -4.416));

        let atoms = top.atoms();
        assert_eq!(atoms[3].atomic_number, 6); // guessed from name
        assert_eq!(atoms[4].atomic_number, 30);
        assert!(atoms[4].hetero);
        assert_eq!(atoms[4].resid, 301);
        Ok(())
    }

    #[test]
    fn multi_model_and_write() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("traj.pdb");
        let models = format!("MODEL        1\n{PDB}ENDMDL\nMODEL        2\n{PDB}ENDMDL\n");
        std::fs::write(&path, models.replace("END\n", ""))?;

        let h = PdbFileHandler::open(&path)?;
        assert_eq!(h.num_models(), 2);
        let st = h.read_state(1, 5)?;
        assert_eq!(st.len(), 5);
        assert!(matches!(
            h.read_state(1, 7),
            Err(PdbHandlerError::ModelSize(1, 5, 7))
        ));

        // Write the record of the second model and read it back
        let (top, st) = h.read_model(1)?;
        let rec = StructureRecord::from_frame(&top, &st);
        let out = dir.path().join("out.pdb");
        PdbFileHandler::create(&out)?.write_record(&rec)?;

        let (top2, st2) = PdbFileHandler::open(&out)?.read_model(0)?;
        let rec2 = StructureRecord::from_frame(&top2, &st2);
        assert_eq!(rec2, rec);
        Ok(())
    }

    #[test]
    fn broken_line() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("b.pdb");
        std::fs::write(&path, "ATOM      1  N   ALA A   1      11.104   6.1\n")?;
        assert!(matches!(
            PdbFileHandler::open(&path)?.read_model(0),
            Err(PdbHandlerError::AtomEntry(1, "y"))
        ));
        Ok(())
    }
}
