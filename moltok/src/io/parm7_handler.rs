use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use thiserror::Error;

use crate::core::*;

/// Reader of Amber parameter/topology files (`parm7`, `prmtop`).
///
/// Only the sections needed to build a [Topology] are kept. The file carries no
/// chain identifiers, so all atoms are assigned to chain `A`.
pub struct Parm7FileHandler {
    sections: HashMap<String, Vec<String>>,
}

#[derive(Debug, Error)]
pub enum Parm7HandlerError {
    #[error("unexpected io error")]
    Io(#[from] std::io::Error),

    #[error("can't open parm7 file for reading")]
    OpenRead(#[source] std::io::Error),

    #[error("line {0}: malformed %FORMAT '{1}'")]
    Format(usize, String),

    #[error("line {0}: data before any %FLAG")]
    NoFlag(usize),

    #[error("missing section {0}")]
    MissingSection(&'static str),

    #[error("invalid integer '{1}' in section {0}")]
    ParseInt(&'static str, String),

    #[error("section {0} has {1} entries, expected {2}")]
    SectionSize(&'static str, usize, usize),

    #[error("residue pointers are not increasing")]
    ResiduePointers,
}

// Sections needed for the topology
const KEPT: [&str; 6] = [
    "POINTERS",
    "ATOM_NAME",
    "RESIDUE_LABEL",
    "RESIDUE_POINTER",
    "ATOMIC_NUMBER",
    "RESIDUE_NUMBER",
];

/// Field width from a Fortran format like `(20a4)`, `(10I8)` or `(5E16.8)`.
fn field_width(fmt: &str) -> Option<usize> {
    let inner = fmt.trim().strip_prefix('(')?.strip_suffix(')')?;
    let pos = inner.find(|c: char| c.is_ascii_alphabetic())?;
    let width = inner[pos + 1..].split('.').next()?;
    width.parse().ok().filter(|w| *w > 0)
}

impl Parm7FileHandler {
    pub fn open(fname: impl AsRef<Path>) -> Result<Self, Parm7HandlerError> {
        let reader = BufReader::new(File::open(fname).map_err(Parm7HandlerError::OpenRead)?);

        let mut sections: HashMap<String, Vec<String>> = HashMap::new();
        let mut cur_flag: Option<String> = None;
        let mut width = 0usize;

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let lnum = i + 1;

            if let Some(flag) = line.strip_prefix("%FLAG") {
                cur_flag = Some(flag.trim().to_owned());
                width = 0;
            } else if let Some(fmt) = line.strip_prefix("%FORMAT") {
                width = field_width(fmt)
                    .ok_or_else(|| Parm7HandlerError::Format(lnum, fmt.to_owned()))?;
            } else if line.starts_with('%') {
                // %VERSION, %COMMENT
                continue;
            } else {
                let Some(flag) = cur_flag.as_ref() else {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Err(Parm7HandlerError::NoFlag(lnum));
                };
                if !KEPT.contains(&flag.as_str()) {
                    continue;
                }
                if width == 0 {
                    return Err(Parm7HandlerError::Format(lnum, String::new()));
                }
                let entries = sections.entry(flag.clone()).or_default();
                let mut rest = line.as_str();
                while !rest.is_empty() {
                    let end = rest
                        .char_indices()
                        .nth(width)
                        .map_or(rest.len(), |(i, _)| i);
                    entries.push(rest[..end].trim().to_owned());
                    rest = &rest[end..];
                }
            }
        }

        Ok(Self { sections })
    }

    fn section(&self, name: &'static str) -> Result<&[String], Parm7HandlerError> {
        self.sections
            .get(name)
            .map(|v| v.as_slice())
            .ok_or(Parm7HandlerError::MissingSection(name))
    }

    fn int_section(&self, name: &'static str) -> Result<Option<Vec<i32>>, Parm7HandlerError> {
        let Some(entries) = self.sections.get(name) else {
            return Ok(None);
        };
        entries
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<i32>()
                    .map_err(|_| Parm7HandlerError::ParseInt(name, s.clone()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    pub fn read_topology(&self) -> Result<Topology, Parm7HandlerError> {
        let pointers = self
            .int_section("POINTERS")?
            .ok_or(Parm7HandlerError::MissingSection("POINTERS"))?;
        if pointers.len() < 12 {
            return Err(Parm7HandlerError::SectionSize("POINTERS", pointers.len(), 12));
        }
        let natoms = pointers[0] as usize;
        let nres = pointers[11] as usize;

        let names = self.section("ATOM_NAME")?;
        if names.len() < natoms {
            return Err(Parm7HandlerError::SectionSize("ATOM_NAME", names.len(), natoms));
        }
        let labels = self.section("RESIDUE_LABEL")?;
        if labels.len() < nres {
            return Err(Parm7HandlerError::SectionSize("RESIDUE_LABEL", labels.len(), nres));
        }
        let res_ptr = self
            .int_section("RESIDUE_POINTER")?
            .ok_or(Parm7HandlerError::MissingSection("RESIDUE_POINTER"))?;
        if res_ptr.len() != nres {
            return Err(Parm7HandlerError::SectionSize("RESIDUE_POINTER", res_ptr.len(), nres));
        }
        let atomic_numbers = self.int_section("ATOMIC_NUMBER")?;
        let res_numbers = self.int_section("RESIDUE_NUMBER")?;

        let mut atoms = Vec::with_capacity(natoms);
        for r in 0..nres {
            // Pointers are 1-based
            let begin = (res_ptr[r] - 1).max(0) as usize;
            let end = res_ptr.get(r + 1).map_or(natoms, |p| (*p - 1).max(0) as usize);
            if end < begin || end > natoms {
                return Err(Parm7HandlerError::ResiduePointers);
            }
            let resid = res_numbers
                .as_ref()
                .and_then(|v| v.get(r).copied())
                .unwrap_or(r as i32 + 1);

            for i in begin..end {
                let mut at = Atom {
                    name: names[i].as_str().into(),
                    resname: labels[r].as_str().into(),
                    resid,
                    chain: 'A',
                    ..Atom::new()
                };
                match atomic_numbers.as_ref().and_then(|v| v.get(i)) {
                    Some(an) if *an > 0 && *an < NUM_ELEMENTS as i32 => {
                        at.atomic_number = *an as u8
                    }
                    _ => at.guess_element_from_name(),
                }
                atoms.push(at);
            }
        }

        Ok(Topology::new(atoms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const PARM7: &str = "\
%VERSION  VERSION_STAMP = V0001.000  DATE = 01/01/24  00:00:00
%FLAG TITLE
%FORMAT(20a4)
test
%FLAG POINTERS
%FORMAT(10I8)
       5       2       0       0       0       0       0       0       0       0
       0       2       0       0       0       0       0       0       0       0
%FLAG ATOM_NAME
%FORMAT(20a4)
N   CA  C   N   CA
%FLAG CHARGE
%FORMAT(5E16.8)
  1.00000000E+00  2.00000000E+00  3.00000000E+00  4.00000000E+00  5.00000000E+00
%FLAG ATOMIC_NUMBER
%FORMAT(10I8)
       7       6       6       7       6
%FLAG RESIDUE_LABEL
%FORMAT(20a4)
AS4 HIP
%FLAG RESIDUE_POINTER
%FORMAT(10I8)
       1       4
";

    #[test]
    fn read_parm7() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sys.parm7");
        std::fs::write(&path, PARM7)?;

        let top = Parm7FileHandler::open(&path)?.read_topology()?;
        assert_eq!(top.len(), 5);
        assert_eq!(top.num_residues(), 2);
        let atoms = top.atoms();
        assert_eq!(atoms[2].name, "C");
        assert_eq!(atoms[2].resname, "AS4");
        assert_eq!(atoms[3].resname, "HIP");
        assert_eq!(atoms[3].resid, 2);
        assert_eq!(atoms[3].atomic_number, 7);
        assert!(atoms.iter().all(|a| a.chain == 'A'));
        Ok(())
    }

    #[test]
    fn missing_section() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad.parm7");
        std::fs::write(&path, "%FLAG POINTERS\n%FORMAT(10I8)\n       1\n")?;
        assert!(matches!(
            Parm7FileHandler::open(&path)?.read_topology(),
            Err(Parm7HandlerError::SectionSize("POINTERS", 1, 12))
        ));
        assert_eq!(field_width("(5E16.8)"), Some(16));
        assert_eq!(field_width("(20a4)"), Some(4));
        Ok(())
    }
}
