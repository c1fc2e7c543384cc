use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use thiserror::Error;

use crate::core::*;

/// Writer of plain XYZ files for the structure viewer.
pub struct XyzFileHandler {
    writer: BufWriter<File>,
}

#[derive(Debug, Error)]
pub enum XyzHandlerError {
    #[error("unexpected io error")]
    Io(#[from] std::io::Error),

    #[error("can't open xyz file for writing")]
    OpenWrite(#[source] std::io::Error),
}

/// Element symbol written to XYZ files: the first letter of the atom name
/// if it is one of N, C, H, O, S in any case, otherwise X.
pub fn xyz_element(atom_name: &str) -> char {
    match atom_name.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some(c @ ('N' | 'C' | 'H' | 'O' | 'S')) => c,
        _ => 'X',
    }
}

impl XyzFileHandler {
    pub fn create(fname: impl AsRef<Path>) -> Result<Self, XyzHandlerError> {
        Ok(Self {
            writer: BufWriter::new(File::create(fname).map_err(XyzHandlerError::OpenWrite)?),
        })
    }

    pub fn write_frame(
        &mut self,
        top: &Topology,
        state: &State,
        comment: &str,
    ) -> Result<(), XyzHandlerError> {
        writeln!(self.writer, "{}", top.len())?;
        writeln!(self.writer, "{comment}")?;
        for (at, p) in top.iter_atoms().zip(state.coords.iter()) {
            writeln!(
                self.writer,
                "{} {:.8} {:.8} {:.8}",
                xyz_element(&at.name),
                p.x,
                p.y,
                p.z
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn elements() {
        assert_eq!(xyz_element("CA"), 'C');
        assert_eq!(xyz_element("HB1"), 'H');
        assert_eq!(xyz_element("SG"), 'S');
        assert_eq!(xyz_element("cb"), 'C');
        assert_eq!(xyz_element("ZN"), 'X');
        assert_eq!(xyz_element("1HB"), 'X');
        assert_eq!(xyz_element(""), 'X');
    }

    #[test]
    fn write_xyz() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("frame_0.xyz");
        let top = Topology::new(vec![
            Atom {
                name: "N".into(),
                ..Atom::new()
            },
            Atom {
                name: "ZN".into(),
                ..Atom::new()
            },
        ]);
        let st = State::new(vec![Pos::new(1.0, 2.5, -3.0), Pos::origin()]);
        XyzFileHandler::create(&path)?.write_frame(&top, &st, "frame 0")?;

        let text = std::fs::read_to_string(&path)?;
        assert_eq!(
            text,
            "2\nframe 0\nN 1.00000000 2.50000000 -3.00000000\nX 0.00000000 0.00000000 0.00000000\n"
        );
        Ok(())
    }
}
