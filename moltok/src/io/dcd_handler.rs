//! Reading and writing of the CHARMM/NAMD DCD trajectory format, which is what
//! `cpptraj` produces for `trajout ... dcd`.
//!
//! Only little-endian files with 32-bit record markers and without fixed atoms are
//! supported. Frames have a fixed size, so any frame can be read directly by index.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use log::{debug, warn};
use thiserror::Error;

use crate::core::{Pos, State, UnitCell};

const HEADER_LEN: u32 = 84;
const CELL_LEN: u32 = 48;

#[derive(Error, Debug)]
pub enum DcdHandlerError {
    #[error("unexpected io error in dcd file")]
    Io(#[from] std::io::Error),

    #[error("can't open dcd file for reading")]
    OpenRead(#[source] std::io::Error),

    #[error("can't open dcd file for writing")]
    OpenWrite(#[source] std::io::Error),

    #[error("not a little-endian CORD/DCD file")]
    NotDcd,

    #[error("record length mismatch: {0} at the start and {1} at the end")]
    RecordLength(u32, u32),

    #[error("unexpected {0} record size {1}")]
    RecordSize(&'static str, u32),

    #[error("files with {0} fixed atoms are not supported")]
    FixedAtoms(i32),

    #[error("frame {0} is out of range 0:{1}")]
    FrameOutOfRange(usize, usize),

    #[error("writing {0} atoms to file with {1} atoms per frame")]
    NatomsMismatch(usize, usize),

    #[error("unit cell is present in some frames only")]
    CellMismatch,
}

/// Layout of a DCD file, read once from its header.
#[derive(Debug, Clone)]
struct DcdLayout {
    natoms: usize,
    header_len: u64,
    frame_len: u64,
    has_cell: bool,
    delta: f32,
    nframes: usize,
}

pub struct DcdReader {
    path: PathBuf,
    layout: DcdLayout,
}

pub struct DcdWriter {
    file: BufWriter<File>,
    natoms: Option<usize>,
    has_cell: bool,
    nframes: i32,
}

pub enum DcdFileHandler {
    Reader(DcdReader),
    Writer(DcdWriter),
}

impl DcdFileHandler {
    pub fn open(fname: impl AsRef<Path>) -> Result<Self, DcdHandlerError> {
        let path = fname.as_ref().to_owned();
        let file = File::open(&path).map_err(DcdHandlerError::OpenRead)?;
        let file_len = file.metadata()?.len();
        let layout = read_layout(&mut BufReader::new(file), file_len)?;
        debug!(
            "DCD '{}': {} atoms, {} frames",
            path.display(),
            layout.natoms,
            layout.nframes
        );
        Ok(Self::Reader(DcdReader { path, layout }))
    }

    pub fn create(fname: impl AsRef<Path>) -> Result<Self, DcdHandlerError> {
        Ok(Self::Writer(DcdWriter {
            file: BufWriter::new(File::create(fname).map_err(DcdHandlerError::OpenWrite)?),
            natoms: None,
            has_cell: false,
            nframes: 0,
        }))
    }

    pub fn num_atoms(&self) -> usize {
        match self {
            Self::Reader(r) => r.layout.natoms,
            Self::Writer(w) => w.natoms.unwrap_or(0),
        }
    }

    pub fn num_frames(&self) -> usize {
        match self {
            Self::Reader(r) => r.layout.nframes,
            Self::Writer(w) => w.nframes as usize,
        }
    }

    /// Reads frame `fr`. Every call uses its own file handle, so frames
    /// could be read from several threads at once.
    pub fn read_frame(&self, fr: usize) -> Result<State, DcdHandlerError> {
        let Self::Reader(r) = self else {
            unreachable!()
        };
        let l = &r.layout;
        if fr >= l.nframes {
            return Err(DcdHandlerError::FrameOutOfRange(fr, l.nframes));
        }

        let mut file = BufReader::new(File::open(&r.path).map_err(DcdHandlerError::OpenRead)?);
        file.seek(SeekFrom::Start(l.header_len + fr as u64 * l.frame_len))?;

        let cell = if l.has_cell {
            let buf = read_record(&mut file)?;
            if buf.len() != CELL_LEN as usize {
                return Err(DcdHandlerError::RecordSize("unit cell", buf.len() as u32));
            }
            let v = f64s_from_le_bytes(&buf);
            // CHARMM order is a, gamma, b, beta, alpha, c
            Some(UnitCell {
                a: v[0],
                gamma: v[1],
                b: v[2],
                beta: v[3],
                alpha: v[4],
                c: v[5],
            })
        } else {
            None
        };

        let xs = read_coord_block(&mut file, l.natoms)?;
        let ys = read_coord_block(&mut file, l.natoms)?;
        let zs = read_coord_block(&mut file, l.natoms)?;

        let coords = (0..l.natoms)
            .map(|i| Pos::new(xs[i], ys[i], zs[i]))
            .collect();

        Ok(State {
            coords,
            time: fr as f32 * l.delta,
            cell,
        })
    }

    /// Appends a frame. The header is written with the first frame and the frame
    /// counter in it is updated after every frame, so the file is always complete.
    pub fn write_state(&mut self, state: &State) -> Result<(), DcdHandlerError> {
        let Self::Writer(w) = self else {
            unreachable!()
        };

        match w.natoms {
            None => {
                w.natoms = Some(state.len());
                w.has_cell = state.cell.is_some();
                write_header(&mut w.file, state.len(), w.has_cell)?;
            }
            Some(n) if n != state.len() => {
                return Err(DcdHandlerError::NatomsMismatch(state.len(), n));
            }
            _ => {}
        }

        match (&state.cell, w.has_cell) {
            (Some(c), true) => {
                let mut buf = Vec::with_capacity(CELL_LEN as usize);
                for v in [c.a, c.gamma, c.b, c.beta, c.alpha, c.c] {
                    buf.extend_from_slice(&v.to_le_bytes());
                }
                write_record(&mut w.file, &buf)?;
            }
            (None, false) => {}
            _ => return Err(DcdHandlerError::CellMismatch),
        }

        for dim in 0..3 {
            let mut buf = Vec::with_capacity(4 * state.len());
            for p in &state.coords {
                buf.extend_from_slice(&p[dim].to_le_bytes());
            }
            write_record(&mut w.file, &buf)?;
        }

        w.nframes += 1;
        // NSET lives right after the leading record marker and "CORD"
        w.file.seek(SeekFrom::Start(8))?;
        w.file.write_all(&w.nframes.to_le_bytes())?;
        w.file.seek(SeekFrom::End(0))?;
        w.file.flush()?;
        Ok(())
    }
}

fn read_layout<R: Read + Seek>(r: &mut R, file_len: u64) -> Result<DcdLayout, DcdHandlerError> {
    let marker = read_u32_le(r).map_err(|_| DcdHandlerError::NotDcd)?;
    if marker != HEADER_LEN {
        return Err(DcdHandlerError::NotDcd);
    }
    let mut hdr = vec![0u8; HEADER_LEN as usize];
    r.read_exact(&mut hdr).map_err(|_| DcdHandlerError::NotDcd)?;
    let end = read_u32_le(r)?;
    if end != HEADER_LEN {
        return Err(DcdHandlerError::RecordLength(HEADER_LEN, end));
    }
    if &hdr[0..4] != b"CORD" {
        return Err(DcdHandlerError::NotDcd);
    }

    let mut icntrl = [0i32; 20];
    for (i, item) in icntrl.iter_mut().enumerate() {
        let off = 4 + i * 4;
        *item = i32::from_le_bytes([hdr[off], hdr[off + 1], hdr[off + 2], hdr[off + 3]]);
    }
    let nset = icntrl[0];
    let nfixed = icntrl[8];
    let delta = f32::from_le_bytes([hdr[40], hdr[41], hdr[42], hdr[43]]);
    let charmm = icntrl[19] != 0;
    let has_cell = charmm && icntrl[10] != 0;
    let four_dims = charmm && icntrl[11] != 0;

    if nfixed != 0 {
        return Err(DcdHandlerError::FixedAtoms(nfixed));
    }

    // Title block, ignored
    read_record(r)?;

    let natom_block = read_record(r)?;
    if natom_block.len() != 4 {
        return Err(DcdHandlerError::RecordSize("NATOM", natom_block.len() as u32));
    }
    let natom = i32::from_le_bytes([
        natom_block[0],
        natom_block[1],
        natom_block[2],
        natom_block[3],
    ]);
    let natoms = usize::try_from(natom)
        .map_err(|_| DcdHandlerError::RecordSize("NATOM", natom as u32))?;

    let header_len = r.stream_position()?;
    let coord_len = 4 + 4 * natoms as u64 + 4;
    let mut frame_len = 3 * coord_len;
    if has_cell {
        frame_len += 4 + CELL_LEN as u64 + 4;
    }
    if four_dims {
        frame_len += coord_len;
    }

    let data_len = file_len.saturating_sub(header_len);
    let nframes = (data_len / frame_len) as usize;
    if data_len % frame_len != 0 {
        warn!(
            "DCD file has {} trailing bytes, last frame is incomplete",
            data_len % frame_len
        );
    }
    if nset > 0 && nset as usize != nframes {
        warn!("DCD header declares {nset} frames, but file contains {nframes}");
    }

    Ok(DcdLayout {
        natoms,
        header_len,
        frame_len,
        has_cell,
        delta,
        nframes,
    })
}

fn write_header<W: Write>(w: &mut W, natoms: usize, has_cell: bool) -> Result<(), DcdHandlerError> {
    let mut icntrl = [0i32; 20];
    icntrl[0] = 0; // NSET, updated after every frame
    icntrl[2] = 1; // NSAVC
    icntrl[10] = has_cell as i32;
    icntrl[19] = 24; // CHARMM version

    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    header.extend_from_slice(b"CORD");
    for v in icntrl {
        header.extend_from_slice(&v.to_le_bytes());
    }
    write_record(w, &header)?;

    let title = format!("Created by MolTok  NATOMS={natoms}");
    let mut line = [b' '; 80];
    let n = title.len().min(80);
    line[..n].copy_from_slice(&title.as_bytes()[..n]);
    let mut title_block = Vec::with_capacity(4 + 80);
    title_block.extend_from_slice(&1i32.to_le_bytes());
    title_block.extend_from_slice(&line);
    write_record(w, &title_block)?;

    write_record(w, &(natoms as i32).to_le_bytes())?;
    Ok(())
}

/// Payload sandwiched by its length
fn write_record<W: Write>(w: &mut W, payload: &[u8]) -> Result<(), DcdHandlerError> {
    let len = payload.len() as u32;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(payload)?;
    w.write_all(&len.to_le_bytes())?;
    Ok(())
}

fn read_u32_le<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_record<R: Read>(r: &mut R) -> Result<Vec<u8>, DcdHandlerError> {
    let len = read_u32_le(r)?;
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)?;
    let len_end = read_u32_le(r)?;
    if len_end != len {
        return Err(DcdHandlerError::RecordLength(len, len_end));
    }
    Ok(payload)
}

fn read_coord_block<R: Read>(r: &mut R, natoms: usize) -> Result<Vec<f32>, DcdHandlerError> {
    let buf = read_record(r)?;
    if buf.len() != 4 * natoms {
        return Err(DcdHandlerError::RecordSize("coordinate", buf.len() as u32));
    }
    Ok(buf
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn f64s_from_le_bytes(b: &[u8]) -> Vec<f64> {
    b.chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect()
}
