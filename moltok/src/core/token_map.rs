use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::info;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Token of a single residue, serialized as `{"token": <int>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: i64,
}

/// Tokens of one frame keyed by residue number.
pub type FrameTokenMap = BTreeMap<i32, TokenEntry>;

/// Tokens of all encoded frames keyed by frame index.
///
/// On disk this is JSON of the form `{"<frame>": {"<resid>": {"token": <int>}}}`.
/// Frames that failed to encode are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenMap(BTreeMap<usize, FrameTokenMap>);

#[derive(Error, Debug)]
pub enum TokenMapError {
    #[error("can't open token map file {0} for reading")]
    OpenRead(PathBuf, #[source] std::io::Error),

    #[error("can't create temporary token map file next to {0}")]
    CreateTemp(PathBuf, #[source] std::io::Error),

    #[error("can't move token map into place at {0}")]
    Persist(PathBuf, #[source] std::io::Error),

    #[error("malformed token map")]
    Json(#[from] serde_json::Error),

    #[error("unexpected io error")]
    Io(#[from] std::io::Error),
}

impl TokenMap {
    pub fn new() -> Self {
        Default::default()
    }

    /// Inserts tokens of one frame, replacing any previous entry of this frame.
    pub fn insert_frame(&mut self, frame: usize, tokens: FrameTokenMap) {
        self.0.insert(frame, tokens);
    }

    pub fn frame(&self, frame: usize) -> Option<&FrameTokenMap> {
        self.0.get(&frame)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn frame_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &FrameTokenMap)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    pub fn iter_tokens(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.values().flat_map(|fr| fr.values().map(|e| e.token))
    }

    /// Minimum and maximum token over all frames, `None` if there are no tokens at all.
    pub fn token_extrema(&self) -> Option<(i64, i64)> {
        self.iter_tokens().fold(None, |acc, t| match acc {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TokenMapError> {
        let path = path.as_ref();
        let file =
            File::open(path).map_err(|e| TokenMapError::OpenRead(path.to_owned(), e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Writes the map atomically: a temporary file in the target directory is
    /// renamed over `path` only after it is completely written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TokenMapError> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| TokenMapError::CreateTemp(path.to_owned(), e))?;
        {
            let mut w = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut w, self)?;
            w.flush()?;
        }
        tmp.persist(path)
            .map_err(|e| TokenMapError::Persist(path.to_owned(), e.error))?;

        info!(
            "Saved tokens of {} frames to '{}'",
            self.len(),
            path.display()
        );
        Ok(())
    }
}

impl FromIterator<(usize, FrameTokenMap)> for TokenMap {
    fn from_iter<T: IntoIterator<Item = (usize, FrameTokenMap)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
