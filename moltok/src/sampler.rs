use std::{iter::StepBy, num::NonZeroUsize, ops::Range};

use crate::config::ConfigError;

/// Lazy sequence of sampled frame indices.
pub type FrameIndices = StepBy<Range<usize>>;

/// Selects every `stride`-th frame starting from frame 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSampler {
    stride: NonZeroUsize,
}

impl FrameSampler {
    pub fn new(stride: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            stride: NonZeroUsize::new(stride).ok_or(ConfigError::ZeroStride)?,
        })
    }

    pub fn stride(&self) -> usize {
        self.stride.get()
    }

    /// Indices `0, S, 2S, ...` below `n_frames`. Calling again restarts the sequence.
    pub fn indices(&self, n_frames: usize) -> FrameIndices {
        (0..n_frames).step_by(self.stride.get())
    }

    pub fn num_sampled(&self, n_frames: usize) -> usize {
        n_frames.div_ceil(self.stride.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn sampled_indices() -> Result<()> {
        let s = FrameSampler::new(25)?;
        assert_eq!(s.indices(100).collect::<Vec<_>>(), vec![0, 25, 50, 75]);
        assert_eq!(s.indices(101).collect::<Vec<_>>(), vec![0, 25, 50, 75, 100]);
        assert_eq!(s.indices(1).collect::<Vec<_>>(), vec![0]);
        assert_eq!(s.indices(0).count(), 0);
        Ok(())
    }

    #[test]
    fn sampling_properties() -> Result<()> {
        for stride in 1..=30 {
            let s = FrameSampler::new(stride)?;
            for n in 0..=120 {
                let idx: Vec<_> = s.indices(n).collect();
                assert_eq!(idx.len(), n.div_ceil(stride));
                assert_eq!(s.indices(n).len(), idx.len());
                assert_eq!(s.num_sampled(n), idx.len());
                assert!(idx.iter().all(|i| *i < n && *i % stride == 0));
                assert!(idx.windows(2).all(|w| w[1] - w[0] == stride));
                if n > 0 {
                    assert_eq!(idx[0], 0);
                }
                // Restartable
                assert_eq!(s.indices(n).collect::<Vec<_>>(), idx);
            }
        }
        Ok(())
    }

    #[test]
    fn zero_stride() {
        assert!(matches!(FrameSampler::new(0), Err(ConfigError::ZeroStride)));
    }
}
