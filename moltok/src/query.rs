use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::core::{FrameTokenMap, TokenMap, TokenMapError};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("no data for frame {0}")]
    MissingFrameData(usize),

    #[error("token dataset is empty")]
    EmptyTokenDataset,
}

/// Tokens of one frame together with the extrema over the whole dataset,
/// which the viewer uses to normalize its color scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTokens {
    pub frame_data: FrameTokenMap,
    pub token_min: i64,
    pub token_max: i64,
}

/// Read-only access to a token map.
pub struct TokenQuery {
    map: TokenMap,
}

impl TokenQuery {
    pub fn new(map: TokenMap) -> Self {
        Self { map }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TokenMapError> {
        Ok(Self::new(TokenMap::load(path)?))
    }

    pub fn token_map(&self) -> &TokenMap {
        &self.map
    }

    pub fn frame(&self, index: usize) -> Result<FrameTokens, QueryError> {
        let (token_min, token_max) = self
            .map
            .token_extrema()
            .ok_or(QueryError::EmptyTokenDataset)?;
        let frame_data = self
            .map
            .frame(index)
            .ok_or(QueryError::MissingFrameData(index))?
            .clone();
        Ok(FrameTokens {
            frame_data,
            token_min,
            token_max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TokenEntry;
    use anyhow::Result;

    fn frame(entries: &[(i32, i64)]) -> FrameTokenMap {
        entries
            .iter()
            .map(|(r, t)| (*r, TokenEntry { token: *t }))
            .collect()
    }

    fn query() -> TokenQuery {
        TokenQuery::new(
            [
                (0, frame(&[(10, 5)])),
                (25, frame(&[(10, 9)])),
                (50, frame(&[(10, 1)])),
            ]
            .into_iter()
            .collect(),
        )
    }

    #[test]
    fn frame_with_extrema() -> Result<()> {
        let fr = query().frame(25)?;
        assert_eq!(fr.frame_data, frame(&[(10, 9)]));
        assert_eq!((fr.token_min, fr.token_max), (1, 9));

        let v = serde_json::to_value(&fr)?;
        assert_eq!(
            v,
            serde_json::json!({"frameData": {"10": {"token": 9}}, "tokenMin": 1, "tokenMax": 9})
        );
        Ok(())
    }

    #[test]
    fn missing_and_empty() {
        assert_eq!(query().frame(999), Err(QueryError::MissingFrameData(999)));
        assert_eq!(
            TokenQuery::new(TokenMap::new()).frame(0),
            Err(QueryError::EmptyTokenDataset)
        );
        // Frames without tokens don't make the dataset non-empty
        let q = TokenQuery::new([(0, frame(&[]))].into_iter().collect());
        assert_eq!(q.frame(0), Err(QueryError::EmptyTokenDataset));
    }
}
