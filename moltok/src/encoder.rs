use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::{ConfigError, EncoderConfig},
    core::*,
    normalize::NormalizedFrame,
};

/// Start of sequence token added by the encoding service.
pub const BOS_TOKEN: i64 = 4098;
/// End of sequence token added by the encoding service.
pub const EOS_TOKEN: i64 = 4097;

/// Heavy-atom slots of a residue in the layout expected by the service.
pub const ATOM37_NAMES: [&str; 37] = [
    "N", "CA", "C", "CB", "O", "CG", "CG1", "CG2", "OG", "OG1", "SG", "CD", "CD1", "CD2", "ND1",
    "ND2", "OD1", "OD2", "SD", "CE", "CE1", "CE2", "CE3", "NE", "NE1", "NE2", "OE1", "OE2", "CH2",
    "NH1", "NH2", "OH", "CZ", "CZ2", "CZ3", "NZ", "OXT",
];

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("request to encoding service failed")]
    Http(#[from] reqwest::Error),

    #[error("encoding service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("malformed response of encoding service: {0}")]
    MalformedResponse(String),

    #[error("frame {frame}: {tokens} tokens for {residues} residues")]
    TokenCountMismatch {
        frame: usize,
        residues: usize,
        tokens: usize,
    },

    #[error("chain {0} is absent")]
    ChainMissing(ChainId),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Anything turning a normalized structure into per-residue structure tokens.
pub trait StructureEncoder: Sync {
    fn encode(&self, frame: &NormalizedFrame, chain: &ChainId) -> Result<Vec<i64>, EncodeError>;
}

/// What to do when the number of tokens differs from the number of residues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentPolicy {
    /// Pair up to the shorter of the two and warn.
    #[default]
    Truncate,
    /// Reject the frame.
    Fail,
}

impl AlignmentPolicy {
    /// Pairs tokens with residue numbers in chain order.
    pub fn align(
        &self,
        frame: usize,
        residue_numbers: &[i32],
        tokens: &[i64],
    ) -> Result<FrameTokenMap, EncodeError> {
        if residue_numbers.len() != tokens.len() {
            if *self == Self::Fail {
                return Err(EncodeError::TokenCountMismatch {
                    frame,
                    residues: residue_numbers.len(),
                    tokens: tokens.len(),
                });
            }
            warn!(
                "Frame {frame}: {} tokens for {} residues, extra entries are dropped",
                tokens.len(),
                residue_numbers.len()
            );
        }

        let mut map = FrameTokenMap::new();
        for (res, tok) in residue_numbers.iter().zip(tokens) {
            debug!("Frame {frame}, residue {res}: token {tok}");
            map.insert(*res, TokenEntry { token: *tok });
        }
        Ok(map)
    }
}

/// Removes BOS and EOS framing if both are present.
pub fn strip_boundary_tokens(tokens: &[i64]) -> &[i64] {
    match tokens {
        [BOS_TOKEN, inner @ .., EOS_TOKEN] => inner,
        _ => tokens,
    }
}

/// Numbers of the residues sent to the service, in chain order. Tokens pair with these.
pub fn encoded_residue_numbers(chain: &Chain) -> Vec<i32> {
    chain
        .residues
        .iter()
        .filter(|r| is_amino_acid(r))
        .map(|r| r.number)
        .collect()
}

/// Amino acid sequence and atom37 coordinates of a chain.
pub fn chain_inputs(chain: &Chain) -> (String, Vec<Vec<[Option<f32>; 3]>>) {
    let mut sequence = String::new();
    let mut coords = vec![];
    for res in chain.residues.iter().filter(|r| is_amino_acid(r)) {
        sequence.push(one_letter_code(&res.name).unwrap_or('X'));
        coords.push(
            ATOM37_NAMES
                .iter()
                .map(|name| match res.atom(name) {
                    Some(at) => [Some(at.pos.x), Some(at.pos.y), Some(at.pos.z)],
                    None => [None; 3],
                })
                .collect(),
        );
    }
    (sequence, coords)
}

#[derive(Serialize)]
struct EncodeInputs {
    sequence: String,
    coordinates: Vec<Vec<[Option<f32>; 3]>>,
}

#[derive(Serialize)]
struct EncodeRequest<'a> {
    model: &'a str,
    inputs: EncodeInputs,
}

#[derive(Deserialize)]
struct EncodeOutputs {
    structure: Option<Vec<i64>>,
}

#[derive(Deserialize)]
struct EncodeResponse {
    outputs: EncodeOutputs,
}

/// Client of the remote structure encoding service.
pub struct ForgeClient {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    token: String,
}

impl ForgeClient {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EncodeError> {
        Ok(Self {
            client: reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?,
            url: url.into().trim_end_matches('/').to_owned(),
            model: model.into(),
            token: token.into(),
        })
    }

    /// Creates a client with the access token taken from the environment variable named in config.
    pub fn from_config(cfg: &EncoderConfig) -> Result<Self, EncodeError> {
        let token = std::env::var(&cfg.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential(cfg.token_env.clone()))?;
        Self::new(
            &cfg.url,
            &cfg.model,
            token,
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/v1/encode", self.url)
    }

    fn request_body<'a>(&'a self, chain: &Chain) -> EncodeRequest<'a> {
        let (sequence, coordinates) = chain_inputs(chain);
        EncodeRequest {
            model: &self.model,
            inputs: EncodeInputs {
                sequence,
                coordinates,
            },
        }
    }
}

impl StructureEncoder for ForgeClient {
    fn encode(&self, frame: &NormalizedFrame, chain: &ChainId) -> Result<Vec<i64>, EncodeError> {
        let chain = frame
            .record()
            .chain(chain)
            .ok_or(EncodeError::ChainMissing(*chain))?;

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.token)
            .json(&self.request_body(chain))
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EncodeError::Service {
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }

        let body: EncodeResponse = resp
            .json()
            .map_err(|e| EncodeError::MalformedResponse(e.to_string()))?;
        let tokens = body
            .outputs
            .structure
            .ok_or_else(|| EncodeError::MalformedResponse("no structure track".into()))?;
        Ok(strip_boundary_tokens(&tokens).to_vec())
    }
}
