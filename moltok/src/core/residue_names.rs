use std::collections::BTreeMap;

use compact_str::CompactString;
use thiserror::Error;

use super::{Residue, StructureRecord};

/// Non-standard residue names produced by constant-pH simulations and their canonical names.
pub const DEFAULT_RESIDUE_NAMES: [(&str, &str); 6] = [
    ("AS4", "ASP"),
    ("GL4", "GLU"),
    ("HIP", "HIS"),
    ("HIE", "HIS"),
    ("HID", "HIS"),
    ("CYM", "CYS"),
];

const ONE_LETTER: [(&str, char); 20] = [
    ("ALA", 'A'),
    ("ARG", 'R'),
    ("ASN", 'N'),
    ("ASP", 'D'),
    ("CYS", 'C'),
    ("GLN", 'Q'),
    ("GLU", 'E'),
    ("GLY", 'G'),
    ("HIS", 'H'),
    ("ILE", 'I'),
    ("LEU", 'L'),
    ("LYS", 'K'),
    ("MET", 'M'),
    ("PHE", 'F'),
    ("PRO", 'P'),
    ("SER", 'S'),
    ("THR", 'T'),
    ("TRP", 'W'),
    ("TYR", 'Y'),
    ("VAL", 'V'),
];

/// One-letter code of a standard amino acid residue name.
pub fn one_letter_code(resname: &str) -> Option<char> {
    ONE_LETTER
        .iter()
        .find(|(name, _)| *name == resname)
        .map(|(_, c)| *c)
}

/// Amino acid residues are the standard ones and anything carrying a full N-CA-C backbone.
pub fn is_amino_acid(res: &Residue) -> bool {
    one_letter_code(&res.name).is_some()
        || ["N", "CA", "C"].iter().all(|name| res.atom(name).is_some())
}

#[derive(Error, Debug)]
pub enum ResidueMappingError {
    #[error("target '{1}' of residue mapping '{0}' is remapped itself")]
    NonCanonicalTarget(String, String),

    #[error("empty residue name in mapping")]
    EmptyName,
}

/// Fixed lookup from non-standard residue names to canonical three-letter names.
///
/// No target is ever a key of the mapping, so applying it is idempotent.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidueNameMapping(BTreeMap<CompactString, CompactString>);

impl Default for ResidueNameMapping {
    fn default() -> Self {
        Self(
            DEFAULT_RESIDUE_NAMES
                .iter()
                .map(|(from, to)| ((*from).into(), (*to).into()))
                .collect(),
        )
    }
}

impl ResidueNameMapping {
    /// Default table with `extra` entries merged over it.
    pub fn with_extra<'a>(
        extra: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ResidueMappingError> {
        let mut map = Self::default();
        for (from, to) in extra {
            let (from, to) = (from.trim(), to.trim());
            if from.is_empty() || to.is_empty() {
                return Err(ResidueMappingError::EmptyName);
            }
            map.0.insert(from.into(), to.into());
        }
        map.check()?;
        Ok(map)
    }

    fn check(&self) -> Result<(), ResidueMappingError> {
        for (from, to) in &self.0 {
            if self.0.contains_key(to) && from != to {
                return Err(ResidueMappingError::NonCanonicalTarget(
                    from.to_string(),
                    to.to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn canonical(&self, resname: &str) -> Option<&str> {
        self.0.get(resname).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renames residues of the record in place. Returns the number of renamed residues.
    pub fn apply(&self, record: &mut StructureRecord) -> usize {
        let mut renamed = 0;
        for res in record.iter_residues_mut() {
            if let Some(to) = self.0.get(&res.name) {
                if *to != res.name {
                    res.name = to.clone();
                    renamed += 1;
                }
            }
        }
        renamed
    }
}
