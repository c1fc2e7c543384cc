use super::periodic_table::{atomic_number_from_symbol, element_symbol};
use compact_str::CompactString;

/// Information about the atom except its coordinates.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Atom {
    /// Atom name.
    pub name: CompactString,
    /// Residue name.
    pub resname: CompactString,
    /// Residue id (aka residue number). This could be negative!
    pub resid: i32,
    /// PDB insertion code, ' ' if not set.
    pub icode: char,
    /// Residue index. Assigned when building the [topology](super::Topology).
    /// Unique for each contiguous span of (chain, resid, icode). Starts from zero.
    pub resindex: usize,
    /// Atomic number in the periodic table. Zero if unknown.
    pub atomic_number: u8,
    /// PDB chain identifier.
    pub chain: char,
    /// Written as HETATM in PDB files.
    pub hetero: bool,
}

impl Atom {
    pub fn new() -> Self {
        Self {
            icode: ' ',
            chain: ' ',
            ..Default::default()
        }
    }

    pub fn element_symbol(&self) -> &'static str {
        element_symbol(self.atomic_number)
    }

    /// Naive guess of the element from the atom name.
    pub fn guess_element_from_name(&mut self) {
        self.atomic_number = 0;
        // Index of the first letter in atom name
        let Some(i) = self.name.find(|c: char| c.is_ascii_alphabetic()) else {
            return;
        };

        // Special cases when atom name doesn't start with the element name at all
        match self.name.as_str() {
            "SOD" => self.atomic_number = 11,
            "POT" => self.atomic_number = 19,
            "CLA" => self.atomic_number = 17,
            _ => (),
        }

        // Two-letter elements starting with C, N, O, H or P only match
        // when the name equals the residue name (ions like CA or CL)
        if self.atomic_number == 0 {
            if let Some(an) = self.name.get(i..i + 2).and_then(atomic_number_from_symbol) {
                let careful = matches!(
                    self.name.as_bytes()[i].to_ascii_uppercase(),
                    b'C' | b'N' | b'O' | b'H' | b'P'
                );
                if !careful || self.name == self.resname {
                    self.atomic_number = an;
                }
            }
        }

        if self.atomic_number == 0 {
            if let Some(an) = atomic_number_from_symbol(&self.name[i..=i]) {
                self.atomic_number = an;
            }
        }
    }
}
