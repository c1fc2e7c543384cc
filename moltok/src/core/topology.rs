use std::ops::Range;

use super::Atom;

/// Topology of the molecular system: atoms with their residue and chain membership.
///
/// [Topology] is read once from a structure or parameter file and is shared read-only
/// by all frames of a [Trajectory](crate::io::Trajectory).
#[derive(Debug, Default, Clone)]
pub struct Topology {
    atoms: Vec<Atom>,
}

impl Topology {
    /// Creates a topology and assigns residue indexes.
    pub fn new(atoms: Vec<Atom>) -> Self {
        let mut top = Self { atoms };
        top.assign_resindex();
        top
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn iter_atoms(&self) -> impl Iterator<Item = &Atom> {
        self.atoms.iter()
    }

    pub fn num_residues(&self) -> usize {
        self.atoms.last().map_or(0, |at| at.resindex + 1)
    }

    /// Atom index ranges of consecutive residues.
    pub fn residue_spans(&self) -> Vec<Range<usize>> {
        let mut spans = Vec::with_capacity(self.num_residues());
        let mut begin = 0;
        for i in 1..=self.atoms.len() {
            if i == self.atoms.len() || self.atoms[i].resindex != self.atoms[begin].resindex {
                spans.push(begin..i);
                begin = i;
            }
        }
        spans
    }

    fn assign_resindex(&mut self) {
        let mut resindex = 0usize;
        let mut cur = match self.atoms.first() {
            Some(at) => (at.chain, at.resid, at.icode),
            None => return,
        };
        for at in self.atoms.iter_mut() {
            let key = (at.chain, at.resid, at.icode);
            if key != cur {
                cur = key;
                resindex += 1;
            }
            at.resindex = resindex;
        }
    }
}
