use std::fmt::Display;

use compact_str::CompactString;

use super::{Atom, Pos, State, Topology};

/// Chain identifier of a structural record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub char);

impl Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 == ' ' {
            write!(f, "<blank>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordAtom {
    pub name: CompactString,
    pub atomic_number: u8,
    pub hetero: bool,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Residue {
    pub name: CompactString,
    pub number: i32,
    pub icode: char,
    pub atoms: Vec<RecordAtom>,
}

impl Residue {
    pub fn atom(&self, name: &str) -> Option<&RecordAtom> {
        self.atoms.iter().find(|at| at.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub id: ChainId,
    pub residues: Vec<Residue>,
}

/// Per-frame structure: chains of residues of atoms.
///
/// A record is built from one frame of a trajectory and does not reference the trajectory
/// afterwards. The only mutation it goes through is residue renaming.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructureRecord {
    pub chains: Vec<Chain>,
}

impl StructureRecord {
    /// Groups atoms of the frame into chains and residues, preserving the file order.
    /// A new chain starts whenever the chain identifier changes.
    pub fn from_frame(top: &Topology, state: &State) -> Self {
        let mut chains: Vec<Chain> = vec![];
        let mut cur_resindex = usize::MAX;

        for (at, pos) in top.iter_atoms().zip(state.coords.iter()) {
            let rec_atom = RecordAtom {
                name: at.name.clone(),
                atomic_number: at.atomic_number,
                hetero: at.hetero,
                pos: *pos,
            };

            match chains.last_mut() {
                Some(ch) if ch.id.0 == at.chain => match ch.residues.last_mut() {
                    Some(res) if at.resindex == cur_resindex => res.atoms.push(rec_atom),
                    _ => {
                        cur_resindex = at.resindex;
                        ch.residues.push(new_residue(at, rec_atom));
                    }
                },
                _ => {
                    cur_resindex = at.resindex;
                    chains.push(Chain {
                        id: ChainId(at.chain),
                        residues: vec![new_residue(at, rec_atom)],
                    });
                }
            }
        }

        Self { chains }
    }

    pub fn first_chain(&self) -> Option<ChainId> {
        self.chains.first().map(|ch| ch.id)
    }

    pub fn chain(&self, id: &ChainId) -> Option<&Chain> {
        self.chains.iter().find(|ch| ch.id == *id)
    }

    pub fn num_atoms(&self) -> usize {
        self.iter_residues().map(|r| r.atoms.len()).sum()
    }

    pub fn num_residues(&self) -> usize {
        self.chains.iter().map(|ch| ch.residues.len()).sum()
    }

    pub fn iter_residues(&self) -> impl Iterator<Item = &Residue> {
        self.chains.iter().flat_map(|ch| ch.residues.iter())
    }

    pub fn iter_residues_mut(&mut self) -> impl Iterator<Item = &mut Residue> {
        self.chains.iter_mut().flat_map(|ch| ch.residues.iter_mut())
    }
}

fn new_residue(at: &Atom, first: RecordAtom) -> Residue {
    Residue {
        name: at.resname.clone(),
        number: at.resid,
        icode: at.icode,
        atoms: vec![first],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(name: &str, resname: &str, resid: i32, chain: char) -> Atom {
        Atom {
            name: name.into(),
            resname: resname.into(),
            resid,
            chain,
            ..Atom::new()
        }
    }

    #[test]
    fn group_chains_and_residues() {
        let top = Topology::new(vec![
            atom("N", "ALA", 1, 'A'),
            atom("CA", "ALA", 1, 'A'),
            atom("N", "HIP", 2, 'A'),
            atom("N", "GLY", 1, 'B'),
        ]);
        let st = State::new(vec![Pos::origin(); 4]);
        let rec = StructureRecord::from_frame(&top, &st);

        assert_eq!(rec.chains.len(), 2);
        assert_eq!(rec.first_chain(), Some(ChainId('A')));
        let numbers = |id| {
            rec.chain(&ChainId(id))
                .map(|ch| ch.residues.iter().map(|r| r.number).collect::<Vec<_>>())
        };
        assert_eq!(numbers('A'), Some(vec![1, 2]));
        assert_eq!(numbers('B'), Some(vec![1]));
        assert_eq!(numbers('C'), None);
        assert_eq!(rec.num_atoms(), 4);
        assert_eq!(rec.num_residues(), 3);
        assert!(rec.chains[0].residues[0].atom("CA").is_some());
    }

    #[test]
    fn empty_frame_has_no_chains() {
        let rec = StructureRecord::from_frame(&Topology::default(), &State::default());
        assert!(rec.first_chain().is_none());
    }
}
