/// Number of elements known to the element guesser (up to Xe).
pub const NUM_ELEMENTS: usize = 55;

/// Translation from atomic number to element symbol. Index 0 is an unknown element.
pub const ELEMENT_NAME: [&str; NUM_ELEMENTS] = [
    "X",  "H",  "He", "Li", "Be", "B",  "C",  "N",  "O",  "F",  "Ne",
    "Na", "Mg", "Al", "Si", "P" , "S",  "Cl", "Ar", "K",  "Ca", "Sc",
    "Ti", "V",  "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge",
    "As", "Se", "Br", "Kr", "Rb", "Sr", "Y",  "Zr", "Nb", "Mo", "Tc",
    "Ru", "Rh", "Pd", "Ag", "Cd", "In", "Sn", "Sb", "Te", "I",  "Xe",
];

/// Atomic number for an element symbol in any letter case, `None` if unknown.
pub fn atomic_number_from_symbol(symbol: &str) -> Option<u8> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return None;
    }
    ELEMENT_NAME
        .iter()
        .skip(1)
        .position(|el| el.eq_ignore_ascii_case(symbol))
        .map(|i| (i + 1) as u8)
}

/// Element symbol for an atomic number. Unknown numbers map to "X".
pub fn element_symbol(atomic_number: u8) -> &'static str {
    ELEMENT_NAME
        .get(atomic_number as usize)
        .copied()
        .unwrap_or(ELEMENT_NAME[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols() {
        assert_eq!(atomic_number_from_symbol("ZN"), Some(30));
        assert_eq!(atomic_number_from_symbol("c"), Some(6));
        assert_eq!(atomic_number_from_symbol("Qq"), None);
        assert_eq!(element_symbol(12), "Mg");
        assert_eq!(element_symbol(200), "X");
    }
}
