use std::fmt;

use strum_macros::{EnumString, EnumVariantNames, IntoStaticStr};

use crate::assembler::allocator::RelativeMemoryPosition;

/// Commands to the assembler that are not instructions.
///
/// Directives start with a dot, e.g. `.section data`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumVariantNames, IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum DirectiveKind {
    /// `.equ NAME, expression`
    #[strum(serialize = ".equ")]
    Constant,
    /// `.section name`
    #[strum(serialize = ".section")]
    Section,
    /// `.macro name, param, param=default`
    #[strum(serialize = ".macro")]
    Macro,
    #[strum(serialize = ".endm")]
    MacroEnd,
    #[strum(serialize = ".resb")]
    ReserveBytes,
    #[strum(serialize = ".resh")]
    ReserveHalfs,
    #[strum(serialize = ".resw")]
    ReserveWords,
    #[strum(serialize = ".resd")]
    ReserveDoubles,
    #[strum(serialize = ".byte")]
    Byte,
    #[strum(serialize = ".half")]
    Half,
    #[strum(serialize = ".word")]
    Word,
    #[strum(serialize = ".dword")]
    Double,
}

impl DirectiveKind {
    /// Size in bytes of a single cell for memory reservations and definitions.
    pub fn cell_size(&self) -> Option<usize> {
        match self {
            DirectiveKind::ReserveBytes | DirectiveKind::Byte => Some(1),
            DirectiveKind::ReserveHalfs | DirectiveKind::Half => Some(2),
            DirectiveKind::ReserveWords | DirectiveKind::Word => Some(4),
            DirectiveKind::ReserveDoubles | DirectiveKind::Double => Some(8),
            _ => None,
        }
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{}", name)
    }
}

/// Reserves zero initialized memory, e.g. `.resw 4, 2` reserves six words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryReservation {
    pub cell_size: usize,
    /// Total size in bytes, known after allocation
    pub size: usize,
    pub position: Option<RelativeMemoryPosition>,
}

impl MemoryReservation {
    pub fn new(cell_size: usize) -> Self {
        Self {
            cell_size,
            size: 0,
            position: None,
        }
    }
}

/// Places values into memory, e.g. `.half 1, 0x20`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDefinition {
    /// Width of each value in bytes
    pub width: usize,
    pub position: Option<RelativeMemoryPosition>,
}

impl MemoryDefinition {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            position: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_directive_names() {
        assert_eq!(DirectiveKind::from_str(".equ"), Ok(DirectiveKind::Constant));
        assert_eq!(DirectiveKind::from_str(".WORD"), Ok(DirectiveKind::Word));
        assert!(DirectiveKind::from_str(".org").is_err());
        assert_eq!(DirectiveKind::MacroEnd.to_string(), ".endm");
    }

    #[test]
    fn test_cell_sizes() {
        assert_eq!(DirectiveKind::ReserveHalfs.cell_size(), Some(2));
        assert_eq!(DirectiveKind::Double.cell_size(), Some(8));
        assert_eq!(DirectiveKind::Section.cell_size(), None);
    }
}
