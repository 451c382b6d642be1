use crate::assembler::{allocator::RelativeMemoryPosition, source_position::PositionedString};

/// A CPU instruction. Its mnemonic and operands live in the [`SourceLine`][crate::ast::SourceLine]
/// of the surrounding operation, the size is looked up in the architecture during allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instruction {
    /// Size of the instruction in bytes
    pub size: usize,
    pub position: Option<RelativeMemoryPosition>,
}

impl Instruction {
    pub fn new() -> Instruction {
        Instruction::default()
    }
}

/// An operand of an instruction before resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand<'a> {
    /// A register name, passed through unchanged
    Register(&'a str),
    /// Anything else is compiled as an expression
    Expression(&'a PositionedString),
}

impl<'a> Operand<'a> {
    pub fn classify(argument: &'a PositionedString, is_register: impl Fn(&str) -> bool) -> Self {
        let text = argument.as_str().trim();
        if is_register(text) {
            Operand::Register(text)
        } else {
            Operand::Expression(argument)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify() {
        let register = PositionedString::unpositioned(" x1");
        let expression = PositionedString::unpositioned("x1 + 4");
        let is_register = |name: &str| name == "x1";

        assert_eq!(
            Operand::classify(&register, is_register),
            Operand::Register("x1")
        );
        assert_eq!(
            Operand::classify(&expression, is_register),
            Operand::Expression(&expression)
        );
    }
}
