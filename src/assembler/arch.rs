use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;

use super::allocator::{LayoutError, MemoryAllocator, SectionDefinition};

/// Everything the assembler needs to know about the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Architecture {
    name: String,
    /// Mnemonic (lowercase) to instruction length in bytes
    instructions: HashMap<String, usize>,
    registers: HashSet<String>,
    sections: Vec<SectionDefinition>,
    /// Upper bound of the total program size in bytes
    memory_size: Option<usize>,
}

impl Architecture {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            instructions: HashMap::new(),
            registers: HashSet::new(),
            sections: Vec::new(),
            memory_size: None,
        }
    }

    pub fn with_instructions<'a>(
        mut self,
        size: usize,
        mnemonics: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        for mnemonic in mnemonics {
            self.instructions.insert(mnemonic.to_lowercase(), size);
        }
        self
    }

    pub fn with_registers<S: Into<String>>(mut self, registers: impl IntoIterator<Item = S>) -> Self {
        self.registers.extend(registers.into_iter().map(Into::into));
        self
    }

    /// Adds a section, or replaces the one with the same name in place.
    pub fn with_section(mut self, section: SectionDefinition) -> Self {
        match self.sections.iter_mut().find(|s| s.name() == section.name()) {
            Some(existing) => *existing = section,
            None => self.sections.push(section),
        }
        self
    }

    pub fn with_memory_size(mut self, memory_size: Option<usize>) -> Self {
        self.memory_size = memory_size;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instruction_size(&self, mnemonic: &str) -> Option<usize> {
        self.instructions.get(&mnemonic.to_lowercase()).copied()
    }

    pub fn is_register(&self, name: &str) -> bool {
        self.registers.contains(name)
    }

    pub fn sections(&self) -> &[SectionDefinition] {
        &self.sections
    }

    pub fn memory_size(&self) -> Option<usize> {
        self.memory_size
    }

    /// A fresh allocator with all sections of the architecture.
    pub fn allocator(&self) -> Result<MemoryAllocator, LayoutError> {
        MemoryAllocator::new(&self.sections)
    }

    /// A small RISC-like target where every instruction takes four bytes.
    fn toy_risc() -> Self {
        let mnemonics = [
            "add", "sub", "and", "or", "xor", "sll", "srl", "sra", "slt", "mul", "div", "rem",
            "addi", "andi", "ori", "xori", "slli", "srli", "srai", "slti", "li", "la", "mv", "lui",
            "lb", "lh", "lw", "ld", "sb", "sh", "sw", "sd", "beq", "bne", "blt", "bge", "j",
            "jal", "jalr", "jr", "call", "ret", "nop", "ecall",
        ];
        let registers = (0..32)
            .map(|i| format!("x{}", i))
            .chain(["zero", "ra", "sp", "gp", "tp", "fp"].iter().map(|r| r.to_string()));

        Architecture::new("toy-risc")
            .with_instructions(4, mnemonics)
            .with_registers(registers)
            .with_section(SectionDefinition::aligned("text", 4).expect("valid text section"))
            .with_section(SectionDefinition::aligned("data", 4).expect("valid data section"))
    }
}

lazy_static! {
    pub static ref DEFAULT_ARCHITECTURE: Architecture = Architecture::toy_risc();
}
