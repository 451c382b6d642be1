//! Two phase memory layout.
//!
//! During allocation every operation requests space inside its section and gets back a
//! [`RelativeMemoryPosition`]. Once everything is allocated, [`MemoryAllocator::calculate_positions`]
//! places the sections behind each other and relative positions can be turned into absolute
//! addresses.

use std::{fmt, str::FromStr};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Section '{0}' must have a non-zero alignment")]
    ZeroAlignment(String),
    #[error("Section alignment of '{name}' ({section_alignment}) is not a multiple of its data alignment ({data_alignment})")]
    MisalignedSection {
        name: String,
        section_alignment: usize,
        data_alignment: usize,
    },
    #[error("Section '{0}' does not exist")]
    UnknownSection(String),
    #[error("Missing section name")]
    MissingSectionName,
    #[error("Section '{0}' defined multiple times")]
    DuplicateSection(String),
    #[error("Memory exceeded: {requested} bytes requested, {maximum} bytes available")]
    MemoryExceeded { requested: usize, maximum: usize },
    #[error("Invalid section definition: '{0}'")]
    InvalidDefinition(String),
    #[error("Size of section '{0}' exceeds the address space")]
    SizeOverflow(String),
}

fn align_up(value: usize, alignment: usize) -> Option<usize> {
    match value % alignment {
        0 => Some(value),
        remainder => value.checked_add(alignment - remainder),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SectionDefinition {
    name: String,
    section_alignment: usize,
    data_alignment: usize,
}

impl SectionDefinition {
    pub fn new(
        name: &str,
        section_alignment: usize,
        data_alignment: usize,
    ) -> Result<Self, LayoutError> {
        if name.is_empty() {
            return Err(LayoutError::MissingSectionName);
        }
        if section_alignment == 0 || data_alignment == 0 {
            return Err(LayoutError::ZeroAlignment(name.to_owned()));
        }
        if section_alignment % data_alignment != 0 {
            return Err(LayoutError::MisalignedSection {
                name: name.to_owned(),
                section_alignment,
                data_alignment,
            });
        }
        Ok(Self {
            name: name.to_owned(),
            section_alignment,
            data_alignment,
        })
    }

    /// A section whose data is aligned like the section itself.
    pub fn aligned(name: &str, alignment: usize) -> Result<Self, LayoutError> {
        Self::new(name, alignment, alignment)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn section_alignment(&self) -> usize {
        self.section_alignment
    }

    pub fn data_alignment(&self) -> usize {
        self.data_alignment
    }
}

impl FromStr for SectionDefinition {
    type Err = LayoutError;

    /// Parses `name:alignment` or `name:section_alignment:data_alignment`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LayoutError::InvalidDefinition(s.to_owned());
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let number = |text: &str| text.parse::<usize>().map_err(|_| invalid());
        match parts.as_slice() {
            [name, alignment] => Self::aligned(name, number(alignment)?),
            [name, section_alignment, data_alignment] => Self::new(
                name,
                number(section_alignment)?,
                number(data_alignment)?,
            ),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for SectionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.name, self.section_alignment, self.data_alignment
        )
    }
}

/// A section and its layout state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySection {
    pub definition: SectionDefinition,
    pub current_size: usize,
    pub current_position: usize,
    /// Set once the position is final, cleared by any further allocation
    pub finalized: bool,
}

impl MemorySection {
    pub fn new(definition: SectionDefinition) -> Self {
        Self {
            definition,
            current_size: 0,
            current_position: 0,
            finalized: false,
        }
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// Reserves `size` bytes at the end of the section, aligned to the data alignment.
    ///
    /// Returns the offset of the reserved block inside the section.
    pub fn allocate_relative(&mut self, size: usize) -> Result<usize, LayoutError> {
        let overflow = || LayoutError::SizeOverflow(self.definition.name.clone());
        let offset = align_up(self.current_size, self.definition.data_alignment)
            .ok_or_else(overflow)?;
        let end = offset.checked_add(size).ok_or_else(overflow)?;
        self.current_size = end;
        self.finalized = false;
        Ok(offset)
    }

    /// Absolute address of `offset`, only known after the layout has been finalized.
    pub fn absolute_address(&self, offset: usize) -> Option<usize> {
        if self.finalized {
            self.current_position.checked_add(offset)
        } else {
            None
        }
    }
}

/// Position inside a named section, only meaningful until the layout is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelativeMemoryPosition {
    pub section: String,
    pub offset: usize,
}

impl RelativeMemoryPosition {
    pub fn new(section: &str, offset: usize) -> Self {
        Self {
            section: section.to_owned(),
            offset,
        }
    }
}

impl fmt::Display for RelativeMemoryPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{:#x}", self.section, self.offset)
    }
}

/// Holds all sections in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryAllocator {
    sections: Vec<MemorySection>,
}

impl MemoryAllocator {
    pub fn new(definitions: &[SectionDefinition]) -> Result<Self, LayoutError> {
        let mut allocator = Self::default();
        for definition in definitions {
            allocator.add_section(definition.clone())?;
        }
        Ok(allocator)
    }

    pub fn add_section(&mut self, definition: SectionDefinition) -> Result<(), LayoutError> {
        if self.has_section(definition.name()) {
            return Err(LayoutError::DuplicateSection(definition.name().to_owned()));
        }
        self.sections.push(MemorySection::new(definition));
        Ok(())
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    pub fn section(&self, name: &str) -> Option<&MemorySection> {
        self.sections.iter().find(|s| s.name() == name)
    }

    pub fn section_mut(&mut self, name: &str) -> Option<&mut MemorySection> {
        self.sections.iter_mut().find(|s| s.name() == name)
    }

    pub fn sections(&self) -> &[MemorySection] {
        &self.sections
    }

    #[tracing::instrument(skip(self))]
    pub fn allocate_relative(
        &mut self,
        section: &str,
        size: usize,
    ) -> Result<RelativeMemoryPosition, LayoutError> {
        let memory_section = self
            .section_mut(section)
            .ok_or_else(|| LayoutError::UnknownSection(section.to_owned()))?;
        let offset = memory_section.allocate_relative(size)?;
        Ok(RelativeMemoryPosition::new(section, offset))
    }

    /// Places all sections behind each other, returns the total size.
    #[tracing::instrument(skip(self))]
    pub fn calculate_positions(&mut self) -> Result<usize, LayoutError> {
        let mut position = 0usize;
        for section in self.sections.iter_mut() {
            let overflow = || LayoutError::SizeOverflow(section.definition.name.clone());
            position = align_up(position, section.definition.section_alignment)
                .ok_or_else(overflow)?;
            section.current_position = position;
            position = position
                .checked_add(section.current_size)
                .ok_or_else(overflow)?;
            section.finalized = true;
            tracing::debug!(
                section = section.name(),
                position = section.current_position,
                size = section.current_size,
                "placed section"
            );
        }
        Ok(position)
    }

    /// Total size the layout would have right now, without finalizing anything.
    ///
    /// Saturates at `usize::MAX` instead of overflowing.
    pub fn estimate_size(&self) -> usize {
        self.sections.iter().fold(0, |position: usize, section| {
            align_up(position, section.definition.section_alignment)
                .unwrap_or(usize::MAX)
                .saturating_add(section.current_size)
        })
    }

    /// Resets all sizes so the allocator can be reused for another compilation.
    pub fn clear(&mut self) {
        for section in self.sections.iter_mut() {
            section.current_size = 0;
            section.current_position = 0;
            section.finalized = false;
        }
    }

    pub fn absolute_address(&self, position: &RelativeMemoryPosition) -> Option<usize> {
        self.section(&position.section)
            .and_then(|section| section.absolute_address(position.offset))
    }
}

/// Keeps track of the section selected by the most recent section directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionTracker {
    current: String,
}

pub const INITIAL_SECTION: &str = "text";

impl SectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn switch_section(&mut self, name: &str) {
        self.current = name.to_owned();
    }

    pub fn current_section(&self) -> &str {
        &self.current
    }
}

impl Default for SectionTracker {
    fn default() -> Self {
        Self {
            current: INITIAL_SECTION.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn allocator() -> MemoryAllocator {
        MemoryAllocator::new(&[
            SectionDefinition::aligned("text", 8).unwrap(),
            SectionDefinition::aligned("data", 16).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_two_sections() -> Result<(), LayoutError> {
        let mut allocator = allocator();
        assert_eq!(allocator.allocate_relative("text", 32)?.offset, 0);
        assert_eq!(allocator.allocate_relative("text", 32)?.offset, 32);
        assert_eq!(allocator.allocate_relative("data", 64)?.offset, 0);

        assert_eq!(allocator.estimate_size(), 128);
        assert_eq!(allocator.calculate_positions()?, 128);

        let text = allocator.section("text").unwrap();
        assert_eq!((text.current_position, text.current_size), (0, 64));
        let data = allocator.section("data").unwrap();
        assert_eq!((data.current_position, data.current_size), (64, 64));
        Ok(())
    }

    #[test]
    fn test_alignment() -> Result<(), LayoutError> {
        let mut allocator = allocator();
        for size in [3, 1, 9, 0, 16, 5] {
            let position = allocator.allocate_relative("text", size)?;
            assert_eq!(position.offset % 8, 0);
            let section = allocator.section("text").unwrap();
            assert_eq!(section.current_size, position.offset + size);
        }
        Ok(())
    }

    #[test]
    fn test_section_alignment() -> Result<(), LayoutError> {
        let mut allocator = allocator();
        allocator.allocate_relative("text", 5)?;
        let position = allocator.allocate_relative("data", 4)?;

        assert_eq!(allocator.calculate_positions()?, 20);
        assert_eq!(allocator.absolute_address(&position), Some(16));
        Ok(())
    }

    #[test]
    fn test_address_requires_finalized_layout() -> Result<(), LayoutError> {
        let mut allocator = allocator();
        let first = allocator.allocate_relative("data", 4)?;
        assert_eq!(allocator.absolute_address(&first), None);

        allocator.calculate_positions()?;
        assert_eq!(allocator.absolute_address(&first), Some(0));

        // Allocating again invalidates the layout of that section
        let second = allocator.allocate_relative("data", 4)?;
        assert_eq!(allocator.absolute_address(&second), None);
        allocator.calculate_positions()?;
        assert_eq!(allocator.absolute_address(&second), Some(16));

        allocator.clear();
        assert_eq!(allocator.absolute_address(&first), None);
        Ok(())
    }

    #[test]
    fn test_size_overflow() -> Result<(), LayoutError> {
        let mut allocator = allocator();
        allocator.allocate_relative("data", usize::MAX - 8)?;
        assert_eq!(
            allocator.allocate_relative("data", 1),
            Err(LayoutError::SizeOverflow("data".to_string()))
        );
        assert_eq!(allocator.section("data").unwrap().current_size, usize::MAX - 8);

        allocator.allocate_relative("text", 16)?;
        assert_eq!(allocator.estimate_size(), usize::MAX);
        assert_eq!(
            allocator.calculate_positions(),
            Err(LayoutError::SizeOverflow("data".to_string()))
        );
        Ok(())
    }

    #[test]
    fn test_clear_is_idempotent() -> Result<(), LayoutError> {
        let mut allocator = allocator();
        let sizes = [4, 12, 1, 30];
        let first: Vec<usize> = sizes
            .iter()
            .map(|&s| allocator.allocate_relative("data", s).map(|p| p.offset))
            .collect::<Result<_, _>>()?;
        allocator.clear();
        let second: Vec<usize> = sizes
            .iter()
            .map(|&s| allocator.allocate_relative("data", s).map(|p| p.offset))
            .collect::<Result<_, _>>()?;
        assert_eq!(first, second);
        assert_eq!(first, vec![0, 16, 32, 48]);
        Ok(())
    }

    #[test]
    fn test_unknown_section() {
        let mut allocator = allocator();
        assert_eq!(
            allocator.allocate_relative("bss", 4),
            Err(LayoutError::UnknownSection("bss".to_string()))
        );
    }

    #[test]
    fn test_invalid_definitions() {
        assert_eq!(
            SectionDefinition::new("text", 0, 4),
            Err(LayoutError::ZeroAlignment("text".to_string()))
        );
        assert!(matches!(
            SectionDefinition::new("text", 6, 4),
            Err(LayoutError::MisalignedSection { .. })
        ));
        assert_eq!(
            MemoryAllocator::new(&[
                SectionDefinition::aligned("text", 4).unwrap(),
                SectionDefinition::aligned("text", 8).unwrap(),
            ]),
            Err(LayoutError::DuplicateSection("text".to_string()))
        );
    }

    #[test]
    fn test_parse_definition() {
        assert_eq!(
            "data:16".parse::<SectionDefinition>(),
            SectionDefinition::new("data", 16, 16)
        );
        assert_eq!(
            "bss:64:8".parse::<SectionDefinition>(),
            SectionDefinition::new("bss", 64, 8)
        );
        assert_eq!(
            "bss".parse::<SectionDefinition>(),
            Err(LayoutError::InvalidDefinition("bss".to_string()))
        );
        assert_eq!(
            "bss:x".parse::<SectionDefinition>(),
            Err(LayoutError::InvalidDefinition("bss:x".to_string()))
        );
    }

    #[test]
    fn test_section_tracker() {
        let mut tracker = SectionTracker::new();
        assert_eq!(tracker.current_section(), "text");
        tracker.switch_section("data");
        assert_eq!(tracker.current_section(), "data");
    }
}
