use std::collections::HashMap;

use super::SymbolGraphEvaluation;
use crate::assembler::{
    error::CompileErrorList,
    expression::{clike, ValueLookup},
};

/// The symbol table maps symbol names to their resolved values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: HashMap<String, clike::Value>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        Self::default()
    }

    /// Compiles every symbol of a valid evaluation in topological order, so each value only
    /// refers to symbols already present in the table.
    #[tracing::instrument(skip_all, fields(symbols = evaluation.topologic_order.len()))]
    pub fn resolve(evaluation: &SymbolGraphEvaluation, errors: &mut CompileErrorList) -> Self {
        let mut table = Self::new();
        for symbol in evaluation.ordered_symbols() {
            let value = clike::compile(&symbol.value, &table, errors);
            tracing::trace!(name = %symbol.name, value, "resolved symbol");
            table.new_symbol(symbol.name.as_str(), value);
        }
        table
    }

    pub fn find_symbol(&self, name: &str) -> Option<clike::Value> {
        self.symbols.get(name).copied()
    }

    /// Inserts or replaces a value.
    pub fn new_symbol(&mut self, name: &str, value: clike::Value) {
        self.symbols.insert(name.to_owned(), value);
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl ValueLookup<clike::Value> for SymbolTable {
    fn lookup(&self, name: &str) -> Option<clike::Value> {
        self.find_symbol(name)
    }
}
