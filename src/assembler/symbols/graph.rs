use std::collections::{BTreeMap, HashMap};

use super::{Symbol, SymbolError};
use crate::assembler::error::CompileErrorList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Input set of the symbol dependency analysis.
#[derive(Debug, Clone, Default)]
pub struct SymbolGraph {
    symbols: Vec<Symbol>,
}

/// Result of [`SymbolGraph::evaluate`]. All collections hold indices into `symbols`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolGraphEvaluation {
    pub invalid_names: Vec<usize>,
    pub duplicates: Vec<Vec<usize>>,
    pub sample_cycle: Vec<usize>,
    /// Only filled in if the graph is valid
    pub topologic_order: Vec<usize>,
    pub symbols: Vec<Symbol>,
}

impl SymbolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: Symbol) {
        tracing::trace!(%symbol, "inserting symbol");
        self.symbols.push(symbol);
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Edges point from a referenced symbol to every symbol referencing it.
    fn edges(&self, names: &HashMap<&str, Vec<usize>>) -> Vec<Vec<usize>> {
        let mut edges = vec![Vec::new(); self.symbols.len()];
        for (index, symbol) in self.symbols.iter().enumerate() {
            if !symbol.is_valid() {
                continue;
            }
            for reference in symbol.references() {
                for &referenced in names.get(reference.as_str()).into_iter().flatten() {
                    if !edges[referenced].contains(&index) {
                        edges[referenced].push(index);
                    }
                }
            }
        }
        edges
    }

    /// Depth first traversal over all nodes.
    ///
    /// Returns the nodes in order of completion and the first cycle encountered, if any.
    fn traverse(edges: &[Vec<usize>]) -> (Vec<usize>, Vec<usize>) {
        let mut marks = vec![Mark::Unvisited; edges.len()];
        let mut finished = Vec::with_capacity(edges.len());
        let mut cycle = Vec::new();

        for root in 0..edges.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            // (node, index of the next edge to follow)
            let mut stack = vec![(root, 0)];
            marks[root] = Mark::InProgress;

            while let Some((node, next)) = stack.last_mut() {
                let node = *node;
                match edges[node].get(*next) {
                    Some(&target) => {
                        *next += 1;
                        match marks[target] {
                            Mark::Unvisited => {
                                marks[target] = Mark::InProgress;
                                stack.push((target, 0));
                            }
                            Mark::InProgress if cycle.is_empty() => {
                                let start = stack
                                    .iter()
                                    .position(|(n, _)| *n == target)
                                    .unwrap_or_default();
                                cycle = stack[start..].iter().map(|(n, _)| *n).collect();
                            }
                            _ => {}
                        }
                    }
                    None => {
                        marks[node] = Mark::Done;
                        finished.push(node);
                        stack.pop();
                    }
                }
            }
        }

        (finished, cycle)
    }

    #[tracing::instrument(skip(self), fields(symbols = self.symbols.len()))]
    pub fn evaluate(&self) -> SymbolGraphEvaluation {
        let mut invalid_names = Vec::new();
        let mut names: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

        for (index, symbol) in self.symbols.iter().enumerate() {
            if !symbol.is_valid() {
                invalid_names.push(index);
                continue;
            }
            names.entry(symbol.name.as_str()).or_default().push(index);
        }
        for indices in names.values().filter(|indices| indices.len() > 1) {
            groups.insert(indices[0], indices.clone());
        }
        let duplicates: Vec<Vec<usize>> = groups.into_values().collect();

        let edges = self.edges(&names);
        let (finished, sample_cycle) = Self::traverse(&edges);

        let mut evaluation = SymbolGraphEvaluation {
            invalid_names,
            duplicates,
            sample_cycle,
            topologic_order: Vec::new(),
            symbols: self.symbols.clone(),
        };
        if evaluation.valid() {
            evaluation.topologic_order = finished.into_iter().rev().collect();
        }

        tracing::debug!(
            valid = evaluation.valid(),
            invalid = evaluation.invalid_names.len(),
            duplicates = evaluation.duplicates.len(),
            cycle = evaluation.sample_cycle.len(),
            "evaluated symbol graph"
        );
        evaluation
    }
}

impl SymbolGraphEvaluation {
    pub fn valid(&self) -> bool {
        self.invalid_names.is_empty() && self.duplicates.is_empty() && self.sample_cycle.is_empty()
    }

    /// Symbols in an order in which every symbol comes after the symbols it depends on.
    pub fn ordered_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.topologic_order.iter().map(|&i| &self.symbols[i])
    }

    /// Textual form of the sample cycle, e.g. `'a' -> 'b' -> 'a'`.
    pub fn cycle_description(&self) -> String {
        let mut names: Vec<String> = self
            .sample_cycle
            .iter()
            .map(|&i| format!("'{}'", self.symbols[i].name))
            .collect();
        if let Some(first) = names.first().cloned() {
            names.push(first);
        }
        names.join(" -> ")
    }

    /// Records one error per invalid name, per duplicate definition and per cycle member.
    pub fn report(&self, errors: &mut CompileErrorList) {
        for &index in &self.invalid_names {
            let symbol = &self.symbols[index];
            errors.push_error(
                symbol.name.span,
                SymbolError::InvalidName(symbol.name.text.clone()),
            );
        }
        for &index in self.duplicates.iter().flatten() {
            let symbol = &self.symbols[index];
            errors.push_error(
                symbol.name.span,
                SymbolError::DuplicateName(symbol.name.text.clone()),
            );
        }
        if !self.sample_cycle.is_empty() {
            let cycle = self.cycle_description();
            for &index in &self.sample_cycle {
                let symbol = &self.symbols[index];
                errors.push_error(
                    symbol.name.span,
                    SymbolError::Cycle {
                        name: symbol.name.text.clone(),
                        cycle: cycle.clone(),
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{
        source_position::PositionedString,
        symbols::SymbolBehavior,
    };

    use pretty_assertions::assert_eq;

    fn graph(symbols: &[(&str, &str)]) -> SymbolGraph {
        let mut graph = SymbolGraph::new();
        for (name, value) in symbols {
            graph.insert(Symbol::new(
                PositionedString::unpositioned(name),
                PositionedString::unpositioned(value),
                SymbolBehavior::Static,
            ));
        }
        graph
    }

    fn names(evaluation: &SymbolGraphEvaluation, indices: &[usize]) -> Vec<String> {
        indices
            .iter()
            .map(|&i| evaluation.symbols[i].name.text.clone())
            .collect()
    }

    #[test]
    fn test_topologic_order() {
        let evaluation = graph(&[("A", "B+1"), ("B", "1")]).evaluate();
        assert!(evaluation.valid());
        assert_eq!(evaluation.topologic_order, vec![1, 0]);
    }

    #[test]
    fn test_longer_chain() {
        let evaluation =
            graph(&[("D", "C * 2"), ("A", "1"), ("C", "A + B"), ("B", "A << 1")]).evaluate();
        assert!(evaluation.valid());

        let order = names(&evaluation, &evaluation.topologic_order);
        let position = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(position("A") < position("B"));
        assert!(position("A") < position("C"));
        assert!(position("B") < position("C"));
        assert!(position("C") < position("D"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_cycle() {
        let evaluation = graph(&[("A", "B"), ("B", "A")]).evaluate();
        assert!(!evaluation.valid());
        assert!(evaluation.topologic_order.is_empty());

        let mut cycle = names(&evaluation, &evaluation.sample_cycle);
        cycle.sort();
        assert_eq!(cycle, vec!["A", "B"]);
    }

    #[test]
    fn test_self_reference() {
        let evaluation = graph(&[("A", "1"), ("B", "B + A")]).evaluate();
        assert_eq!(evaluation.sample_cycle, vec![1]);
        assert_eq!(evaluation.cycle_description(), "'B' -> 'B'");
    }

    #[test]
    fn test_character_literal_is_not_a_cycle() {
        let evaluation = graph(&[("a", "'a'"), ("n", r"'\n' + a")]).evaluate();
        assert!(evaluation.valid());
        assert!(evaluation.sample_cycle.is_empty());
        assert_eq!(names(&evaluation, &evaluation.topologic_order), vec!["a", "n"]);
    }

    #[test]
    fn test_function_names_are_invalid() {
        let evaluation = graph(&[("max", "1"), ("A", "max(1, 2)")]).evaluate();
        assert!(!evaluation.valid());
        assert_eq!(evaluation.invalid_names, vec![0]);
        assert!(evaluation.sample_cycle.is_empty());
    }

    #[test]
    fn test_duplicates_and_invalid_names() {
        let evaluation = graph(&[("A", "1"), ("1x", "2"), ("A", "3"), ("B", "A")]).evaluate();
        assert!(!evaluation.valid());
        assert_eq!(evaluation.invalid_names, vec![1]);
        assert_eq!(evaluation.duplicates, vec![vec![0, 2]]);
        assert!(evaluation.sample_cycle.is_empty());
        assert!(evaluation.topologic_order.is_empty());
    }

    #[test]
    fn test_report() {
        let mut errors = CompileErrorList::new();
        graph(&[("A", "B"), ("B", "A"), ("C", "1"), ("C", "2")])
            .evaluate()
            .report(&mut errors);
        // two duplicate definitions and two cycle members
        assert_eq!(errors.error_count(), 4);
    }

    #[test]
    fn test_empty_graph() {
        let evaluation = SymbolGraph::new().evaluate();
        assert!(evaluation.valid());
        assert!(evaluation.topologic_order.is_empty());
    }
}
