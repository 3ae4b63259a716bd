//! Propositional formulas over feature names.
//!
//! Presence conditions, feature mappings, and variant selections are all
//! plain propositional formulas over feature identifiers. This module
//! carries the small engine the rest of the crate needs: simplifying
//! constructors, a parser/printer for the grammar used in the artefact CSV
//! (`!`, `&&`, `||`, parentheses, `True`/`False`), and implication and
//! equivalence checks.
//!
//! Satisfiability-style queries are answered by bounded truth-table
//! enumeration. That keeps solver internals out of this crate; a query over
//! more than [`MAX_ENUM_VARIABLES`] distinct variables fails with a typed
//! error instead of silently taking exponential time.

mod parser;

pub use parser::ParseError;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on distinct variables for `implies`/`equivalent`.
///
/// Real-world block conditions nest a handful of features; 20 variables
/// (about a million assignments) is far beyond anything observed in studied
/// product lines while still bounding the worst case.
pub const MAX_ENUM_VARIABLES: usize = 20;

/// Errors from formula operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    /// An implication/equivalence query mentioned too many distinct
    /// variables for truth-table enumeration.
    #[error("formula query over {count} variables exceeds the enumeration limit of {limit}")]
    TooManyVariables { count: usize, limit: usize },

    /// A condition string could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A propositional formula over feature names.
///
/// `And`/`Or` keep their operands in insertion order; use [`Formula::and`]
/// and [`Formula::or`] to construct simplified connectives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Formula {
    True,
    False,
    Var(String),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    /// A variable literal.
    pub fn var(name: impl Into<String>) -> Self {
        Formula::Var(name.into())
    }

    /// Negation, with double negation collapsed.
    pub fn not(operand: Formula) -> Self {
        match operand {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Not(inner) => *inner,
            other => Formula::Not(Box::new(other)),
        }
    }

    /// Simplifying conjunction: flattens nested conjunctions, drops `True`
    /// operands, collapses to `False` on any `False` operand, removes
    /// duplicates, and reduces empty/singleton conjunctions.
    pub fn and(operands: impl IntoIterator<Item = Formula>) -> Self {
        let mut flat: Vec<Formula> = Vec::new();
        for op in operands {
            match op {
                Formula::True => {}
                Formula::False => return Formula::False,
                Formula::And(inner) => {
                    for f in inner {
                        if !flat.contains(&f) {
                            flat.push(f);
                        }
                    }
                }
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }
        match flat.len() {
            0 => Formula::True,
            1 => flat.swap_remove(0),
            _ => Formula::And(flat),
        }
    }

    /// Simplifying disjunction, dual to [`Formula::and`].
    pub fn or(operands: impl IntoIterator<Item = Formula>) -> Self {
        let mut flat: Vec<Formula> = Vec::new();
        for op in operands {
            match op {
                Formula::False => {}
                Formula::True => return Formula::True,
                Formula::Or(inner) => {
                    for f in inner {
                        if !flat.contains(&f) {
                            flat.push(f);
                        }
                    }
                }
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }
        match flat.len() {
            0 => Formula::False,
            1 => flat.swap_remove(0),
            _ => Formula::Or(flat),
        }
    }

    /// Parses the condition grammar used by the artefact CSV.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        parser::parse(input)
    }

    /// All distinct variable names, in sorted order.
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables<'a>(&'a self, into: &mut BTreeSet<&'a str>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Var(name) => {
                into.insert(name.as_str());
            }
            Formula::Not(inner) => inner.collect_variables(into),
            Formula::And(ops) | Formula::Or(ops) => {
                for op in ops {
                    op.collect_variables(into);
                }
            }
        }
    }

    /// Evaluates under the given assignment. Variables absent from the
    /// assignment evaluate to `false` (a feature not selected is off).
    pub fn eval(&self, assignment: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Formula::True => true,
            Formula::False => false,
            Formula::Var(name) => assignment(name),
            Formula::Not(inner) => !inner.eval(assignment),
            Formula::And(ops) => ops.iter().all(|op| op.eval(assignment)),
            Formula::Or(ops) => ops.iter().any(|op| op.eval(assignment)),
        }
    }

    /// True if `self → other` is a tautology.
    pub fn implies(&self, other: &Formula) -> Result<bool, FormulaError> {
        let mut vars: BTreeSet<&str> = self.variables();
        vars.extend(other.variables());
        for_all_assignments(&vars, |assignment| {
            !self.eval(assignment) || other.eval(assignment)
        })
    }

    /// True if the two formulas agree under every assignment.
    pub fn equivalent(&self, other: &Formula) -> Result<bool, FormulaError> {
        let mut vars: BTreeSet<&str> = self.variables();
        vars.extend(other.variables());
        for_all_assignments(&vars, |assignment| {
            self.eval(assignment) == other.eval(assignment)
        })
    }
}

/// Checks `predicate` under every assignment of the given variables.
fn for_all_assignments(
    vars: &BTreeSet<&str>,
    predicate: impl Fn(&dyn Fn(&str) -> bool) -> bool,
) -> Result<bool, FormulaError> {
    let names: Vec<&str> = vars.iter().copied().collect();
    if names.len() > MAX_ENUM_VARIABLES {
        return Err(FormulaError::TooManyVariables {
            count: names.len(),
            limit: MAX_ENUM_VARIABLES,
        });
    }

    for bits in 0u64..(1u64 << names.len()) {
        let assignment = |name: &str| -> bool {
            names
                .iter()
                .position(|n| *n == name)
                .map(|i| bits & (1 << i) != 0)
                .unwrap_or(false)
        };
        if !predicate(&assignment) {
            return Ok(false);
        }
    }
    Ok(true)
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => write!(f, "True"),
            Formula::False => write!(f, "False"),
            Formula::Var(name) => write!(f, "{}", name),
            Formula::Not(inner) => {
                if inner.is_atom() {
                    write!(f, "!{}", inner)
                } else {
                    write!(f, "!({})", inner)
                }
            }
            Formula::And(ops) => {
                let mut first = true;
                for op in ops {
                    if !first {
                        write!(f, " && ")?;
                    }
                    first = false;
                    if matches!(op, Formula::Or(_)) {
                        write!(f, "({})", op)?;
                    } else {
                        write!(f, "{}", op)?;
                    }
                }
                Ok(())
            }
            Formula::Or(ops) => {
                let mut first = true;
                for op in ops {
                    if !first {
                        write!(f, " || ")?;
                    }
                    first = false;
                    write!(f, "{}", op)?;
                }
                Ok(())
            }
        }
    }
}

impl Formula {
    fn is_atom(&self) -> bool {
        matches!(self, Formula::True | Formula::False | Formula::Var(_))
    }
}
