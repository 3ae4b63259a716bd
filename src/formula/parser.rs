//! Parser for the condition grammar of the artefact CSV.
//!
//! Grammar (precedence low to high): `||`, `&&`, `!`, atoms. Atoms are
//! parenthesised formulas, feature identifiers, or the constants
//! `True`/`False` (case-insensitive). Single `&`/`|` are accepted as
//! synonyms for the doubled operators, since both spellings occur in the
//! wild in extracted conditions.

use thiserror::Error;

use super::Formula;

/// Errors from parsing a condition string. Positions are 0-based byte
/// offsets into the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected character '{ch}' at offset {pos}")]
    UnexpectedChar { pos: usize, ch: char },

    #[error("unexpected end of condition")]
    UnexpectedEnd,

    #[error("expected ')' at offset {pos}")]
    MissingCloseParen { pos: usize },

    #[error("trailing input at offset {pos}")]
    TrailingInput { pos: usize },

    #[error("empty condition")]
    Empty,
}

/// Parses a condition string into a [`Formula`].
pub fn parse(input: &str) -> Result<Formula, ParseError> {
    let mut parser = Parser { input, pos: 0 };
    parser.skip_whitespace();
    if parser.at_end() {
        return Err(ParseError::Empty);
    }
    let formula = parser.parse_or()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(ParseError::TrailingInput { pos: parser.pos });
    }
    Ok(formula)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    /// Consumes `op` (possibly doubled) if it is next; returns whether it was.
    fn eat_operator(&mut self, op: u8) -> bool {
        self.skip_whitespace();
        if self.peek() != Some(op) {
            return false;
        }
        self.pos += 1;
        if self.peek() == Some(op) {
            self.pos += 1;
        }
        true
    }

    fn parse_or(&mut self) -> Result<Formula, ParseError> {
        let first = self.parse_and()?;
        if !self.eat_operator(b'|') {
            return Ok(first);
        }
        let mut operands = vec![first, self.parse_and()?];
        while self.eat_operator(b'|') {
            operands.push(self.parse_and()?);
        }
        Ok(Formula::or(operands))
    }

    fn parse_and(&mut self) -> Result<Formula, ParseError> {
        let first = self.parse_unary()?;
        if !self.eat_operator(b'&') {
            return Ok(first);
        }
        let mut operands = vec![first, self.parse_unary()?];
        while self.eat_operator(b'&') {
            operands.push(self.parse_unary()?);
        }
        Ok(Formula::and(operands))
    }

    fn parse_unary(&mut self) -> Result<Formula, ParseError> {
        self.skip_whitespace();
        if self.peek() == Some(b'!') {
            self.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(Formula::not(operand));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Formula, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(ParseError::UnexpectedEnd),
            Some(b'(') => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.skip_whitespace();
                if self.peek() != Some(b')') {
                    return Err(ParseError::MissingCloseParen { pos: self.pos });
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(c) if is_ident_byte(c) => {
                let start = self.pos;
                while self.peek().map(is_ident_byte).unwrap_or(false) {
                    self.pos += 1;
                }
                // Identifier bytes are ASCII, so these are char boundaries.
                let name = &self.input[start..self.pos];
                if name.eq_ignore_ascii_case("true") {
                    Ok(Formula::True)
                } else if name.eq_ignore_ascii_case("false") {
                    Ok(Formula::False)
                } else {
                    Ok(Formula::var(name))
                }
            }
            Some(other) => Err(ParseError::UnexpectedChar {
                pos: self.pos,
                ch: other as char,
            }),
        }
    }
}

/// Feature identifiers: macro-name characters as they appear in `#if`
/// conditions extracted from C-like sources.
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
