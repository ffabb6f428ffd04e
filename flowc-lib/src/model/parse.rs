//! Text grammar naming port elements of a model.
//!
//! ```text
//! elements := '{' range (',' range)* '}' | range
//! range    := node_id '.' port_name ('[' index (':' index)? ']')?
//! ```
//!
//! `[i]` selects one element and `[i:j]` the elements `i..j`. Whitespace
//! between tokens is ignored.

use std::fmt::Write;

use super::model_impl::Model;
use super::port_elements::{PortElementsBase, PortRange};
use super::types::{NodeId, SPEC_DELIMITERS};
use crate::error::{Error, Result};

struct Tokenizer<'s> {
    tokens: Vec<&'s str>,
    position: usize,
}

impl<'s> Tokenizer<'s> {
    fn new(text: &'s str) -> Self {
        let mut tokens = Vec::new();
        let mut start = None;
        for (i, c) in text.char_indices() {
            let is_delimiter = SPEC_DELIMITERS.contains(c);
            if c.is_whitespace() || is_delimiter {
                if let Some(s) = start.take() {
                    tokens.push(&text[s..i]);
                }
                if is_delimiter {
                    tokens.push(&text[i..i + c.len_utf8()]);
                }
            } else if start.is_none() {
                start = Some(i);
            }
        }
        if let Some(s) = start {
            tokens.push(&text[s..]);
        }
        Self {
            tokens,
            position: 0,
        }
    }

    fn peek(&self) -> Option<&'s str> {
        self.tokens.get(self.position).copied()
    }

    fn read(&mut self, expected: &str) -> Result<&'s str> {
        let token = self.peek().ok_or_else(|| self.error(format!("expected {}, found end of input", expected)))?;
        self.position += 1;
        Ok(token)
    }

    fn read_name(&mut self, expected: &str) -> Result<&'s str> {
        let token = self.read(expected)?;
        if SPEC_DELIMITERS.contains(token) {
            self.position -= 1;
            return Err(self.error(format!("expected {}, found '{}'", expected, token)));
        }
        Ok(token)
    }

    fn read_index(&mut self) -> Result<usize> {
        let token = self.read("an index")?;
        token.parse().map_err(|_| Error::Parse {
            position: self.position - 1,
            message: format!("expected an index, found '{}'", token),
        })
    }

    fn expect(&mut self, delimiter: &str) -> Result<()> {
        match self.peek() {
            Some(token) if token == delimiter => {
                self.position += 1;
                Ok(())
            }
            Some(token) => Err(self.error(format!("expected '{}', found '{}'", delimiter, token))),
            None => Err(self.error(format!("expected '{}', found end of input", delimiter))),
        }
    }

    fn error(&self, message: String) -> Error {
        Error::Parse {
            position: self.position,
            message,
        }
    }
}

/// Parses `text` into elements of ports of `model`.
pub fn parse_port_elements(model: &Model, text: &str) -> Result<PortElementsBase> {
    let mut tokenizer = Tokenizer::new(text);
    let elements = if tokenizer.peek() == Some("{") {
        tokenizer.expect("{")?;
        let mut ranges = vec![parse_range(model, &mut tokenizer)?];
        while tokenizer.peek() == Some(",") {
            tokenizer.expect(",")?;
            ranges.push(parse_range(model, &mut tokenizer)?);
        }
        tokenizer.expect("}")?;
        PortElementsBase::from_ranges(ranges)?
    } else {
        PortElementsBase::from_range(parse_range(model, &mut tokenizer)?)
    };

    if let Some(token) = tokenizer.peek() {
        return Err(tokenizer.error(format!("unexpected trailing '{}'", token)));
    }
    Ok(elements)
}

fn parse_range(model: &Model, tokenizer: &mut Tokenizer<'_>) -> Result<PortRange> {
    let node_token = tokenizer.read_name("a node id")?;
    tokenizer.expect(".")?;
    let port_name = tokenizer.read_name("a port name")?;

    let node = NodeId::new(node_token)
        .ok()
        .and_then(|id| model.get_node(&id))
        .ok_or_else(|| Error::NullReference(format!("couldn't find node {}", node_token)))?;
    let port = node.output_port(port_name)?;

    if tokenizer.peek() != Some("[") {
        return Ok(PortRange::full(port));
    }

    tokenizer.expect("[")?;
    let start = tokenizer.read_index()?;
    let range = if tokenizer.peek() == Some(":") {
        tokenizer.expect(":")?;
        let end = tokenizer.read_index()?;
        let count = end.checked_sub(start).ok_or_else(|| {
            Error::IndexOutOfRange(format!("range end {} precedes start {}", end, start))
        })?;
        PortRange::new(port, start, count)?
    } else {
        PortRange::element(port, start)?
    };
    tokenizer.expect("]")?;
    Ok(range)
}

/// Writes `elements` in the grammar accepted by [`parse_port_elements`].
pub fn format_port_elements(model: &Model, elements: &PortElementsBase) -> Result<String> {
    if elements.num_ranges() == 0 {
        return Err(Error::InvalidArgument("cannot format empty elements".into()));
    }

    let mut parts = Vec::with_capacity(elements.num_ranges());
    for range in elements.ranges() {
        let node = model
            .node(range.port().node)
            .ok_or_else(|| Error::NullReference("port of a removed node".into()))?;
        let port = model.port(range.port())?;

        let mut part = format!("{}.{}", node.id(), port.name());
        if range.is_fixed_size() {
            // Writing to a String cannot fail.
            let _ = if range.size() == 1 {
                write!(part, "[{}]", range.start_index())
            } else {
                write!(part, "[{}:{}]", range.start_index(), range.end())
            };
        }
        parts.push(part);
    }

    Ok(if parts.len() == 1 {
        parts.remove(0)
    } else {
        format!("{{{}}}", parts.join(","))
    })
}
