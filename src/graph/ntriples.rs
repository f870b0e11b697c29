//! Line-oriented N-Triples parsing and serialization.
//!
//! The parser is strict about statement shape: every non-blank,
//! non-comment line must hold exactly `subject predicate object .`, with
//! literals only in object position. Errors carry the one-based line
//! number so a broken payload can be pointed at directly.

use thiserror::Error;

use super::{Graph, Term, Triple};

/// A malformed N-Triples line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("N-Triples parse error on line {line}: {message}")]
pub struct NtParseError {
    /// One-based line number of the offending line.
    pub line: usize,
    pub message: String,
}

/// Parses an N-Triples document. Blank lines and `#` comment lines are
/// skipped.
pub fn parse(input: &str) -> Result<Graph, NtParseError> {
    let mut graph = Graph::new();
    for (idx, raw) in input.lines().enumerate() {
        if let Some(triple) = parse_line(raw, idx + 1)? {
            graph.insert(triple);
        }
    }
    Ok(graph)
}

/// Serializes a graph, one statement per line in graph order, without a
/// trailing newline.
pub fn serialize(graph: &Graph) -> String {
    let mut lines = Vec::with_capacity(graph.len());
    for triple in graph.iter() {
        lines.push(format!(
            "{} {} {} .",
            format_term(&triple.subject),
            format_term(&triple.predicate),
            format_term(&triple.object)
        ));
    }
    lines.join("\n")
}

pub(crate) fn format_term(term: &Term) -> String {
    match term {
        Term::Iri(iri) => format!("<{iri}>"),
        Term::Blank(label) => format!("_:{label}"),
        Term::Literal {
            lexical,
            lang,
            datatype,
        } => {
            let mut out = format!("\"{}\"", escape_literal(lexical));
            if let Some(lang) = lang {
                out.push('@');
                out.push_str(lang);
            } else if let Some(datatype) = datatype {
                out.push_str("^^");
                out.push('<');
                out.push_str(datatype);
                out.push('>');
            }
            out
        }
    }
}

fn escape_literal(lexical: &str) -> String {
    let mut out = String::with_capacity(lexical.len());
    for c in lexical.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04X}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

fn parse_line(raw: &str, line: usize) -> Result<Option<Triple>, NtParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let mut scanner = Scanner::new(trimmed, line);
    let subject = scanner.parse_subject()?;
    scanner.skip_ws();
    let predicate = Term::Iri(scanner.parse_iri()?);
    scanner.skip_ws();
    let object = scanner.parse_object()?;
    scanner.skip_ws();
    if !scanner.eat('.') {
        return Err(scanner.error("expected terminating '.'"));
    }
    scanner.skip_ws();
    if scanner.peek().is_some() {
        return Err(scanner.error("trailing content after statement"));
    }

    Ok(Some(Triple::new(subject, predicate, object)))
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Scanner {
    fn new(input: &str, line: usize) -> Self {
        Scanner {
            chars: input.chars().collect(),
            pos: 0,
            line,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, want: char) -> bool {
        if self.peek() == Some(want) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> NtParseError {
        NtParseError {
            line: self.line,
            message: message.into(),
        }
    }

    fn parse_subject(&mut self) -> Result<Term, NtParseError> {
        match self.peek() {
            Some('<') => Ok(Term::Iri(self.parse_iri()?)),
            Some('_') => Ok(Term::Blank(self.parse_blank_label()?)),
            _ => Err(self.error("expected IRI or blank node in subject position")),
        }
    }

    fn parse_object(&mut self) -> Result<Term, NtParseError> {
        match self.peek() {
            Some('<') => Ok(Term::Iri(self.parse_iri()?)),
            Some('_') => Ok(Term::Blank(self.parse_blank_label()?)),
            Some('"') => self.parse_literal(),
            _ => Err(self.error("expected IRI, blank node or literal in object position")),
        }
    }

    fn parse_iri(&mut self) -> Result<String, NtParseError> {
        if !self.eat('<') {
            return Err(self.error("expected '<'"));
        }
        let mut iri = String::new();
        loop {
            match self.bump() {
                Some('>') => return Ok(iri),
                Some(c) => iri.push(c),
                None => return Err(self.error("unterminated IRI")),
            }
        }
    }

    fn parse_blank_label(&mut self) -> Result<String, NtParseError> {
        if !self.eat('_') || !self.eat(':') {
            return Err(self.error("expected '_:' blank node label"));
        }
        let mut label = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                label.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if label.is_empty() {
            return Err(self.error("empty blank node label"));
        }
        Ok(label)
    }

    fn parse_literal(&mut self) -> Result<Term, NtParseError> {
        if !self.eat('"') {
            return Err(self.error("expected '\"'"));
        }
        let mut lexical = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => lexical.push(self.parse_escape()?),
                Some(c) => lexical.push(c),
                None => return Err(self.error("unterminated literal")),
            }
        }

        if self.eat('@') {
            let mut lang = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_alphanumeric() || c == '-' {
                    lang.push(c);
                    self.pos += 1;
                } else {
                    break;
                }
            }
            if lang.is_empty() {
                return Err(self.error("empty language tag"));
            }
            return Ok(Term::Literal {
                lexical,
                lang: Some(lang),
                datatype: None,
            });
        }

        if self.peek() == Some('^') {
            self.pos += 1;
            if !self.eat('^') {
                return Err(self.error("expected '^^' before datatype IRI"));
            }
            let datatype = self.parse_iri()?;
            return Ok(Term::Literal {
                lexical,
                lang: None,
                datatype: Some(datatype),
            });
        }

        Ok(Term::Literal {
            lexical,
            lang: None,
            datatype: None,
        })
    }

    fn parse_escape(&mut self) -> Result<char, NtParseError> {
        match self.bump() {
            Some('t') => Ok('\t'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('"') => Ok('"'),
            Some('\\') => Ok('\\'),
            Some('u') => self.parse_unicode_escape(4),
            Some('U') => self.parse_unicode_escape(8),
            Some(c) => Err(self.error(format!("unknown escape '\\{c}'"))),
            None => Err(self.error("dangling escape at end of literal")),
        }
    }

    fn parse_unicode_escape(&mut self, digits: usize) -> Result<char, NtParseError> {
        let mut value: u32 = 0;
        for _ in 0..digits {
            let c = self
                .bump()
                .ok_or_else(|| self.error("truncated unicode escape"))?;
            let digit = c
                .to_digit(16)
                .ok_or_else(|| self.error(format!("invalid hex digit '{c}' in unicode escape")))?;
            value = value * 16 + digit;
        }
        char::from_u32(value)
            .ok_or_else(|| self.error(format!("invalid unicode scalar U+{value:04X}")))
    }
}
