//! Triple serialization: N-Triples in and out, plus a JSON array form.
//!
//! ```text
//! bytes ──parse_triples(fmt)──▶ Vec<Triple> ──MemoryGraph::extend──▶ endpoint
//! endpoint ──snapshot──▶ write_ntriples ──▶ writer
//! ```

use std::io::Write;

use super::{Format, Literal, Term, Triple};
use crate::{Error, Result};

/// Parse serialized triples.
pub fn parse_triples(bytes: &[u8], format: Format) -> Result<Vec<Triple>> {
    match format {
        Format::Json => Ok(serde_json::from_slice(bytes)?),
        Format::NTriples => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| Error::Parse { line: 0, message: e.to_string() })?;
            text.lines()
                .enumerate()
                .filter_map(|(i, line)| {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        None
                    } else {
                        Some(parse_line(line).map_err(|message| Error::Parse { line: i + 1, message }))
                    }
                })
                .collect()
        }
    }
}

/// Write triples as N-Triples, one per line.
pub fn write_ntriples<'a>(
    triples: impl IntoIterator<Item = &'a Triple>,
    writer: &mut dyn Write,
) -> Result<usize> {
    let mut written = 0;
    for t in triples {
        writeln!(writer, "{} {} {} .", t.subject, t.predicate, t.object)?;
        written += 1;
    }
    Ok(written)
}

pub(crate) fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

// ============================================================================
// N-Triples line parser
// ============================================================================

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn eat(&mut self, c: char) -> bool {
        match self.rest.strip_prefix(c) {
            Some(r) => {
                self.rest = r;
                true
            }
            None => false,
        }
    }

    fn take_until(&mut self, end: char) -> std::result::Result<&'a str, String> {
        let idx = self.rest.find(end).ok_or_else(|| format!("missing '{end}'"))?;
        let (head, tail) = self.rest.split_at(idx);
        self.rest = &tail[end.len_utf8()..];
        Ok(head)
    }

    fn take_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let idx = self.rest.find(|c: char| !f(c)).unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(idx);
        self.rest = tail;
        head
    }

    fn term(&mut self) -> std::result::Result<Term, String> {
        self.skip_ws();
        if self.eat('<') {
            return Ok(Term::Iri(self.take_until('>')?.to_string()));
        }
        if self.rest.starts_with("_:") {
            self.rest = &self.rest[2..];
            let label = self.take_while(|c| !c.is_whitespace() && c != '.');
            if label.is_empty() {
                return Err("empty blank node label".into());
            }
            return Ok(Term::Blank(label.to_string()));
        }
        if self.eat('"') {
            let lexical = self.string_body()?;
            let mut literal = Literal { lexical, language: None, datatype: None };
            if self.eat('@') {
                let lang = self.take_while(|c| c.is_ascii_alphanumeric() || c == '-');
                if lang.is_empty() {
                    return Err("empty language tag".into());
                }
                literal.language = Some(lang.to_string());
            } else if self.rest.starts_with("^^") {
                self.rest = &self.rest[2..];
                if !self.eat('<') {
                    return Err("datatype must be an IRI".into());
                }
                literal.datatype = Some(self.take_until('>')?.to_string());
            }
            return Ok(Term::Literal(literal));
        }
        Err(format!("unexpected input: {:?}", self.rest.chars().take(16).collect::<String>()))
    }

    fn string_body(&mut self) -> std::result::Result<String, String> {
        let rest = self.rest;
        let mut out = String::new();
        let mut chars = rest.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.rest = &rest[i + 1..];
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, '"')) => out.push('"'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, 'u')) => {
                        let hex: String = (0..4).filter_map(|_| chars.next().map(|(_, h)| h)).collect();
                        let code = u32::from_str_radix(&hex, 16).map_err(|_| format!("bad escape \\u{hex}"))?;
                        out.push(char::from_u32(code).ok_or_else(|| format!("bad code point {code:x}"))?);
                    }
                    other => return Err(format!("bad escape {:?}", other.map(|(_, c)| c))),
                },
                c => out.push(c),
            }
        }
        Err("unterminated string".into())
    }
}

fn parse_line(line: &str) -> std::result::Result<Triple, String> {
    let mut cur = Cursor { rest: line };
    let subject = cur.term()?;
    if matches!(subject, Term::Literal(_)) {
        return Err("literal in subject position".into());
    }
    let predicate = cur.term()?;
    if !matches!(predicate, Term::Iri(_)) {
        return Err("predicate must be an IRI".into());
    }
    let object = cur.term()?;
    cur.skip_ws();
    if !cur.eat('.') {
        return Err("missing terminating '.'".into());
    }
    cur.skip_ws();
    if !cur.rest.is_empty() && !cur.rest.starts_with('#') {
        return Err("trailing input after '.'".into());
    }
    Ok(Triple::new(subject, predicate, object))
}
