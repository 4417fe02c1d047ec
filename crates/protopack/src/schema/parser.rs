//! Runtime `.proto` text parser.
//!
//! Parses proto2/proto3 schema text into [`SchemaRegistry`] entries: message
//! and enum declarations, nested types, oneofs, map fields (including the
//! hidden entry message a map field desugars to), field options `packed` and
//! `default`, and `import` statements when loading from disk. Service,
//! extend and unknown option declarations are parsed and discarded; the
//! codec has no use for them.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{EnumSchema, FieldSchema, FieldType, Label, MessageSchema, SchemaRegistry, Syntax};
use crate::value::Value;

/// Error type for schema parsing and loading.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{file}:{line}: {message}")]
    Syntax {
        file: String,
        line: u32,
        message: String,
    },
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(u64),
    Float(f64),
    Str(Vec<u8>),
    Punct(u8),
    Eof,
}

#[derive(Debug)]
struct RawFile {
    syntax: Syntax,
    package: String,
    imports: Vec<String>,
    messages: Vec<RawMessage>,
    enums: Vec<RawEnum>,
    file: String,
}

#[derive(Debug)]
struct RawMessage {
    name: String,
    map_entry: bool,
    fields: Vec<RawField>,
    oneofs: Vec<String>,
    nested: Vec<RawMessage>,
    enums: Vec<RawEnum>,
}

#[derive(Debug)]
struct RawEnum {
    name: String,
    values: Vec<(String, i32)>,
}

#[derive(Debug)]
struct RawField {
    name: String,
    number: u32,
    line: u32,
    label: Label,
    ty: RawType,
    oneof: Option<usize>,
    packed: Option<bool>,
    default: Option<RawConst>,
}

#[derive(Debug)]
enum RawType {
    Scalar(FieldType),
    Named(String),
}

#[derive(Debug, Clone)]
enum RawConst {
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(Vec<u8>),
    Ident(String),
}

struct Parser<'s> {
    src: &'s [u8],
    pos: usize,
    line: u32,
    file: String,
    tok: Tok,
    tok_line: u32,
}

const MAX_FIELD_NUMBER: u64 = 536_870_911;

impl<'s> Parser<'s> {
    fn new(file: String, src: &'s str) -> Result<Self, ParseError> {
        let mut parser = Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            file,
            tok: Tok::Eof,
            tok_line: 1,
        };
        parser.bump()?;
        Ok(parser)
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            file: self.file.clone(),
            line: self.tok_line,
            message: message.into(),
        }
    }

    // ---- lexer ---------------------------------------------------------

    fn bump(&mut self) -> Result<(), ParseError> {
        self.tok = self.lex()?;
        Ok(())
    }

    fn lex(&mut self) -> Result<Tok, ParseError> {
        self.skip_trivia()?;
        self.tok_line = self.line;
        let Some(&c) = self.src.get(self.pos) else {
            return Ok(Tok::Eof);
        };
        match c {
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => Ok(self.lex_ident()),
            b'0'..=b'9' => self.lex_number(),
            b'"' | b'\'' => self.lex_string(c),
            b'{' | b'}' | b'[' | b']' | b'(' | b')' | b'<' | b'>' | b'=' | b';' | b',' | b'.'
            | b'-' => {
                self.pos += 1;
                Ok(Tok::Punct(c))
            }
            _ => Err(self.err(format!("unexpected character '{}'", c as char))),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.src.get(self.pos) {
                Some(b'\n') => {
                    self.line += 1;
                    self.pos += 1;
                }
                Some(b' ') | Some(b'\t') | Some(b'\r') => self.pos += 1,
                Some(b'/') => match self.src.get(self.pos + 1) {
                    Some(b'/') => {
                        while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
                            self.pos += 1;
                        }
                    }
                    Some(b'*') => {
                        self.pos += 2;
                        loop {
                            match self.src.get(self.pos) {
                                Some(b'*') if self.src.get(self.pos + 1) == Some(&b'/') => {
                                    self.pos += 2;
                                    break;
                                }
                                Some(b'\n') => {
                                    self.line += 1;
                                    self.pos += 1;
                                }
                                Some(_) => self.pos += 1,
                                None => return Err(self.err("unterminated block comment")),
                            }
                        }
                    }
                    _ => return Ok(()),
                },
                _ => return Ok(()),
            }
        }
    }

    fn lex_ident(&mut self) -> Tok {
        let start = self.pos;
        while let Some(&c) = self.src.get(self.pos) {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        Tok::Ident(String::from_utf8_lossy(&self.src[start..self.pos]).into_owned())
    }

    fn lex_number(&mut self) -> Result<Tok, ParseError> {
        let start = self.pos;
        if self.src[self.pos] == b'0'
            && matches!(self.src.get(self.pos + 1), Some(b'x') | Some(b'X'))
        {
            self.pos += 2;
            let digits = self.pos;
            while matches!(self.src.get(self.pos), Some(c) if c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let text = std::str::from_utf8(&self.src[digits..self.pos]).unwrap_or("");
            return u64::from_str_radix(text, 16)
                .map(Tok::Int)
                .map_err(|_| self.err("invalid hex literal"));
        }
        let mut float = false;
        while let Some(&c) = self.src.get(self.pos) {
            match c {
                b'0'..=b'9' => self.pos += 1,
                b'.' | b'e' | b'E' => {
                    float = true;
                    self.pos += 1;
                    if matches!(self.src.get(self.pos), Some(b'+') | Some(b'-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        if float {
            text.parse::<f64>()
                .map(Tok::Float)
                .map_err(|_| self.err(format!("invalid float literal '{text}'")))
        } else {
            text.parse::<u64>()
                .map(Tok::Int)
                .map_err(|_| self.err(format!("invalid integer literal '{text}'")))
        }
    }

    fn lex_string(&mut self, quote: u8) -> Result<Tok, ParseError> {
        self.pos += 1;
        let mut bytes = Vec::new();
        loop {
            match self.src.get(self.pos) {
                None | Some(b'\n') => return Err(self.err("unterminated string literal")),
                Some(&c) if c == quote => {
                    self.pos += 1;
                    return Ok(Tok::Str(bytes));
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escape = *self
                        .src
                        .get(self.pos)
                        .ok_or_else(|| self.err("unterminated escape"))?;
                    self.pos += 1;
                    match escape {
                        b'n' => bytes.push(b'\n'),
                        b'r' => bytes.push(b'\r'),
                        b't' => bytes.push(b'\t'),
                        b'\\' | b'\'' | b'"' => bytes.push(escape),
                        b'0'..=b'7' => {
                            let mut value = (escape - b'0') as u32;
                            for _ in 0..2 {
                                match self.src.get(self.pos) {
                                    Some(&c @ b'0'..=b'7') => {
                                        value = value * 8 + (c - b'0') as u32;
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            bytes.push(value as u8);
                        }
                        b'x' | b'X' => {
                            let mut value = 0u32;
                            let mut digits = 0;
                            while digits < 2 {
                                match self.src.get(self.pos) {
                                    Some(&c) if c.is_ascii_hexdigit() => {
                                        value = value * 16
                                            + (c as char).to_digit(16).unwrap_or(0);
                                        self.pos += 1;
                                        digits += 1;
                                    }
                                    _ => break,
                                }
                            }
                            if digits == 0 {
                                return Err(self.err("invalid hex escape"));
                            }
                            bytes.push(value as u8);
                        }
                        _ => {
                            return Err(self.err(format!(
                                "unknown escape '\\{}'",
                                escape as char
                            )))
                        }
                    }
                }
                Some(&c) => {
                    bytes.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    // ---- token helpers -------------------------------------------------

    fn eat_punct(&mut self, punct: u8) -> Result<bool, ParseError> {
        if self.tok == Tok::Punct(punct) {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_punct(&mut self, punct: u8) -> Result<(), ParseError> {
        if !self.eat_punct(punct)? {
            return Err(self.err(format!("expected '{}'", punct as char)));
        }
        Ok(())
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match std::mem::replace(&mut self.tok, Tok::Eof) {
            Tok::Ident(name) => {
                self.bump()?;
                Ok(name)
            }
            other => {
                self.tok = other;
                Err(self.err("expected identifier"))
            }
        }
    }

    fn expect_int(&mut self) -> Result<u64, ParseError> {
        match self.tok {
            Tok::Int(value) => {
                self.bump()?;
                Ok(value)
            }
            _ => Err(self.err("expected integer")),
        }
    }

    fn expect_string(&mut self) -> Result<Vec<u8>, ParseError> {
        match std::mem::replace(&mut self.tok, Tok::Eof) {
            Tok::Str(bytes) => {
                self.bump()?;
                Ok(bytes)
            }
            other => {
                self.tok = other;
                Err(self.err("expected string literal"))
            }
        }
    }

    /// A dotted type or option name; a leading dot marks an absolute
    /// reference.
    fn dotted_name(&mut self) -> Result<String, ParseError> {
        let mut name = String::new();
        if self.tok == Tok::Punct(b'.') {
            self.bump()?;
            name.push('.');
        }
        name.push_str(&self.expect_ident()?);
        while self.eat_punct(b'.')? {
            name.push('.');
            name.push_str(&self.expect_ident()?);
        }
        Ok(name)
    }

    /// Consumes the remainder of a statement through its terminating `;`,
    /// balancing any braces/brackets on the way (aggregate option values).
    fn skip_statement(&mut self) -> Result<(), ParseError> {
        let mut depth = 0u32;
        loop {
            match self.tok {
                Tok::Eof => return Err(self.err("unterminated statement")),
                Tok::Punct(b'{') | Tok::Punct(b'[') | Tok::Punct(b'(') => depth += 1,
                Tok::Punct(b'}') | Tok::Punct(b']') | Tok::Punct(b')') => {
                    depth = depth.saturating_sub(1)
                }
                Tok::Punct(b';') if depth == 0 => {
                    self.bump()?;
                    return Ok(());
                }
                _ => {}
            }
            self.bump()?;
        }
    }

    /// Consumes a `{ ... }` block (and anything before it, e.g. a service
    /// name), balancing nested braces.
    fn skip_block(&mut self) -> Result<(), ParseError> {
        loop {
            match self.tok {
                Tok::Eof => return Err(self.err("unterminated block")),
                Tok::Punct(b'{') => break,
                _ => self.bump()?,
            }
        }
        let mut depth = 0u32;
        loop {
            match self.tok {
                Tok::Eof => return Err(self.err("unterminated block")),
                Tok::Punct(b'{') => depth += 1,
                Tok::Punct(b'}') => {
                    depth -= 1;
                    if depth == 0 {
                        self.bump()?;
                        return Ok(());
                    }
                }
                _ => {}
            }
            self.bump()?;
        }
    }

    // ---- grammar -------------------------------------------------------

    fn parse_file(mut self) -> Result<RawFile, ParseError> {
        let mut file = RawFile {
            syntax: Syntax::Proto2,
            package: String::new(),
            imports: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
            file: self.file.clone(),
        };
        loop {
            match &self.tok {
                Tok::Eof => return Ok(file),
                Tok::Punct(b';') => self.bump()?,
                Tok::Ident(word) => match word.as_str() {
                    "syntax" => {
                        self.bump()?;
                        self.expect_punct(b'=')?;
                        let name = self.expect_string()?;
                        file.syntax = match name.as_slice() {
                            b"proto2" => Syntax::Proto2,
                            b"proto3" => Syntax::Proto3,
                            _ => return Err(self.err("syntax must be \"proto2\" or \"proto3\"")),
                        };
                        self.expect_punct(b';')?;
                    }
                    "package" => {
                        self.bump()?;
                        file.package = self.dotted_name()?;
                        self.expect_punct(b';')?;
                    }
                    "import" => {
                        self.bump()?;
                        if let Tok::Ident(modifier) = &self.tok {
                            if modifier == "public" || modifier == "weak" {
                                self.bump()?;
                            }
                        }
                        let path = self.expect_string()?;
                        file.imports
                            .push(String::from_utf8_lossy(&path).into_owned());
                        self.expect_punct(b';')?;
                    }
                    "option" => {
                        self.bump()?;
                        self.skip_statement()?;
                    }
                    "message" => {
                        self.bump()?;
                        let message = self.parse_message(file.syntax)?;
                        file.messages.push(message);
                    }
                    "enum" => {
                        self.bump()?;
                        let raw = self.parse_enum()?;
                        file.enums.push(raw);
                    }
                    "service" | "extend" => {
                        self.bump()?;
                        self.skip_block()?;
                    }
                    other => return Err(self.err(format!("unexpected '{other}'"))),
                },
                _ => return Err(self.err("unexpected token")),
            }
        }
    }

    fn parse_message(&mut self, syntax: Syntax) -> Result<RawMessage, ParseError> {
        let name = self.expect_ident()?;
        let mut message = RawMessage {
            name,
            map_entry: false,
            fields: Vec::new(),
            oneofs: Vec::new(),
            nested: Vec::new(),
            enums: Vec::new(),
        };
        self.expect_punct(b'{')?;
        while !self.eat_punct(b'}')? {
            match &self.tok {
                Tok::Punct(b';') => self.bump()?,
                Tok::Ident(word) => match word.as_str() {
                    "message" => {
                        self.bump()?;
                        let nested = self.parse_message(syntax)?;
                        message.nested.push(nested);
                    }
                    "enum" => {
                        self.bump()?;
                        let nested = self.parse_enum()?;
                        message.enums.push(nested);
                    }
                    "oneof" => {
                        self.bump()?;
                        let oneof_name = self.expect_ident()?;
                        let index = message.oneofs.len();
                        message.oneofs.push(oneof_name);
                        self.expect_punct(b'{')?;
                        while !self.eat_punct(b'}')? {
                            if self.eat_punct(b';')? {
                                continue;
                            }
                            if let Tok::Ident(word) = &self.tok {
                                if word == "option" {
                                    self.bump()?;
                                    self.skip_statement()?;
                                    continue;
                                }
                            }
                            let field =
                                self.parse_field(syntax, Label::Optional, Some(index))?;
                            message.fields.push(field);
                        }
                    }
                    "map" => {
                        self.bump()?;
                        self.parse_map_field(&mut message)?;
                    }
                    "option" | "reserved" | "extensions" => {
                        self.bump()?;
                        self.skip_statement()?;
                    }
                    "extend" => {
                        self.bump()?;
                        self.skip_block()?;
                    }
                    "group" => return Err(self.err("group fields are not supported")),
                    "required" => {
                        if syntax == Syntax::Proto3 {
                            return Err(self.err("'required' is not allowed in proto3"));
                        }
                        self.bump()?;
                        let field = self.parse_field(syntax, Label::Required, None)?;
                        message.fields.push(field);
                    }
                    "optional" => {
                        self.bump()?;
                        let field = self.parse_field(syntax, Label::Optional, None)?;
                        message.fields.push(field);
                    }
                    "repeated" => {
                        self.bump()?;
                        let field = self.parse_field(syntax, Label::Repeated, None)?;
                        message.fields.push(field);
                    }
                    _ => {
                        // Unlabeled field: the proto3 norm, tolerated for
                        // proto2 as well.
                        let field = self.parse_field(syntax, Label::Optional, None)?;
                        message.fields.push(field);
                    }
                },
                _ => return Err(self.err("unexpected token in message body")),
            }
        }
        Ok(message)
    }

    fn parse_field(
        &mut self,
        syntax: Syntax,
        label: Label,
        oneof: Option<usize>,
    ) -> Result<RawField, ParseError> {
        let ty = self.parse_type()?;
        let name = self.expect_ident()?;
        let line = self.tok_line;
        self.expect_punct(b'=')?;
        let number = self.parse_field_number()?;
        let (packed, default) = self.parse_field_options(syntax)?;
        self.expect_punct(b';')?;
        Ok(RawField {
            name,
            number,
            line,
            label,
            ty,
            oneof,
            packed,
            default,
        })
    }

    fn parse_field_number(&mut self) -> Result<u32, ParseError> {
        let number = self.expect_int()?;
        if number == 0 || number > MAX_FIELD_NUMBER {
            return Err(self.err(format!("field number {number} out of range")));
        }
        if (19_000..=19_999).contains(&number) {
            return Err(self.err(format!("field number {number} is reserved")));
        }
        Ok(number as u32)
    }

    fn parse_type(&mut self) -> Result<RawType, ParseError> {
        if self.tok == Tok::Punct(b'.') {
            return Ok(RawType::Named(self.dotted_name()?));
        }
        let Tok::Ident(word) = &self.tok else {
            return Err(self.err("expected field type"));
        };
        let scalar = scalar_type(word);
        match scalar {
            Some(ty) => {
                self.bump()?;
                Ok(RawType::Scalar(ty))
            }
            None => Ok(RawType::Named(self.dotted_name()?)),
        }
    }

    fn parse_map_field(&mut self, message: &mut RawMessage) -> Result<(), ParseError> {
        self.expect_punct(b'<')?;
        let key_word = self.expect_ident()?;
        let key_ty = scalar_type(&key_word)
            .filter(|ty| {
                !matches!(
                    ty,
                    FieldType::Double | FieldType::Float | FieldType::Bytes
                )
            })
            .ok_or_else(|| self.err(format!("'{key_word}' cannot key a map")))?;
        self.expect_punct(b',')?;
        let value_ty = self.parse_type()?;
        self.expect_punct(b'>')?;
        let name = self.expect_ident()?;
        let line = self.tok_line;
        self.expect_punct(b'=')?;
        let number = self.parse_field_number()?;
        // Map fields take no packed/default options.
        let (_, _) = self.parse_field_options(Syntax::Proto3)?;
        self.expect_punct(b';')?;

        let entry_name = map_entry_name(&name);
        message.nested.push(RawMessage {
            name: entry_name.clone(),
            map_entry: true,
            fields: vec![
                RawField {
                    name: "key".to_owned(),
                    number: 1,
                    line,
                    label: Label::Optional,
                    ty: RawType::Scalar(key_ty),
                    oneof: None,
                    packed: None,
                    default: None,
                },
                RawField {
                    name: "value".to_owned(),
                    number: 2,
                    line,
                    label: Label::Optional,
                    ty: value_ty,
                    oneof: None,
                    packed: None,
                    default: None,
                },
            ],
            oneofs: Vec::new(),
            nested: Vec::new(),
            enums: Vec::new(),
        });
        message.fields.push(RawField {
            name,
            number,
            line,
            label: Label::Repeated,
            ty: RawType::Named(entry_name),
            oneof: None,
            packed: None,
            default: None,
        });
        Ok(())
    }

    fn parse_field_options(
        &mut self,
        syntax: Syntax,
    ) -> Result<(Option<bool>, Option<RawConst>), ParseError> {
        let mut packed = None;
        let mut default = None;
        if !self.eat_punct(b'[')? {
            return Ok((packed, default));
        }
        loop {
            let option_name = if self.eat_punct(b'(')? {
                let name = self.dotted_name()?;
                self.expect_punct(b')')?;
                // Custom options may have a field path suffix.
                while self.eat_punct(b'.')? {
                    self.expect_ident()?;
                }
                name
            } else {
                self.dotted_name()?
            };
            self.expect_punct(b'=')?;
            let constant = self.parse_const()?;
            match option_name.as_str() {
                "packed" => match constant {
                    Some(RawConst::Ident(word)) if word == "true" => packed = Some(true),
                    Some(RawConst::Ident(word)) if word == "false" => packed = Some(false),
                    _ => return Err(self.err("packed must be true or false")),
                },
                "default" => {
                    if syntax == Syntax::Proto3 {
                        return Err(self.err("explicit default values are not allowed in proto3"));
                    }
                    default = constant;
                    if default.is_none() {
                        return Err(self.err("unsupported default value"));
                    }
                }
                _ => {}
            }
            if self.eat_punct(b']')? {
                return Ok((packed, default));
            }
            self.expect_punct(b',')?;
        }
    }

    /// An option constant. Aggregate (`{ ... }`) values are skipped and
    /// reported as `None`.
    fn parse_const(&mut self) -> Result<Option<RawConst>, ParseError> {
        if self.eat_punct(b'-')? {
            return match std::mem::replace(&mut self.tok, Tok::Eof) {
                Tok::Int(value) if value <= i64::MAX as u64 + 1 => {
                    self.bump()?;
                    Ok(Some(RawConst::Int((value as i64).wrapping_neg())))
                }
                Tok::Float(value) => {
                    self.bump()?;
                    Ok(Some(RawConst::Float(-value)))
                }
                Tok::Ident(word) if word == "inf" => {
                    self.bump()?;
                    Ok(Some(RawConst::Float(f64::NEG_INFINITY)))
                }
                other => {
                    self.tok = other;
                    Err(self.err("expected number after '-'"))
                }
            };
        }
        match std::mem::replace(&mut self.tok, Tok::Eof) {
            Tok::Int(value) => {
                self.bump()?;
                Ok(Some(RawConst::UInt(value)))
            }
            Tok::Float(value) => {
                self.bump()?;
                Ok(Some(RawConst::Float(value)))
            }
            Tok::Str(bytes) => {
                self.bump()?;
                Ok(Some(RawConst::Str(bytes)))
            }
            Tok::Ident(word) => {
                self.bump()?;
                Ok(Some(RawConst::Ident(word)))
            }
            tok @ Tok::Punct(b'{') => {
                self.tok = tok;
                let mut depth = 0u32;
                loop {
                    match self.tok {
                        Tok::Eof => return Err(self.err("unterminated aggregate value")),
                        Tok::Punct(b'{') => depth += 1,
                        Tok::Punct(b'}') => {
                            depth -= 1;
                            if depth == 0 {
                                self.bump()?;
                                return Ok(None);
                            }
                        }
                        _ => {}
                    }
                    self.bump()?;
                }
            }
            other => {
                self.tok = other;
                Err(self.err("expected option value"))
            }
        }
    }

    fn parse_enum(&mut self) -> Result<RawEnum, ParseError> {
        let name = self.expect_ident()?;
        let mut raw = RawEnum {
            name,
            values: Vec::new(),
        };
        self.expect_punct(b'{')?;
        while !self.eat_punct(b'}')? {
            if self.eat_punct(b';')? {
                continue;
            }
            let value_name = self.expect_ident()?;
            if value_name == "option" || value_name == "reserved" {
                self.skip_statement()?;
                continue;
            }
            self.expect_punct(b'=')?;
            let negative = self.eat_punct(b'-')?;
            let magnitude = self.expect_int()?;
            let number = if negative {
                if magnitude > i32::MAX as u64 + 1 {
                    return Err(self.err("enum value out of range"));
                }
                (magnitude as i64).wrapping_neg()
            } else {
                if magnitude > i32::MAX as u64 {
                    return Err(self.err("enum value out of range"));
                }
                magnitude as i64
            };
            if self.eat_punct(b'[')? {
                let mut depth = 1u32;
                while depth > 0 {
                    match self.tok {
                        Tok::Eof => return Err(self.err("unterminated value options")),
                        Tok::Punct(b'[') => {
                            depth += 1;
                            self.bump()?;
                        }
                        Tok::Punct(b']') => {
                            depth -= 1;
                            self.bump()?;
                        }
                        _ => self.bump()?,
                    }
                }
            }
            self.expect_punct(b';')?;
            raw.values.push((value_name, number as i32));
        }
        Ok(raw)
    }
}

fn scalar_type(word: &str) -> Option<FieldType> {
    Some(match word {
        "double" => FieldType::Double,
        "float" => FieldType::Float,
        "int32" => FieldType::Int32,
        "int64" => FieldType::Int64,
        "uint32" => FieldType::UInt32,
        "uint64" => FieldType::UInt64,
        "sint32" => FieldType::SInt32,
        "sint64" => FieldType::SInt64,
        "fixed32" => FieldType::Fixed32,
        "fixed64" => FieldType::Fixed64,
        "sfixed32" => FieldType::SFixed32,
        "sfixed64" => FieldType::SFixed64,
        "bool" => FieldType::Bool,
        "string" => FieldType::String,
        "bytes" => FieldType::Bytes,
        _ => return None,
    })
}

/// `my_map` becomes `MyMapEntry`, the descriptor naming convention for the
/// hidden entry message.
fn map_entry_name(field_name: &str) -> String {
    let mut name = String::new();
    for part in field_name.split('_') {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name.push_str("Entry");
    name
}

// ---- finalization ------------------------------------------------------

struct FlatMessage {
    full_name: String,
    syntax: Syntax,
    file: String,
    map_entry: bool,
    fields: Vec<RawField>,
    oneofs: Vec<String>,
}

fn flatten(
    message: RawMessage,
    scope: &str,
    syntax: Syntax,
    file: &str,
    messages: &mut Vec<FlatMessage>,
    enums: &mut Vec<(String, RawEnum)>,
) {
    let full_name = join_name(scope, &message.name);
    for nested in message.nested {
        flatten(nested, &full_name, syntax, file, messages, enums);
    }
    for nested in message.enums {
        enums.push((join_name(&full_name, &nested.name), nested));
    }
    messages.push(FlatMessage {
        full_name,
        syntax,
        file: file.to_owned(),
        map_entry: message.map_entry,
        fields: message.fields,
        oneofs: message.oneofs,
    });
}

fn join_name(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_owned()
    } else {
        format!("{scope}.{name}")
    }
}

/// Resolves a (possibly dotted, possibly absolute) type reference against
/// the lexical scope chain, innermost first.
fn resolve_name(name: &str, scope: &str, defined: &HashSet<String>) -> Option<String> {
    if let Some(absolute) = name.strip_prefix('.') {
        return defined.contains(absolute).then(|| absolute.to_owned());
    }
    let mut prefix = scope;
    loop {
        let candidate = join_name(prefix, name);
        if defined.contains(&candidate) {
            return Some(candidate);
        }
        match prefix.rfind('.') {
            Some(dot) => prefix = &prefix[..dot],
            None if !prefix.is_empty() => prefix = "",
            None => return None,
        }
    }
}

fn finalize(files: Vec<RawFile>) -> Result<SchemaRegistry, ParseError> {
    let mut flat_messages = Vec::new();
    let mut flat_enums = Vec::new();
    for file in files {
        let RawFile {
            syntax,
            package,
            messages,
            enums,
            file: file_name,
            ..
        } = file;
        for message in messages {
            flatten(
                message,
                &package,
                syntax,
                &file_name,
                &mut flat_messages,
                &mut flat_enums,
            );
        }
        for nested in enums {
            flat_enums.push((join_name(&package, &nested.name), nested));
        }
    }

    let mut enums: HashMap<String, EnumSchema> = HashMap::new();
    for (full_name, raw) in flat_enums {
        let schema = EnumSchema {
            full_name: full_name.clone(),
            values: raw.values,
        };
        if enums.insert(full_name.clone(), schema).is_some() {
            return Err(duplicate_error(&full_name));
        }
    }

    let message_names: HashSet<String> = flat_messages
        .iter()
        .map(|m| m.full_name.clone())
        .collect();
    if message_names.len() != flat_messages.len() {
        let mut seen = HashSet::new();
        for message in &flat_messages {
            if !seen.insert(&message.full_name) {
                return Err(duplicate_error(&message.full_name));
            }
        }
    }
    let enum_names: HashSet<String> = enums.keys().cloned().collect();

    let mut registry = SchemaRegistry::default();
    for message in flat_messages {
        let schema = finalize_message(message, &message_names, &enum_names, &enums)?;
        registry.messages.insert(schema.full_name.clone(), schema);
    }
    registry.enums = enums;
    Ok(registry)
}

fn duplicate_error(full_name: &str) -> ParseError {
    ParseError::Syntax {
        file: String::new(),
        line: 0,
        message: format!("duplicate type name '{full_name}'"),
    }
}

fn finalize_message(
    message: FlatMessage,
    message_names: &HashSet<String>,
    enum_names: &HashSet<String>,
    enums: &HashMap<String, EnumSchema>,
) -> Result<MessageSchema, ParseError> {
    let field_error = |field: &RawField, text: String| ParseError::Syntax {
        file: message.file.clone(),
        line: field.line,
        message: text,
    };

    let mut numbers = HashSet::new();
    let mut names = HashSet::new();
    let mut fields = Vec::with_capacity(message.fields.len());
    for raw in &message.fields {
        if !numbers.insert(raw.number) {
            return Err(field_error(
                raw,
                format!("duplicate field number {}", raw.number),
            ));
        }
        if !names.insert(raw.name.clone()) {
            return Err(field_error(raw, format!("duplicate field '{}'", raw.name)));
        }

        let ty = match &raw.ty {
            RawType::Scalar(ty) => ty.clone(),
            RawType::Named(name) => {
                if let Some(full) = resolve_name(name, &message.full_name, message_names) {
                    FieldType::Message(full)
                } else if let Some(full) = resolve_name(name, &message.full_name, enum_names) {
                    FieldType::Enum(full)
                } else {
                    return Err(field_error(raw, format!("type '{name}' is not defined")));
                }
            }
        };

        let probe = FieldSchema {
            name: raw.name.clone(),
            number: raw.number,
            label: raw.label,
            ty: ty.clone(),
            packed: false,
            oneof: raw.oneof,
            default: None,
        };
        let packed = match raw.packed {
            Some(true) => {
                if raw.label != Label::Repeated || !probe.is_packable() {
                    return Err(field_error(
                        raw,
                        format!("field '{}' cannot be packed", raw.name),
                    ));
                }
                true
            }
            Some(false) => false,
            None => {
                message.syntax == Syntax::Proto3
                    && raw.label == Label::Repeated
                    && probe.is_packable()
            }
        };

        let default = match &raw.default {
            Some(constant) => {
                if raw.label == Label::Repeated {
                    return Err(field_error(
                        raw,
                        "repeated fields cannot have a default".to_owned(),
                    ));
                }
                Some(convert_default(constant, &ty, enums).map_err(|t| field_error(raw, t))?)
            }
            None => None,
        };

        fields.push(FieldSchema {
            packed,
            default,
            ..probe
        });
    }

    Ok(MessageSchema::new(
        message.full_name,
        fields,
        message.oneofs,
        message.map_entry,
    ))
}

fn convert_default(
    constant: &RawConst,
    ty: &FieldType,
    enums: &HashMap<String, EnumSchema>,
) -> Result<Value, String> {
    match ty {
        FieldType::Int32
        | FieldType::Int64
        | FieldType::SInt32
        | FieldType::SInt64
        | FieldType::SFixed32
        | FieldType::SFixed64 => match constant {
            RawConst::Int(value) => Ok(Value::Int(*value)),
            RawConst::UInt(value) if *value <= i64::MAX as u64 => Ok(Value::Int(*value as i64)),
            _ => Err("default does not fit a signed integer field".to_owned()),
        },
        FieldType::UInt32 | FieldType::UInt64 | FieldType::Fixed32 | FieldType::Fixed64 => {
            match constant {
                RawConst::UInt(value) => Ok(Value::UInt(*value)),
                RawConst::Int(value) if *value >= 0 => Ok(Value::UInt(*value as u64)),
                _ => Err("default does not fit an unsigned integer field".to_owned()),
            }
        }
        FieldType::Double | FieldType::Float => match constant {
            RawConst::Float(value) => Ok(Value::Float(*value)),
            RawConst::Int(value) => Ok(Value::Float(*value as f64)),
            RawConst::UInt(value) => Ok(Value::Float(*value as f64)),
            RawConst::Ident(word) if word == "inf" => Ok(Value::Float(f64::INFINITY)),
            RawConst::Ident(word) if word == "nan" => Ok(Value::Float(f64::NAN)),
            _ => Err("default is not a number".to_owned()),
        },
        FieldType::Bool => match constant {
            RawConst::Ident(word) if word == "true" => Ok(Value::Bool(true)),
            RawConst::Ident(word) if word == "false" => Ok(Value::Bool(false)),
            _ => Err("default must be true or false".to_owned()),
        },
        FieldType::String | FieldType::Bytes => match constant {
            RawConst::Str(bytes) => Ok(Value::Bytes(bytes.clone())),
            _ => Err("default must be a string literal".to_owned()),
        },
        FieldType::Enum(enum_name) => match constant {
            RawConst::Ident(word) => enums
                .get(enum_name)
                .and_then(|schema| schema.number(word))
                .map(|number| Value::Int(number as i64))
                .ok_or_else(|| format!("'{word}' is not a value of {enum_name}")),
            _ => Err("enum default must be a value name".to_owned()),
        },
        FieldType::Message(_) => Err("message fields cannot have a default".to_owned()),
    }
}

// ---- entry points ------------------------------------------------------

pub(crate) fn parse_sources(sources: &[&str]) -> Result<SchemaRegistry, ParseError> {
    let mut files = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        let name = format!("<source {}>", index + 1);
        files.push(Parser::new(name, source)?.parse_file()?);
    }
    finalize(files)
}

pub(crate) fn parse_files(root: &Path) -> Result<SchemaRegistry, ParseError> {
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut queue: Vec<PathBuf> = vec![root.to_path_buf()];
    let root_dir = root.parent().map(Path::to_path_buf);
    let mut files = Vec::new();
    while let Some(path) = queue.pop() {
        if !visited.insert(path.clone()) {
            continue;
        }
        let source = std::fs::read_to_string(&path).map_err(|source| ParseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let raw = Parser::new(path.display().to_string(), &source)?.parse_file()?;
        for import in &raw.imports {
            queue.push(resolve_import(import, path.parent(), root_dir.as_deref())?);
        }
        files.push(raw);
    }
    finalize(files)
}

fn resolve_import(
    import: &str,
    importing_dir: Option<&Path>,
    root_dir: Option<&Path>,
) -> Result<PathBuf, ParseError> {
    for dir in [importing_dir, root_dir].into_iter().flatten() {
        let candidate = dir.join(import);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(ParseError::Io {
        path: import.to_owned(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "import not found"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS_BOOK: &str = r#"
        syntax = "proto3";
        package tutorial;

        message Person {
            string name = 1;
            int32 id = 2;
            string email = 3;

            enum PhoneType {
                MOBILE = 0;
                HOME = 1;
                WORK = 2;
            }

            message PhoneNumber {
                string number = 1;
                PhoneType type = 2;
            }

            repeated PhoneNumber phones = 4;
            map<string, string> attributes = 5;

            oneof contact {
                string nickname = 6;
                uint64 badge = 7;
            }
        }

        message AddressBook {
            repeated Person people = 1;
        }
    "#;

    #[test]
    fn parses_nested_types_and_resolution() {
        let registry = SchemaRegistry::parse(&[ADDRESS_BOOK]).unwrap();
        let person = registry.message("tutorial.Person").unwrap();
        assert_eq!(person.fields.len(), 7);

        let phones = person.field_by_number(4).unwrap();
        assert_eq!(
            phones.ty,
            FieldType::Message("tutorial.Person.PhoneNumber".to_owned())
        );
        assert_eq!(phones.label, Label::Repeated);
        assert!(!phones.packed);

        let phone = registry.message("tutorial.Person.PhoneNumber").unwrap();
        assert_eq!(
            phone.field_by_number(2).unwrap().ty,
            FieldType::Enum("tutorial.Person.PhoneType".to_owned())
        );

        let book = registry.message("tutorial.AddressBook").unwrap();
        assert_eq!(
            book.field_by_number(1).unwrap().ty,
            FieldType::Message("tutorial.Person".to_owned())
        );
    }

    #[test]
    fn map_field_desugars_to_entry_message() {
        let registry = SchemaRegistry::parse(&[ADDRESS_BOOK]).unwrap();
        let person = registry.message("tutorial.Person").unwrap();
        let attributes = person.field_by_number(5).unwrap();
        assert_eq!(attributes.label, Label::Repeated);
        assert_eq!(
            attributes.ty,
            FieldType::Message("tutorial.Person.AttributesEntry".to_owned())
        );

        let entry = registry
            .message("tutorial.Person.AttributesEntry")
            .unwrap();
        assert!(entry.map_entry);
        let (key, value) = entry.map_key_value().unwrap();
        assert_eq!(key.ty, FieldType::String);
        assert_eq!(value.ty, FieldType::String);
    }

    #[test]
    fn oneof_membership() {
        let registry = SchemaRegistry::parse(&[ADDRESS_BOOK]).unwrap();
        let person = registry.message("tutorial.Person").unwrap();
        assert_eq!(person.oneofs, ["contact"]);
        assert_eq!(person.field_by_number(6).unwrap().oneof, Some(0));
        assert_eq!(person.field_by_number(7).unwrap().oneof, Some(0));
        assert_eq!(person.field_by_number(1).unwrap().oneof, None);
    }

    #[test]
    fn proto3_packs_packable_repeated_fields() {
        let registry = SchemaRegistry::parse(&[r#"
            syntax = "proto3";
            message M {
                repeated int32 a = 1;
                repeated string b = 2;
                repeated sint64 c = 3 [packed = false];
            }
        "#])
        .unwrap();
        let message = registry.message("M").unwrap();
        assert!(message.field_by_number(1).unwrap().packed);
        assert!(!message.field_by_number(2).unwrap().packed);
        assert!(!message.field_by_number(3).unwrap().packed);
    }

    #[test]
    fn proto2_defaults_and_packed_option() {
        let registry = SchemaRegistry::parse(&[r#"
            syntax = "proto2";
            enum Mood { HAPPY = 1; SAD = 2; }
            message M {
                optional int32 a = 1 [default = -5];
                optional string b = 2 [default = "hi"];
                optional Mood mood = 3 [default = SAD];
                optional double d = 4 [default = 1.5];
                repeated fixed32 f = 5;
                repeated fixed32 g = 6 [packed = true];
            }
        "#])
        .unwrap();
        let message = registry.message("M").unwrap();
        assert_eq!(message.field_by_number(1).unwrap().default, Some(Value::Int(-5)));
        assert_eq!(
            message.field_by_number(2).unwrap().default,
            Some(Value::Bytes(b"hi".to_vec()))
        );
        assert_eq!(message.field_by_number(3).unwrap().default, Some(Value::Int(2)));
        assert_eq!(
            message.field_by_number(4).unwrap().default,
            Some(Value::Float(1.5))
        );
        assert!(!message.field_by_number(5).unwrap().packed);
        assert!(message.field_by_number(6).unwrap().packed);
    }

    #[test]
    fn rejects_required_in_proto3() {
        let error = SchemaRegistry::parse(&[r#"
            syntax = "proto3";
            message M { required int32 a = 1; }
        "#])
        .unwrap_err();
        assert!(error.to_string().contains("required"));
    }

    #[test]
    fn rejects_packed_on_string() {
        let error = SchemaRegistry::parse(&[r#"
            syntax = "proto2";
            message M { repeated string a = 1 [packed = true]; }
        "#])
        .unwrap_err();
        assert!(error.to_string().contains("cannot be packed"));
    }

    #[test]
    fn rejects_duplicate_field_numbers() {
        let error = SchemaRegistry::parse(&[r#"
            syntax = "proto3";
            message M { int32 a = 1; int32 b = 1; }
        "#])
        .unwrap_err();
        assert!(error.to_string().contains("duplicate field number"));
    }

    #[test]
    fn rejects_unknown_type() {
        let error = SchemaRegistry::parse(&[r#"
            syntax = "proto3";
            message M { Missing a = 1; }
        "#])
        .unwrap_err();
        assert!(error.to_string().contains("not defined"));
    }

    #[test]
    fn skips_services_options_and_comments() {
        let registry = SchemaRegistry::parse(&[r#"
            // line comment
            syntax = "proto3";
            option java_package = "com.example";
            /* block
               comment */
            message Request { string kind = 1; }
            message Response { int32 distance = 1; }
            service Fish {
                rpc Swim (Request) returns (Response);
            }
        "#])
        .unwrap();
        assert!(registry.message("Request").is_some());
        assert!(registry.message("Response").is_some());
    }

    #[test]
    fn cross_file_references() {
        let registry = SchemaRegistry::parse(&[
            r#"
                syntax = "proto3";
                package common;
                message Header { uint64 seq = 1; }
            "#,
            r#"
                syntax = "proto3";
                package app;
                message Envelope { common.Header header = 1; }
            "#,
        ])
        .unwrap();
        let envelope = registry.message("app.Envelope").unwrap();
        assert_eq!(
            envelope.field_by_number(1).unwrap().ty,
            FieldType::Message("common.Header".to_owned())
        );
    }

    #[test]
    fn map_entry_names() {
        assert_eq!(map_entry_name("attributes"), "AttributesEntry");
        assert_eq!(map_entry_name("my_map"), "MyMapEntry");
        assert_eq!(map_entry_name("x"), "XEntry");
    }
}
