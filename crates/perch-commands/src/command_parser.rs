//! Tokenizer for command text (the part of a message after the prefix).

use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

use crate::argument::Argument;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
/// Human-readable parse failure; parsing never yields a partial result.
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Positional arguments in order plus `name=value` arguments by name.
pub struct ParsedCommand {
    pub positional: Vec<Argument>,
    pub explicit: BTreeMap<String, Argument>,
}

pub fn parse_command(text: &str) -> Result<ParsedCommand, ParseError> {
    let mut cursor = Cursor {
        chars: text.chars().peekable(),
    };
    let mut parsed = ParsedCommand::default();
    loop {
        cursor.skip_whitespace();
        let Some(ch) = cursor.peek() else {
            return Ok(parsed);
        };
        if !ch.is_ascii_alphabetic() {
            let argument = cursor.value()?;
            cursor.expect_separator()?;
            parsed.positional.push(argument);
            continue;
        }

        let word = cursor.bareword();
        if cursor.peek() != Some('=') {
            cursor.expect_separator()?;
            parsed.positional.push(Argument::Flag(word));
            continue;
        }
        cursor.next();
        if cursor.peek().is_none_or(char::is_whitespace) {
            return Err(ParseError::new(format!(
                "Missing value for explicit argument {word}"
            )));
        }
        let argument = cursor.value()?;
        cursor.expect_separator()?;
        if parsed.explicit.contains_key(&word) {
            return Err(ParseError::new(format!(
                "Duplicate explicit argument {word}"
            )));
        }
        parsed.explicit.insert(word, argument);
    }
}

struct Cursor<'a> {
    chars: Peekable<Chars<'a>>,
}

impl Cursor<'_> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn next(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.next();
        }
    }

    fn expect_separator(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(ch) if ch.is_whitespace() => Ok(()),
            Some(ch) => Err(ParseError::new(format!(
                "Unexpected character {ch} after argument"
            ))),
        }
    }

    fn value(&mut self) -> Result<Argument, ParseError> {
        match self.peek() {
            Some(ch) if ch.is_ascii_alphabetic() => Ok(Argument::Flag(self.bareword())),
            Some(ch) if ch.is_ascii_digit() => self.number(),
            Some('.') => Err(ParseError::new("Malformed number")),
            Some('"') => self.string(),
            Some('[') => self.string_array(),
            Some(ch) => Err(ParseError::new(format!(
                "Unexpected toplevel character {ch}"
            ))),
            None => Err(ParseError::new("Unexpected end of input")),
        }
    }

    fn bareword(&mut self) -> String {
        let mut word = String::new();
        while let Some(ch) = self.peek() {
            if !(ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') {
                break;
            }
            word.push(ch);
            self.next();
        }
        word
    }

    fn digits(&mut self, into: &mut String) -> usize {
        let mut count = 0;
        while let Some(ch) = self.peek().filter(char::is_ascii_digit) {
            into.push(ch);
            self.next();
            count += 1;
        }
        count
    }

    fn number(&mut self) -> Result<Argument, ParseError> {
        let mut text = String::new();
        self.digits(&mut text);
        let is_float = self.peek() == Some('.');
        if is_float {
            text.push('.');
            self.next();
            if self.digits(&mut text) == 0 {
                return Err(ParseError::new("Malformed number"));
            }
        }
        if self
            .peek()
            .is_some_and(|ch| ch.is_ascii_alphanumeric() || ch == '.' || ch == '_')
        {
            return Err(ParseError::new("Malformed number"));
        }

        if is_float {
            text.parse::<f64>()
                .map(Argument::Float)
                .map_err(|_| ParseError::new("Malformed number"))
        } else {
            text.parse::<i64>()
                .map(Argument::Int)
                .map_err(|_| ParseError::new("Malformed number"))
        }
    }

    fn string(&mut self) -> Result<Argument, ParseError> {
        self.next();
        let mut value = String::new();
        loop {
            match self.next() {
                None => return Err(ParseError::new("Unclosed string")),
                Some('\\') => match self.next() {
                    Some(escaped) => value.push(escaped),
                    None => return Err(ParseError::new("Unclosed string")),
                },
                Some('"') => return Ok(Argument::String(value)),
                Some(ch) => value.push(ch),
            }
        }
    }

    fn string_array(&mut self) -> Result<Argument, ParseError> {
        self.next();
        let mut items = Vec::new();
        let mut current = String::new();
        loop {
            match self.next() {
                None => return Err(ParseError::new("Unclosed strarray")),
                Some('\\') => match self.next() {
                    Some(escaped) => current.push(escaped),
                    None => return Err(ParseError::new("Unclosed strarray")),
                },
                Some(',') => {
                    if !current.is_empty() {
                        items.push(std::mem::take(&mut current));
                    }
                }
                Some(']') => {
                    if !current.is_empty() {
                        items.push(current);
                    }
                    return Ok(Argument::StringArray(items));
                }
                Some(ch) => current.push(ch),
            }
        }
    }
}
