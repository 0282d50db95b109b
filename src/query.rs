//! Query translation into the normalized prefix form.
//!
//! Search and Scan accept queries in three forms. Prefix queries are passed
//! to the backend unchanged; keyword and contextual queries go through a
//! [`QueryTranslator`] when one is configured for that form, and are passed
//! through verbatim otherwise.

use std::sync::Arc;

use crate::apdu::{Diagnostic, Query, diagnostic::bib1};

/// Turns a query language into the normalized prefix form.
pub trait QueryTranslator: Send + Sync {
    /// Translate `raw`.
    ///
    /// # Errors
    /// Returns the diagnostic to report when `raw` cannot be translated.
    fn translate(&self, raw: &str) -> Result<String, Diagnostic>;
}

/// Translators configured for the non-prefix query forms.
#[derive(Clone, Default)]
pub struct Translators {
    /// Translator for keyword queries.
    pub keyword: Option<Arc<dyn QueryTranslator>>,
    /// Translator for contextual queries.
    pub contextual: Option<Arc<dyn QueryTranslator>>,
}

impl Translators {
    /// Bring `query` into prefix form.
    ///
    /// # Errors
    /// Propagates the translator's diagnostic.
    pub fn normalize(&self, query: &Query) -> Result<String, Diagnostic> {
        let translator = match query {
            Query::Prefix(text) => return Ok(text.clone()),
            Query::Keyword(_) => self.keyword.as_deref(),
            Query::Contextual(_) => self.contextual.as_deref(),
        };
        match translator {
            Some(translator) => translator.translate(query.text()),
            None => Ok(query.text().to_owned()),
        }
    }
}

impl std::fmt::Debug for Translators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translators")
            .field("keyword", &self.keyword.is_some())
            .field("contextual", &self.contextual.is_some())
            .finish()
    }
}

/// Translator for simple keyword queries.
///
/// Words are combined with `and`, `or` and `not` (case-insensitive, left
/// associative); adjacent words without an operator are implicitly and-ed.
/// `field=word` restricts a word to a field and double quotes group a phrase.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordTranslator;

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Word(String),
    Op(&'static str),
}

fn tokenize(raw: &str) -> Result<Vec<Token>, Diagnostic> {
    let mut tokens = Vec::new();
    let mut chars = raw.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut word = String::new();
        let mut quoted = false;
        while let Some(&ch) = chars.peek() {
            if ch == '"' {
                quoted = !quoted;
                chars.next();
                continue;
            }
            if ch.is_whitespace() && !quoted {
                break;
            }
            word.push(ch);
            chars.next();
        }
        if quoted {
            return Err(Diagnostic::with_addinfo(
                bib1::MALFORMED_QUERY,
                "unterminated quote",
            ));
        }
        let token = match word.to_ascii_lowercase().as_str() {
            "and" => Token::Op("@and"),
            "or" => Token::Op("@or"),
            "not" => Token::Op("@not"),
            _ => Token::Word(word),
        };
        tokens.push(token);
    }
    Ok(tokens)
}

fn operand(word: &str) -> String {
    let (field, term) = match word.split_once('=') {
        Some((field, term)) if !field.is_empty() && !term.is_empty() => (Some(field), term),
        _ => (None, word),
    };
    let quoted = if term.contains(char::is_whitespace) {
        format!("\"{term}\"")
    } else {
        term.to_owned()
    };
    match field {
        Some(name) => format!("@attr 1={name} {quoted}"),
        None => quoted,
    }
}

impl QueryTranslator for KeywordTranslator {
    fn translate(&self, raw: &str) -> Result<String, Diagnostic> {
        let mut tokens = tokenize(raw)?.into_iter();
        let mut expr = match tokens.next() {
            Some(Token::Word(word)) => operand(&word),
            Some(Token::Op(op)) => {
                return Err(Diagnostic::with_addinfo(
                    bib1::MALFORMED_QUERY,
                    format!("query starts with {}", op.trim_start_matches('@')),
                ));
            }
            None => return Err(Diagnostic::with_addinfo(bib1::MALFORMED_QUERY, "empty query")),
        };
        while let Some(token) = tokens.next() {
            let (op, word) = match token {
                Token::Word(word) => ("@and", word),
                Token::Op(op) => match tokens.next() {
                    Some(Token::Word(word)) => (op, word),
                    _ => {
                        return Err(Diagnostic::with_addinfo(
                            bib1::MALFORMED_QUERY,
                            format!("missing operand after {}", op.trim_start_matches('@')),
                        ));
                    }
                },
            };
            expr = format!("{op} {expr} {}", operand(&word));
        }
        Ok(expr)
    }
}
