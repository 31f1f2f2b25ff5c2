//! Curl-style request template parsing.
//!
//! A template is the text of a single curl invocation describing one HTTP
//! call. This module understands the subset of curl flags needed to express
//! a request:
//! - `-X`/`--request <METHOD>`
//! - positional `<URL>`
//! - repeatable `-H`/`--header "<Name>: <Value>"`
//! - `-d`/`--data`/`--data-raw`/`--data-binary <BODY>`
//! - trailing `\` or `^` line continuations
//!
//! Single- and double-quoted spans form one token, with `\"`-style escapes
//! kept literal inside a span. `{{row.field}}` placeholders are preserved
//! verbatim in the URL, header values, and body; resolving them is a
//! separate step.

use reqwest::Method;
use thiserror::Error;
use tracing::debug;

/// Error cases for a malformed template. Surfaced before any request is
/// issued; a template that fails to parse never starts a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no URL found in template")]
    MissingUrl,

    #[error("unterminated {quote} quote")]
    UnterminatedQuote { quote: char },

    #[error("flag '{flag}' expects a value")]
    MissingValue { flag: String },

    #[error("unknown HTTP method '{method}'")]
    UnknownMethod { method: String },
}

/// A parsed request template. Placeholders are still in place.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTemplate {
    pub method: Method,
    pub url: String,
    /// Headers in encounter order. Names are unique (case-insensitive);
    /// a repeated name keeps its first position but takes the last value.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestTemplate {
    /// Parse template text into a `RequestTemplate`.
    ///
    /// A leading `curl` token is skipped. The URL is the first token that
    /// looks like an absolute http(s) URL, falling back to the first
    /// positional token. Without an explicit `-X`, the method is POST when
    /// a body is present and GET otherwise.
    ///
    /// # Arguments
    /// * `input` - The template text, possibly spanning multiple lines
    ///
    /// # Returns
    /// The parsed template, or a `ParseError` describing what is malformed
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let tokens = tokenize(input)?;

        let mut method: Option<Method> = None;
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut body: Option<String> = None;
        let mut positional: Vec<String> = Vec::new();

        let mut i = 0;
        if tokens
            .first()
            .map(|t| t.eq_ignore_ascii_case("curl"))
            .unwrap_or(false)
        {
            i = 1;
        }

        while i < tokens.len() {
            let token = tokens[i].as_str();
            match token {
                "-X" | "--request" => {
                    let value = flag_value(&tokens, i, token)?;
                    method = Some(parse_method(value)?);
                    i += 2;
                }
                "-H" | "--header" => {
                    let value = flag_value(&tokens, i, token)?;
                    push_header(&mut headers, value);
                    i += 2;
                }
                "-d" | "--data" | "--data-raw" | "--data-binary" => {
                    let value = flag_value(&tokens, i, token)?;
                    body = Some(value.to_string());
                    i += 2;
                }
                flag if flag.starts_with('-') && flag.len() > 1 => {
                    // -L, --compressed, -s and other decorative curl flags
                    // carry no template information. Assumed valueless.
                    debug!(flag = %flag, "ignoring unrecognized template flag");
                    i += 1;
                }
                _ => {
                    positional.push(tokens[i].clone());
                    i += 1;
                }
            }
        }

        let url = positional
            .iter()
            .find(|t| is_absolute_url(t))
            .or_else(|| positional.first())
            .cloned()
            .ok_or(ParseError::MissingUrl)?;

        let method = method.unwrap_or(if body.is_some() {
            Method::POST
        } else {
            Method::GET
        });

        Ok(RequestTemplate {
            method,
            url,
            headers,
            body,
        })
    }
}

fn is_absolute_url(token: &str) -> bool {
    token.starts_with("http://") || token.starts_with("https://")
}

fn flag_value<'a>(tokens: &'a [String], i: usize, flag: &str) -> Result<&'a str, ParseError> {
    tokens
        .get(i + 1)
        .map(|s| s.as_str())
        .ok_or_else(|| ParseError::MissingValue {
            flag: flag.to_string(),
        })
}

fn parse_method(token: &str) -> Result<Method, ParseError> {
    match token.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        "PATCH" => Ok(Method::PATCH),
        "HEAD" => Ok(Method::HEAD),
        "OPTIONS" => Ok(Method::OPTIONS),
        _ => Err(ParseError::UnknownMethod {
            method: token.to_string(),
        }),
    }
}

/// Add one `Name: Value` header, splitting on the first colon. A value
/// without a colon carries no header and is skipped, matching curl's
/// tolerance. A repeated name (case-insensitive) overwrites in place.
fn push_header(headers: &mut Vec<(String, String)>, raw: &str) {
    let Some((name, value)) = raw.split_once(':') else {
        debug!(header = %raw, "skipping header without a colon");
        return;
    };
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() {
        debug!(header = %raw, "skipping header with empty name");
        return;
    }

    if let Some(existing) = headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
        existing.1 = value.to_string();
    } else {
        headers.push((name.to_string(), value.to_string()));
    }
}

/// Split template text into shell-like tokens.
///
/// Line continuations are folded to spaces first, then a single scan
/// handles quoting: a quoted span is one token (or part of one), an
/// escaped quote of the enclosing kind or an escaped backslash is literal
/// inside a span, and outside quotes a backslash escapes the next
/// character.
fn tokenize(input: &str) -> Result<Vec<String>, ParseError> {
    let input = fold_line_continuations(input);

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' | '"' => {
                in_token = true;
                let quote = ch;
                loop {
                    match chars.next() {
                        None => return Err(ParseError::UnterminatedQuote { quote }),
                        Some('\\') => match chars.peek() {
                            Some(&next) if next == quote || next == '\\' => {
                                current.push(next);
                                chars.next();
                            }
                            _ => current.push('\\'),
                        },
                        Some(c) if c == quote => break,
                        Some(c) => current.push(c),
                    }
                }
            }
            '\\' => {
                in_token = true;
                match chars.next() {
                    Some(c) => current.push(c),
                    None => current.push('\\'),
                }
            }
            _ => {
                in_token = true;
                current.push(ch);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }

    Ok(tokens)
}

/// Replace `\`-newline and `^`-newline pairs (with an optional `\r`) with a
/// single space so a multi-line template reads as one command line.
fn fold_line_continuations(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' || ch == '^' {
            let mut lookahead = chars.clone();
            let mut skip = 0;
            if lookahead.peek() == Some(&'\r') {
                lookahead.next();
                skip += 1;
            }
            if lookahead.peek() == Some(&'\n') {
                skip += 1;
                for _ in 0..skip {
                    chars.next();
                }
                out.push(' ');
                continue;
            }
        }
        out.push(ch);
    }

    out
}
