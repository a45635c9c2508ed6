//! Title tokenization policies.

use crate::errors::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

static NOT_WORD_CHAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{Nd}\s]").unwrap());
static CONTROL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{C}").unwrap());
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Shortest token kept by the filtering policies.
pub const DEFAULT_MIN_TOKEN_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenizerPolicy {
    /// Split on whitespace runs. No case folding.
    Whitespace,
    /// Strip everything but Unicode letters, digits and whitespace from the
    /// whole title, drop control characters, collapse spaces, lowercase.
    Normalized,
    /// Split on whitespace, then lowercase each token and keep only its ASCII
    /// letters and digits.
    AsciiPerToken,
}

impl TokenizerPolicy {
    pub fn default_min_len(self) -> usize {
        match self {
            TokenizerPolicy::Whitespace => 0,
            TokenizerPolicy::Normalized | TokenizerPolicy::AsciiPerToken => DEFAULT_MIN_TOKEN_LEN,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenizerPolicy::Whitespace => "whitespace",
            TokenizerPolicy::Normalized => "normalized",
            TokenizerPolicy::AsciiPerToken => "ascii",
        }
    }
}

impl fmt::Display for TokenizerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for TokenizerPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "whitespace" | "p1" => Ok(TokenizerPolicy::Whitespace),
            "normalized" | "p2" => Ok(TokenizerPolicy::Normalized),
            "ascii" | "ascii-per-token" => Ok(TokenizerPolicy::AsciiPerToken),
            _ => Err(ConfigError::UnknownVariant { kind: "tokenizer", value: s.to_string(), expected: "whitespace, normalized, ascii" }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tokenizer {
    policy: TokenizerPolicy,
    min_len: usize,
}

impl Tokenizer {
    pub fn new(policy: TokenizerPolicy) -> Self { Self { policy, min_len: policy.default_min_len() } }

    /// Tokens shorter than `min_len` characters are dropped.
    pub fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len;
        self
    }

    pub fn policy(&self) -> TokenizerPolicy { self.policy }

    pub fn min_len(&self) -> usize { self.min_len }

    /// Lazily yield the tokens of `title`. Each call starts over.
    pub fn tokenize<'a>(&self, title: &'a str) -> Tokens<'a> {
        let text = match self.policy {
            TokenizerPolicy::Normalized => Cow::Owned(normalize(title)),
            TokenizerPolicy::Whitespace | TokenizerPolicy::AsciiPerToken => Cow::Borrowed(title),
        };
        Tokens { text, pos: 0, policy: self.policy, min_len: self.min_len }
    }
}

fn normalize(title: &str) -> String {
    let kept = NOT_WORD_CHAR.replace_all(title, "");
    let visible = CONTROL.replace_all(&kept, "");
    SPACES.replace_all(&visible, " ").to_lowercase()
}

pub struct Tokens<'a> {
    text: Cow<'a, str>,
    pos: usize,
    policy: TokenizerPolicy,
    min_len: usize,
}

impl Iterator for Tokens<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let rest = &self.text[self.pos..];
            let start = rest.find(|c: char| !c.is_whitespace())?;
            let len = rest[start..].find(char::is_whitespace).unwrap_or(rest.len() - start);
            let raw = &rest[start..start + len];
            let token: String = match self.policy {
                TokenizerPolicy::AsciiPerToken => raw.to_lowercase().chars().filter(char::is_ascii_alphanumeric).collect(),
                TokenizerPolicy::Whitespace | TokenizerPolicy::Normalized => raw.to_string(),
            };
            self.pos += start + len;
            if !token.is_empty() && token.chars().count() >= self.min_len {
                return Some(token);
            }
        }
    }
}
