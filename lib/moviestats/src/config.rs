//! Job and runtime configuration.
//!
//! A [`JobConfig`] is built once, before any input is read, and handed by
//! value to the mapper and reducer. Nothing mutates it during a run.

use crate::constants::*;
use crate::errors::ConfigError;
use crate::movie::Schema;
use crate::tokenizer::{Tokenizer, TokenizerPolicy};
use crate::utils::{env_parse, env_var_truthy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Word-frequency jobs drop words seen this many times or fewer.
pub const DEFAULT_WORD_THRESHOLD: u64 = 100;

/// What a record contributes as keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeySelector {
    /// Every title token.
    Word,
    /// The release year.
    Year,
    /// Every genre name.
    Genre,
}

impl KeySelector {
    pub fn as_str(self) -> &'static str {
        match self {
            KeySelector::Word => "word",
            KeySelector::Year => "year",
            KeySelector::Genre => "genre",
        }
    }
}

impl fmt::Display for KeySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for KeySelector {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "word" | "words" => Ok(KeySelector::Word),
            "year" | "years" => Ok(KeySelector::Year),
            "genre" | "genres" => Ok(KeySelector::Genre),
            _ => Err(ConfigError::UnknownVariant { kind: "key", value: s.to_string(), expected: "word, year, genre" }),
        }
    }
}

/// Named job variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobPreset {
    /// Raw whitespace-split title words, no filtering.
    TitleWords,
    /// Normalized title words seen more than 100 times.
    WordsInMovies,
    /// Movies per release year.
    MoviesInYear,
    /// Movies per genre.
    Genres,
    /// Movies per year, year taken from MovieLens titles.
    MovielensYears,
    /// MovieLens title words, ASCII-folded per token.
    MovielensWords,
}

impl JobPreset {
    pub const ALL: [JobPreset; 6] = [
        JobPreset::TitleWords,
        JobPreset::WordsInMovies,
        JobPreset::MoviesInYear,
        JobPreset::Genres,
        JobPreset::MovielensYears,
        JobPreset::MovielensWords,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobPreset::TitleWords => "title-words",
            JobPreset::WordsInMovies => "words-in-movies",
            JobPreset::MoviesInYear => "movies-in-year",
            JobPreset::Genres => "genres",
            JobPreset::MovielensYears => "movielens-years",
            JobPreset::MovielensWords => "movielens-words",
        }
    }

    pub fn config(self) -> JobConfig {
        let (schema, key, tokenizer, threshold) = match self {
            JobPreset::TitleWords => (Schema::Imdb, KeySelector::Word, TokenizerPolicy::Whitespace, 0),
            JobPreset::WordsInMovies => (Schema::Imdb, KeySelector::Word, TokenizerPolicy::Normalized, DEFAULT_WORD_THRESHOLD),
            JobPreset::MoviesInYear => (Schema::Imdb, KeySelector::Year, TokenizerPolicy::Whitespace, 0),
            JobPreset::Genres => (Schema::Imdb, KeySelector::Genre, TokenizerPolicy::Whitespace, 0),
            JobPreset::MovielensYears => (Schema::MovieLens, KeySelector::Year, TokenizerPolicy::Whitespace, 0),
            JobPreset::MovielensWords => (Schema::MovieLens, KeySelector::Word, TokenizerPolicy::AsciiPerToken, 0),
        };
        JobConfig { schema, key, tokenizer, min_token_len: tokenizer.default_min_len(), threshold }
    }
}

impl fmt::Display for JobPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for JobPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase().replace('_', "-");
        JobPreset::ALL.into_iter().find(|p| p.as_str() == wanted).ok_or_else(|| ConfigError::UnknownVariant {
            kind: "job",
            value: s.to_string(),
            expected: "title-words, words-in-movies, movies-in-year, genres, movielens-years, movielens-words",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub schema: Schema,
    pub key: KeySelector,
    pub tokenizer: TokenizerPolicy,
    pub min_token_len: usize,
    /// Keys are written only when their count is strictly greater.
    pub threshold: u64,
}

impl Default for JobConfig {
    fn default() -> Self { JobPreset::WordsInMovies.config() }
}

impl JobConfig {
    pub fn with_schema(mut self, schema: Schema) -> Self { self.schema = schema; self }

    pub fn with_key(mut self, key: KeySelector) -> Self { self.key = key; self }

    /// Also resets `min_token_len` to the policy's default.
    pub fn with_tokenizer(mut self, policy: TokenizerPolicy) -> Self {
        self.tokenizer = policy;
        self.min_token_len = policy.default_min_len();
        self
    }

    pub fn with_min_token_len(mut self, len: usize) -> Self { self.min_token_len = len; self }

    pub fn with_threshold(mut self, threshold: u64) -> Self { self.threshold = threshold; self }

    pub fn build_tokenizer(&self) -> Tokenizer { Tokenizer::new(self.tokenizer).with_min_len(self.min_token_len) }
}

/// Validate a threshold argument. Anything but a non-negative integer is rejected.
pub fn parse_threshold(raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidThreshold(raw.to_string()))
}

/// Local execution tuning, read from `MOVIESTATS_*` environment variables.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub local_tasks: usize,
    /// Defaults to the number of map tasks.
    pub num_reducers: Option<usize>,
    pub rayon_threads: Option<usize>,
    pub flush_bytes: usize,
    pub flush_interval: Duration,
    pub writer_queue_cap: usize,
    pub local_batch_bytes: usize,
    pub min_split_bytes: u64,
    pub keep_intermediates: bool,
    pub work_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            local_tasks: num_cpus::get(),
            num_reducers: None,
            rayon_threads: None,
            flush_bytes: DEFAULT_FLUSH_BYTES,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            writer_queue_cap: DEFAULT_WRITER_QUEUE_CAP,
            local_batch_bytes: DEFAULT_LOCAL_BATCH_BYTES,
            min_split_bytes: DEFAULT_MIN_SPLIT_BYTES,
            keep_intermediates: false,
            work_dir: DEFAULT_WORK_DIR.to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            local_tasks: env_parse::<usize>(ENV_LOCAL_TASKS).unwrap_or(d.local_tasks).max(1),
            num_reducers: env_parse::<usize>(ENV_NUM_REDUCERS).filter(|&n| n > 0),
            rayon_threads: env_parse::<usize>(ENV_RAYON_THREADS).filter(|&n| n > 0),
            flush_bytes: env_parse(ENV_FLUSH_BYTES).unwrap_or(d.flush_bytes),
            flush_interval: env_parse::<u64>(ENV_FLUSH_INTERVAL_MS).map(Duration::from_millis).unwrap_or(d.flush_interval),
            writer_queue_cap: env_parse::<usize>(ENV_WRITER_QUEUE_CAP).unwrap_or(d.writer_queue_cap).max(1),
            local_batch_bytes: env_parse(ENV_LOCAL_BATCH_BYTES).unwrap_or(d.local_batch_bytes),
            min_split_bytes: env_parse(ENV_MIN_SPLIT_BYTES).unwrap_or(d.min_split_bytes),
            keep_intermediates: env_var_truthy(ENV_KEEP_INTERMEDIATES),
            work_dir: std::env::var(ENV_WORK_DIR).unwrap_or(d.work_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_round_trip_by_name() {
        for p in JobPreset::ALL {
            assert_eq!(p.as_str().parse::<JobPreset>().unwrap(), p);
        }
        assert_eq!("WORDS_IN_MOVIES".parse::<JobPreset>().unwrap(), JobPreset::WordsInMovies);
        assert!("wordcount".parse::<JobPreset>().is_err());
    }

    #[test]
    fn word_frequency_defaults() {
        let c = JobConfig::default();
        assert_eq!(c.schema, Schema::Imdb);
        assert_eq!(c.key, KeySelector::Word);
        assert_eq!(c.tokenizer, TokenizerPolicy::Normalized);
        assert_eq!(c.min_token_len, 4);
        assert_eq!(c.threshold, 100);
        assert_eq!(JobPreset::MoviesInYear.config().threshold, 0);
    }

    #[test]
    fn overrides_apply_in_order() {
        let c = JobPreset::TitleWords.config().with_tokenizer(TokenizerPolicy::Normalized).with_min_token_len(2).with_threshold(7);
        assert_eq!(c.min_token_len, 2);
        assert_eq!(c.threshold, 7);
        assert_eq!(c.build_tokenizer().min_len(), 2);
    }

    #[test]
    fn threshold_must_be_an_integer() {
        assert_eq!(parse_threshold("250").unwrap(), 250);
        assert_eq!(parse_threshold(" 0 ").unwrap(), 0);
        assert_eq!(parse_threshold("ten"), Err(ConfigError::InvalidThreshold("ten".into())));
        assert!(parse_threshold("-5").is_err());
    }
}
