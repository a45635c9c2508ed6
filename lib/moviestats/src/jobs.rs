use crate::api::{Mapper, Reducer};
use crate::config::{JobConfig, KeySelector};
use crate::movie::{parse_line, Movie};
use crate::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Line-level outcome counters, shared by every map task of a run.
#[derive(Debug, Default)]
pub struct MapCounters {
    lines: AtomicU64,
    headers: AtomicU64,
    skipped: AtomicU64,
    emitted: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapCountsSnapshot {
    pub lines: u64,
    pub headers: u64,
    pub skipped: u64,
    pub emitted: u64,
}

impl MapCounters {
    pub fn snapshot(&self) -> MapCountsSnapshot {
        MapCountsSnapshot {
            lines: self.lines.load(Ordering::Relaxed),
            headers: self.headers.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
        }
    }
}

/// Emitter for all movie jobs: header skip, parse, key selection, `(key, 1)`.
pub struct MovieMapper {
    config: JobConfig,
    tokenizer: Tokenizer,
    counters: Arc<MapCounters>,
}

impl MovieMapper {
    pub fn new(config: JobConfig) -> Self {
        let tokenizer = config.build_tokenizer();
        Self { config, tokenizer, counters: Arc::new(MapCounters::default()) }
    }

    /// Handle on the counters that stays valid after the mapper is moved into a pipeline.
    pub fn counters(&self) -> Arc<MapCounters> { Arc::clone(&self.counters) }

    fn select(&self, movie: &Movie) -> Vec<String> {
        match self.config.key {
            KeySelector::Word => self.tokenizer.tokenize(&movie.title).collect(),
            KeySelector::Year => vec![movie.year.clone()],
            KeySelector::Genre => movie.genres.clone(),
        }
    }
}

impl Mapper for MovieMapper {
    type Input = String;
    type Key = String;
    type Value = u64;

    fn do_map<I, F>(&self, input: I, emit: &mut F)
    where
        I: IntoIterator<Item = Self::Input>,
        F: FnMut(Self::Key, Self::Value),
    {
        for line in input {
            self.counters.lines.fetch_add(1, Ordering::Relaxed);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if self.config.schema.is_header(line) {
                self.counters.headers.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            match parse_line(self.config.schema, line) {
                Ok(movie) => {
                    for key in self.select(&movie) {
                        emit(key, 1);
                        self.counters.emitted.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, line = %line, "skipping line");
                }
            }
        }
    }
}

/// One output record, written as `key<TAB>count`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyCount {
    pub key: String,
    pub count: u64,
}

impl fmt::Display for KeyCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}\t{}", self.key, self.count) }
}

/// Aggregator: sums the values for a key and keeps it only when the sum is
/// strictly above the threshold. A threshold of 0 keeps every key.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountReducer {
    threshold: u64,
}

impl CountReducer {
    pub fn new(threshold: u64) -> Self { Self { threshold } }

    pub fn aggregate<I>(&self, key: &str, values: I) -> Option<KeyCount>
    where
        I: IntoIterator<Item = u64>,
    {
        let count: u64 = values.into_iter().sum();
        (count > self.threshold).then(|| KeyCount { key: key.to_string(), count })
    }
}

impl Reducer for CountReducer {
    type Key = String;
    type ValueIn = u64;
    type Out = KeyCount;

    fn do_reduce<I, F>(&self, key: &Self::Key, values: I, emit: &mut F)
    where
        I: IntoIterator<Item = Self::ValueIn>,
        F: FnMut(Self::Out),
    {
        if let Some(kc) = self.aggregate(key, values) {
            emit(kc);
        }
    }
}
