pub mod api;
pub mod config;
pub mod constants;
pub mod csv;
pub mod errors;
pub mod io;
pub mod jobs;
pub mod local;
pub mod movie;
pub mod runtime;
pub mod stats;
pub mod tokenizer;
pub mod utils;
pub mod writer;

pub use api::{ExecutablePipeline, Mapper, Reducer};
pub use config::{JobConfig, JobPreset, KeySelector, RuntimeConfig};
pub use errors::{ConfigError, ParseError};
pub use jobs::{CountReducer, KeyCount, MovieMapper};
pub use movie::{Movie, Schema};
pub use runtime::{default_pipeline, RuntimePipeline};
pub use stats::RunStats;
pub use tokenizer::{Tokenizer, TokenizerPolicy};
