use anyhow::Result;
use clap::Parser;
use moviestats::config::parse_threshold;
use moviestats::{CountReducer, ExecutablePipeline, JobPreset, KeySelector, MovieMapper, RuntimePipeline, Schema, TokenizerPolicy};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "movie-stats", about = "Word, year and genre counts over movie CSV files")]
struct Args {
    /// Input file or directory
    input: String,
    /// Output directory (replaced if it exists)
    output: String,
    /// Only keys seen more than this many times are written
    #[arg(value_parser = parse_threshold)]
    threshold: Option<u64>,
    /// Job preset: title-words, words-in-movies, movies-in-year, genres, movielens-years, movielens-words
    #[arg(long, default_value = "words-in-movies")]
    job: JobPreset,
    /// Override the preset's column layout (imdb, movielens)
    #[arg(long)]
    schema: Option<Schema>,
    /// Override what is counted (word, year, genre)
    #[arg(long)]
    key: Option<KeySelector>,
    /// Override the title tokenizer (whitespace, normalized, ascii)
    #[arg(long)]
    tokenizer: Option<TokenizerPolicy>,
    /// Override the minimum token length
    #[arg(long)]
    min_token_len: Option<usize>,
    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&args.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut config = args.job.config();
    if let Some(schema) = args.schema { config = config.with_schema(schema); }
    if let Some(key) = args.key { config = config.with_key(key); }
    if let Some(policy) = args.tokenizer { config = config.with_tokenizer(policy); }
    if let Some(len) = args.min_token_len { config = config.with_min_token_len(len); }
    if let Some(threshold) = args.threshold { config = config.with_threshold(threshold); }
    info!(job = %args.job, schema = %config.schema, key = %config.key, tokenizer = %config.tokenizer,
          min_token_len = config.min_token_len, threshold = config.threshold, "Job configured");

    let mapper = MovieMapper::new(config.clone());
    let counters = mapper.counters();
    let mut pipeline = RuntimePipeline::new();
    pipeline.add_input(&args.input);
    pipeline.add_output(&args.output);
    let stats = pipeline.map_reduce(mapper, CountReducer::new(config.threshold))?;

    let lines = counters.snapshot();
    info!(lines = lines.lines, headers = lines.headers, skipped = lines.skipped, emitted = lines.emitted,
          keys_written = stats.reduce.records_out, wall_ms = stats.wall_ms, "Done");
    Ok(())
}
