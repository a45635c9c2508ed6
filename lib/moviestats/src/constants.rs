//! Environment variable names and default values for runtime tuning.

pub const ENV_KEEP_INTERMEDIATES: &str = "MOVIESTATS_KEEP_INTERMEDIATES";
pub const ENV_RAYON_THREADS: &str = "MOVIESTATS_RAYON_THREADS";
pub const ENV_NUM_REDUCERS: &str = "MOVIESTATS_NUM_REDUCERS";
pub const ENV_LOCAL_TASKS: &str = "MOVIESTATS_LOCAL_TASKS";
pub const ENV_FLUSH_BYTES: &str = "MOVIESTATS_FLUSH_BYTES";
pub const ENV_FLUSH_INTERVAL_MS: &str = "MOVIESTATS_FLUSH_INTERVAL_MS";
pub const ENV_WRITER_QUEUE_CAP: &str = "MOVIESTATS_WRITER_QUEUE_CAP";
pub const ENV_LOCAL_BATCH_BYTES: &str = "MOVIESTATS_LOCAL_BATCH_BYTES";
pub const ENV_WORK_DIR: &str = "MOVIESTATS_WORK_DIR";
pub const ENV_MIN_SPLIT_BYTES: &str = "MOVIESTATS_MIN_SPLIT_BYTES";

// Per-thread batch handed to a partition writer in one channel send
pub const DEFAULT_LOCAL_BATCH_BYTES: usize = 256 * 1024;
pub const DEFAULT_WRITER_QUEUE_CAP: usize = 1024;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 200;
pub const DEFAULT_FLUSH_BYTES: usize = 16 * 1024 * 1024;
// Files smaller than this are never cut into several map splits
pub const DEFAULT_MIN_SPLIT_BYTES: u64 = 4 * 1024 * 1024;
/// Scratch space for intermediates, relative to the working directory.
pub const DEFAULT_WORK_DIR: &str = ".moviestats_runs";

pub const STATS_FILE: &str = "_stats.json";
pub const SUCCESS_FILE: &str = "_SUCCESS";
