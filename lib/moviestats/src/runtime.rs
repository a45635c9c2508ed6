use crate::api::{ExecutablePipeline, Mapper, Reducer};
use crate::config::RuntimeConfig;
use crate::constants::{STATS_FILE, SUCCESS_FILE};
use crate::io::{ensure_dir, hash_to_partition, input_splits, lines_in, list_files_recursive, map_file, open_writer, push_record, read_bin_line, resolve_path, write_marker, InputSplit};
use crate::stats::{MapTaskStats, ReduceTaskStats, RunStats, SortTaskStats};
use crate::writer::{partition_path, ThreadWriter, WriterPool};
use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};

/// Single-machine driver: splits the input, maps splits in parallel,
/// hash-partitions the pairs by key, sorts each partition, then reduces each
/// partition into `part-NNNNN.tsv` under the output directory.
pub struct RuntimePipeline {
    inputs: Vec<String>,
    output: Option<String>,
    config: RuntimeConfig,
}

impl RuntimePipeline {
    pub fn new() -> Self { Self::with_config(RuntimeConfig::from_env()) }

    pub fn with_config(config: RuntimeConfig) -> Self { Self { inputs: vec![], output: None, config } }
}

impl Default for RuntimePipeline { fn default() -> Self { Self::new() } }

impl ExecutablePipeline for RuntimePipeline {
    fn add_input(&mut self, input_path: impl Into<String>) { self.inputs.push(input_path.into()); }

    fn add_output(&mut self, output_path: impl Into<String>) { self.output = Some(output_path.into()); }

    fn map_reduce<M, R>(&mut self, mapper: M, reducer: R) -> Result<RunStats>
    where
        M: Mapper<Input = String> + Send + Sync + 'static,
        R: Reducer<Key = M::Key, ValueIn = M::Value> + Send + Sync + 'static,
    {
        let run_start = Instant::now();
        let cfg = &self.config;
        let output_dir = PathBuf::from(self.output.clone().context("output not set")?);
        if self.inputs.is_empty() {
            bail!("no input set");
        }

        let mut all_files = Vec::new();
        for inp in &self.inputs {
            let mut files = list_files_recursive(inp)?;
            all_files.append(&mut files);
        }
        // the output dir is wiped before the map phase, so compare resolved paths
        let resolved_output = resolve_path(&output_dir)?;
        for p in self.inputs.iter().map(PathBuf::from).chain(all_files.iter().cloned()) {
            if resolve_path(&p)?.starts_with(&resolved_output) {
                bail!("output directory {} contains input {}", output_dir.display(), p.display());
            }
        }

        let ts = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
        let run_id = format!("local-{}-{}", std::process::id(), ts);
        let launch_root = Path::new(&cfg.work_dir).join(&run_id);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.rayon_threads.unwrap_or(0))
            .build()
            .context("build rayon thread pool")?;
        let result = pool.install(|| run_phases(cfg, &run_id, &launch_root, &all_files, &output_dir, &mapper, &reducer));

        if cfg.keep_intermediates {
            info!(path = %launch_root.display(), "keeping intermediates");
        } else if let Err(e) = fs::remove_dir_all(&launch_root) {
            debug!("remove {}: {}", launch_root.display(), e);
        }

        let mut stats = result?;
        stats.wall_ms = run_start.elapsed().as_millis() as u64;
        let mut w = open_writer(output_dir.join(STATS_FILE))?;
        serde_json::to_writer_pretty(&mut w, &stats).context("write run stats")?;
        writeln!(w)?;
        w.flush()?;
        write_marker(output_dir.join(SUCCESS_FILE))?;
        info!(wall_ms = stats.wall_ms, output = %output_dir.display(), "Run complete");
        Ok(stats)
    }
}

pub fn default_pipeline() -> RuntimePipeline { RuntimePipeline::new() }

fn run_phases<M, R>(
    cfg: &RuntimeConfig,
    run_id: &str,
    launch_root: &Path,
    files: &[PathBuf],
    output_dir: &Path,
    mapper: &M,
    reducer: &R,
) -> Result<RunStats>
where
    M: Mapper<Input = String> + Sync,
    R: Reducer<Key = M::Key, ValueIn = M::Value> + Sync,
{
    let map_out_dir = launch_root.join("map_out");
    let sort_out_dir = launch_root.join("sort_out");
    ensure_dir(&map_out_dir)?;
    ensure_dir(&sort_out_dir)?;

    // Prepare output directory (clean it before starting)
    if output_dir.exists() {
        fs::remove_dir_all(output_dir).with_context(|| format!("clear output {}", output_dir.display()))?;
    }
    ensure_dir(output_dir)?;

    let splits = input_splits(files, cfg.local_tasks, cfg.min_split_bytes)?;
    let ntasks = splits.len();
    let num_reducers = cfg.num_reducers.unwrap_or(ntasks).max(1);
    info!(run_id = %run_id, files = files.len(), ntasks, num_reducers, threads = rayon::current_num_threads(), "Starting map phase");

    let mut stats = RunStats::default();

    // Map phase
    let (writer_pool, mut writer_joiner) = WriterPool::new(&map_out_dir, num_reducers, cfg.flush_bytes, cfg.flush_interval, cfg.writer_queue_cap)?;
    let map_phase_start = Instant::now();
    let map_result: Result<Vec<MapTaskStats>> = splits
        .par_iter()
        .enumerate()
        .map(|(task_id, split)| run_map_task(task_id, split, mapper, &writer_pool, cfg.local_batch_bytes))
        .collect();
    // writers must be drained and closed even when a task failed
    writer_pool.close_all();
    let joined = writer_joiner.join_all();
    let map_stats = map_result?;
    joined.context("map output incomplete")?;
    let map_phase_ms = map_phase_start.elapsed().as_millis() as u64;
    stats.record_map(&map_stats, map_phase_ms);
    let totals = writer_pool.totals();
    info!(phase = "map",
          tasks = stats.map.tasks,
          total_emits = stats.map.total_emits, dropped_emits = stats.map.dropped_emits,
          total_bytes_out = stats.map.total_bytes_out, total_flushes = stats.map.total_flushes,
          bytes_written = totals.bytes_written, write_calls = totals.write_calls,
          min_task_ms = stats.map.min_task_ms, max_task_ms = stats.map.max_task_ms,
          wall_ms = map_phase_ms,
          "Map phase complete");

    // Sort/shuffle
    let sort_phase_start = Instant::now();
    let sort_stats: Vec<SortTaskStats> = (0..num_reducers)
        .into_par_iter()
        .map(|r| run_sort_task(r, &map_out_dir, &sort_out_dir))
        .collect::<Result<_>>()?;
    let sort_phase_ms = sort_phase_start.elapsed().as_millis() as u64;
    stats.record_sort(&sort_stats, sort_phase_ms);
    info!(phase = "sort",
          reducers = stats.sort.reducers, total_records = stats.sort.total_records, total_bytes = stats.sort.total_bytes,
          min_reducer_ms = stats.sort.min_reducer_ms, max_reducer_ms = stats.sort.max_reducer_ms,
          wall_ms = sort_phase_ms,
          "Sort phase complete");

    // Reduce phase
    let reduce_phase_start = Instant::now();
    let reduce_stats: Vec<ReduceTaskStats> = (0..num_reducers)
        .into_par_iter()
        .map(|r| run_reduce_task(r, &sort_out_dir, output_dir, reducer))
        .collect::<Result<_>>()?;
    let reduce_phase_ms = reduce_phase_start.elapsed().as_millis() as u64;
    stats.record_reduce(&reduce_stats, reduce_phase_ms);
    info!(phase = "reduce",
          reducers = stats.reduce.reducers, total_records = stats.reduce.total_records,
          total_groups = stats.reduce.total_groups, records_out = stats.reduce.records_out,
          min_reducer_ms = stats.reduce.min_reducer_ms, max_reducer_ms = stats.reduce.max_reducer_ms,
          wall_ms = reduce_phase_ms,
          "Reduce phase complete");

    Ok(stats)
}

fn run_map_task<M>(task_id: usize, split: &InputSplit, mapper: &M, pool: &WriterPool, batch_bytes: usize) -> Result<MapTaskStats>
where
    M: Mapper<Input = String>,
{
    let task_start = Instant::now();
    let map = map_file(&split.path)?;
    let bytes = map
        .get(split.start..split.end)
        .with_context(|| format!("{} changed size during the run", split.path.display()))?;
    debug!(task_id, path = %split.path.display(), start = split.start, end = split.end, "map task starting");

    let num_partitions = pool.num_partitions();
    let mut tw = ThreadWriter::new(pool, batch_bytes);
    let mut total_emits: u64 = 0;
    let mut dropped_emits: u64 = 0;
    let mut send_err: Option<anyhow::Error> = None;
    {
        // a pair that fails to encode is dropped; the rest of the line still goes out
        let mut emit = |k: M::Key, v: M::Value| {
            let key_bytes = match bincode::serialize(&k) { Ok(b) => b, Err(e) => { error!("bincode key: {}", e); dropped_emits += 1; return; } };
            let val_bytes = match bincode::serialize(&v) { Ok(b) => b, Err(e) => { error!("bincode val: {}", e); dropped_emits += 1; return; } };
            let part = hash_to_partition(&key_bytes, num_partitions);
            push_record(tw.buffer(part), &key_bytes, &val_bytes);
            total_emits += 1;
            if send_err.is_none() {
                if let Err(e) = tw.maybe_flush(part) { send_err = Some(e); }
            }
        };
        mapper.do_map(lines_in(bytes).map(|l| l.into_owned()), &mut emit);
    }
    if let Some(e) = send_err {
        return Err(e).with_context(|| format!("map task {} ({})", task_id, split.path.display()));
    }
    tw.flush_all().with_context(|| format!("map task {} ({})", task_id, split.path.display()))?;
    let (total_flushes, total_bytes_out) = tw.stats();

    Ok(MapTaskStats {
        task_id,
        num_files: 1,
        total_emits,
        dropped_emits,
        total_bytes_out,
        total_flushes,
        wall_ms: task_start.elapsed().as_millis() as u64,
    })
}

fn sorted_path(sort_out_dir: &Path, r: usize) -> PathBuf { sort_out_dir.join(format!("reduce_in_part{}.bin", r)) }

// Order one partition's records by key bytes so equal keys are adjacent.
fn run_sort_task(r: usize, map_out_dir: &Path, sort_out_dir: &Path) -> Result<SortTaskStats> {
    let reducer_start = Instant::now();
    let in_path = partition_path(map_out_dir, r);
    let out_path = sorted_path(sort_out_dir, r);
    let bytes_in = fs::metadata(&in_path).with_context(|| format!("stat {}", in_path.display()))?.len();
    let mut w = open_writer(&out_path)?;
    if bytes_in == 0 {
        w.flush()?;
        return Ok(SortTaskStats { reducer: r, records_in: 0, bytes_in, sort_ms: 0, wall_ms: reducer_start.elapsed().as_millis() as u64 });
    }

    let map = map_file(&in_path)?;
    let bytes = &map[..];
    // (record_start, key_end, record_end)
    let mut index: Vec<(usize, usize, usize)> = Vec::new();
    let mut off = 0usize;
    while let Some((k, _v, next)) = read_bin_line(bytes, off) {
        index.push((off, off + 8 + k.len(), next));
        off = next;
    }
    if off != bytes.len() {
        bail!("truncated record in {} at byte {}", in_path.display(), off);
    }

    let sort_start = Instant::now();
    // Keys are at [start+8..key_end] because [start..start+8) holds the lengths
    index.par_sort_by(|a, b| bytes[a.0 + 8..a.1].cmp(&bytes[b.0 + 8..b.1]));
    let sort_ms = sort_start.elapsed().as_millis() as u64;

    for &(s, _k, e) in &index {
        w.write_all(&bytes[s..e]).with_context(|| format!("write {}", out_path.display()))?;
    }
    w.flush()?;
    debug!(reducer = r, records = index.len(), sort_ms, "partition sorted");

    Ok(SortTaskStats { reducer: r, records_in: index.len() as u64, bytes_in, sort_ms, wall_ms: reducer_start.elapsed().as_millis() as u64 })
}

fn run_reduce_task<R: Reducer>(r: usize, sort_out_dir: &Path, output_dir: &Path, reducer: &R) -> Result<ReduceTaskStats> {
    let reducer_start = Instant::now();
    let in_path = sorted_path(sort_out_dir, r);
    let out_path = output_dir.join(format!("part-{:05}.tsv", r));
    let mut out = open_writer(&out_path)?;

    let mut records_in: u64 = 0;
    let mut groups: u64 = 0;
    let mut records_out: u64 = 0;

    let len = fs::metadata(&in_path).with_context(|| format!("stat {}", in_path.display()))?.len();
    if len > 0 {
        let map = map_file(&in_path)?;
        let bytes = &map[..];
        let mut current: Option<(&[u8], R::Key)> = None;
        let mut values: Vec<R::ValueIn> = Vec::new();
        let mut off = 0usize;
        while let Some((k, v, next)) = read_bin_line(bytes, off) {
            let value: R::ValueIn = bincode::deserialize(v).with_context(|| format!("bad value in {}", in_path.display()))?;
            records_in += 1;
            let same_group = matches!(&current, Some((cur, _)) if *cur == k);
            if !same_group {
                if let Some((_, key)) = current.take() {
                    records_out += flush_group(reducer, &key, &mut values, &mut out)?;
                    groups += 1;
                }
                let key: R::Key = bincode::deserialize(k).with_context(|| format!("bad key in {}", in_path.display()))?;
                current = Some((k, key));
            }
            values.push(value);
            off = next;
        }
        if let Some((_, key)) = current.take() {
            records_out += flush_group(reducer, &key, &mut values, &mut out)?;
            groups += 1;
        }
    }
    out.flush().with_context(|| format!("flush {}", out_path.display()))?;

    Ok(ReduceTaskStats { reducer: r, records_in, groups, records_out, wall_ms: reducer_start.elapsed().as_millis() as u64 })
}

fn flush_group<R: Reducer>(reducer: &R, key: &R::Key, values: &mut Vec<R::ValueIn>, out: &mut impl Write) -> Result<u64> {
    let mut written: u64 = 0;
    let mut write_err: Option<std::io::Error> = None;
    reducer.do_reduce(key, values.drain(..), &mut |rec: R::Out| {
        if write_err.is_some() { return; }
        match writeln!(out, "{}", rec) {
            Ok(()) => written += 1,
            Err(e) => write_err = Some(e),
        }
    });
    match write_err {
        Some(e) => Err(e).context("write reduce output"),
        None => Ok(written),
    }
}
