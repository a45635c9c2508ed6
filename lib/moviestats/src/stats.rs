use serde::Serialize;

#[derive(Clone, Debug)]
pub struct MapTaskStats {
    pub task_id: usize,
    pub num_files: u64,
    pub total_emits: u64,
    pub dropped_emits: u64,
    pub total_bytes_out: u64,
    pub total_flushes: u64,
    pub wall_ms: u64,
}

#[derive(Clone, Debug)]
pub struct SortTaskStats {
    pub reducer: usize,
    pub records_in: u64,
    pub bytes_in: u64,
    pub sort_ms: u64,
    pub wall_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ReduceTaskStats {
    pub reducer: usize,
    pub records_in: u64,
    pub groups: u64,
    pub records_out: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct MapStats {
    pub tasks: usize,
    pub files: u64,
    pub total_emits: u64,
    pub dropped_emits: u64,
    pub total_bytes_out: u64,
    pub total_flushes: u64,
    pub min_task_ms: u64,
    pub max_task_ms: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct SortStats {
    pub reducers: usize,
    pub total_records: u64,
    pub total_bytes: u64,
    pub min_reducer_ms: u64,
    pub max_reducer_ms: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct ReduceStats {
    pub reducers: usize,
    pub total_records: u64,
    pub total_groups: u64,
    pub records_out: u64,
    pub min_reducer_ms: u64,
    pub max_reducer_ms: u64,
    pub wall_ms: u64,
}

/// Summary of one pipeline run, logged per phase and written as `_stats.json`.
#[derive(Default, Clone, Debug, Serialize)]
pub struct RunStats {
    pub map: MapStats,
    pub sort: SortStats,
    pub reduce: ReduceStats,
    pub wall_ms: u64,
}

impl RunStats {
    pub fn record_map(&mut self, per_task: &[MapTaskStats], wall_ms: u64) {
        self.map = MapStats {
            tasks: per_task.len(),
            files: per_task.iter().map(|t| t.num_files).sum(),
            total_emits: per_task.iter().map(|t| t.total_emits).sum(),
            dropped_emits: per_task.iter().map(|t| t.dropped_emits).sum(),
            total_bytes_out: per_task.iter().map(|t| t.total_bytes_out).sum(),
            total_flushes: per_task.iter().map(|t| t.total_flushes).sum(),
            min_task_ms: per_task.iter().map(|t| t.wall_ms).min().unwrap_or(0),
            max_task_ms: per_task.iter().map(|t| t.wall_ms).max().unwrap_or(0),
            wall_ms,
        };
    }

    pub fn record_sort(&mut self, per_reducer: &[SortTaskStats], wall_ms: u64) {
        self.sort = SortStats {
            reducers: per_reducer.len(),
            total_records: per_reducer.iter().map(|s| s.records_in).sum(),
            total_bytes: per_reducer.iter().map(|s| s.bytes_in).sum(),
            min_reducer_ms: per_reducer.iter().map(|s| s.wall_ms).min().unwrap_or(0),
            max_reducer_ms: per_reducer.iter().map(|s| s.wall_ms).max().unwrap_or(0),
            wall_ms,
        };
    }

    pub fn record_reduce(&mut self, per_reducer: &[ReduceTaskStats], wall_ms: u64) {
        self.reduce = ReduceStats {
            reducers: per_reducer.len(),
            total_records: per_reducer.iter().map(|s| s.records_in).sum(),
            total_groups: per_reducer.iter().map(|s| s.groups).sum(),
            records_out: per_reducer.iter().map(|s| s.records_out).sum(),
            min_reducer_ms: per_reducer.iter().map(|s| s.wall_ms).min().unwrap_or(0),
            max_reducer_ms: per_reducer.iter().map(|s| s.wall_ms).max().unwrap_or(0),
            wall_ms,
        };
    }
}
