use crate::io::{ensure_dir, open_writer};
use anyhow::{anyhow, Context, Result};
use crossbeam_channel as channel;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::error;

// One IO thread per partition file. Senders are bounded for backpressure.
pub struct WriterPool {
    senders: Vec<channel::Sender<WriterMsg>>,
    counters: Arc<Vec<PartitionCounters>>,
}

enum WriterMsg {
    Data(Vec<u8>),
    Close,
}

pub struct WriterJoiner {
    handles: Vec<thread::JoinHandle<Result<()>>>,
}

impl WriterJoiner {
    /// Wait for every IO thread. Returns the first write failure or panic;
    /// a partition file is only complete when this is `Ok`.
    pub fn join_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for (part, h) in self.handles.drain(..).enumerate() {
            let res = h.join().unwrap_or_else(|_| Err(anyhow!("partition writer {} panicked", part)));
            if let Err(e) = res {
                error!(part, error = %e, "partition writer failed");
                if first_err.is_none() { first_err = Some(e); }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[derive(Default)]
struct PartitionCounters {
    bytes_written: AtomicU64,
    write_calls: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WriterTotals {
    pub bytes_written: u64,
    pub write_calls: u64,
}

// After the first failure the thread keeps draining its queue so senders never block.
fn write_chunk(writer: &mut BufWriter<File>, buf: &mut Vec<u8>, c: &PartitionCounters, failed: &mut Option<std::io::Error>) {
    if !buf.is_empty() && failed.is_none() {
        match writer.write_all(buf) {
            Ok(()) => {
                c.bytes_written.fetch_add(buf.len() as u64, Ordering::Relaxed);
                c.write_calls.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => *failed = Some(e),
        }
    }
    buf.clear();
}

impl WriterPool {
    pub fn new(base_dir: impl AsRef<Path>, num_partitions: usize, flush_bytes: usize, flush_interval: Duration, queue_cap: usize) -> Result<(Self, WriterJoiner)> {
        ensure_dir(&base_dir)?;
        let counters: Arc<Vec<PartitionCounters>> = Arc::new((0..num_partitions).map(|_| PartitionCounters::default()).collect());
        let mut senders = Vec::with_capacity(num_partitions);
        let mut handles = Vec::with_capacity(num_partitions);
        for part in 0..num_partitions {
            let (tx, rx) = channel::bounded::<WriterMsg>(queue_cap);
            let path = partition_path(base_dir.as_ref(), part);
            let mut writer = open_writer(&path)?;
            let counters = Arc::clone(&counters);
            let handle = thread::spawn(move || -> Result<()> {
                let c = &counters[part];
                let mut buf: Vec<u8> = Vec::with_capacity(flush_bytes.min(1 << 20));
                let mut failed: Option<std::io::Error> = None;
                let mut last_flush = Instant::now();
                loop {
                    let timeout = flush_interval.saturating_sub(last_flush.elapsed());
                    match rx.recv_timeout(timeout) {
                        Ok(WriterMsg::Data(bytes)) => buf.extend_from_slice(&bytes),
                        Ok(WriterMsg::Close) | Err(channel::RecvTimeoutError::Disconnected) => {
                            write_chunk(&mut writer, &mut buf, c, &mut failed);
                            break;
                        }
                        Err(channel::RecvTimeoutError::Timeout) => {}
                    }
                    if buf.len() >= flush_bytes || last_flush.elapsed() >= flush_interval {
                        write_chunk(&mut writer, &mut buf, c, &mut failed);
                        last_flush = Instant::now();
                    }
                }
                match failed {
                    Some(e) => Err::<(), _>(e).with_context(|| format!("write {}", path.display())),
                    None => writer.flush().with_context(|| format!("flush {}", path.display())),
                }
            });
            senders.push(tx);
            handles.push(handle);
        }
        Ok((Self { senders, counters }, WriterJoiner { handles }))
    }

    pub fn num_partitions(&self) -> usize { self.senders.len() }

    /// Hand a chunk of encoded records to the partition's IO thread.
    pub fn send_raw(&self, partition: usize, bytes: Vec<u8>) -> Result<()> {
        self.senders[partition]
            .send(WriterMsg::Data(bytes))
            .map_err(|_| anyhow!("partition writer {} is gone", partition))
    }

    pub fn close_all(&self) {
        for tx in &self.senders { let _ = tx.send(WriterMsg::Close); }
    }

    pub fn totals(&self) -> WriterTotals {
        self.counters.iter().fold(WriterTotals::default(), |acc, c| WriterTotals {
            bytes_written: acc.bytes_written + c.bytes_written.load(Ordering::Relaxed),
            write_calls: acc.write_calls + c.write_calls.load(Ordering::Relaxed),
        })
    }
}

pub fn partition_path(base_dir: &Path, part: usize) -> PathBuf { base_dir.join(format!("part{}.bin", part)) }

/// Per-thread batching in front of a [`WriterPool`].
pub struct ThreadWriter<'a> {
    pool: &'a WriterPool,
    local_buffers: Vec<Vec<u8>>,
    batch_bytes: usize,
    flushes: u64,
    bytes_sent: u64,
}

impl<'a> ThreadWriter<'a> {
    pub fn new(pool: &'a WriterPool, batch_bytes: usize) -> Self {
        let local_buffers = (0..pool.num_partitions()).map(|_| Vec::new()).collect();
        Self { pool, local_buffers, batch_bytes, flushes: 0, bytes_sent: 0 }
    }

    pub fn buffer(&mut self, partition: usize) -> &mut Vec<u8> { &mut self.local_buffers[partition] }

    pub fn maybe_flush(&mut self, partition: usize) -> Result<()> {
        if self.local_buffers[partition].len() >= self.batch_bytes {
            self.flush_partition(partition)?;
        }
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<()> {
        for p in 0..self.local_buffers.len() {
            if !self.local_buffers[p].is_empty() {
                self.flush_partition(p)?;
            }
        }
        Ok(())
    }

    fn flush_partition(&mut self, partition: usize) -> Result<()> {
        let chunk = std::mem::take(&mut self.local_buffers[partition]);
        self.bytes_sent += chunk.len() as u64;
        self.flushes += 1;
        self.pool.send_raw(partition, chunk)
    }

    /// `(flushes, bytes_sent)`
    pub fn stats(&self) -> (u64, u64) { (self.flushes, self.bytes_sent) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{push_record, read_bin_line};

    #[test]
    fn chunks_land_in_their_partition_file() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, mut joiner) = WriterPool::new(dir.path(), 2, 64, Duration::from_millis(5), 4).unwrap();
        {
            let mut tw = ThreadWriter::new(&pool, 16);
            for i in 0..10u64 {
                let v = bincode::serialize(&i).unwrap();
                push_record(tw.buffer((i % 2) as usize), format!("k{}", i).as_bytes(), &v);
                tw.maybe_flush((i % 2) as usize).unwrap();
            }
            tw.flush_all().unwrap();
            assert!(tw.stats().0 >= 2);
        }
        pool.close_all();
        joiner.join_all().unwrap();

        for part in 0..2 {
            let bytes = std::fs::read(partition_path(dir.path(), part)).unwrap();
            let mut off = 0;
            let mut n = 0;
            while let Some((_, v, next)) = read_bin_line(&bytes, off) {
                let v: u64 = bincode::deserialize(v).unwrap();
                assert_eq!(v % 2, part as u64);
                n += 1;
                off = next;
            }
            assert_eq!(n, 5);
        }
        assert!(pool.totals().bytes_written > 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_partition_write_is_reported_by_join() {
        if !Path::new("/dev/full").exists() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        // part0.bin points at a device that rejects every write with ENOSPC
        std::os::unix::fs::symlink("/dev/full", partition_path(dir.path(), 0)).unwrap();
        let (pool, mut joiner) = WriterPool::new(dir.path(), 2, 64, Duration::from_millis(5), 4).unwrap();
        {
            let mut tw = ThreadWriter::new(&pool, 1);
            for i in 0..2000u64 {
                push_record(tw.buffer((i % 2) as usize), b"key", &i.to_le_bytes());
                tw.maybe_flush((i % 2) as usize).unwrap();
            }
            tw.flush_all().unwrap();
        }
        pool.close_all();
        let err = joiner.join_all().unwrap_err();
        assert!(format!("{:#}", err).contains("part0.bin"), "{:#}", err);
        assert!(std::fs::metadata(partition_path(dir.path(), 1)).unwrap().len() > 0);
    }

    #[test]
    fn sending_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, mut joiner) = WriterPool::new(dir.path(), 1, 64, Duration::from_millis(5), 4).unwrap();
        pool.close_all();
        joiner.join_all().unwrap();
        let mut tw = ThreadWriter::new(&pool, 1);
        push_record(tw.buffer(0), b"late", b"");
        assert!(tw.maybe_flush(0).is_err());
    }
}
