use anyhow::{bail, Context, Result};
use memchr::memchr;
use memmap2::Mmap;
use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::hash::Hasher;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    fs::create_dir_all(path.as_ref()).with_context(|| format!("create_dir_all {}", path.as_ref().display()))
}

/// Regular files under `path` (or `path` itself), sorted. Hidden and
/// `_`-prefixed entries below the root are pruned, whole directories included,
/// so `_SUCCESS` markers and scratch dirs such as `.moviestats_runs` are never read.
pub fn list_files_recursive(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    if !path.exists() {
        bail!("input path does not exist: {}", path.display());
    }
    let mut files = Vec::new();
    let walker = walkdir::WalkDir::new(path).into_iter().filter_entry(|e| e.depth() == 0 || !is_skipped_name(e.file_name()));
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", path.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn is_skipped_name(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    name.starts_with('.') || name.starts_with('_')
}

/// Absolute form of `path` with symlinks and `..` resolved, even when `path`
/// does not exist yet: the nearest existing ancestor is canonicalized and the
/// missing tail is appended lexically.
pub fn resolve_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().context("current_dir")?.join(path)
    };
    let mut existing = absolute.as_path();
    let mut tail = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            // `..` or the root: step up without recording a name
            (Some(parent), None) => {
                tail.push(OsString::from(".."));
                existing = parent;
            }
            (None, _) => break,
        }
    }
    let mut resolved = fs::canonicalize(existing).with_context(|| format!("canonicalize {}", existing.display()))?;
    for part in tail.iter().rev() {
        if part == ".." {
            resolved.pop();
        } else if part != "." {
            resolved.push(part);
        }
    }
    Ok(resolved)
}

pub fn map_file(path: impl AsRef<Path>) -> Result<Mmap> {
    let file = File::open(path.as_ref()).with_context(|| format!("open {}", path.as_ref().display()))?;
    unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", path.as_ref().display()))
}

/// A line-aligned byte range of one input file; the unit of map work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputSplit {
    pub path: PathBuf,
    pub start: usize,
    pub end: usize,
}

/// Cut `files` into about `target` splits of at least `min_split_bytes`.
/// Every cut lands just after a newline, so no line spans two splits.
/// Empty files produce no split.
pub fn input_splits(files: &[PathBuf], target: usize, min_split_bytes: u64) -> Result<Vec<InputSplit>> {
    let mut sizes = Vec::with_capacity(files.len());
    for f in files {
        sizes.push(fs::metadata(f).with_context(|| format!("stat {}", f.display()))?.len());
    }
    let total: u64 = sizes.iter().sum();
    let split_size = (total / target.max(1) as u64).max(min_split_bytes).max(1) as usize;

    let mut splits = Vec::new();
    for (path, &size) in files.iter().zip(&sizes) {
        let size = size as usize;
        if size == 0 {
            continue;
        }
        if size <= split_size {
            splits.push(InputSplit { path: path.clone(), start: 0, end: size });
            continue;
        }
        let map = map_file(path)?;
        let bytes = &map[..];
        let mut start = 0;
        while start < bytes.len() {
            let want = start + split_size;
            let end = if want >= bytes.len() {
                bytes.len()
            } else {
                memchr(b'\n', &bytes[want - 1..]).map(|i| want + i).unwrap_or(bytes.len())
            };
            splits.push(InputSplit { path: path.clone(), start, end });
            start = end;
        }
    }
    Ok(splits)
}

/// `\n`-separated lines of `bytes` with a trailing `\r` removed. Invalid
/// UTF-8 is replaced rather than rejected.
pub fn lines_in(bytes: &[u8]) -> impl Iterator<Item = Cow<'_, str>> {
    let mut off = 0usize;
    std::iter::from_fn(move || {
        if off >= bytes.len() {
            return None;
        }
        let nl = memchr(b'\n', &bytes[off..]).map(|i| off + i).unwrap_or(bytes.len());
        let mut line = &bytes[off..nl];
        off = nl + 1;
        if let [rest @ .., b'\r'] = line { line = rest; }
        Some(String::from_utf8_lossy(line))
    })
}

pub fn hash_to_partition(key_bytes: &[u8], num_partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    hasher.write(key_bytes);
    (hasher.finish() as usize) % num_partitions
}

/// Append one intermediate record: `[klen u32 le][vlen u32 le][key][value]`.
pub fn push_record(buf: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
}

/// Record at `off`: `(key, value, next_offset)`. `None` at the end of the
/// buffer or on a truncated record.
pub fn read_bin_line(bytes: &[u8], off: usize) -> Option<(&[u8], &[u8], usize)> {
    let header = bytes.get(off..off + 8)?;
    let klen = u32::from_le_bytes(header[0..4].try_into().ok()?) as usize;
    let vlen = u32::from_le_bytes(header[4..8].try_into().ok()?) as usize;
    let key_start = off + 8;
    let val_start = key_start + klen;
    let end = val_start + vlen;
    let key = bytes.get(key_start..val_start)?;
    let value = bytes.get(val_start..end)?;
    Some((key, value, end))
}

pub fn open_writer(path: impl AsRef<Path>) -> Result<BufWriter<File>> {
    if let Some(parent) = path.as_ref().parent() {
        ensure_dir(parent)?;
    }
    let file = File::create(path.as_ref()).with_context(|| format!("create {}", path.as_ref().display()))?;
    Ok(BufWriter::new(file))
}

pub fn write_marker(path: impl AsRef<Path>) -> Result<()> {
    File::create(path.as_ref()).with_context(|| format!("create {}", path.as_ref().display()))?;
    Ok(())
}
