//! Segmented append-only disk persistence for messages that have
//! overflowed the in-memory FIFO.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use xrm_types::QueueMessage;

use crate::error::QueueError;

const SEGMENT_PREFIX: &str = "segment-";
const SEGMENT_SUFFIX: &str = ".jsonl";

fn segment_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("{SEGMENT_PREFIX}{index:020}{SEGMENT_SUFFIX}"))
}

fn parse_segment_index(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

/// A directory of `segment-<index>.jsonl` files, each holding up to
/// `segment_capacity` serialized [`QueueMessage`]s, one per line.
pub struct DiskStore {
    dir: PathBuf,
    segment_capacity: usize,
    write_index: u64,
    write_count: usize,
    writer: Option<BufWriter<File>>,
    read_index: u64,
    read_buffer: VecDeque<QueueMessage>,
    pending: usize,
}

impl DiskStore {
    /// Open (and, if needed, create) the segment directory, recovering any
    /// segments left over from a previous run.
    pub fn open(dir: impl Into<PathBuf>, segment_capacity: usize) -> Result<Self, QueueError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| QueueError::SegmentIo {
            path: dir.display().to_string(),
            source,
        })?;

        let mut indices = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|source| QueueError::SegmentIo {
            path: dir.display().to_string(),
            source,
        })? {
            let entry = entry.map_err(|source| QueueError::SegmentIo {
                path: dir.display().to_string(),
                source,
            })?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(idx) = parse_segment_index(name) {
                    indices.push(idx);
                }
            }
        }
        indices.sort_unstable();

        let mut pending = 0usize;
        for &idx in &indices {
            pending += count_lines(&segment_path(&dir, idx))?;
        }

        let read_index = indices.first().copied().unwrap_or(0);
        let write_index = indices.last().copied().unwrap_or(0);
        let write_count = if indices.is_empty() {
            0
        } else {
            count_lines(&segment_path(&dir, write_index))?
        };

        Ok(Self {
            dir,
            segment_capacity,
            write_index,
            write_count,
            writer: None,
            read_index,
            read_buffer: VecDeque::new(),
            pending,
        })
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
    }

    #[must_use]
    pub fn has_recovered_segments(&self) -> bool {
        self.pending > 0
    }

    /// Append a message to the current write segment, rotating to a new
    /// segment once capacity is reached.
    pub fn push(&mut self, msg: &QueueMessage) -> Result<(), QueueError> {
        if self.writer.is_none() || self.write_count >= self.segment_capacity {
            if self.writer.is_some() {
                self.write_index += 1;
                self.write_count = 0;
            }
            let path = segment_path(&self.dir, self.write_index);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| QueueError::SegmentIo {
                    path: path.display().to_string(),
                    source,
                })?;
            self.writer = Some(BufWriter::new(file));
        }

        let line = serde_json::to_string(msg).expect("QueueMessage always serializes");
        let writer = self.writer.as_mut().expect("writer just ensured");
        writeln!(writer, "{line}").map_err(|source| QueueError::SegmentIo {
            path: segment_path(&self.dir, self.write_index).display().to_string(),
            source,
        })?;
        writer.flush().map_err(|source| QueueError::SegmentIo {
            path: segment_path(&self.dir, self.write_index).display().to_string(),
            source,
        })?;
        self.write_count += 1;
        self.pending += 1;
        Ok(())
    }

    /// Pop the oldest message off disk, loading the next read segment on
    /// demand and deleting segments once fully drained.
    pub fn pop(&mut self) -> Result<Option<QueueMessage>, QueueError> {
        if self.read_buffer.is_empty() {
            self.load_next_read_segment()?;
        }
        if let Some(msg) = self.read_buffer.pop_front() {
            self.pending = self.pending.saturating_sub(1);
            return Ok(Some(msg));
        }
        Ok(None)
    }

    fn load_next_read_segment(&mut self) -> Result<(), QueueError> {
        while self.read_index <= self.write_index {
            let path = segment_path(&self.dir, self.read_index);
            if !path.exists() {
                self.read_index += 1;
                continue;
            }
            let file = File::open(&path).map_err(|source| QueueError::SegmentIo {
                path: path.display().to_string(),
                source,
            })?;
            let reader = BufReader::new(file);
            let mut loaded = false;
            for line in reader.lines() {
                let line = line.map_err(|source| QueueError::SegmentIo {
                    path: path.display().to_string(),
                    source,
                })?;
                if line.trim().is_empty() {
                    continue;
                }
                let msg: QueueMessage = serde_json::from_str(&line).map_err(|source| QueueError::CorruptEntry {
                    path: path.display().to_string(),
                    source,
                })?;
                self.read_buffer.push_back(msg);
                loaded = true;
            }
            let is_current_write_segment = self.read_index == self.write_index && self.writer.is_some();
            if !is_current_write_segment {
                let _ = fs::remove_file(&path);
            }
            self.read_index += 1;
            if loaded {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Flush and close the active write segment.
    pub fn close(&mut self) -> Result<(), QueueError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().map_err(|source| QueueError::SegmentIo {
                path: segment_path(&self.dir, self.write_index).display().to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

fn count_lines(path: &Path) -> Result<usize, QueueError> {
    if !path.exists() {
        return Ok(0);
    }
    let file = File::open(path).map_err(|source| QueueError::SegmentIo {
        path: path.display().to_string(),
        source,
    })?;
    let reader = BufReader::new(file);
    let mut count = 0usize;
    for line in reader.lines() {
        let line = line.map_err(|source| QueueError::SegmentIo {
            path: path.display().to_string(),
            source,
        })?;
        if !line.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}
