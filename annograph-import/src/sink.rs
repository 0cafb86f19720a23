//! Receiving-store seam
//!
//! A partition's mutation log is handed over in commit batches. Each call to
//! [`GraphSink::apply_batch`] is one commit; a failed commit stops the
//! partition and earlier commits stay in place.

use crate::error::{ImportError, ImportResult};
use crate::graph::GraphMutation;
use annograph_common::Partition;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error};

pub trait GraphSink: Send + Sync {
    /// Commit one batch of mutations for `partition`
    fn apply_batch(&self, partition: &Partition, batch: &[GraphMutation]) -> ImportResult<()>;
}

/// Sink that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    committed: Mutex<Vec<(Partition, GraphMutation)>>,
    batches: Mutex<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All committed mutations, in commit order
    pub fn mutations(&self) -> Vec<(Partition, GraphMutation)> {
        self.committed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn mutations_for(&self, partition: &Partition) -> Vec<GraphMutation> {
        self.committed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(p, _)| p == partition)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn batch_count(&self) -> usize {
        *self.batches.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl GraphSink for MemorySink {
    fn apply_batch(&self, partition: &Partition, batch: &[GraphMutation]) -> ImportResult<()> {
        let mut committed = self.committed.lock().unwrap_or_else(|e| e.into_inner());
        committed.extend(batch.iter().map(|m| (partition.clone(), m.clone())));
        *self.batches.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    speaker: &'a str,
    discourse: &'a str,
    #[serde(flatten)]
    mutation: &'a GraphMutation,
}

/// Sink writing one JSON object per mutation, flushed at every commit
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> annograph_common::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl GraphSink for JsonLinesSink {
    fn apply_batch(&self, partition: &Partition, batch: &[GraphMutation]) -> ImportResult<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        for mutation in batch {
            let line = JsonLine {
                speaker: &partition.speaker,
                discourse: &partition.discourse,
                mutation,
            };
            serde_json::to_writer(&mut *writer, &line).map_err(|e| ImportError::Sink(e.to_string()))?;
            writer.write_all(b"\n").map_err(|e| ImportError::Sink(e.to_string()))?;
        }
        writer.flush().map_err(|e| ImportError::Sink(e.to_string()))
    }
}

/// Result of flushing a mutation log
#[derive(Debug, Clone, PartialEq)]
pub struct FlushOutcome {
    /// Mutations accepted by the sink before any failure
    pub committed: usize,
    pub error: Option<ImportError>,
}

/// Hand `mutations` to `sink` in batches of `batch_size`, stopping at the
/// first rejected batch
pub fn flush_mutations(
    sink: &dyn GraphSink,
    partition: &Partition,
    mutations: &[GraphMutation],
    batch_size: usize,
) -> FlushOutcome {
    let mut committed = 0;
    for batch in mutations.chunks(batch_size.max(1)) {
        if let Err(e) = sink.apply_batch(partition, batch) {
            error!(
                speaker = %partition.speaker,
                discourse = %partition.discourse,
                committed,
                error = %e,
                "Sink rejected batch"
            );
            return FlushOutcome {
                committed,
                error: Some(e),
            };
        }
        committed += batch.len();
        debug!(speaker = %partition.speaker, discourse = %partition.discourse, committed, "Committed batch");
    }
    FlushOutcome { committed, error: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annograph_common::Tier;
    use std::io::BufRead;

    fn schema(count: usize) -> Vec<GraphMutation> {
        (0..count)
            .map(|i| GraphMutation::RegisterSchema {
                tier: Tier::from(format!("tier{}", i)),
            })
            .collect()
    }

    struct RejectSecondBatch(Mutex<usize>);

    impl GraphSink for RejectSecondBatch {
        fn apply_batch(&self, _partition: &Partition, _batch: &[GraphMutation]) -> ImportResult<()> {
            let mut calls = self.0.lock().unwrap();
            *calls += 1;
            if *calls == 2 {
                return Err(ImportError::Sink("store unavailable".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_flush_splits_into_commit_batches() {
        let sink = MemorySink::new();
        let partition = Partition::new("s01", "d01");
        let outcome = flush_mutations(&sink, &partition, &schema(5), 2);
        assert_eq!(outcome.committed, 5);
        assert!(outcome.error.is_none());
        assert_eq!(sink.batch_count(), 3);
        assert_eq!(sink.mutations_for(&partition).len(), 5);
    }

    #[test]
    fn test_flush_stops_at_rejected_batch() {
        let sink = RejectSecondBatch(Mutex::new(0));
        let outcome = flush_mutations(&sink, &Partition::new("s01", "d01"), &schema(5), 2);
        assert_eq!(outcome.committed, 2);
        assert_eq!(outcome.error, Some(ImportError::Sink("store unavailable".to_string())));
    }

    #[test]
    fn test_json_lines_sink_tags_partition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mutations.jsonl");
        let sink = JsonLinesSink::create(&path).unwrap();
        sink.apply_batch(&Partition::new("s01", "d01"), &schema(2)).unwrap();

        let file = File::open(&path).unwrap();
        let lines: Vec<serde_json::Value> = std::io::BufReader::new(file)
            .lines()
            .map(|l| serde_json::from_str(&l.unwrap()).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["op"], "register_schema");
        assert_eq!(lines[0]["speaker"], "s01");
        assert_eq!(lines[1]["tier"], "tier1");
    }
}
