//! Import orchestrator
//!
//! Partitions run in parallel on blocking worker threads, at most
//! `max_workers` at a time. Inside a partition the stages run in order:
//!
//! 1. Hierarchy (tier batches)
//! 2. Subannotations
//! 3. Utterances
//! 4. Syllables (syllabic rows, then degenerate rows)
//!
//! Each stage's mutations are flushed to the sink as soon as the stage ends.
//! The stop check is polled before a partition starts and between stages; a
//! stage that has started always completes.

use crate::checker::InvariantChecker;
use crate::graph::AnnotationGraph;
use crate::hierarchy::HierarchyBuilder;
use crate::registry::Registries;
use crate::report::{ImportReport, PartitionReport, PartitionStatus, Stage, StageReport};
use crate::rows::{ImportManifest, PartitionInput};
use crate::segmenter::UtteranceSegmenter;
use crate::sink::{flush_mutations, GraphSink};
use crate::subannotation::SubannotationAttacher;
use crate::syllabification::SyllabificationEngine;
use annograph_common::config::ImportConfig;
use annograph_common::events::{NoopReporter, ProgressReporter, StopCheck};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const STAGES: [Stage; 4] = [Stage::Hierarchy, Stage::Subannotations, Stage::Utterances, Stage::Syllables];

/// Graph and report of one processed partition
#[derive(Debug)]
pub struct PartitionOutcome {
    pub report: PartitionReport,
    pub graph: AnnotationGraph,
}

/// Runs import sessions against one sink
#[derive(Clone)]
pub struct ImportOrchestrator {
    config: ImportConfig,
    registries: Arc<Registries>,
    sink: Arc<dyn GraphSink>,
    reporter: Arc<dyn ProgressReporter>,
}

impl ImportOrchestrator {
    pub fn new(config: ImportConfig, sink: Arc<dyn GraphSink>) -> Self {
        Self {
            config,
            registries: Arc::new(Registries::new()),
            sink,
            reporter: Arc::new(NoopReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Share type and schema dictionaries with another orchestrator
    pub fn with_registries(mut self, registries: Arc<Registries>) -> Self {
        self.registries = registries;
        self
    }

    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Import every partition of `manifest`
    ///
    /// Partition reports are returned in manifest order regardless of the
    /// order in which workers finish.
    pub async fn run(&self, manifest: ImportManifest, stop: Arc<dyn StopCheck>) -> ImportReport {
        let session_id = Uuid::new_v4();
        let started_at = Utc::now();
        let total = manifest.partitions.len();

        tracing::info!(
            session_id = %session_id,
            corpus = manifest.corpus.as_deref().unwrap_or("-"),
            partitions = total,
            workers = self.config.max_workers,
            "Starting import session"
        );
        self.reporter.phase(&format!("Importing {} partitions", total));
        self.reporter.progress(0, total);

        let finished = Arc::new(AtomicUsize::new(0));

        let mut results: Vec<(usize, PartitionReport)> = stream::iter(manifest.partitions.into_iter().enumerate())
            .map(|(position, input)| {
                let worker = self.clone();
                let stop = Arc::clone(&stop);
                let finished = Arc::clone(&finished);

                async move {
                    let partition = input.partition();
                    let reporter = Arc::clone(&worker.reporter);

                    let report = if stop.should_stop() {
                        tracing::debug!(partition = %partition, "Partition skipped after stop request");
                        PartitionReport::not_started(partition.clone(), PartitionStatus::Cancelled)
                    } else {
                        let task = tokio::task::spawn_blocking(move || worker.run_partition(&input, stop.as_ref()).report);
                        match task.await {
                            Ok(report) => report,
                            Err(e) => {
                                tracing::error!(partition = %partition, error = %e, "Partition worker failed");
                                PartitionReport::not_started(partition.clone(), PartitionStatus::Failed)
                            }
                        }
                    };

                    let current = finished.fetch_add(1, Ordering::Relaxed) + 1;
                    reporter.progress(current, total);
                    reporter.partition_finished(
                        &partition.speaker,
                        &partition.discourse,
                        report.status.as_str(),
                        report.failure_count(),
                    );

                    (position, report)
                }
            })
            .buffer_unordered(self.config.max_workers.max(1))
            .collect()
            .await;

        results.sort_by_key(|(position, _)| *position);
        let partitions: Vec<PartitionReport> = results.into_iter().map(|(_, report)| report).collect();

        let report = ImportReport {
            session_id,
            started_at,
            ended_at: Utc::now(),
            type_nodes: self.registries.types.len(),
            partitions,
        };
        tracing::info!(
            session_id = %session_id,
            completed = report.count(PartitionStatus::Completed),
            with_errors = report.count(PartitionStatus::CompletedWithErrors),
            failed = report.count(PartitionStatus::Failed),
            cancelled = report.count(PartitionStatus::Cancelled),
            type_nodes = report.type_nodes,
            duration_ms = (report.ended_at - report.started_at).num_milliseconds(),
            "Import session finished"
        );
        report
    }

    /// Import one partition on the calling thread
    pub fn run_partition(&self, input: &PartitionInput, stop: &dyn StopCheck) -> PartitionOutcome {
        let partition = input.partition();
        let mut graph = AnnotationGraph::new(partition.clone());
        let mut report = PartitionReport::new(partition.clone());
        let mut cancelled = false;

        tracing::info!(
            speaker = %partition.speaker,
            discourse = %partition.discourse,
            rows = input.row_count(),
            "Importing partition"
        );

        for stage in STAGES {
            if stop.should_stop() {
                tracing::info!(partition = %partition, next_stage = ?stage, "Partition cancelled between stages");
                cancelled = true;
                break;
            }

            self.reporter.phase(&format!("{} ({})", stage.description(), partition));
            let stage_report = self.run_stage(stage, &mut graph, input);
            report.stages.push(stage_report);

            if !self.flush(&mut graph, &mut report) {
                break;
            }
        }

        if !cancelled && report.sink_error.is_none() && self.config.check_invariants {
            report.violations = InvariantChecker::new().check(&graph);
            for violation in &report.violations {
                tracing::warn!(partition = %partition, violation = %violation, "Invariant violation");
            }
        }

        report.settle(cancelled);
        tracing::info!(
            speaker = %partition.speaker,
            discourse = %partition.discourse,
            status = report.status.as_str(),
            failures = report.failure_count(),
            violations = report.violations.len(),
            mutations = report.mutations_committed,
            "Partition finished"
        );

        PartitionOutcome { report, graph }
    }

    fn run_stage(&self, stage: Stage, graph: &mut AnnotationGraph, input: &PartitionInput) -> StageReport {
        let registries = self.registries.as_ref();
        match stage {
            Stage::Hierarchy => HierarchyBuilder::new(registries).build(graph, &input.tiers),
            Stage::Subannotations => SubannotationAttacher::new(registries).attach(graph, &input.subannotations),
            Stage::Utterances => UtteranceSegmenter::new(registries).segment(graph, &input.utterances),
            Stage::Syllables => {
                SyllabificationEngine::new(registries, self.config.search_hop_limit).syllabify(graph, &input.syllables)
            }
        }
    }

    /// Flush the graph's pending mutations. Returns false if the sink failed.
    fn flush(&self, graph: &mut AnnotationGraph, report: &mut PartitionReport) -> bool {
        let mutations = graph.take_mutations();
        report.mutations_total += mutations.len();

        let outcome = flush_mutations(
            self.sink.as_ref(),
            graph.partition(),
            &mutations,
            self.config.commit_batch_size,
        );
        report.mutations_committed += outcome.committed;

        match outcome.error {
            Some(e) => {
                report.sink_error = Some(e.to_string());
                false
            }
            None => true,
        }
    }
}
