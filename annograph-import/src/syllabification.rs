//! Syllabification Engine
//!
//! Assigns nucleus / onset / coda roles to phones and moves them from their
//! word into a new syllable node. Rows are planned with read-only searches
//! first and applied afterwards, so a row that fails leaves the graph as it
//! was.
//!
//! Syllabic rows (with a nucleus) are planned together, in three passes over
//! the batch: every nucleus is claimed, then every onset, then every coda. A
//! walk never crosses a claimed phone, so an open syllable cannot swallow the
//! next syllable's onset or nucleus whatever the row order. Degenerate rows
//! (no nucleus, split at a break index) follow once the syllabic rows are
//! applied. Re-running on phones that already hold a role is refused: rebuild
//! from clean input instead.

use crate::error::{ImportError, ImportResult};
use crate::graph::{AnnotationGraph, Direction, NodeIndex};
use crate::registry::Registries;
use crate::report::{Stage, StageReport};
use crate::rows::SyllableRow;
use annograph_common::{AnnotationId, Interval, Role, RoleTag, Tier};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Planned syllable with a nucleus
#[derive(Debug, Clone, PartialEq)]
struct SyllabicPlan {
    interval: Interval,
    word: NodeIndex,
    nucleus: NodeIndex,
    /// Nearest first
    onset: Vec<NodeIndex>,
    /// Nearest first
    coda: Vec<NodeIndex>,
}

/// Planned mutation for one syllable row
#[derive(Debug, Clone, PartialEq)]
enum SyllablePlan {
    Syllabic(SyllabicPlan),
    Degenerate {
        interval: Interval,
        word: NodeIndex,
        /// Window in chain order, each phone with its role
        window: Vec<(NodeIndex, RoleTag)>,
    },
}

impl SyllablePlan {
    fn word(&self) -> NodeIndex {
        match self {
            Self::Syllabic(plan) => plan.word,
            Self::Degenerate { word, .. } => *word,
        }
    }

    fn interval(&self) -> Interval {
        match self {
            Self::Syllabic(plan) => plan.interval,
            Self::Degenerate { interval, .. } => *interval,
        }
    }
}

pub struct SyllabificationEngine<'a> {
    registries: &'a Registries,
    hop_limit: usize,
}

impl<'a> SyllabificationEngine<'a> {
    pub fn new(registries: &'a Registries, hop_limit: usize) -> Self {
        Self { registries, hop_limit }
    }

    pub fn syllabify(&self, graph: &mut AnnotationGraph, rows: &[SyllableRow]) -> StageReport {
        let mut report = StageReport::new(Stage::Syllables);
        if rows.is_empty() {
            return report;
        }

        let tier = Tier::Syllable;
        let mut seen = HashSet::with_capacity(rows.len());
        if let Some(row) = rows
            .iter()
            .find(|row| !seen.insert(&row.id) || graph.contains(&tier, &row.id))
        {
            let error = ImportError::DuplicateIdentifier {
                tier: tier.clone(),
                id: row.id.clone(),
            };
            warn!(error = %error, "Syllable batch aborted");
            report.abort(&tier, &error);
            return report;
        }

        let (syllabic, degenerate): (Vec<&SyllableRow>, Vec<&SyllableRow>) =
            rows.iter().partition(|row| !row.is_degenerate());
        info!(
            speaker = %graph.partition().speaker,
            discourse = %graph.partition().discourse,
            syllabic = syllabic.len(),
            degenerate = degenerate.len(),
            "Syllabifying"
        );

        self.registries.prepare_tier(graph, &tier);
        for (row, plan) in self.plan_syllabic_rows(graph, &syllabic, &mut report) {
            let plan = SyllablePlan::Syllabic(plan);
            match self.apply(graph, row, &plan) {
                Ok(()) => report.created += 1,
                Err(e) => report.fail_at(&tier, &row.id, &e),
            }
        }

        for row in degenerate {
            let outcome = self
                .plan_degenerate(graph, row)
                .and_then(|plan| self.apply(graph, row, &plan));
            match outcome {
                Ok(()) => report.created += 1,
                Err(e) => {
                    debug!(row_id = %row.id, error = %e, "Syllable skipped");
                    report.fail_at(&tier, &row.id, &e);
                }
            }
        }

        report
    }

    /// Plan every syllabic row of the batch. Rows that cannot be anchored are
    /// reported and dropped; the rest are returned in input order.
    fn plan_syllabic_rows<'r>(
        &self,
        graph: &AnnotationGraph,
        rows: &[&'r SyllableRow],
        report: &mut StageReport,
    ) -> Vec<(&'r SyllableRow, SyllabicPlan)> {
        let mut claimed = HashSet::new();
        let mut plans = Vec::with_capacity(rows.len());

        for &row in rows {
            match anchor_syllabic(graph, row, &claimed) {
                Ok(plan) => {
                    claimed.insert(plan.nucleus);
                    plans.push((row, plan));
                }
                Err(e) => {
                    debug!(row_id = %row.id, error = %e, "Syllable skipped");
                    report.fail_at(&Tier::Syllable, &row.id, &e);
                }
            }
        }

        for &mut (row, ref mut plan) in plans.iter_mut() {
            plan.onset = self.walk_within_word(
                graph,
                row,
                plan.nucleus,
                plan.word,
                Direction::Backward,
                row.onset_id.as_ref(),
                &claimed,
            );
            claimed.extend(plan.onset.iter().copied());
        }

        for &mut (row, ref mut plan) in plans.iter_mut() {
            plan.coda = self.walk_within_word(
                graph,
                row,
                plan.nucleus,
                plan.word,
                Direction::Forward,
                row.coda_id.as_ref(),
                &claimed,
            );
            claimed.extend(plan.coda.iter().copied());
        }

        plans
    }

    fn plan_degenerate(&self, graph: &AnnotationGraph, row: &SyllableRow) -> ImportResult<SyllablePlan> {
        let interval = row_interval(row)?;
        let onset_id = row.onset_id.as_ref().ok_or_else(|| ImportError::DanglingReference {
            tier: Tier::Syllable,
            id: row.id.clone(),
            field: "onset_id",
            target: "<none>".to_string(),
        })?;
        let onset = anchor_phone(graph, row, "onset_id", onset_id)?;
        let word = containing_word(graph, row, onset)?;

        let mut phones = vec![onset];
        if let Some(coda_id) = row.coda_id.as_ref().filter(|&id| id != onset_id) {
            let walked = graph.walk_while(onset, Direction::Forward, self.hop_limit, |p| {
                is_free_phone_of(graph, p, word)
            });
            match graph
                .lookup(&Tier::Phone, coda_id)
                .and_then(|coda| walked.iter().position(|&p| p == coda))
            {
                Some(end) => phones.extend_from_slice(&walked[..=end]),
                None => warn!(
                    row_id = %row.id,
                    coda_id = %coda_id,
                    hop_limit = self.hop_limit,
                    "Coda not reachable from onset within the word; using the onset alone"
                ),
            }
        }

        let len = phones.len();
        let break_index = match row.break_index {
            Some(b) if b > len => {
                warn!(row_id = %row.id, break_index = b, window = len, "Break beyond window, clamped");
                len
            }
            Some(b) => b,
            None => len,
        };

        let window = phones
            .into_iter()
            .enumerate()
            .map(|(offset, phone)| (phone, degenerate_role(offset, break_index)))
            .collect();

        Ok(SyllablePlan::Degenerate { interval, word, window })
    }

    /// Collect free, unclaimed phones of `word` next to `anchor`, nearest first.
    ///
    /// A boundary that is reached ends the walk after it is collected; a
    /// boundary that is given but not reached is ignored.
    #[allow(clippy::too_many_arguments)]
    fn walk_within_word(
        &self,
        graph: &AnnotationGraph,
        row: &SyllableRow,
        anchor: NodeIndex,
        word: NodeIndex,
        direction: Direction,
        boundary: Option<&AnnotationId>,
        claimed: &HashSet<NodeIndex>,
    ) -> Vec<NodeIndex> {
        let mut walked = graph.walk_while(anchor, direction, self.hop_limit, |p| {
            !claimed.contains(&p) && is_free_phone_of(graph, p, word)
        });

        if let Some(boundary_id) = boundary {
            match graph
                .lookup(&Tier::Phone, boundary_id)
                .and_then(|b| walked.iter().position(|&p| p == b))
            {
                Some(end) => walked.truncate(end + 1),
                None => warn!(
                    row_id = %row.id,
                    boundary = %boundary_id,
                    direction = ?direction,
                    "Boundary phone not reached; treating as absent"
                ),
            }
        }

        walked
    }

    fn apply(&self, graph: &mut AnnotationGraph, row: &SyllableRow, plan: &SyllablePlan) -> ImportResult<()> {
        let word = plan.word();
        let syllable = graph.insert_node(Tier::Syllable, row.id.clone(), plan.interval(), row.label.clone())?;
        self.registries.classify(graph, syllable);
        graph.link_partition(syllable);
        graph.link_previous(syllable, row.prev_id.as_ref());

        match plan {
            SyllablePlan::Syllabic(SyllabicPlan {
                nucleus, onset, coda, ..
            }) => {
                graph.set_role(*nucleus, RoleTag::nucleus())?;
                graph.reparent(*nucleus, word, syllable)?;
                graph.add_containment(syllable, word)?;
                for (distance, &phone) in onset.iter().enumerate() {
                    graph.set_role(phone, RoleTag::onset(ordinal(distance + 1)))?;
                    graph.reparent(phone, word, syllable)?;
                }
                for (distance, &phone) in coda.iter().enumerate() {
                    graph.set_role(phone, RoleTag::coda(ordinal(distance + 1)))?;
                    graph.reparent(phone, word, syllable)?;
                }
                debug!(row_id = %row.id, onset = onset.len(), coda = coda.len(), "Created syllable");
            }
            SyllablePlan::Degenerate { window, .. } => {
                graph.add_containment(syllable, word)?;
                for &(phone, tag) in window {
                    graph.set_role(phone, tag)?;
                    graph.reparent(phone, word, syllable)?;
                }
                debug!(row_id = %row.id, window = window.len(), "Created degenerate syllable");
            }
        }

        Ok(())
    }
}

fn row_interval(row: &SyllableRow) -> ImportResult<Interval> {
    Interval::new(row.begin, row.end).map_err(|e| ImportError::InvalidRow {
        tier: Tier::Syllable,
        id: row.id.clone(),
        reason: e.to_string(),
    })
}

/// Nucleus and word of a syllabic row; onset and coda are filled in later passes
fn anchor_syllabic(
    graph: &AnnotationGraph,
    row: &SyllableRow,
    claimed: &HashSet<NodeIndex>,
) -> ImportResult<SyllabicPlan> {
    let interval = row_interval(row)?;
    let nucleus_id = row.nucleus_id.as_ref().ok_or_else(|| ImportError::DanglingReference {
        tier: Tier::Syllable,
        id: row.id.clone(),
        field: "nucleus_id",
        target: "<none>".to_string(),
    })?;
    let nucleus = anchor_phone(graph, row, "nucleus_id", nucleus_id)?;
    if claimed.contains(&nucleus) {
        return Err(ImportError::RoleConflict {
            id: nucleus_id.clone(),
            existing: Role::Nucleus,
        });
    }
    let word = containing_word(graph, row, nucleus)?;

    Ok(SyllabicPlan {
        interval,
        word,
        nucleus,
        onset: Vec::new(),
        coda: Vec::new(),
    })
}

fn anchor_phone(
    graph: &AnnotationGraph,
    row: &SyllableRow,
    field: &'static str,
    phone_id: &AnnotationId,
) -> ImportResult<NodeIndex> {
    let phone = graph
        .lookup(&Tier::Phone, phone_id)
        .ok_or_else(|| ImportError::DanglingReference {
            tier: Tier::Syllable,
            id: row.id.clone(),
            field,
            target: phone_id.to_string(),
        })?;
    if let Some(existing) = graph.node(phone).role {
        return Err(ImportError::RoleConflict {
            id: phone_id.clone(),
            existing: existing.role,
        });
    }
    Ok(phone)
}

fn containing_word(graph: &AnnotationGraph, row: &SyllableRow, phone: NodeIndex) -> ImportResult<NodeIndex> {
    graph
        .parent_in_tier(phone, &Tier::Word)
        .ok_or_else(|| ImportError::PathNotFound {
            tier: Tier::Syllable,
            id: row.id.clone(),
            reason: format!("phone {} is not contained by a word", graph.node(phone).id),
        })
}

/// Untagged phone still directly contained by `word`
fn is_free_phone_of(graph: &AnnotationGraph, phone: NodeIndex, word: NodeIndex) -> bool {
    let node = graph.node(phone);
    node.tier == Tier::Phone && node.role.is_none() && graph.parent_in_tier(phone, &Tier::Word) == Some(word)
}

/// Role of the phone at `offset` in a degenerate window split at `break_index`
fn degenerate_role(offset: usize, break_index: usize) -> RoleTag {
    if offset >= break_index {
        RoleTag::coda(ordinal(offset - break_index + 1))
    } else {
        RoleTag::onset(ordinal(break_index - offset))
    }
}

fn ordinal(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
