//! Utterance segmentation over the word chain

mod helpers;

use annograph_common::{Interval, Tier};
use annograph_import::rows::PartitionInput;
use annograph_import::{ErrorKind, PartitionStatus, Stage};
use helpers::{import, phones, utterance, words};

fn five_words() -> PartitionInput {
    let mut input = PartitionInput::new("s01", "d01");
    input.tiers.push(words(&[
        (1, 0.0, 0.4, "we"),
        (2, 0.4, 0.9, "saw"),
        (3, 0.9, 1.3, "it"),
        (4, 1.8, 2.2, "go"),
        (5, 2.2, 2.6, "now"),
    ]));
    input.tiers.push(phones(&[
        (10, 1, 0.0, 0.4, "W"),
        (11, 2, 0.4, 0.9, "S"),
        (12, 3, 0.9, 1.3, "IH"),
        (13, 4, 1.8, 2.2, "G"),
        (14, 5, 2.2, 2.6, "N"),
    ]));
    input.utterances.push(utterance("u2", 4, 5, Some("u1")));
    input.utterances.push(utterance("u1", 1, 3, None));
    input
}

#[test]
fn test_utterances_span_word_paths() {
    let imported = import(&five_words());
    assert_eq!(imported.report.status, PartitionStatus::Completed, "{:?}", imported.report);

    let graph = &imported.graph;
    let u1 = imported.node(&Tier::Utterance, "u1");
    let u2 = imported.node(&Tier::Utterance, "u2");
    assert_eq!(graph.node(u1).interval, Interval::new(0.0, 1.3).unwrap());
    assert_eq!(graph.node(u2).interval, Interval::new(1.8, 2.6).unwrap());
    assert_eq!(graph.successors(u1), &[u2]);

    for word in graph.tier_nodes(&Tier::Word) {
        assert!(graph.parent_in_tier(word, &Tier::Utterance).is_some());
    }
}

#[test]
fn test_segmentation_is_deterministic_on_clean_graphs() {
    let first = import(&five_words());
    let second = import(&five_words());

    assert_eq!(first.committed(), second.committed());
    for id in ["u1", "u2"] {
        let a = first.node(&Tier::Utterance, id);
        let b = second.node(&Tier::Utterance, id);
        let ids = |imported: &helpers::Imported, n| -> Vec<String> {
            imported
                .graph
                .children(n)
                .iter()
                .map(|&c| imported.graph.node(c).id.to_string())
                .collect()
        };
        assert_eq!(ids(&first, a), ids(&second, b));
    }
}

#[test]
fn test_unreachable_row_fails_and_batch_continues() {
    let mut input = five_words();
    input.utterances.push(utterance("u3", 5, 1, None));
    input.utterances.push(utterance("u4", 9, 9, None));

    let imported = import(&input);
    assert_eq!(imported.report.status, PartitionStatus::CompletedWithErrors);

    let stage = imported.report.stage(Stage::Utterances).unwrap();
    assert_eq!(stage.created, 2);
    let failed: Vec<_> = stage
        .failures
        .iter()
        .map(|f| (f.row_id.clone().unwrap().to_string(), f.kind))
        .collect();
    assert_eq!(
        failed,
        vec![
            ("u3".to_string(), ErrorKind::PathNotFound),
            ("u4".to_string(), ErrorKind::PathNotFound)
        ]
    );
}

#[test]
fn test_single_word_utterance() {
    let mut input = five_words();
    input.utterances = vec![utterance("u1", 3, 3, None)];

    let imported = import(&input);
    let u1 = imported.node(&Tier::Utterance, "u1");
    let it = imported.node(&Tier::Word, 3);
    assert_eq!(imported.graph.children(u1), &[it]);
}
