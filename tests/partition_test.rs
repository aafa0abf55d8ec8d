//! Partition lifecycle, search and backup tests

use partitioned_index::partition::Storage;
use partitioned_index::query::{MultiPhraseQuery, PhraseAlternatives};
use partitioned_index::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;

/// Helper to create a partition in its own folder
fn create_test_partition(temp_dir: &TempDir, name: &str, config: IndexConfig) -> Partition {
    let storage = Storage::open(temp_dir.path().join(name)).unwrap();
    Partition::new(name, storage, Arc::new(config))
}

fn person(name: &str, city: &str) -> Document {
    Document::of_type("person").with("Name", name).with("City", city)
}

fn sorted(mut documents: Vec<Document>) -> Vec<Document> {
    documents.sort();
    documents
}

#[test]
fn test_add_then_count_match_all() {
    let temp_dir = TempDir::new().unwrap();
    let partition = create_test_partition(&temp_dir, "people", IndexConfig::default());

    let documents: Vec<Document> = (0..25)
        .map(|i| person(&format!("person-{}", i), "Paris"))
        .collect();
    assert_eq!(partition.add(&documents).unwrap(), 25);
    partition.flush().unwrap();

    assert_eq!(partition.count(&QueryNode::MatchAllDocs).unwrap(), 25);
}

#[test]
fn test_delete_count_then_zero() {
    let temp_dir = TempDir::new().unwrap();
    let partition = create_test_partition(&temp_dir, "people", IndexConfig::default());
    partition
        .add(&[
            person("Bob", "London"),
            person("Alice", "London"),
            person("Carol", "Paris"),
        ])
        .unwrap();
    partition.flush().unwrap();

    let london = QueryNode::term("City", "London");
    assert_eq!(partition.delete(&london).unwrap(), 2);
    partition.flush().unwrap();

    assert_eq!(partition.count(&london).unwrap(), 0);
    assert_eq!(partition.count(&QueryNode::MatchAllDocs).unwrap(), 1);
}

#[test]
fn test_delete_no_count() {
    let temp_dir = TempDir::new().unwrap();
    let partition = create_test_partition(&temp_dir, "people", IndexConfig::default());
    partition
        .add(&[person("Bob", "London"), person("Carol", "Paris")])
        .unwrap();
    partition.flush().unwrap();

    partition
        .delete_no_count(&QueryNode::prefix("Name", "Bo"))
        .unwrap();
    partition.flush().unwrap();

    let remaining = partition.documents(&QueryNode::MatchAllDocs).unwrap();
    assert_eq!(remaining, vec![person("Carol", "Paris")]);
}

#[test]
fn test_query_kinds_against_encoded_fields() {
    let temp_dir = TempDir::new().unwrap();
    let partition = create_test_partition(&temp_dir, "people", IndexConfig::default());
    partition
        .add(&[
            person("Bob", "London"),
            person("Bobby", "Lisbon"),
            person("Alice", "Paris"),
            Document::of_type("city").with("Name", "London"),
        ])
        .unwrap();
    partition.flush().unwrap();

    let count = |query: QueryNode| partition.count(&query).unwrap();

    assert_eq!(count(QueryNode::record_type("person")), 3);
    assert_eq!(count(QueryNode::term("Name", "London")), 1);
    assert_eq!(count(QueryNode::wildcard("City", "L*n")), 2);
    assert_eq!(count(QueryNode::wildcard("Name", "Bo?")), 1);
    assert_eq!(count(QueryNode::prefix("Name", "Bob")), 2);
    assert_eq!(count(QueryNode::regexp("City", "(London|Paris)")), 2);
    assert_eq!(count(QueryNode::fuzzy("Name", "Alise", 1, 0)), 1);
    assert_eq!(
        count(QueryNode::term_range("Name", Some("A"), Some("Bob"), true, true)),
        2
    );
    assert_eq!(count(QueryNode::term_range("Name", Some("B"), None, true, true)), 3);
    assert_eq!(
        count(QueryNode::boolean(vec![
            (QueryNode::record_type("person"), Occur::Must),
            (QueryNode::term("City", "London"), Occur::MustNot),
        ])),
        2
    );
    assert_eq!(
        count(QueryNode::disjunction_max(
            vec![
                QueryNode::term("Name", "Bob"),
                QueryNode::term("Name", "Alice"),
            ],
            0.1
        )),
        2
    );
    assert_eq!(
        count(QueryNode::constant_score(QueryNode::term("City", "Paris"))),
        1
    );
}

#[test]
fn test_phrase_over_field_sequence() {
    let temp_dir = TempDir::new().unwrap();
    let partition = create_test_partition(&temp_dir, "docs", IndexConfig::default());
    partition
        .add(&[
            Document::of_type("note")
                .with("Word", "quick")
                .with("Word", "brown")
                .with("Word", "fox"),
            Document::of_type("note")
                .with("Word", "brown")
                .with("Word", "quick"),
        ])
        .unwrap();
    partition.flush().unwrap();

    assert_eq!(
        partition
            .count(&QueryNode::phrase("Word", ["quick", "brown"], 0))
            .unwrap(),
        1
    );

    let multi = QueryNode::MultiPhrase(MultiPhraseQuery {
        field: "Word".to_string(),
        positions: vec![
            PhraseAlternatives {
                alternatives: BTreeSet::from(["brown".to_string(), "quick".to_string()]),
                position: 0,
            },
            PhraseAlternatives {
                alternatives: BTreeSet::from(["fox".to_string(), "quick".to_string()]),
                position: 1,
            },
        ],
        slop: 0,
    });
    assert_eq!(partition.count(&multi).unwrap(), 2);
}

#[test]
fn test_foreign_node_is_rejected_by_search() {
    let temp_dir = TempDir::new().unwrap();
    let partition = create_test_partition(&temp_dir, "people", IndexConfig::default());

    let foreign = QueryNode::Foreign(partitioned_index::query::ForeignQuery {
        name: "span_near".to_string(),
    });
    match partition.count(&foreign) {
        Err(IndexError::UnsupportedQueryNode(kind)) => assert_eq!(kind, "span_near"),
        other => panic!("expected UnsupportedQueryNode, got {:?}", other),
    }
}

#[test]
fn test_case_insensitive_partition() {
    let temp_dir = TempDir::new().unwrap();
    let config = IndexConfigBuilder::new().case_insensitive(true).build();
    let partition = create_test_partition(&temp_dir, "people", config);
    partition.add(&[person("Bob", "LONDON")]).unwrap();
    partition.flush().unwrap();

    let rewriter = CaseInsensitive::query_rewriter();
    let query = rewriter.rewrite(&QueryNode::term("City", "London")).unwrap();
    assert_eq!(partition.count(&query).unwrap(), 1);

    // Stored pairs keep their original spelling
    let found = partition.documents(&query).unwrap();
    assert_eq!(found[0].get("City"), Some("LONDON"));
}

#[test]
fn test_top_is_capped_by_max_results() {
    let temp_dir = TempDir::new().unwrap();
    let config = IndexConfigBuilder::new().max_results(3).build();
    let partition = create_test_partition(&temp_dir, "people", config);
    let documents: Vec<Document> = (0..10)
        .map(|i| person(&format!("p{}", i), "Rome"))
        .collect();
    partition.add(&documents).unwrap();
    partition.flush().unwrap();

    let top = partition
        .search(|searcher| searcher.top(&QueryNode::term("City", "Rome"), 50))
        .unwrap();
    assert_eq!(top.len(), 3);

    let all = partition
        .search(|searcher| {
            assert_eq!(searcher.num_docs(), 10);
            searcher.documents(&QueryNode::MatchAllDocs)
        })
        .unwrap();
    assert_eq!(all.len(), 10);
}

#[test]
fn test_backup_restore_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let original = create_test_partition(&temp_dir, "people", IndexConfig::default());
    let documents = vec![
        person("Bob", "London"),
        person("Alice", "Paris"),
        Document::of_type("city").with("Name", "Rome"),
    ];
    original.add(&documents).unwrap();
    original.flush().unwrap();

    let backup_dir = temp_dir.path().join("backup");
    original.backup(&backup_dir).unwrap();

    let restored_root = TempDir::new().unwrap();
    let restored = create_test_partition(&restored_root, "people", IndexConfig::default());
    restored.add(&[person("Stale", "Nowhere")]).unwrap();
    restored.flush().unwrap();

    restored.restore(&backup_dir).unwrap();
    assert_eq!(
        sorted(restored.documents(&QueryNode::MatchAllDocs).unwrap()),
        sorted(documents)
    );

    // Still writable after the restore
    restored.add(&[person("Dave", "Oslo")]).unwrap();
    restored.flush().unwrap();
    assert_eq!(restored.count(&QueryNode::MatchAllDocs).unwrap(), 4);
}

#[test]
fn test_backup_while_adding_copies_one_commit() {
    let temp_dir = TempDir::new().unwrap();
    let partition = create_test_partition(&temp_dir, "people", IndexConfig::default());
    partition.add(&[person("Bob", "London")]).unwrap();
    partition.flush().unwrap();

    let backup_dir = temp_dir.path().join("backup");
    std::thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..5 {
                partition.add(&[person(&format!("w{}", i), "Berlin")]).unwrap();
                partition.flush().unwrap();
            }
        });
        partition.backup(&backup_dir).unwrap();
    });

    let restored_root = TempDir::new().unwrap();
    let restored = create_test_partition(&restored_root, "people", IndexConfig::default());
    restored.restore(&backup_dir).unwrap();

    let status = restored.check().unwrap();
    assert!(status.clean);
    let count = restored.count(&QueryNode::MatchAllDocs).unwrap();
    assert!((1..=6).contains(&count), "unexpected count {}", count);
}

#[test]
fn test_delete_all_then_reuse() {
    let temp_dir = TempDir::new().unwrap();
    let partition = create_test_partition(&temp_dir, "people", IndexConfig::default());
    partition
        .add(&[person("Bob", "London"), person("Alice", "Paris")])
        .unwrap();
    partition.flush().unwrap();

    partition.delete_all().unwrap();
    assert_eq!(partition.state(), PartitionState::Closed);

    partition.add(&[person("Carol", "Rome")]).unwrap();
    partition.flush().unwrap();
    assert_eq!(
        partition.documents(&QueryNode::MatchAllDocs).unwrap(),
        vec![person("Carol", "Rome")]
    );
}

#[test]
fn test_second_writer_on_same_storage_fails_activation() {
    let temp_dir = TempDir::new().unwrap();
    let first = create_test_partition(&temp_dir, "shared", IndexConfig::default());
    let second = create_test_partition(&temp_dir, "shared", IndexConfig::default());

    first.flush().unwrap();
    assert!(first.storage().is_locked().unwrap());
    match second.flush() {
        Err(IndexError::Activation(_)) => {}
        other => panic!("expected activation failure, got {:?}", other),
    }

    first.close().unwrap();
    second.flush().unwrap();
}
