//! Integration test: convergence.
//!
//! Nodes edit independently, gossip, and must end up with identical
//! ledgers and identical suggestions, whatever the delivery order.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tagmesh_gossip::GossipConfig;
use tagmesh_integration_tests::{TagCluster, author_key, infohash, statement};
use tagmesh_ledger::InsertOutcome;
use tagmesh_types::{Operation, Predicate};

/// 5 nodes, one author each, overlapping tag sets. Edits stay local until
/// gossip rounds run.
#[tokio::test]
#[ntest::timeout(10000)]
async fn test_five_nodes_converge_on_mixed_edits() {
    let c = TagCluster::with_config(
        5,
        GossipConfig {
            forward_fanout: 0,
            ..GossipConfig::default()
        },
    );
    let subject = infohash(1);
    let edits: [&[&str]; 5] = [
        &["anime", "drama"],
        &["anime"],
        &["anime", "comedy"],
        &["drama"],
        &[],
    ];
    for (i, tags) in edits.iter().enumerate() {
        c.node(i)
            .update_tags(&subject, Predicate::Tag, tags.iter(), &author_key(i as u8 + 1))
            .await
            .unwrap();
    }
    // Nothing has been gossiped yet.
    assert_eq!(c.suggestions(3, &subject), vec!["drama"]);

    let rounds = c.converge(20).await.expect("cluster should converge");
    assert!(rounds > 0);

    for i in 0..c.len() {
        assert_eq!(
            c.suggestions(i, &subject),
            vec!["anime", "drama", "comedy"],
            "node {i} ranks by distinct authors"
        );
        assert_eq!(c.node(i).ledger().len().unwrap(), 6);
    }
}

/// Statements cross a 5-node line although the ends never talk directly.
#[tokio::test]
#[ntest::timeout(10000)]
async fn test_line_topology_relays_statements() {
    let c = TagCluster::line(5);
    let subject = infohash(7);

    c.node(0)
        .update_tags(&subject, Predicate::Tag, ["left"], &author_key(1))
        .await
        .unwrap();
    c.node(4)
        .update_tags(&subject, Predicate::Tag, ["right"], &author_key(2))
        .await
        .unwrap();

    c.converge(10).await.expect("line should converge");
    for i in 0..c.len() {
        assert_eq!(c.suggestions(i, &subject), vec!["left", "right"]);
    }
}

/// Publishing pushes new statements through the mesh without any round.
#[tokio::test]
#[ntest::timeout(10000)]
async fn test_publish_reaches_every_node() {
    let c = TagCluster::new(4);
    let subject = infohash(2);

    c.node(0)
        .update_tags(&subject, Predicate::Tag, ["fresh"], &author_key(1))
        .await
        .unwrap();
    c.settle().await;

    for i in 0..c.len() {
        assert_eq!(c.suggestions(i, &subject), vec!["fresh"], "node {i}");
    }
}

/// Extra rounds and replays after convergence change nothing.
#[tokio::test]
#[ntest::timeout(10000)]
async fn test_converged_cluster_is_stable() {
    let c = TagCluster::new(3);
    let subject = infohash(3);
    for i in 0..3 {
        c.node(i)
            .update_tags(&subject, Predicate::Tag, ["shared", "extra"], &author_key(i as u8 + 1))
            .await
            .unwrap();
    }
    c.converge(20).await.expect("cluster should converge");

    let before: Vec<(usize, u64)> = (0..3)
        .map(|i| {
            let ledger = c.node(i).ledger();
            (ledger.len().unwrap(), ledger.last_seq())
        })
        .collect();

    for _ in 0..3 {
        c.gossip_round().await;
    }
    let after: Vec<(usize, u64)> = (0..3)
        .map(|i| {
            let ledger = c.node(i).ledger();
            (ledger.len().unwrap(), ledger.last_seq())
        })
        .collect();
    assert_eq!(before, after);

    // Replaying node 0's whole ledger into node 1 only finds duplicates.
    for (_, s) in c.node(0).ledger().statements_since(0, usize::MAX).unwrap() {
        assert_eq!(
            c.node(1).ledger().insert(&s).unwrap(),
            InsertOutcome::DuplicateIgnored
        );
    }
}

/// The same statements delivered in three different orders yield the same
/// ledger and the same suggestions.
#[tokio::test]
async fn test_delivery_order_does_not_matter() {
    let c = TagCluster::new(3);
    let subject = infohash(1);

    let mut statements = vec![
        statement(1, 1, "anime", Operation::Add, 1),
        statement(1, 1, "anime", Operation::Remove, 2),
        statement(1, 1, "anime", Operation::Add, 3),
        statement(2, 1, "anime", Operation::Add, 1),
        statement(2, 1, "drama", Operation::Add, 1),
        statement(2, 1, "drama", Operation::Remove, 2),
        statement(3, 1, "comedy", Operation::Add, 1),
        statement(3, 1, "drama", Operation::Add, 5),
        statement(4, 1, "horror", Operation::Remove, 1),
    ];

    for s in &statements {
        c.node(0).ledger().insert(s).unwrap();
    }
    for s in statements.iter().rev() {
        c.node(1).ledger().insert(s).unwrap();
    }
    statements.shuffle(&mut StdRng::seed_from_u64(7));
    for s in &statements {
        c.node(2).ledger().insert(s).unwrap();
    }

    let expected = vec!["anime", "comedy", "drama"];
    for i in 0..3 {
        c.node(i).resolver().invalidate(&tagmesh_types::Subject::from([1; 20]));
        assert_eq!(c.suggestions(i, &subject), expected, "node {i}");
    }
    assert_eq!(c.fingerprint(0), c.fingerprint(1));
    assert_eq!(c.fingerprint(0), c.fingerprint(2));
}
