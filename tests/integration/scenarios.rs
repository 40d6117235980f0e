//! Integration test: end-to-end tagging scenarios.
//!
//! Edits through `TagNode::update_tags` on one node, observed through
//! `get_suggestions` on the others after gossip.

use tagmesh_engine::EngineError;
use tagmesh_gossip::GossipConfig;
use tagmesh_integration_tests::{TagCluster, author_key, infohash, statement};
use tagmesh_net::{MessageBody, TagMessage};
use tagmesh_types::{MAX_TAG_LENGTH, Operation, Predicate};

/// Two authors independently add "anime"; a third node lists it once.
#[tokio::test]
#[ntest::timeout(10000)]
async fn test_two_authors_same_tag_listed_once() {
    let c = TagCluster::with_config(
        3,
        GossipConfig {
            forward_fanout: 0,
            ..GossipConfig::default()
        },
    );
    let subject = infohash(1);

    c.node(0)
        .update_tags(&subject, Predicate::Tag, ["anime"], &author_key(1))
        .await
        .unwrap();
    c.node(1)
        .update_tags(&subject, Predicate::Tag, ["anime"], &author_key(2))
        .await
        .unwrap();

    c.converge(20).await.expect("cluster should converge");
    assert_eq!(c.suggestions(2, &subject), vec!["anime"]);
    assert_eq!(c.node(2).ledger().len().unwrap(), 2, "one ADD per author");
}

/// An author adds then removes a tag. A node that receives the REMOVE
/// before the ADD still ends up without the tag.
#[tokio::test]
#[ntest::timeout(10000)]
async fn test_remove_received_before_add() {
    let c = TagCluster::with_config(
        2,
        GossipConfig {
            forward_fanout: 0,
            ..GossipConfig::default()
        },
    );
    let subject = infohash(1);
    let key = author_key(1);

    c.node(0)
        .update_tags(&subject, Predicate::Tag, ["anime"], &key)
        .await
        .unwrap();
    c.node(0)
        .update_tags(&subject, Predicate::Tag, Vec::<String>::new(), &key)
        .await
        .unwrap();

    let mut history = c.node(0).history(&subject, Predicate::Tag).unwrap();
    assert_eq!(history.len(), 2);
    history.sort_by_key(|s| std::cmp::Reverse(s.clock));
    assert_eq!(history[0].operation, Operation::Remove);

    let deliver = TagMessage::new(MessageBody::Deliver {
        statements: history.iter().map(|s| s.encode()).collect(),
    });
    let reply = c
        .sync(1)
        .handle_message(c.peer_id(0), deliver)
        .await
        .expect("deliver is acknowledged");
    assert!(matches!(
        reply.body,
        MessageBody::Ack { accepted: 2, duplicates: 0, rejected: 0 }
    ));

    assert!(c.suggestions(1, &subject).is_empty());
    assert!(c.suggestions(0, &subject).is_empty());
}

/// An overlong tag is refused locally and nothing reaches the network.
#[tokio::test]
#[ntest::timeout(10000)]
async fn test_overlong_tag_never_leaves_the_node() {
    let c = TagCluster::new(3);
    let subject = infohash(1);

    let too_long = "a".repeat(MAX_TAG_LENGTH + 1);
    let err = c
        .node(0)
        .update_tags(&subject, Predicate::Tag, [too_long], &author_key(1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Malformed(_)));

    for _ in 0..3 {
        c.gossip_round().await;
    }
    for i in 0..c.len() {
        assert!(c.node(i).ledger().is_empty().unwrap(), "node {i}");
    }
}

/// A statement whose object was altered after signing is rejected by the
/// receiver and not forwarded.
#[tokio::test]
#[ntest::timeout(10000)]
async fn test_tampered_statement_rejected_by_peers() {
    let c = TagCluster::new(3);
    let mut forged = statement(1, 1, "anime", Operation::Add, 1);
    forged.object = "spam".to_string();

    let deliver = TagMessage::new(MessageBody::Deliver {
        statements: vec![forged.encode()],
    });
    let reply = c
        .sync(1)
        .handle_message(c.peer_id(0), deliver)
        .await
        .expect("deliver is acknowledged");
    assert!(matches!(
        reply.body,
        MessageBody::Ack { accepted: 0, duplicates: 0, rejected: 1 }
    ));

    c.gossip_round().await;
    for i in 0..c.len() {
        assert!(c.node(i).ledger().is_empty().unwrap(), "node {i}");
    }
}

/// Removing a tag that only another author added records a REMOVE on the
/// remover's own edge; the other author's ADD keeps the tag visible.
#[tokio::test]
#[ntest::timeout(10000)]
async fn test_removing_foreign_tag_is_local_to_the_remover() {
    let c = TagCluster::new(2);
    let subject = infohash(4);

    c.node(0)
        .update_tags(&subject, Predicate::Tag, ["anime"], &author_key(1))
        .await
        .unwrap();
    assert_eq!(c.suggestions(1, &subject), vec!["anime"]);

    let report = c
        .node(1)
        .update_tags(&subject, Predicate::Tag, Vec::<String>::new(), &author_key(2))
        .await
        .unwrap();
    assert_eq!(report.removed, vec!["anime"]);

    c.converge(20).await.expect("cluster should converge");
    for i in 0..c.len() {
        assert_eq!(c.suggestions(i, &subject), vec!["anime"]);
        assert_eq!(c.node(i).ledger().len().unwrap(), 2);
    }
}
