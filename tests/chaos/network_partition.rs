//! Chaos test: network partition.
//!
//! 6-node cluster split 3 vs 3. Both sides keep editing. After healing,
//! every node holds every statement and ranks tags identically.

use tagmesh_integration_tests::{TagCluster, author_key, infohash};
use tagmesh_types::Predicate;

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_network_partition_and_heal() {
    let c = TagCluster::new(6);
    let subject = infohash(9);
    let left = [0, 1, 2];
    let right = [3, 4, 5];

    // --- Phase 1: healthy cluster ---
    c.node(0)
        .update_tags(&subject, Predicate::Tag, ["before"], &author_key(1))
        .await
        .unwrap();
    c.converge(20).await.expect("healthy cluster should converge");

    // --- Phase 2: partition, edits on both sides ---
    c.partition(&left).await;
    for &i in &left {
        c.node(i)
            .update_tags(&subject, Predicate::Tag, ["before", "left"], &author_key(10 + i as u8))
            .await
            .unwrap();
    }
    for &i in &right {
        c.node(i)
            .update_tags(&subject, Predicate::Tag, ["right"], &author_key(10 + i as u8))
            .await
            .unwrap();
    }

    c.converge_group(&left, 20).await.expect("left side converges");
    c.converge_group(&right, 20).await.expect("right side converges");
    assert!(c.suggestions(0, &subject).contains(&"left".to_string()));
    assert!(!c.suggestions(0, &subject).contains(&"right".to_string()));
    assert!(!c.suggestions(5, &subject).contains(&"left".to_string()));
    assert_ne!(c.fingerprint(0), c.fingerprint(5));

    // --- Phase 3: heal ---
    c.heal().await;
    c.converge(30).await.expect("healed cluster should converge");

    let expected = c.suggestions(0, &subject);
    assert!(expected.contains(&"left".to_string()));
    assert!(expected.contains(&"right".to_string()));
    for i in 1..c.len() {
        assert_eq!(c.suggestions(i, &subject), expected, "node {i}");
    }
}
