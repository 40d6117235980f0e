//! Chaos test: random node kill/restart.
//!
//! 7-node cluster. Every round one random node goes down and another
//! comes back while the live ones keep editing. Once everyone is back,
//! no edit may be missing anywhere.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tagmesh_integration_tests::{TagCluster, author_key, infohash};
use tagmesh_types::Predicate;

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_random_kill_loses_no_statements() {
    let c = TagCluster::new(7);
    let mut rng = StdRng::seed_from_u64(42);
    let mut down: BTreeSet<usize> = BTreeSet::new();
    let mut expected_tags = BTreeSet::new();

    for round in 0..20u8 {
        // Kill one node, revive another.
        let victim = rng.random_range(0..c.len());
        if down.insert(victim) {
            c.kill_node(victim).await;
        }
        if down.len() > 2 {
            let back = *down.iter().next().unwrap();
            down.remove(&back);
            c.revive_node(back).await;
        }

        // A live node adds a fresh tag on top of what it sees.
        let editor = (0..c.len())
            .find(|i| !down.contains(i) && (*i + round as usize) % 2 == 0)
            .or_else(|| (0..c.len()).find(|i| !down.contains(i)))
            .unwrap();
        let subject = infohash(round % 3 + 1);
        let tag = format!("tag-{round:02}");
        let mut tags = c.suggestions(editor, &subject);
        tags.push(tag.clone());
        c.node(editor)
            .update_tags(&subject, Predicate::Tag, &tags, &author_key(editor as u8 + 1))
            .await
            .unwrap();
        expected_tags.insert((round % 3 + 1, tag));

        c.gossip_round().await;
    }

    for i in down {
        c.revive_node(i).await;
    }
    c.converge(30).await.expect("revived cluster should converge");

    for (subject, tag) in &expected_tags {
        for i in 0..c.len() {
            assert!(
                c.suggestions(i, &infohash(*subject)).contains(tag),
                "{tag} missing on node {i}"
            );
        }
    }
}
