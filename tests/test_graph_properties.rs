mod common;

use cascade_gc::{DeleteOptions, ObjectGraph, ObjectIdentity, ObjectStore, OwnerReference};
use common::{id, object, Harness, MAX_STEPS};
use proptest::prelude::*;

/// Owners per node; node `i` only references nodes `< i`, so the graph is acyclic
type Dag = Vec<Vec<(usize, bool)>>;

fn dag_strategy() -> impl Strategy<Value = Dag> {
    proptest::collection::vec(
        proptest::collection::vec((any::<prop::sample::Index>(), any::<bool>()), 0..3),
        1..12,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, owners)| {
                if i == 0 {
                    return Vec::new();
                }
                owners.into_iter().map(|(index, blocking)| (index.index(i), blocking)).collect()
            })
            .collect()
    })
}

fn dag_with_order() -> impl Strategy<Value = (Dag, Vec<usize>)> {
    dag_strategy().prop_flat_map(|dag| {
        let order: Vec<usize> = (0..dag.len()).collect();
        (Just(dag), Just(order).prop_shuffle())
    })
}

fn name(i: usize) -> String {
    format!("n{}", i)
}

fn references(owners: &[(usize, bool)]) -> Vec<OwnerReference> {
    owners
        .iter()
        .map(|&(owner, blocking)| OwnerReference {
            owner: id(&name(owner)),
            blocking,
        })
        .collect()
}

fn assert_back_references_consistent(graph: &ObjectGraph) {
    for identity in graph.identities() {
        let node = graph.node(&identity).unwrap();
        for owner in node.owners.keys() {
            let owner_node = graph.node(owner).expect("owner tracked");
            assert!(owner_node.dependents.contains(&identity), "{} missing back-reference to {}", owner, identity);
        }
        for dependent in &node.dependents {
            let dependent_node = graph.node(dependent).expect("dependent tracked");
            assert!(dependent_node.owners.contains_key(&identity), "{} lists stale dependent {}", identity, dependent);
        }
    }
}

fn sorted_nodes(graph: &ObjectGraph) -> Vec<cascade_gc::GraphNode> {
    let mut ids: Vec<ObjectIdentity> = graph.identities();
    ids.sort_by(|a, b| a.name.cmp(&b.name));
    ids.iter().filter_map(|i| graph.node(i)).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn back_references_consistent_in_any_order((dag, order) in dag_with_order()) {
        let graph = ObjectGraph::new();
        for &i in &order {
            graph.upsert(&id(&name(i)), &references(&dag[i]), 1, None).unwrap();
        }

        assert_back_references_consistent(&graph);
        prop_assert_eq!(graph.len(), dag.len());
        prop_assert!(graph.identities().iter().all(|i| !graph.node(i).unwrap().is_virtual));

        // keep only the first owner of every node
        for &i in &order {
            let trimmed: Vec<_> = dag[i].iter().take(1).copied().collect();
            graph.upsert(&id(&name(i)), &references(&trimmed), 1, None).unwrap();
        }
        assert_back_references_consistent(&graph);
    }

    #[test]
    fn reingestion_leaves_graph_unchanged((dag, order) in dag_with_order()) {
        let graph = ObjectGraph::new();
        for &i in &order {
            graph.upsert(&id(&name(i)), &references(&dag[i]), 1, None).unwrap();
        }
        let before = sorted_nodes(&graph);

        for &i in &order {
            let outcome = graph.upsert(&id(&name(i)), &references(&dag[i]), 1, None).unwrap();
            prop_assert!(!outcome.topology_changed());
            prop_assert!(!outcome.created);
        }
        prop_assert_eq!(sorted_nodes(&graph), before);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn synchronous_deletion_of_roots_terminates(dag in dag_strategy()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let h = Harness::new();
            for (i, owners) in dag.iter().enumerate() {
                let mut snapshot = object(&name(i));
                snapshot.owner_references = references(owners);
                h.store.apply(snapshot);
            }
            h.settle().await;
            assert_eq!(h.store.len(), dag.len());

            for (i, owners) in dag.iter().enumerate() {
                if owners.is_empty() {
                    h.store.delete(&id(&name(i)), DeleteOptions::synchronous()).await.unwrap();
                }
            }
            let steps = h.settle().await;

            assert!(steps < MAX_STEPS, "did not settle");
            assert!(h.store.is_empty(), "left over: {:?}", h.store.len());
            assert!(h.graph.is_empty());
        });
    }
}
