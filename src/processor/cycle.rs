use crate::graph::ObjectGraph;
use crate::object::ObjectIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleVerdict {
    Acyclic,
    Cycle,
}

/// Local ownership-cycle heuristic
///
/// Reports a cycle when `identity` and every one of its owners are
/// collecting garbage at the same time. A legitimate two-step synchronous
/// deletion (owner first, then dependent) matches as well, and so does each
/// level of a synchronous cascade; both are accepted false positives.
pub fn check(graph: &ObjectGraph, identity: &ObjectIdentity) -> CycleVerdict {
    let Some(node) = graph.node(identity) else {
        return CycleVerdict::Acyclic;
    };
    if !node.gc_in_progress || node.owners.is_empty() {
        return CycleVerdict::Acyclic;
    }

    let all_collecting = node
        .owners
        .keys()
        .all(|owner| graph.node(owner).map_or(false, |o| o.gc_in_progress));

    if all_collecting {
        CycleVerdict::Cycle
    } else {
        CycleVerdict::Acyclic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::OwnerReference;

    fn id(name: &str) -> ObjectIdentity {
        ObjectIdentity::new("v1", "ConfigMap", name, format!("uid-{}", name))
    }

    #[test]
    fn test_two_node_cycle() {
        let graph = ObjectGraph::new();
        graph.upsert(&id("a"), &[OwnerReference::blocking(id("b"))], 1, None).unwrap();
        graph.upsert(&id("b"), &[OwnerReference::blocking(id("a"))], 1, None).unwrap();
        assert_eq!(check(&graph, &id("a")), CycleVerdict::Acyclic);

        graph.mark_gc_in_progress(&id("a"), true);
        assert_eq!(check(&graph, &id("a")), CycleVerdict::Acyclic);

        graph.mark_gc_in_progress(&id("b"), true);
        assert_eq!(check(&graph, &id("a")), CycleVerdict::Cycle);
        assert_eq!(check(&graph, &id("b")), CycleVerdict::Cycle);
    }

    #[test]
    fn test_one_solid_owner_is_acyclic() {
        let graph = ObjectGraph::new();
        graph.upsert(&id("o1"), &[], 1, None).unwrap();
        graph.upsert(&id("o2"), &[], 1, None).unwrap();
        graph
            .upsert(
                &id("d"),
                &[OwnerReference::blocking(id("o1")), OwnerReference::blocking(id("o2"))],
                1,
                None,
            )
            .unwrap();
        graph.mark_gc_in_progress(&id("d"), true);
        graph.mark_gc_in_progress(&id("o1"), true);

        assert_eq!(check(&graph, &id("d")), CycleVerdict::Acyclic);
    }

    #[test]
    fn test_ownerless_and_unknown_are_acyclic() {
        let graph = ObjectGraph::new();
        graph.upsert(&id("a"), &[], 1, None).unwrap();
        graph.mark_gc_in_progress(&id("a"), true);

        assert_eq!(check(&graph, &id("a")), CycleVerdict::Acyclic);
        assert_eq!(check(&graph, &id("missing")), CycleVerdict::Acyclic);
    }

    #[test]
    fn test_virtual_owner_never_collecting() {
        let graph = ObjectGraph::new();
        graph.upsert(&id("d"), &[OwnerReference::blocking(id("ghost"))], 1, None).unwrap();
        graph.mark_gc_in_progress(&id("d"), true);

        assert_eq!(check(&graph, &id("d")), CycleVerdict::Acyclic);
    }
}
