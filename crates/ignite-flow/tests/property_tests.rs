//! Property-based tests for ignite-flow invariants.
//!
//! These tests use proptest to verify ordering and fingerprint invariants
//! across randomly generated graphs and plans.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashSet;

use proptest::prelude::*;

use ignite_core::RoleName;
use ignite_flow::error::ErrorKind;
use ignite_flow::graph::DependencyGraph;
use ignite_flow::plan::BootstrapPlan;
use ignite_flow::step::{Arg, Step, StepId};
use ignite_test_utils::{OPERATOR, PlanFactory, staking_module, treasury_module};

/// Generates a node count and forward edges `(i, j)` with `i < j`, which
/// can never form a cycle.
fn arb_dag() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..16).prop_flat_map(|n| {
        let edges = prop::collection::vec((0..n, 0..n), 0..n * 2).prop_map(|pairs| {
            pairs
                .into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| (a.min(b), a.max(b)))
                .collect::<Vec<_>>()
        });
        (Just(n), edges)
    })
}

fn id(i: usize) -> StepId {
    StepId::new(format!("n{i:02}"))
}

fn build(n: usize, edges: &[(usize, usize)]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for i in 0..n {
        graph.add_step(id(i)).unwrap();
    }
    for (a, b) in edges {
        graph.add_edge(&id(*a), &id(*b)).unwrap();
    }
    graph
}

proptest! {
    /// INVARIANT: The order is a permutation of the steps honoring every edge.
    #[test]
    fn order_is_consistent_with_edges((n, edges) in arb_dag()) {
        let graph = build(n, &edges);
        let order = graph.order();

        prop_assert_eq!(order.len(), n);
        let unique: HashSet<&StepId> = order.iter().collect();
        prop_assert_eq!(unique.len(), n);

        let position = |step: &StepId| order.iter().position(|s| s == step).unwrap();
        for (a, b) in &edges {
            prop_assert!(position(&id(*a)) < position(&id(*b)));
        }
    }

    /// INVARIANT: Ordering is deterministic for the same graph.
    #[test]
    fn order_is_deterministic((n, edges) in arb_dag()) {
        prop_assert_eq!(build(n, &edges).order(), build(n, &edges).order());
    }

    /// INVARIANT: An edge closing a cycle is rejected and changes nothing.
    #[test]
    fn cycle_closing_edge_is_rejected((n, edges) in arb_dag()) {
        prop_assume!(!edges.is_empty());
        let mut graph = build(n, &edges);
        let (a, b) = edges[0];
        let before_order = graph.order();
        let before_edges = graph.edge_count();

        let err = graph.add_edge(&id(b), &id(a)).unwrap_err();

        prop_assert_eq!(err.kind(), ErrorKind::Cycle);
        prop_assert_eq!(graph.len(), n);
        prop_assert_eq!(graph.edge_count(), before_edges);
        prop_assert_eq!(graph.order(), before_order);
    }

    /// INVARIANT: A linear plan compiles to its chain order.
    #[test]
    fn linear_plan_runs_in_chain_order(n in 1usize..30) {
        let compiled = PlanFactory::linear(n).compile().unwrap();
        let order: Vec<String> = compiled.order().iter().map(ToString::to_string).collect();
        let expected: Vec<String> = (1..=n).map(|i| format!("s{i}")).collect();
        prop_assert_eq!(order, expected);
    }

    /// INVARIANT: The fingerprint ignores module declaration order and the
    /// plan name.
    #[test]
    fn fingerprint_ignores_module_order_and_name(
        name_a in "[a-z]{4,10}",
        name_b in "[a-z]{4,10}",
        class in 1i64..64,
    ) {
        let step = Step::new("enable", "Treasury", "enableAssetClass")
            .arg(Arg::integer(class))
            .arg(Arg::identity("0xX"))
            .role(RoleName::owner());

        let forward = BootstrapPlan::builder(name_a, OPERATOR)
            .module(treasury_module())
            .module(staking_module())
            .role("Treasury", RoleName::owner(), OPERATOR)
            .step(step.clone())
            .build();
        let reversed = BootstrapPlan::builder(name_b, OPERATOR)
            .module(staking_module())
            .module(treasury_module())
            .role("Treasury", RoleName::owner(), OPERATOR)
            .step(step)
            .build();

        prop_assert_eq!(forward.fingerprint().unwrap(), reversed.fingerprint().unwrap());
    }
}
