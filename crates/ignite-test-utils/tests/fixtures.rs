//! Sanity checks for the shared fixtures.

use ignite_test_utils::PlanFactory;

#[test]
fn fixture_plans_compile() {
    for plan in [
        PlanFactory::treasury(),
        PlanFactory::linear(5),
        PlanFactory::rebase_rate(100),
    ] {
        let compiled = plan.compile().expect("fixture plan compiles");
        assert_eq!(compiled.steps.len(), plan.steps.len());
    }
}

#[test]
fn linear_plan_is_chained() {
    let compiled = PlanFactory::linear(4).compile().unwrap();
    let order: Vec<&str> = compiled.order().iter().map(|s| s.as_str()).collect();
    assert_eq!(order, vec!["s1", "s2", "s3", "s4"]);
    assert_eq!(compiled.graph().edge_count(), 3);
}

#[test]
fn out_of_range_rate_still_compiles() {
    // Parameter values are checked when the consuming step runs.
    assert!(PlanFactory::rebase_rate(15_000).compile().is_ok());
}
