//! Step dependency graph.
//!
//! Edges mean "must happen before". The graph rejects edges that would close
//! a cycle when they are added and leaves itself untouched, so a built graph
//! always has a total order. Among steps whose prerequisites are satisfied,
//! the one declared first runs first.

use crate::dag::Dag;
use crate::error::{Error, Result};
use crate::step::StepId;

/// DAG over step ids.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dag: Dag<StepId>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step. Declaration order is the order of `add_step` calls.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateStep`] if the id is already present.
    pub fn add_step(&mut self, id: StepId) -> Result<()> {
        if self.dag.get_index(&id).is_some() {
            return Err(Error::DuplicateStep { step: id });
        }
        self.dag.add_node(id);
        Ok(())
    }

    /// Adds the constraint `before` happens before `after`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDependency`] if either step is unknown, or
    /// [`Error::Cycle`] if the edge would close a cycle. The graph is not
    /// modified on error.
    pub fn add_edge(&mut self, before: &StepId, after: &StepId) -> Result<()> {
        let to = self.dag.get_index(after).ok_or_else(|| Error::MissingDependency {
            step: after.clone(),
            dependency: after.to_string(),
        })?;
        let from = self.dag.get_index(before).ok_or_else(|| Error::MissingDependency {
            step: after.clone(),
            dependency: before.to_string(),
        })?;
        self.dag.add_edge(from, to).map_err(|rejected| Error::Cycle {
            cycle: rejected.path.iter().map(ToString::to_string).collect(),
        })
    }

    /// Returns a deterministic total order consistent with every edge.
    #[must_use]
    pub fn order(&self) -> Vec<StepId> {
        self.dag.toposort()
    }

    /// Returns true if `later` transitively depends on `earlier`.
    #[must_use]
    pub fn depends_on(&self, later: &StepId, earlier: &StepId) -> bool {
        match (self.dag.get_index(earlier), self.dag.get_index(later)) {
            (Some(from), Some(to)) => from != to && self.dag.reaches(from, to),
            _ => false,
        }
    }

    /// Returns the direct prerequisites of a step, in declaration order.
    #[must_use]
    pub fn prerequisites(&self, id: &StepId) -> Vec<StepId> {
        self.dag
            .get_index(id)
            .map(|idx| self.dag.upstream(idx))
            .unwrap_or_default()
    }

    /// Returns true if the step is in the graph.
    #[must_use]
    pub fn contains(&self, id: &StepId) -> bool {
        self.dag.get_index(id).is_some()
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dag.node_count()
    }

    /// Returns true if the graph has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dag.node_count() == 0
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.dag.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(ids: &[&str]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for id in ids {
            graph.add_step(StepId::from(*id)).unwrap();
        }
        graph
    }

    #[test]
    fn order_respects_edges_and_declaration() -> Result<()> {
        let mut g = graph(&["enable", "grant", "unrelated"]);
        g.add_edge(&"grant".into(), &"enable".into())?;
        assert_eq!(
            g.order(),
            vec![StepId::from("grant"), "enable".into(), "unrelated".into()]
        );
        assert!(g.depends_on(&"enable".into(), &"grant".into()));
        assert_eq!(g.prerequisites(&"enable".into()), vec![StepId::from("grant")]);
        Ok(())
    }

    #[test]
    fn unknown_step_is_missing_dependency() {
        let mut g = graph(&["a"]);
        let err = g.add_edge(&"ghost".into(), &"a".into()).unwrap_err();
        match err {
            Error::MissingDependency { step, dependency } => {
                assert_eq!(step.as_str(), "a");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cycle_leaves_graph_intact() {
        let mut g = graph(&["a", "b"]);
        g.add_edge(&"a".into(), &"b".into()).unwrap();
        let err = g.add_edge(&"b".into(), &"a".into()).unwrap_err();
        assert!(matches!(err, Error::Cycle { ref cycle } if cycle == &["b", "a", "b"]));
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.order(), vec![StepId::from("a"), "b".into()]);
    }

    #[test]
    fn duplicate_step_rejected() {
        let mut g = graph(&["a"]);
        assert!(matches!(
            g.add_step("a".into()),
            Err(Error::DuplicateStep { .. })
        ));
    }
}
