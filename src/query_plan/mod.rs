//! Plan data model shared by the planner (C3), query builder (C4), and
//! executor (C5): a small DAG of [`Step`]s, each a single subgraph request.
//!
//! Grounded on `query_plan/mod.rs`'s `FetchNode`/`FetchDataPathElement` shape,
//! flattened two ways: no `PlanNode` enum of Sequence/Parallel/Flatten
//! wrappers — dependencies are expressed directly on each step via
//! `depends_on`, and the executor is free to run any step whose dependencies
//! are all done; and selection sets are this module's own small IR
//! ([`FieldSelection`]) rather than `apollo_compiler::executable` nodes,
//! since a step's outgoing selection is synthesized by the planner rather
//! than sliced out of the client document unchanged.

use indexmap::IndexMap;

pub type StepId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootOperationKind {
    Query,
    Mutation,
    Subscription,
}

/// One element of the path from the operation root down to the spot in the
/// response where a step's result is spliced back in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathElement {
    /// A field name (by response key, i.e. alias if present); descends into
    /// that field's value.
    Field(String),
    /// Iterates every element of a list at this point in the response.
    ListItem,
}

pub type InsertionPath = Vec<PathElement>;

/// A field to request from a subgraph, with its own nested selection.
/// Arguments are forwarded as GraphQL source text exactly as the client
/// wrote them; the planner never needs to interpret argument values.
#[derive(Debug, Clone)]
pub struct FieldSelection {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: Vec<(String, String)>,
    pub selections: Vec<FieldSelection>,
}

impl FieldSelection {
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone)]
pub enum StepKind {
    /// A root operation field dispatched directly against its owning subgraph.
    RootQuery,
    /// An `_entities(representations: ...)` lookup against `parent_type`.
    EntityResolution { parent_type: String },
}

/// A single subgraph request plus everything needed to build and splice it.
#[derive(Debug, Clone)]
pub struct Step {
    pub id: StepId,
    pub subgraph: String,
    pub kind: StepKind,
    pub operation_kind: RootOperationKind,
    /// Fields to request, already filtered to ones this subgraph owns.
    pub selections: Vec<FieldSelection>,
    /// For entity steps: the `@key` fields needed to build `representations`,
    /// resolved relative to `insertion_path`.
    pub key_fields: Vec<String>,
    /// For entity steps: the entity type's name (used as the `on` condition
    /// inside `_entities`).
    pub entity_type: Option<String>,
    pub insertion_path: InsertionPath,
    pub depends_on: Vec<StepId>,
}

impl Step {
    pub fn is_entity_resolution(&self) -> bool {
        matches!(self.kind, StepKind::EntityResolution { .. })
    }
}

/// The complete query plan: steps whose `depends_on` ids have already been
/// checked to form a DAG (see [`crate::planner::check_acyclic`]).
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.get(id)
    }

    /// Steps not yet completed whose dependencies are all satisfied.
    pub fn ready_steps(&self, completed: &IndexMap<StepId, ()>) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|step| !completed.contains_key(&step.id))
            .filter(|step| step.depends_on.iter().all(|dep| completed.contains_key(dep)))
            .map(|step| step.id)
            .collect()
    }

    pub fn is_complete(&self, completed: &IndexMap<StepId, ()>) -> bool {
        self.steps.len() == completed.len()
    }
}
