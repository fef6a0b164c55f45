//! Error taxonomy for the gateway: one `thiserror` enum per layer, composed
//! into a single [`GatewayError`] at the crate boundary.

use thiserror::Error;

/// Errors raised while parsing a subgraph SDL or composing the supergraph.
/// Both are boot-time failures: the process aborts rather than starting in a
/// partially-composed state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositionError {
    #[error("subgraph `{subgraph}` has an invalid schema: {message}")]
    InvalidSchema { subgraph: String, message: String },

    #[error(
        "root field `{field}` is owned by both `{first_owner}` and `{second_owner}`; \
         root operation fields must be uniquely owned"
    )]
    OwnershipConflict {
        field: String,
        first_owner: String,
        second_owner: String,
    },
}

/// Errors raised while turning a parsed client document into a [`crate::query_plan::Plan`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("the client query could not be parsed: {0}")]
    ParseError(String),

    #[error("no subgraph owns field `{parent_type}.{field}`")]
    NoOwner { parent_type: String, field: String },

    #[error("query plan construction produced a cycle at step {step_id}")]
    PlanCycle { step_id: usize },
}

/// Errors raised while executing a plan against live subgraphs.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("request to subgraph `{subgraph}` failed: {message}")]
    SubgraphTransport { subgraph: String, message: String },

    #[error("subgraph `{subgraph}` returned GraphQL errors")]
    SubgraphGraphQL {
        subgraph: String,
        messages: Vec<String>,
    },

    #[error("request to subgraph `{subgraph}` timed out")]
    Timeout { subgraph: String },

    #[error("request canceled")]
    Canceled,
}

/// Top-level error type returned by [`crate::Gateway`] operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("invalid gateway configuration: {0}")]
    Config(String),
}

/// The shape returned to clients for both planner-fatal and per-step errors,
/// per spec: `{ message, path, extensions: { service, code? } }`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ErrorExtensions>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorExtensions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl GraphQLError {
    pub fn whole_request(message: impl Into<String>) -> Self {
        GraphQLError {
            message: message.into(),
            path: Vec::new(),
            extensions: None,
        }
    }

    pub fn from_subgraph(message: impl Into<String>, path: Vec<String>, service: &str) -> Self {
        GraphQLError {
            message: message.into(),
            path,
            extensions: Some(ErrorExtensions {
                service: Some(service.to_string()),
                code: None,
            }),
        }
    }
}

impl From<&PlanError> for GraphQLError {
    fn from(value: &PlanError) -> Self {
        GraphQLError::whole_request(value.to_string())
    }
}
