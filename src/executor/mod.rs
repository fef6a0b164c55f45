//! C5 — Executor.
//!
//! Runs a [`Plan`] against live subgraphs: spawns a task per step as soon as
//! its dependencies are done, builds `_entities` representations by walking
//! the response tree at the step's insertion path, and merges each step's
//! result back in. Failures are recorded per spec §7 rather than aborting
//! the whole request — a step's subtree is left absent and its error is
//! reported alongside whatever data other steps produced. A single
//! per-request deadline is shared by every step: once it elapses, no new
//! step is dispatched and every step still in flight is woken immediately
//! and canceled rather than left to hit its own timeout independently.
//!
//! Grounded on `other_examples/.../benjamn-apollo-router__...fetch.rs`:
//! `Variables::new()`'s representation-building walk, `response_at_path()`'s
//! `_entities` extraction and path-indexed merge-back, and the
//! `tracing::trace_span!`-wrapped dispatch. The ready-step scheduling loop
//! follows `workflow-engine-rs__...federation-query_planner.rs`'s
//! `execute_plan` shape. The shared deadline/cancellation signal is built on
//! `tokio::sync::watch`, the same crate the rest of this module's scheduling
//! already depends on.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;

use crate::error::{ErrorExtensions, ExecutionError, GraphQLError};
use crate::query_builder::build_document;
use crate::query_plan::{PathElement, Plan, Step, StepId, StepKind};
use crate::supergraph::Supergraph;

pub struct Executor {
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, serde::Deserialize)]
struct SubgraphResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<SubgraphGraphQLError>,
}

#[derive(Debug, serde::Deserialize)]
struct SubgraphGraphQLError {
    message: String,
}

pub struct ExecutionOutcome {
    pub data: Value,
    pub errors: Vec<GraphQLError>,
}

impl Executor {
    pub fn new(timeout: Duration) -> Self {
        Executor {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// `forwarded_headers` are attached, verbatim, to every outgoing
    /// subgraph request; the caller decides whether forwarding applies.
    pub async fn execute(
        &self,
        supergraph: &Supergraph,
        plan: &Plan,
        forwarded_headers: &[(String, String)],
    ) -> ExecutionOutcome {
        let data = Arc::new(Mutex::new(Value::Object(Default::default())));
        let errors = Arc::new(Mutex::new(Vec::<GraphQLError>::new()));
        let mut completed: IndexMap<StepId, ()> = IndexMap::new();
        let mut spawned: IndexMap<StepId, ()> = IndexMap::new();

        if plan.steps.is_empty() {
            return ExecutionOutcome {
                data: Value::Object(Default::default()),
                errors: Vec::new(),
            };
        }

        let deadline = Instant::now() + self.timeout;
        let (canceled_tx, canceled_rx) = watch::channel(false);
        let watchdog = tokio::spawn({
            let canceled_tx = canceled_tx.clone();
            async move {
                tokio::time::sleep_until(deadline).await;
                let _ = canceled_tx.send(true);
            }
        });

        let (tx, mut rx) = mpsc::channel::<StepId>(plan.steps.len());

        loop {
            if !*canceled_rx.borrow() {
                for step_id in plan.ready_steps(&completed) {
                    if spawned.contains_key(&step_id) {
                        continue;
                    }
                    spawned.insert(step_id, ());
                    let step = plan.step(step_id).expect("ready step exists").clone();
                    let url = supergraph.subgraphs[&step.subgraph].url.clone();
                    let client = self.client.clone();
                    let headers = forwarded_headers.to_vec();
                    let data = Arc::clone(&data);
                    let errors = Arc::clone(&errors);
                    let tx = tx.clone();
                    let canceled_rx = canceled_rx.clone();
                    tokio::spawn(async move {
                        run_step(&client, &url, &headers, deadline, canceled_rx, &step, &data, &errors).await;
                        let _ = tx.send(step_id).await;
                    });
                }
            }

            let all_spawned_finished = *canceled_rx.borrow() && spawned.len() == completed.len();
            if plan.is_complete(&completed) || all_spawned_finished {
                break;
            }

            match rx.recv().await {
                Some(step_id) => {
                    completed.insert(step_id, ());
                }
                None => break,
            }
        }

        watchdog.abort();

        if *canceled_rx.borrow() && !plan.is_complete(&completed) {
            errors
                .lock()
                .await
                .push(GraphQLError::whole_request(ExecutionError::Canceled.to_string()));
        }

        let data = data.lock().await.clone();
        let errors = errors.lock().await.clone();
        ExecutionOutcome { data, errors }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_step(
    client: &reqwest::Client,
    url: &str,
    headers: &[(String, String)],
    deadline: Instant,
    mut canceled_rx: watch::Receiver<bool>,
    step: &Step,
    data: &Arc<Mutex<Value>>,
    errors: &Arc<Mutex<Vec<GraphQLError>>>,
) {
    if *canceled_rx.borrow() {
        return;
    }

    let document = build_document(step);
    let variables = match &step.kind {
        StepKind::EntityResolution { .. } => {
            let guard = data.lock().await;
            let representations = build_representations(&guard, step);
            drop(guard);
            if representations.is_empty() {
                return;
            }
            Some(json!({ "representations": representations }))
        }
        StepKind::RootQuery => None,
    };

    let body = json!({
        "query": document,
        "variables": variables.unwrap_or(Value::Null),
    });

    let mut builder = client.post(url).json(&body);
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let request = builder.send();

    let response = tokio::select! {
        biased;
        _ = canceled_rx.changed() => {
            record_error(errors, step, ExecutionError::Canceled).await;
            return;
        }
        _ = tokio::time::sleep_until(deadline) => {
            record_error(errors, step, ExecutionError::Timeout { subgraph: step.subgraph.clone() }).await;
            return;
        }
        result = request => match result {
            Ok(response) => response,
            Err(e) => {
                record_error(errors, step, ExecutionError::SubgraphTransport {
                    subgraph: step.subgraph.clone(),
                    message: e.to_string(),
                })
                .await;
                return;
            }
        },
    };

    let parsed: SubgraphResponse = match response.json().await {
        Ok(parsed) => parsed,
        Err(e) => {
            record_error(errors, step, ExecutionError::SubgraphTransport {
                subgraph: step.subgraph.clone(),
                message: e.to_string(),
            })
            .await;
            return;
        }
    };

    if !parsed.errors.is_empty() {
        let messages = parsed.errors.iter().map(|e| e.message.clone()).collect();
        record_error(errors, step, ExecutionError::SubgraphGraphQL {
            subgraph: step.subgraph.clone(),
            messages,
        })
        .await;
    }

    if let Some(response_data) = parsed.data {
        let mut guard = data.lock().await;
        merge_response(&mut guard, step, response_data);
    }
}

async fn record_error(errors: &Arc<Mutex<Vec<GraphQLError>>>, step: &Step, error: ExecutionError) {
    let path = step
        .insertion_path
        .iter()
        .filter_map(|element| match element {
            PathElement::Field(name) => Some(name.clone()),
            PathElement::ListItem => None,
        })
        .collect();
    let graphql_error = GraphQLError {
        message: error.to_string(),
        path,
        extensions: Some(ErrorExtensions {
            service: Some(step.subgraph.clone()),
            code: Some(error_code(&error).to_string()),
        }),
    };
    errors.lock().await.push(graphql_error);
}

fn error_code(error: &ExecutionError) -> &'static str {
    match error {
        ExecutionError::SubgraphTransport { .. } => "SUBGRAPH_TRANSPORT_ERROR",
        ExecutionError::SubgraphGraphQL { .. } => "SUBGRAPH_GRAPHQL_ERROR",
        ExecutionError::Timeout { .. } => "SUBGRAPH_TIMEOUT",
        ExecutionError::Canceled => "REQUEST_CANCELED",
    }
}

/// Walks `data` at `step.insertion_path`, producing one `_Any` representation
/// per matching object using the step's `key_fields`. `__typename` is read
/// out of the prior step's actual response at this context rather than
/// synthesized from `step.entity_type`, falling back to it only when the
/// parent step's selection didn't carry one through (e.g. a hand-built plan
/// in tests) — in the normal path the planner always injects `__typename`
/// into the step that produces this context.
fn build_representations(data: &Value, step: &Step) -> Vec<Value> {
    let Some(entity_type) = &step.entity_type else {
        return Vec::new();
    };
    contexts(data, &step.insertion_path)
        .into_iter()
        .filter_map(|context| {
            let typename = context
                .get("__typename")
                .and_then(Value::as_str)
                .unwrap_or(entity_type);
            let mut representation = serde_json::Map::new();
            representation.insert("__typename".to_string(), json!(typename));
            for key_field in &step.key_fields {
                representation.insert(key_field.clone(), context.get(key_field)?.clone());
            }
            Some(Value::Object(representation))
        })
        .collect()
}

fn contexts<'a>(value: &'a Value, path: &[PathElement]) -> Vec<&'a Value> {
    match path.split_first() {
        None => vec![value],
        Some((PathElement::Field(name), rest)) => match value.get(name) {
            Some(v) => contexts(v, rest),
            None => Vec::new(),
        },
        Some((PathElement::ListItem, rest)) => match value.as_array() {
            Some(items) => items.iter().flat_map(|v| contexts(v, rest)).collect(),
            None => Vec::new(),
        },
    }
}

fn contexts_mut<'a>(value: &'a mut Value, path: &[PathElement]) -> Vec<&'a mut Value> {
    match path.split_first() {
        None => vec![value],
        Some((PathElement::Field(name), rest)) => {
            if !value.is_object() {
                *value = Value::Object(Default::default());
            }
            let entry = value
                .as_object_mut()
                .expect("just ensured object")
                .entry(name.clone())
                .or_insert_with(|| Value::Object(Default::default()));
            contexts_mut(entry, rest)
        }
        Some((PathElement::ListItem, rest)) => match value.as_array_mut() {
            Some(items) => items.iter_mut().flat_map(|v| contexts_mut(v, rest)).collect(),
            None => Vec::new(),
        },
    }
}

fn merge_response(data: &mut Value, step: &Step, response_data: Value) {
    match &step.kind {
        StepKind::RootQuery => {
            if let Value::Object(incoming) = response_data {
                let root = contexts_mut(data, &[]).into_iter().next().expect("root exists");
                merge_object(root, incoming);
            }
        }
        StepKind::EntityResolution { .. } => {
            let Some(entities) = response_data.get("_entities").and_then(Value::as_array) else {
                return;
            };
            let contexts = contexts_mut(data, &step.insertion_path);
            for (context, entity) in contexts.into_iter().zip(entities.iter()) {
                if let Value::Object(incoming) = entity {
                    merge_object(context, incoming.clone());
                }
            }
        }
    }
}

fn merge_object(target: &mut Value, incoming: serde_json::Map<String, Value>) {
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    let target = target.as_object_mut().expect("just ensured object");
    for (key, value) in incoming {
        target.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_plan::{FieldSelection, RootOperationKind};

    fn entity_step() -> Step {
        Step {
            id: 1,
            subgraph: "reviews".to_string(),
            kind: StepKind::EntityResolution {
                parent_type: "Product".to_string(),
            },
            operation_kind: RootOperationKind::Query,
            selections: vec![FieldSelection {
                name: "reviews".to_string(),
                alias: None,
                arguments: Vec::new(),
                selections: Vec::new(),
            }],
            key_fields: vec!["id".to_string()],
            entity_type: Some("Product".to_string()),
            insertion_path: vec![PathElement::Field("product".to_string())],
            depends_on: vec![0],
        }
    }

    #[test]
    fn representation_typename_comes_from_the_prior_response() {
        let data = json!({ "product": { "id": "1", "__typename": "SpecialProduct" } });
        let reps = build_representations(&data, &entity_step());
        assert_eq!(reps, vec![json!({ "__typename": "SpecialProduct", "id": "1" })]);
    }

    #[test]
    fn representation_falls_back_to_entity_type_when_typename_is_absent() {
        let data = json!({ "product": { "id": "1" } });
        let reps = build_representations(&data, &entity_step());
        assert_eq!(reps, vec![json!({ "__typename": "Product", "id": "1" })]);
    }
}
