//! End-to-end scenarios: a composed gateway talking to mock subgraphs over
//! real HTTP (via `wiremock`, the same crate the `apollographql-router`
//! example repo tests its connectors with), plus a couple of plan-shape
//! checks that don't need a live subgraph to observe.

use std::path::Path;

use federation_gateway::config::{GatewayConfig, SubgraphConfig};
use federation_gateway::planner;
use federation_gateway::subgraph::SubgraphModel;
use federation_gateway::supergraph::Supergraph;
use federation_gateway::{Gateway, GraphQLRequest};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_sdl(dir: &Path, file_name: &str, sdl: &str) {
    std::fs::write(dir.join(file_name), sdl).unwrap();
}

async fn gateway_over(subgraphs: Vec<(&str, &MockServer, &str)>) -> Gateway {
    let dir = tempdir();
    let mut configs = Vec::new();
    for (name, server, sdl) in subgraphs {
        let file_name = format!("{name}.graphql");
        write_sdl(dir.path(), &file_name, sdl);
        configs.push(SubgraphConfig {
            name: name.to_string(),
            url: format!("{}/graphql", server.uri()),
            sdl_files: vec![file_name],
        });
    }
    let config = GatewayConfig {
        subgraphs: configs,
        listen_port: None,
        endpoint_path: "/graphql".to_string(),
        request_timeout_secs: 5,
        forward_headers: false,
        tracing_enabled: false,
        service_name: None,
    };
    Gateway::compose(dir.path(), &config).unwrap()
}

// A tiny temp-dir helper so each test gets its own scratch directory without
// pulling in a `tempfile` dependency the teacher's own crates don't carry.
struct TempDir(std::path::PathBuf);
impl TempDir {
    fn path(&self) -> &Path {
        &self.0
    }
}
impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}
fn tempdir() -> TempDir {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "federation-gateway-test-{}-{unique}",
        std::process::id()
    ));
    let _ = std::fs::create_dir_all(&dir);
    TempDir(dir)
}

const PRODUCTS_SDL: &str = r#"
    type Query {
      product(id: ID!): Product
    }
    type Product @key(fields: "id") {
      id: ID!
      name: String!
      weight: Float!
    }
"#;

const REVIEWS_SDL: &str = r#"
    type Product @key(fields: "id") {
      id: ID!
      reviews: [Review!]! @provides(fields: "body")
    }
    type Review {
      body: String! @external
    }
"#;

const REVIEW_CONTENT_SDL: &str = r#"
    type Query { _unused: Boolean }
    type Review {
      body: String!
    }
"#;

const SHIPPING_SDL: &str = r#"
    type Product @key(fields: "id") {
      id: ID!
      weight: Float! @external
      shippingEstimate: Float! @requires(fields: "weight")
    }
"#;

const MUTATIONS_SDL: &str = r#"
    type Query { _unused: Boolean }
    type Mutation {
      createProduct(name: String!): Product!
    }
    type Product @key(fields: "id") {
      id: ID!
      name: String!
    }
"#;

// Scenario: simple single-subgraph query needs exactly one subgraph round trip.
#[tokio::test]
async fn simple_single_subgraph_query() {
    let products = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "product": { "name": "Keyboard" } }
        })))
        .mount(&products)
        .await;

    let gateway = gateway_over(vec![("products", &products, PRODUCTS_SDL)]).await;
    let response = gateway
        .handle_request(GraphQLRequest {
            query: "{ product(id: \"1\") { name } }".to_string(),
            variables: json!({}),
        }, &[])
        .await;

    assert!(response.errors.is_empty());
    assert_eq!(response.data["product"]["name"], "Keyboard");
}

// Scenario: a field owned by another subgraph triggers an `_entities` join.
#[tokio::test]
async fn entity_join_across_subgraphs() {
    let products = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "product": { "id": "1", "name": "Keyboard", "__typename": "Product" } }
        })))
        .mount(&products)
        .await;

    let reviews = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "_entities": [{ "reviews": [{ "body": "Great!" }] }] }
        })))
        .mount(&reviews)
        .await;

    let gateway = gateway_over(vec![
        ("products", &products, PRODUCTS_SDL),
        ("reviews", &reviews, REVIEWS_SDL),
    ])
    .await;
    let response = gateway
        .handle_request(GraphQLRequest {
            query: "{ product(id: \"1\") { name reviews { body } } }".to_string(),
            variables: json!({}),
        }, &[])
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(response.data["product"]["name"], "Keyboard");
    assert_eq!(response.data["product"]["reviews"][0]["body"], "Great!");
}

// Scenario: a partial subgraph failure leaves the rest of the response intact.
#[tokio::test]
async fn partial_failure_from_one_subgraph() {
    let products = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "product": { "id": "1", "name": "Keyboard" } }
        })))
        .mount(&products)
        .await;

    let reviews = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&reviews)
        .await;

    let gateway = gateway_over(vec![
        ("products", &products, PRODUCTS_SDL),
        ("reviews", &reviews, REVIEWS_SDL),
    ])
    .await;
    let response = gateway
        .handle_request(GraphQLRequest {
            query: "{ product(id: \"1\") { name reviews { body } } }".to_string(),
            variables: json!({}),
        }, &[])
        .await;

    assert_eq!(response.data["product"]["name"], "Keyboard");
    assert!(response.data["product"].get("reviews").is_none());
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].extensions.as_ref().unwrap().service.as_deref(), Some("reviews"));
}

// Scenario: a mutation root field routes to the subgraph that owns it.
#[tokio::test]
async fn mutation_propagates_to_owning_subgraph() {
    let subgraph = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "createProduct": { "id": "2", "name": "Mouse" } }
        })))
        .mount(&subgraph)
        .await;

    let gateway = gateway_over(vec![("catalog", &subgraph, MUTATIONS_SDL)]).await;
    let response = gateway
        .handle_request(GraphQLRequest {
            query: "mutation { createProduct(name: \"Mouse\") { name } }".to_string(),
            variables: json!({}),
        }, &[])
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(response.data["createProduct"]["name"], "Mouse");
}

// Scenario: `@requires` pulls the needed field into the same step that
// produces the entity, rather than erroring as an unowned field.
#[test]
fn requires_injects_the_needed_field_into_the_entity_step() {
    let products = SubgraphModel::parse("products", "http://products", PRODUCTS_SDL).unwrap();
    let shipping = SubgraphModel::parse("shipping", "http://shipping", SHIPPING_SDL).unwrap();
    let supergraph = Supergraph::compose(vec![products, shipping]).unwrap();

    let plan = planner::plan(
        &supergraph,
        "{ product(id: \"1\") { name shippingEstimate } }",
        &json!({}),
    )
    .unwrap();

    let root = plan.steps.iter().find(|s| s.subgraph == "products").unwrap();
    assert!(root.selections.iter().any(|f| f.name == "weight"));

    let entity_step = plan.steps.iter().find(|s| s.subgraph == "shipping").unwrap();
    assert!(entity_step.key_fields.iter().any(|f| f == "id"));
}

// Scenario: `@provides` lets the declaring subgraph serve a nested field
// directly, with no extra entity-resolution step back to the field's owner.
#[test]
fn provides_shortcut_avoids_an_extra_step() {
    let products = SubgraphModel::parse("products", "http://products", PRODUCTS_SDL).unwrap();
    let reviews = SubgraphModel::parse("reviews", "http://reviews", REVIEWS_SDL).unwrap();
    let review_content =
        SubgraphModel::parse("review-content", "http://review-content", REVIEW_CONTENT_SDL).unwrap();
    let supergraph = Supergraph::compose(vec![products, reviews, review_content]).unwrap();

    // `review-content` owns `Review.body`, but `reviews` already provides it
    // inline via `@provides(fields: "body")`, so no hop back is needed.
    assert_eq!(supergraph.owner_of("Review", "body"), Some("review-content"));
    assert!(supergraph.shortcut_reaches("reviews", "Review", "body"));

    let plan = planner::plan(
        &supergraph,
        "{ product(id: \"1\") { name reviews { body } } }",
        &json!({}),
    )
    .unwrap();
    assert_eq!(plan.steps.len(), 2, "no extra hop to review-content");
}
