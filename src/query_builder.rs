//! C4 — Query Builder.
//!
//! Renders a [`Step`] into the GraphQL document text sent to its subgraph.
//! Root steps render as a plain operation; entity steps wrap their
//! selection in `_entities(representations: $representations) { ... on T }`.
//!
//! Grounded on `query_plan/mod.rs`'s `FetchNode` rendering conventions and
//! `benjamn-apollo-router__...fetch.rs`'s `_entities(representations: ...)`
//! wire shape.

use std::fmt::Write as _;

use crate::query_plan::{FieldSelection, RootOperationKind, Step, StepKind};

pub fn build_document(step: &Step) -> String {
    match &step.kind {
        StepKind::RootQuery => build_root_document(step),
        StepKind::EntityResolution { parent_type } => build_entity_document(step, parent_type),
    }
}

fn build_root_document(step: &Step) -> String {
    let op = match step.operation_kind {
        RootOperationKind::Query => "query",
        RootOperationKind::Mutation => "mutation",
        RootOperationKind::Subscription => "subscription",
    };
    let mut out = format!("{op} {{\n");
    render_selections(&step.selections, 1, &mut out);
    out.push_str("}\n");
    out
}

fn build_entity_document(step: &Step, parent_type: &str) -> String {
    let mut out = String::from("query($representations: [_Any!]!) {\n");
    out.push_str("  _entities(representations: $representations) {\n");
    let _ = writeln!(out, "    ... on {parent_type} {{");
    render_selections(&step.selections, 3, &mut out);
    out.push_str("    }\n");
    out.push_str("  }\n");
    out.push_str("}\n");
    out
}

fn render_selections(selections: &[FieldSelection], indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    for selection in selections {
        out.push_str(&pad);
        if let Some(alias) = &selection.alias {
            let _ = write!(out, "{alias}: ");
        }
        out.push_str(&selection.name);
        if !selection.arguments.is_empty() {
            out.push('(');
            for (i, (name, value)) in selection.arguments.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{name}: {value}");
            }
            out.push(')');
        }
        if selection.selections.is_empty() {
            out.push('\n');
        } else {
            out.push_str(" {\n");
            render_selections(&selection.selections, indent + 1, out);
            out.push_str(&pad);
            out.push_str("}\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_plan::StepKind;

    #[test]
    fn renders_root_query_with_arguments() {
        let step = Step {
            id: 0,
            subgraph: "products".to_string(),
            kind: StepKind::RootQuery,
            operation_kind: RootOperationKind::Query,
            selections: vec![FieldSelection {
                name: "product".to_string(),
                alias: None,
                arguments: vec![("id".to_string(), "\"1\"".to_string())],
                selections: vec![FieldSelection {
                    name: "name".to_string(),
                    alias: None,
                    arguments: Vec::new(),
                    selections: Vec::new(),
                }],
            }],
            key_fields: Vec::new(),
            entity_type: None,
            insertion_path: Vec::new(),
            depends_on: Vec::new(),
        };
        let doc = build_document(&step);
        assert!(doc.contains("product(id: \"1\") {"));
        assert!(doc.contains("name"));
    }

    #[test]
    fn renders_entity_resolution_with_on_clause() {
        let step = Step {
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
            insertion_path: Vec::new(),
            depends_on: vec![0],
        };
        let doc = build_document(&step);
        assert!(doc.contains("_entities(representations: $representations)"));
        assert!(doc.contains("... on Product {"));
    }
}
