//! C2 — Supergraph Composer.
//!
//! Merges the subgraph models into the global indexes the planner consumes:
//! field ownership (with the root-field uniqueness check), entity resolvers
//! keyed by type, and the `@provides` reachability graph used for the
//! shortcut optimization.
//!
//! Grounded on `apollo-supergraph/src/lib.rs`'s `Supergraph::compose` —
//! simplified from its `join__*` directive synthesis down to the flat
//! ownership/entity maps this gateway's planner actually needs. The
//! reachability graph follows the spec's own description of the shortcut,
//! built with `petgraph`, the same crate the teacher depends on.

use indexmap::{IndexMap, IndexSet};
use petgraph::algo::dijkstra;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::CompositionError;
use crate::query_plan::RootOperationKind;
use crate::subgraph::{EntityKey, FieldName, SubgraphModel, TypeName};

#[derive(Debug, Clone)]
pub struct EntityResolver {
    pub subgraph: String,
    pub key: EntityKey,
}

/// The composed view of all subgraphs: who owns what, and how entities are
/// resolved and shortcut across subgraph boundaries.
#[derive(Debug)]
pub struct Supergraph {
    pub subgraphs: IndexMap<String, SubgraphModel>,
    root_type_names: IndexSet<TypeName>,
    /// The composed root type name for each operation kind, honoring a
    /// subgraph's `schema { query: ... mutation: ... }` rename instead of
    /// assuming the conventional `Query`/`Mutation`/`Subscription` names.
    root_type_by_kind: IndexMap<RootOperationKind, TypeName>,
    /// Subgraphs that own a field, in config order; the planner's owner is
    /// always `owners[0]`.
    field_owners: IndexMap<(TypeName, FieldName), Vec<String>>,
    /// Resolvable `@key` entries per entity type, in config order.
    entity_resolvers: IndexMap<TypeName, Vec<EntityResolver>>,
    /// `graph[node]` is a `(subgraph, type)` pair — "this subgraph's view of
    /// this type"; an edge `a -> b` with weight 0 means a field inside `a`
    /// already provides the nested field inline via `@provides`, so no
    /// separate entity-resolution step back to `b` is needed.
    provides_graph: DiGraph<(String, TypeName), u32>,
    node_by_key: IndexMap<(String, TypeName), NodeIndex>,
}

impl Supergraph {
    pub fn compose(subgraphs: Vec<SubgraphModel>) -> Result<Self, CompositionError> {
        let mut root_type_names = IndexSet::new();
        let mut root_type_by_kind: IndexMap<RootOperationKind, TypeName> = IndexMap::new();
        for subgraph in &subgraphs {
            if let Some(name) = subgraph.schema.query_root_operation() {
                root_type_names.insert(name.to_string());
                root_type_by_kind
                    .entry(RootOperationKind::Query)
                    .or_insert_with(|| name.to_string());
            }
            if let Some(name) = subgraph.schema.mutation_root_operation() {
                root_type_names.insert(name.to_string());
                root_type_by_kind
                    .entry(RootOperationKind::Mutation)
                    .or_insert_with(|| name.to_string());
            }
            if let Some(name) = subgraph.schema.subscription_root_operation() {
                root_type_names.insert(name.to_string());
                root_type_by_kind
                    .entry(RootOperationKind::Subscription)
                    .or_insert_with(|| name.to_string());
            }
        }

        let mut field_owners: IndexMap<(TypeName, FieldName), Vec<String>> = IndexMap::new();
        for subgraph in &subgraphs {
            for key in subgraph.owned() {
                field_owners
                    .entry(key.clone())
                    .or_default()
                    .push(subgraph.name.clone());
            }
        }

        for ((type_name, field_name), owners) in &field_owners {
            if root_type_names.contains(type_name) && owners.len() > 1 {
                return Err(CompositionError::OwnershipConflict {
                    field: format!("{type_name}.{field_name}"),
                    first_owner: owners[0].clone(),
                    second_owner: owners[1].clone(),
                });
            }
        }

        let mut entity_resolvers: IndexMap<TypeName, Vec<EntityResolver>> = IndexMap::new();
        for subgraph in &subgraphs {
            for (type_name, keys) in subgraph.keys_iter() {
                for key in keys {
                    if !key.resolvable {
                        continue;
                    }
                    entity_resolvers
                        .entry(type_name.clone())
                        .or_default()
                        .push(EntityResolver {
                            subgraph: subgraph.name.clone(),
                            key: key.clone(),
                        });
                }
            }
        }

        let mut provides_graph: DiGraph<(String, TypeName), u32> = DiGraph::new();
        let mut node_by_key: IndexMap<(String, TypeName), NodeIndex> = IndexMap::new();
        let mut node_index = |graph: &mut DiGraph<(String, TypeName), u32>,
                               map: &mut IndexMap<(String, TypeName), NodeIndex>,
                               subgraph: &str,
                               type_name: &str| {
            let key = (subgraph.to_string(), type_name.to_string());
            *map.entry(key.clone()).or_insert_with(|| graph.add_node(key))
        };

        // A `@provides(fields: "…")` on subgraph A's field means A already
        // returns those sub-fields inline for values of the field's return
        // type; if the declared owner of a nested field is subgraph B,
        // that's a zero-cost edge from A's view of that type to B's.
        for subgraph in &subgraphs {
            for (type_name, field_name) in subgraph.owned() {
                let Some(provided) = subgraph.provides_for(type_name, field_name) else {
                    continue;
                };
                let Some(child_type) = subgraph.field_type_name(type_name, field_name) else {
                    continue;
                };
                for nested_field in provided {
                    let Some(owners) = field_owners.get(&(child_type.clone(), nested_field.clone()))
                    else {
                        continue;
                    };
                    if let Some(owner) = owners.first() {
                        if owner != &subgraph.name {
                            let from = node_index(&mut provides_graph, &mut node_by_key, &subgraph.name, &child_type);
                            let to = node_index(&mut provides_graph, &mut node_by_key, owner, &child_type);
                            provides_graph.update_edge(from, to, 0);
                        }
                    }
                }
            }
        }

        Ok(Supergraph {
            subgraphs: subgraphs.into_iter().map(|s| (s.name.clone(), s)).collect(),
            root_type_names,
            root_type_by_kind,
            field_owners,
            entity_resolvers,
            provides_graph,
            node_by_key,
        })
    }

    pub fn is_root_type(&self, type_name: &str) -> bool {
        self.root_type_names.contains(type_name)
    }

    /// The composed root type name for `kind`, honoring a subgraph's
    /// `schema { query: ... }`-style rename instead of assuming the
    /// conventional `Query`/`Mutation`/`Subscription` names.
    pub fn root_type_name(&self, kind: RootOperationKind) -> Option<&str> {
        self.root_type_by_kind.get(&kind).map(String::as_str)
    }

    /// The subgraph that should resolve `type_name.field_name`, per config
    /// order (first owner wins for shared entity fields).
    pub fn owner_of(&self, type_name: &str, field_name: &str) -> Option<&str> {
        self.field_owners
            .get(&(type_name.to_string(), field_name.to_string()))
            .and_then(|owners| owners.first())
            .map(String::as_str)
    }

    pub fn entity_resolvers(&self, type_name: &str) -> &[EntityResolver] {
        self.entity_resolvers
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True when `from_subgraph` can obtain `type_name.field_name` without an
    /// extra entity-resolution hop, because a `@provides` edge already
    /// reaches the owner at zero cost.
    pub fn shortcut_reaches(&self, from_subgraph: &str, type_name: &str, field_name: &str) -> bool {
        let Some(owner) = self.owner_of(type_name, field_name) else {
            return false;
        };
        if owner == from_subgraph {
            return true;
        }
        let from_key = (from_subgraph.to_string(), type_name.to_string());
        let to_key = (owner.to_string(), type_name.to_string());
        let Some(&from) = self.node_by_key.get(&from_key) else {
            return false;
        };
        let Some(&to) = self.node_by_key.get(&to_key) else {
            return false;
        };
        let costs = dijkstra(&self.provides_graph, from, Some(to), |edge| *edge.weight());
        costs.get(&to) == Some(&0)
    }

    /// A deterministic textual summary of field ownership and entity
    /// resolvers, used by the `compose` CLI subcommand in place of a
    /// synthesized supergraph SDL (this composer merges into flat ownership
    /// indexes rather than a `join__*`-annotated schema document).
    pub fn describe(&self) -> String {
        let mut out = String::new();
        out.push_str("# subgraphs\n");
        for name in self.subgraphs.keys() {
            out.push_str("- ");
            out.push_str(name);
            out.push('\n');
        }
        out.push_str("\n# field ownership\n");
        for ((type_name, field_name), owners) in &self.field_owners {
            out.push_str(&format!("{type_name}.{field_name} -> {}\n", owners.join(", ")));
        }
        out.push_str("\n# entity resolvers\n");
        for (type_name, resolvers) in &self.entity_resolvers {
            for resolver in resolvers {
                out.push_str(&format!(
                    "{type_name} @ {} (key: {})\n",
                    resolver.subgraph,
                    resolver.key.fields.join(" ")
                ));
            }
        }
        out
    }
}
