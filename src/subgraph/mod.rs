//! C1 — Subgraph Model.
//!
//! Parses one subgraph SDL and builds the three read-only indexes the
//! planner and composer need: field ownership, keys, and the
//! `@external`/`@requires`/`@provides` bookkeeping.
//!
//! Grounded on `apollo-subgraph/src/{lib.rs,spec.rs}` for the parse-then-index
//! shape, and `schema/subgraph_metadata.rs` for which facts get collected —
//! flattened here into plain `(TypeName, FieldName)`-keyed maps rather than
//! the teacher's position/referencer wrapper types.

use apollo_compiler::ast::Value;
use apollo_compiler::schema::{Directive, ExtendedType};
use apollo_compiler::Schema;
use indexmap::{IndexMap, IndexSet};

use crate::error::CompositionError;

pub type TypeName = String;
pub type FieldName = String;

/// A key field-set: a whitespace-tokenized list of field names drawn from the
/// entity type, plus whether the key is resolvable (default true).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityKey {
    pub fields: Vec<FieldName>,
    pub resolvable: bool,
}

/// Per-subgraph read-only indexes built once at boot.
#[derive(Debug)]
pub struct SubgraphModel {
    pub name: String,
    pub url: String,
    pub schema: Schema,

    /// Fields defined or extended here, not marked `@external`.
    owned_fields: IndexSet<(TypeName, FieldName)>,
    /// Fields marked `@external` here.
    external_fields: IndexSet<(TypeName, FieldName)>,
    /// `@key(fields: "…")` declarations per entity type, in declaration order.
    keys: IndexMap<TypeName, Vec<EntityKey>>,
    /// `@requires(fields: "…")` per field, tokenized.
    requires: IndexMap<(TypeName, FieldName), Vec<FieldName>>,
    /// `@provides(fields: "…")` per field, tokenized.
    provides: IndexMap<(TypeName, FieldName), Vec<FieldName>>,
    /// Root operation type name -> field names defined in this subgraph.
    root_fields: IndexMap<String, Vec<FieldName>>,
}

/// Federation directive (and `FieldSet` scalar) definitions a subgraph SDL is
/// allowed to use without declaring itself — subgraph authors write
/// `@key`/`@external`/`@requires`/`@provides` the way a federation gateway's
/// `@link` bootstrapping would have injected them, so they're prepended here
/// before validation instead of requiring every fixture to spell them out.
const FEDERATION_DIRECTIVES_PRELUDE: &str = r#"
    directive @key(fields: FieldSet!, resolvable: Boolean = true) repeatable on OBJECT | INTERFACE
    directive @external on FIELD_DEFINITION | OBJECT
    directive @requires(fields: FieldSet!) on FIELD_DEFINITION
    directive @provides(fields: FieldSet!) on FIELD_DEFINITION
    directive @shareable on OBJECT | FIELD_DEFINITION
    directive @tag(name: String!) repeatable on FIELD_DEFINITION | INTERFACE | OBJECT | UNION | ARGUMENT_DEFINITION | SCALAR | ENUM | ENUM_VALUE | INPUT_OBJECT | INPUT_FIELD_DEFINITION | SCHEMA
    directive @inaccessible on FIELD_DEFINITION | OBJECT | INTERFACE | UNION | ARGUMENT_DEFINITION | SCALAR | ENUM | ENUM_VALUE | INPUT_OBJECT | INPUT_FIELD_DEFINITION
    directive @override(from: String!) on FIELD_DEFINITION
    directive @composeDirective(name: String!) repeatable on SCHEMA
    scalar FieldSet
"#;

impl SubgraphModel {
    pub fn parse(name: &str, url: &str, sdl: &str) -> Result<Self, CompositionError> {
        let full_sdl = format!("{FEDERATION_DIRECTIVES_PRELUDE}\n{sdl}");
        let schema = Schema::parse_and_validate(full_sdl, format!("{name}.graphql"))
            .map_err(|diagnostics| CompositionError::InvalidSchema {
                subgraph: name.to_string(),
                message: diagnostics.to_string(),
            })?
            .into_inner();

        let mut model = SubgraphModel {
            name: name.to_string(),
            url: url.to_string(),
            schema,
            owned_fields: IndexSet::new(),
            external_fields: IndexSet::new(),
            keys: IndexMap::new(),
            requires: IndexMap::new(),
            provides: IndexMap::new(),
            root_fields: IndexMap::new(),
        };
        model.index()?;
        Ok(model)
    }

    fn index(&mut self) -> Result<(), CompositionError> {
        let root_type_names: IndexSet<String> = [
            self.schema.query_root_operation().map(|n| n.to_string()),
            self.schema.mutation_root_operation().map(|n| n.to_string()),
            self.schema.subscription_root_operation().map(|n| n.to_string()),
        ]
        .into_iter()
        .flatten()
        .collect();

        let types: Vec<(String, apollo_compiler::Node<apollo_compiler::schema::ObjectType>)> =
            self.schema
                .types
                .iter()
                .filter_map(|(name, ty)| match ty {
                    ExtendedType::Object(obj) => Some((name.to_string(), obj.clone())),
                    _ => None,
                })
                .collect();

        for (type_name, object) in &types {
            for key_directive in object.directives.get_all("key") {
                let fields = directive_string_arg(key_directive, "fields").ok_or_else(|| {
                    CompositionError::InvalidSchema {
                        subgraph: self.name.clone(),
                        message: format!("`{type_name}` has a malformed @key directive"),
                    }
                })?;
                let resolvable = directive_bool_arg(key_directive, "resolvable").unwrap_or(true);
                self.keys.entry(type_name.clone()).or_default().push(EntityKey {
                    fields: tokenize_field_set(&fields),
                    resolvable,
                });
            }

            let is_root_type = root_type_names.contains(type_name);

            for (field_name, field) in object.fields.iter() {
                let field_name = field_name.to_string();
                let is_external = field.directives.has("external");
                let key = (type_name.clone(), field_name.clone());

                if is_external {
                    self.external_fields.insert(key.clone());
                } else {
                    self.owned_fields.insert(key.clone());
                    if is_root_type {
                        self.root_fields
                            .entry(type_name.clone())
                            .or_default()
                            .push(field_name.clone());
                    }
                }

                if let Some(requires_directive) = field.directives.get("requires") {
                    let fields = directive_string_arg(requires_directive, "fields").ok_or_else(
                        || CompositionError::InvalidSchema {
                            subgraph: self.name.clone(),
                            message: format!(
                                "`{type_name}.{field_name}` has a malformed @requires directive"
                            ),
                        },
                    )?;
                    self.requires.insert(key.clone(), tokenize_field_set(&fields));
                }

                if let Some(provides_directive) = field.directives.get("provides") {
                    let fields = directive_string_arg(provides_directive, "fields").ok_or_else(
                        || CompositionError::InvalidSchema {
                            subgraph: self.name.clone(),
                            message: format!(
                                "`{type_name}.{field_name}` has a malformed @provides directive"
                            ),
                        },
                    )?;
                    self.provides.insert(key, tokenize_field_set(&fields));
                }
            }
        }
        Ok(())
    }

    pub fn owns(&self, type_name: &str, field_name: &str) -> bool {
        self.owned_fields
            .contains(&(type_name.to_string(), field_name.to_string()))
    }

    pub fn is_external(&self, type_name: &str, field_name: &str) -> bool {
        self.external_fields
            .contains(&(type_name.to_string(), field_name.to_string()))
    }

    pub fn keys_for(&self, type_name: &str) -> &[EntityKey] {
        self.keys.get(type_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterates `(type_name, keys)` for every entity type this subgraph
    /// declares a `@key` on; used by the composer to build entity resolvers.
    pub fn keys_iter(&self) -> impl Iterator<Item = (&TypeName, &Vec<EntityKey>)> {
        self.keys.iter()
    }

    pub fn requires_for(&self, type_name: &str, field_name: &str) -> Option<&[FieldName]> {
        self.requires
            .get(&(type_name.to_string(), field_name.to_string()))
            .map(Vec::as_slice)
    }

    pub fn provides_for(&self, type_name: &str, field_name: &str) -> Option<&[FieldName]> {
        self.provides
            .get(&(type_name.to_string(), field_name.to_string()))
            .map(Vec::as_slice)
    }

    pub fn root_fields(&self, root_type_name: &str) -> &[FieldName] {
        self.root_fields
            .get(root_type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All `(TypeName, FieldName)` pairs owned by this subgraph; used by the
    /// composer to build the global ownership map.
    pub fn owned(&self) -> impl Iterator<Item = &(TypeName, FieldName)> {
        self.owned_fields.iter()
    }

    /// The named return type of a field, with list/non-null wrappers stripped.
    /// Used by the planner to keep walking the client selection set without
    /// needing a separately-composed supergraph schema.
    pub fn field_type_name(&self, type_name: &str, field_name: &str) -> Option<String> {
        let fields = match self.schema.types.get(type_name)? {
            ExtendedType::Object(obj) => &obj.fields,
            ExtendedType::Interface(iface) => &iface.fields,
            _ => return None,
        };
        fields
            .get(field_name)
            .map(|f| f.ty.inner_named_type().to_string())
    }

    /// Whether `type_name` names an object, interface, or union — i.e.
    /// something with a sub-selection, as opposed to a scalar or enum leaf.
    pub fn is_composite_type(&self, type_name: &str) -> bool {
        matches!(
            self.schema.types.get(type_name),
            Some(ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_))
        )
    }
}

fn tokenize_field_set(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_owned).collect()
}

fn directive_string_arg(directive: &Directive, arg_name: &str) -> Option<String> {
    match directive.specified_argument_by_name(arg_name) {
        Some(value) => match value.as_ref() {
            Value::String(s) => Some(s.to_string()),
            _ => None,
        },
        None => None,
    }
}

fn directive_bool_arg(directive: &Directive, arg_name: &str) -> Option<bool> {
    match directive.specified_argument_by_name(arg_name) {
        Some(value) => match value.as_ref() {
            Value::Boolean(b) => Some(*b),
            _ => None,
        },
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCTS_SDL: &str = r#"
        type Query {
          product(id: ID!): Product
        }

        type Product @key(fields: "id") {
          id: ID!
          name: String!
          price: Float
        }
    "#;

    #[test]
    fn collects_root_fields_and_keys() {
        let model = SubgraphModel::parse("products", "http://products", PRODUCTS_SDL).unwrap();
        assert_eq!(model.root_fields("Query"), &["product".to_string()]);
        assert!(model.owns("Product", "name"));
        let keys = model.keys_for("Product");
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].fields, vec!["id".to_string()]);
        assert!(keys[0].resolvable);
    }

    #[test]
    fn tracks_external_requires_and_provides() {
        let sdl = r#"
            type Query {
              shippingEstimate: Float
            }

            type Product @key(fields: "id") {
              id: ID!
              weight: Float @external
              shippingCost: Float @requires(fields: "weight")
              reviews: [Review!]! @provides(fields: "body")
            }

            type Review {
              body: String
            }
        "#;
        let model = SubgraphModel::parse("shipping", "http://shipping", sdl).unwrap();
        assert!(model.is_external("Product", "weight"));
        assert!(!model.owns("Product", "weight"));
        assert_eq!(
            model.requires_for("Product", "shippingCost"),
            Some(["weight".to_string()].as_slice())
        );
        assert_eq!(
            model.provides_for("Product", "reviews"),
            Some(["body".to_string()].as_slice())
        );
    }

    #[test]
    fn rejects_invalid_schema() {
        let err = SubgraphModel::parse("broken", "http://broken", "type Query {").unwrap_err();
        assert!(matches!(err, CompositionError::InvalidSchema { .. }));
    }
}
