//! Orchestrator for stitched projects.
//!
//! Stitching composes in-process: same-named object, interface and input
//! types merge their field sets, enums and unions merge their members, and
//! a field declared with two different types is a composition conflict.

use async_graphql_parser::types::{
    ServiceDocument, TypeDefinition, TypeKind, TypeSystemDefinition,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

use super::{
    ComposedSchema, CompositionError, Orchestrator, OrchestratorConfig, SchemaBuildError,
    SchemaInput,
};
use crate::sdl;

/// Composition front-end for stitched projects.
#[derive(Debug, Default, Clone, Copy)]
pub struct StitchingOrchestrator;

impl StitchingOrchestrator {
    fn parse_all(
        schemas: &[SchemaInput],
    ) -> Result<Vec<(String, ServiceDocument)>, Vec<CompositionError>> {
        let mut parsed = Vec::with_capacity(schemas.len());
        let mut errors = Vec::new();
        for schema in schemas {
            match sdl::parse_sdl(&schema.raw) {
                Ok(document) => parsed.push((schema.source.clone(), document)),
                Err(message) => errors.push(CompositionError::new(format!(
                    "failed to parse schema '{}': {message}",
                    schema.source
                ))),
            }
        }
        if errors.is_empty() {
            Ok(parsed)
        } else {
            Err(errors)
        }
    }
}

fn merge_documents(
    parsed: Vec<(String, ServiceDocument)>,
) -> (ServiceDocument, Vec<CompositionError>) {
    let mut definitions: Vec<TypeSystemDefinition> = Vec::new();
    let mut type_slots: BTreeMap<String, usize> = BTreeMap::new();
    let mut directive_names: BTreeSet<String> = BTreeSet::new();
    let mut has_schema_definition = false;
    let mut conflicts = Vec::new();

    for (source, document) in parsed {
        for definition in document.definitions {
            match definition {
                TypeSystemDefinition::Schema(sd) => {
                    if !has_schema_definition {
                        has_schema_definition = true;
                        definitions.push(TypeSystemDefinition::Schema(sd));
                    }
                }
                TypeSystemDefinition::Directive(dd) => {
                    if directive_names.insert(dd.node.name.node.to_string()) {
                        definitions.push(TypeSystemDefinition::Directive(dd));
                    }
                }
                TypeSystemDefinition::Type(td) => {
                    let name = td.node.name.node.to_string();
                    if let Some(&slot) = type_slots.get(&name) {
                        if let TypeSystemDefinition::Type(existing) = &mut definitions[slot] {
                            merge_type(&mut existing.node, td.node, &source, &mut conflicts);
                        }
                    } else {
                        type_slots.insert(name, definitions.len());
                        definitions.push(TypeSystemDefinition::Type(td));
                    }
                }
            }
        }
    }

    (ServiceDocument { definitions }, conflicts)
}

fn merge_type(
    existing: &mut TypeDefinition,
    incoming: TypeDefinition,
    source: &str,
    conflicts: &mut Vec<CompositionError>,
) {
    let type_name = existing.name.node.to_string();
    // A base definition absorbs any extension that happened to come first.
    if !incoming.extend {
        existing.extend = false;
    }
    match (&mut existing.kind, incoming.kind) {
        (TypeKind::Object(base), TypeKind::Object(other)) => {
            for implemented in other.implements {
                if !base.implements.iter().any(|i| i.node == implemented.node) {
                    base.implements.push(implemented);
                }
            }
            for field in other.fields {
                match base
                    .fields
                    .iter()
                    .find(|f| f.node.name.node == field.node.name.node)
                {
                    Some(current) if current.node.ty.node != field.node.ty.node => {
                        conflicts.push(CompositionError::new(format!(
                            "field '{type_name}.{}' has conflicting types '{}' and '{}' (from '{source}')",
                            field.node.name.node, current.node.ty.node, field.node.ty.node
                        )));
                    }
                    Some(_) => {}
                    None => base.fields.push(field),
                }
            }
        }
        (TypeKind::Interface(base), TypeKind::Interface(other)) => {
            for field in other.fields {
                match base
                    .fields
                    .iter()
                    .find(|f| f.node.name.node == field.node.name.node)
                {
                    Some(current) if current.node.ty.node != field.node.ty.node => {
                        conflicts.push(CompositionError::new(format!(
                            "field '{type_name}.{}' has conflicting types '{}' and '{}' (from '{source}')",
                            field.node.name.node, current.node.ty.node, field.node.ty.node
                        )));
                    }
                    Some(_) => {}
                    None => base.fields.push(field),
                }
            }
        }
        (TypeKind::InputObject(base), TypeKind::InputObject(other)) => {
            for field in other.fields {
                match base
                    .fields
                    .iter()
                    .find(|f| f.node.name.node == field.node.name.node)
                {
                    Some(current) if current.node.ty.node != field.node.ty.node => {
                        conflicts.push(CompositionError::new(format!(
                            "input field '{type_name}.{}' has conflicting types '{}' and '{}' (from '{source}')",
                            field.node.name.node, current.node.ty.node, field.node.ty.node
                        )));
                    }
                    Some(_) => {}
                    None => base.fields.push(field),
                }
            }
        }
        (TypeKind::Enum(base), TypeKind::Enum(other)) => {
            for value in other.values {
                if !base.values.iter().any(|v| v.node.value.node == value.node.value.node) {
                    base.values.push(value);
                }
            }
        }
        (TypeKind::Union(base), TypeKind::Union(other)) => {
            for member in other.members {
                if !base.members.iter().any(|m| m.node == member.node) {
                    base.members.push(member);
                }
            }
        }
        (TypeKind::Scalar, TypeKind::Scalar) => {}
        (_, incoming_kind) => {
            conflicts.push(CompositionError::new(format!(
                "type '{type_name}' is declared with conflicting kinds ('{}' in '{source}')",
                kind_name(&incoming_kind)
            )));
        }
    }
}

/// Checks the merged document for unresolved references: extensions whose
/// base type no service provides, and fields or members naming unknown
/// types. These are the composition rules that make a stitched schema
/// servable.
fn semantic_errors(document: &ServiceDocument) -> Vec<CompositionError> {
    const BUILTINS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

    let mut defined: BTreeSet<String> = BTreeSet::new();
    for definition in &document.definitions {
        if let TypeSystemDefinition::Type(td) = definition {
            defined.insert(td.node.name.node.to_string());
        }
    }
    let known = |name: &str| defined.contains(name) || BUILTINS.contains(&name);

    let mut errors = Vec::new();
    for definition in &document.definitions {
        let TypeSystemDefinition::Type(td) = definition else {
            continue;
        };
        let type_name = &td.node.name.node;

        if td.node.extend {
            errors.push(CompositionError::new(format!(
                "type extension of unknown type '{type_name}'"
            )));
            continue;
        }

        match &td.node.kind {
            TypeKind::Object(object) => {
                for implemented in &object.implements {
                    if !known(implemented.node.as_str()) {
                        errors.push(CompositionError::new(format!(
                            "type '{type_name}' implements unknown interface '{}'",
                            implemented.node
                        )));
                    }
                }
                check_fields(type_name.as_str(), &object.fields, &known, &mut errors);
            }
            TypeKind::Interface(interface) => {
                check_fields(type_name.as_str(), &interface.fields, &known, &mut errors);
            }
            TypeKind::Union(union_type) => {
                for member in &union_type.members {
                    if !known(member.node.as_str()) {
                        errors.push(CompositionError::new(format!(
                            "union '{type_name}' references unknown type '{}'",
                            member.node
                        )));
                    }
                }
            }
            TypeKind::InputObject(input) => {
                for field in &input.fields {
                    let referenced = base_type_name(&field.node.ty.node);
                    if !known(referenced) {
                        errors.push(CompositionError::new(format!(
                            "input field '{type_name}.{}' references unknown type '{referenced}'",
                            field.node.name.node
                        )));
                    }
                }
            }
            TypeKind::Scalar | TypeKind::Enum(_) => {}
        }
    }
    errors
}

fn check_fields(
    type_name: &str,
    fields: &[async_graphql_parser::Positioned<async_graphql_parser::types::FieldDefinition>],
    known: &dyn Fn(&str) -> bool,
    errors: &mut Vec<CompositionError>,
) {
    for field in fields {
        let referenced = base_type_name(&field.node.ty.node);
        if !known(referenced) {
            errors.push(CompositionError::new(format!(
                "field '{type_name}.{}' references unknown type '{referenced}'",
                field.node.name.node
            )));
        }
        for argument in &field.node.arguments {
            let referenced = base_type_name(&argument.node.ty.node);
            if !known(referenced) {
                errors.push(CompositionError::new(format!(
                    "argument '{type_name}.{}.{}' references unknown type '{referenced}'",
                    field.node.name.node, argument.node.name.node
                )));
            }
        }
    }
}

fn base_type_name(ty: &async_graphql_parser::types::Type) -> &str {
    match &ty.base {
        async_graphql_parser::types::BaseType::Named(name) => name.as_str(),
        async_graphql_parser::types::BaseType::List(inner) => base_type_name(inner),
    }
}

fn kind_name(kind: &TypeKind) -> &'static str {
    match kind {
        TypeKind::Scalar => "scalar",
        TypeKind::Object(_) => "object",
        TypeKind::Interface(_) => "interface",
        TypeKind::Union(_) => "union",
        TypeKind::Enum(_) => "enum",
        TypeKind::InputObject(_) => "input object",
    }
}

#[async_trait]
impl Orchestrator for StitchingOrchestrator {
    async fn validate(
        &self,
        schemas: &[SchemaInput],
        _config: &OrchestratorConfig,
    ) -> Result<Vec<CompositionError>, SchemaBuildError> {
        let parsed = match Self::parse_all(schemas) {
            Ok(parsed) => parsed,
            Err(errors) => return Ok(errors),
        };
        let (document, mut conflicts) = merge_documents(parsed);
        conflicts.extend(semantic_errors(&document));
        Ok(conflicts)
    }

    async fn build(
        &self,
        schemas: &[SchemaInput],
        _config: &OrchestratorConfig,
    ) -> Result<ComposedSchema, SchemaBuildError> {
        let mut parsed = Vec::with_capacity(schemas.len());
        for schema in schemas {
            let document =
                sdl::parse_sdl(&schema.raw).map_err(|message| SchemaBuildError::Parse {
                    source_name: schema.source.clone(),
                    message,
                })?;
            parsed.push((schema.source.clone(), document));
        }

        let (document, conflicts) = merge_documents(parsed);
        if !conflicts.is_empty() {
            let joined: Vec<String> = conflicts.into_iter().map(|c| c.message).collect();
            return Err(SchemaBuildError::Composition(joined.join("; ")));
        }

        let raw = sdl::print_document(&document);
        Ok(ComposedSchema {
            document,
            raw,
            source: "stitching".to_string(),
        })
    }

    async fn supergraph(
        &self,
        _schemas: &[SchemaInput],
        _config: &OrchestratorConfig,
    ) -> Result<Option<String>, SchemaBuildError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(pairs: &[(&str, &str)]) -> Vec<SchemaInput> {
        pairs
            .iter()
            .map(|(source, raw)| SchemaInput::new(*raw, *source))
            .collect()
    }

    #[tokio::test]
    async fn merges_query_fields_across_services() {
        let orchestrator = StitchingOrchestrator;
        let schemas = inputs(&[
            ("users", "type Query { user: String }"),
            ("posts", "type Query { post: String }"),
        ]);

        let composed = orchestrator
            .build(&schemas, &OrchestratorConfig::default())
            .await
            .unwrap();
        assert!(composed.raw.contains("user"));
        assert!(composed.raw.contains("post"));
    }

    #[tokio::test]
    async fn conflicting_field_types_fail_validation() {
        let orchestrator = StitchingOrchestrator;
        let schemas = inputs(&[
            ("a", "type Query { thing: String }"),
            ("b", "type Query { thing: Int }"),
        ]);

        let errors = orchestrator
            .validate(&schemas, &OrchestratorConfig::default())
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("conflicting types"));

        let err = orchestrator
            .build(&schemas, &OrchestratorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaBuildError::Composition(_)));
    }

    #[tokio::test]
    async fn conflicting_kinds_fail_validation() {
        let orchestrator = StitchingOrchestrator;
        let schemas = inputs(&[
            ("a", "type Query { x: Thing }\ntype Thing { id: ID }"),
            ("b", "scalar Thing"),
        ]);

        let errors = orchestrator
            .validate(&schemas, &OrchestratorConfig::default())
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("conflicting kinds"));
    }

    #[tokio::test]
    async fn parse_failures_surface_per_service() {
        let orchestrator = StitchingOrchestrator;
        let schemas = inputs(&[("ok", "type Query { a: ID }"), ("broken", "type {")]);

        let errors = orchestrator
            .validate(&schemas, &OrchestratorConfig::default())
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("broken"));
    }

    #[tokio::test]
    async fn extension_without_base_fails_validation() {
        let orchestrator = StitchingOrchestrator;
        let schemas = inputs(&[(
            "pong",
            "type Query { pong: String }\nextend type Ping { extra: String }",
        )]);

        let errors = orchestrator
            .validate(&schemas, &OrchestratorConfig::default())
            .await
            .unwrap();
        assert!(errors
            .iter()
            .any(|e| e.message.contains("extension of unknown type 'Ping'")));
    }

    #[tokio::test]
    async fn unknown_field_type_fails_validation() {
        let orchestrator = StitchingOrchestrator;
        let schemas = inputs(&[("a", "type Query { thing: Missing }")]);

        let errors = orchestrator
            .validate(&schemas, &OrchestratorConfig::default())
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("unknown type 'Missing'"));
    }

    #[tokio::test]
    async fn extension_with_base_in_another_service_is_fine() {
        let orchestrator = StitchingOrchestrator;
        let schemas = inputs(&[
            ("ping", "type Query { ping: String }\ntype Ping { id: ID }"),
            ("pong", "type Query { pong: String }\nextend type Ping { extra: String }"),
        ]);

        let errors = orchestrator
            .validate(&schemas, &OrchestratorConfig::default())
            .await
            .unwrap();
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn merged_document_parses() {
        let orchestrator = StitchingOrchestrator;
        let schemas = inputs(&[
            ("a", "type Query { a: A }\ntype A { id: ID }\nenum E { X }"),
            ("b", "type Query { b: ID }\nenum E { Y }"),
        ]);

        let composed = orchestrator
            .build(&schemas, &OrchestratorConfig::default())
            .await
            .unwrap();
        let reparsed = crate::sdl::parse_sdl(&composed.raw).unwrap();
        let index = crate::index::SchemaIndex::from_document(&reparsed);
        assert_eq!(index.get("E").unwrap().enum_values.len(), 2);
        assert_eq!(index.get("Query").unwrap().fields.len(), 2);
    }
}
