//! SDL parsing, printing and fingerprinting.
//!
//! The registry needs a deterministic textual form of a schema in two
//! places: the differ's fast path (two schemas with equal fingerprints are
//! identical and need no diff) and the stitching/federation orchestrators
//! (which re-print merged or stripped documents). Canonical form sorts
//! definitions, fields, arguments, enum values and union members by name
//! before printing, so the fingerprint is independent of declaration order.
//!
//! The fingerprint algorithm is MD5 over the canonical print. MD5 is not
//! used for anything security-sensitive here; it is the registry's schema
//! checksum format and must stay stable across releases.

use async_graphql_parser::types::{
    ConstDirective, DirectiveDefinition, DirectiveLocation, EnumValueDefinition, FieldDefinition,
    InputValueDefinition, SchemaDefinition, ServiceDocument, TypeDefinition, TypeKind,
    TypeSystemDefinition,
};
use md5::{Digest, Md5};
use std::fmt::Write as _;

/// Parses an SDL document.
///
/// # Errors
///
/// Returns the parser's rendered message when the SDL is not syntactically
/// valid.
pub fn parse_sdl(sdl: &str) -> Result<ServiceDocument, String> {
    async_graphql_parser::parse_schema(sdl).map_err(|e| e.to_string())
}

/// Computes the registry fingerprint of an SDL document.
///
/// Parseable documents are hashed in canonical (sorted) printed form, so
/// reordering definitions does not change the fingerprint. Unparseable
/// input falls back to hashing the trimmed text, keeping the fast path
/// usable even for schemas the parser rejects.
#[must_use]
pub fn hash_schema(sdl: &str) -> String {
    let canonical = match parse_sdl(sdl) {
        Ok(doc) => canonical_print(&doc),
        Err(_) => sdl.trim().to_string(),
    };
    let mut hasher = Md5::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Prints a document in canonical form: definitions, fields, arguments,
/// enum values and union members sorted by name.
#[must_use]
pub fn canonical_print(doc: &ServiceDocument) -> String {
    let mut doc = doc.clone();
    sort_document(&mut doc);
    print_document(&doc)
}

fn sort_document(doc: &mut ServiceDocument) {
    doc.definitions.sort_by_key(definition_sort_key);
    for definition in &mut doc.definitions {
        match definition {
            TypeSystemDefinition::Type(td) => sort_type_definition(&mut td.node),
            TypeSystemDefinition::Directive(dd) => {
                dd.node.arguments.sort_by(|a, b| a.node.name.node.cmp(&b.node.name.node));
            }
            TypeSystemDefinition::Schema(_) => {}
        }
    }
}

fn definition_sort_key(definition: &TypeSystemDefinition) -> (u8, String) {
    match definition {
        TypeSystemDefinition::Schema(_) => (0, String::new()),
        TypeSystemDefinition::Directive(dd) => (1, dd.node.name.node.to_string()),
        TypeSystemDefinition::Type(td) => (2, td.node.name.node.to_string()),
    }
}

fn sort_type_definition(td: &mut TypeDefinition) {
    match &mut td.kind {
        TypeKind::Object(object) => {
            object.implements.sort_by(|a, b| a.node.cmp(&b.node));
            object.fields.sort_by(|a, b| a.node.name.node.cmp(&b.node.name.node));
            for field in &mut object.fields {
                field.node.arguments.sort_by(|a, b| a.node.name.node.cmp(&b.node.name.node));
            }
        }
        TypeKind::Interface(interface) => {
            interface.implements.sort_by(|a, b| a.node.cmp(&b.node));
            interface.fields.sort_by(|a, b| a.node.name.node.cmp(&b.node.name.node));
            for field in &mut interface.fields {
                field.node.arguments.sort_by(|a, b| a.node.name.node.cmp(&b.node.name.node));
            }
        }
        TypeKind::Union(union_type) => {
            union_type.members.sort_by(|a, b| a.node.cmp(&b.node));
        }
        TypeKind::Enum(enum_type) => {
            enum_type.values.sort_by(|a, b| a.node.value.node.cmp(&b.node.value.node));
        }
        TypeKind::InputObject(input) => {
            input.fields.sort_by(|a, b| a.node.name.node.cmp(&b.node.name.node));
        }
        TypeKind::Scalar => {}
    }
}

/// Prints a document as SDL.
#[must_use]
pub fn print_document(doc: &ServiceDocument) -> String {
    let mut out = String::new();
    for definition in &doc.definitions {
        match definition {
            TypeSystemDefinition::Schema(sd) => print_schema_definition(&mut out, &sd.node),
            TypeSystemDefinition::Directive(dd) => print_directive_definition(&mut out, &dd.node),
            TypeSystemDefinition::Type(td) => print_type_definition(&mut out, &td.node),
        }
        out.push('\n');
    }
    out
}

fn print_description(out: &mut String, description: Option<&str>, indent: &str) {
    if let Some(text) = description {
        let _ = writeln!(out, "{indent}\"\"\"{text}\"\"\"");
    }
}

fn print_schema_definition(out: &mut String, sd: &SchemaDefinition) {
    if sd.extend {
        out.push_str("extend ");
    }
    out.push_str("schema");
    print_directives(out, &sd.directives);
    out.push_str(" {\n");
    if let Some(query) = &sd.query {
        let _ = writeln!(out, "  query: {}", query.node);
    }
    if let Some(mutation) = &sd.mutation {
        let _ = writeln!(out, "  mutation: {}", mutation.node);
    }
    if let Some(subscription) = &sd.subscription {
        let _ = writeln!(out, "  subscription: {}", subscription.node);
    }
    out.push_str("}\n");
}

fn print_directive_definition(out: &mut String, dd: &DirectiveDefinition) {
    print_description(out, dd.description.as_ref().map(|d| d.node.as_str()), "");
    let _ = write!(out, "directive @{}", dd.name.node);
    print_argument_definitions(out, &dd.arguments);
    if dd.is_repeatable {
        out.push_str(" repeatable");
    }
    out.push_str(" on ");
    let locations: Vec<&str> = dd
        .locations
        .iter()
        .map(|l| directive_location_str(&l.node))
        .collect();
    out.push_str(&locations.join(" | "));
    out.push('\n');
}

fn print_type_definition(out: &mut String, td: &TypeDefinition) {
    print_description(out, td.description.as_ref().map(|d| d.node.as_str()), "");
    if td.extend {
        out.push_str("extend ");
    }
    match &td.kind {
        TypeKind::Scalar => {
            let _ = write!(out, "scalar {}", td.name.node);
            print_directives(out, &td.directives);
            out.push('\n');
        }
        TypeKind::Object(object) => {
            let _ = write!(out, "type {}", td.name.node);
            print_implements(out, &object.implements);
            print_directives(out, &td.directives);
            print_fields(out, &object.fields);
        }
        TypeKind::Interface(interface) => {
            let _ = write!(out, "interface {}", td.name.node);
            print_implements(out, &interface.implements);
            print_directives(out, &td.directives);
            print_fields(out, &interface.fields);
        }
        TypeKind::Union(union_type) => {
            let _ = write!(out, "union {}", td.name.node);
            print_directives(out, &td.directives);
            let members: Vec<String> = union_type
                .members
                .iter()
                .map(|m| m.node.to_string())
                .collect();
            let _ = writeln!(out, " = {}", members.join(" | "));
        }
        TypeKind::Enum(enum_type) => {
            let _ = write!(out, "enum {}", td.name.node);
            print_directives(out, &td.directives);
            out.push_str(" {\n");
            for value in &enum_type.values {
                print_enum_value(out, &value.node);
            }
            out.push_str("}\n");
        }
        TypeKind::InputObject(input) => {
            let _ = write!(out, "input {}", td.name.node);
            print_directives(out, &td.directives);
            out.push_str(" {\n");
            for field in &input.fields {
                print_description(
                    out,
                    field.node.description.as_ref().map(|d| d.node.as_str()),
                    "  ",
                );
                out.push_str("  ");
                print_input_value(out, &field.node);
                out.push('\n');
            }
            out.push_str("}\n");
        }
    }
}

fn print_implements<T: std::fmt::Display>(
    out: &mut String,
    implements: &[async_graphql_parser::Positioned<T>],
) {
    if implements.is_empty() {
        return;
    }
    let names: Vec<String> = implements.iter().map(|n| n.node.to_string()).collect();
    let _ = write!(out, " implements {}", names.join(" & "));
}

fn print_fields(out: &mut String, fields: &[async_graphql_parser::Positioned<FieldDefinition>]) {
    out.push_str(" {\n");
    for field in fields {
        print_description(
            out,
            field.node.description.as_ref().map(|d| d.node.as_str()),
            "  ",
        );
        let _ = write!(out, "  {}", field.node.name.node);
        print_argument_definitions(out, &field.node.arguments);
        let _ = write!(out, ": {}", field.node.ty.node);
        print_directives(out, &field.node.directives);
        out.push('\n');
    }
    out.push_str("}\n");
}

fn print_enum_value(out: &mut String, value: &EnumValueDefinition) {
    print_description(
        out,
        value.description.as_ref().map(|d| d.node.as_str()),
        "  ",
    );
    let _ = write!(out, "  {}", value.value.node);
    print_directives(out, &value.directives);
    out.push('\n');
}

fn print_argument_definitions(
    out: &mut String,
    arguments: &[async_graphql_parser::Positioned<InputValueDefinition>],
) {
    if arguments.is_empty() {
        return;
    }
    out.push('(');
    for (i, argument) in arguments.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        print_input_value(out, &argument.node);
    }
    out.push(')');
}

fn print_input_value(out: &mut String, value: &InputValueDefinition) {
    let _ = write!(out, "{}: {}", value.name.node, value.ty.node);
    if let Some(default) = &value.default_value {
        let _ = write!(out, " = {}", default.node);
    }
    print_directives(out, &value.directives);
}

fn print_directives(
    out: &mut String,
    directives: &[async_graphql_parser::Positioned<ConstDirective>],
) {
    for directive in directives {
        let _ = write!(out, " @{}", directive.node.name.node);
        if !directive.node.arguments.is_empty() {
            out.push('(');
            for (i, (name, value)) in directive.node.arguments.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}: {}", name.node, value.node);
            }
            out.push(')');
        }
    }
}

fn directive_location_str(location: &DirectiveLocation) -> &'static str {
    match location {
        DirectiveLocation::Query => "QUERY",
        DirectiveLocation::Mutation => "MUTATION",
        DirectiveLocation::Subscription => "SUBSCRIPTION",
        DirectiveLocation::Field => "FIELD",
        DirectiveLocation::FragmentDefinition => "FRAGMENT_DEFINITION",
        DirectiveLocation::FragmentSpread => "FRAGMENT_SPREAD",
        DirectiveLocation::InlineFragment => "INLINE_FRAGMENT",
        DirectiveLocation::VariableDefinition => "VARIABLE_DEFINITION",
        DirectiveLocation::Schema => "SCHEMA",
        DirectiveLocation::Scalar => "SCALAR",
        DirectiveLocation::Object => "OBJECT",
        DirectiveLocation::FieldDefinition => "FIELD_DEFINITION",
        DirectiveLocation::ArgumentDefinition => "ARGUMENT_DEFINITION",
        DirectiveLocation::Interface => "INTERFACE",
        DirectiveLocation::Union => "UNION",
        DirectiveLocation::Enum => "ENUM",
        DirectiveLocation::EnumValue => "ENUM_VALUE",
        DirectiveLocation::InputObject => "INPUT_OBJECT",
        DirectiveLocation::InputFieldDefinition => "INPUT_FIELD_DEFINITION",
    }
}
