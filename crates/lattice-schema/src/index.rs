//! Flattened, name-keyed view of a parsed schema document.
//!
//! The differ never walks the AST directly: it compares two [`SchemaIndex`]
//! values, which collapse type extensions and key every member by name.
//! `BTreeMap`/`BTreeSet` keep iteration order deterministic, which in turn
//! keeps the differ's output totally ordered.

use async_graphql_parser::types::{
    ServiceDocument, Type, TypeDefinition, TypeKind, TypeSystemDefinition,
};
use std::collections::{BTreeMap, BTreeSet};

/// The kind of a named type, for kind-change detection and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeEntryKind {
    /// A scalar type.
    Scalar,
    /// An object type.
    Object,
    /// An interface type.
    Interface,
    /// A union type.
    Union,
    /// An enum type.
    Enum,
    /// An input object type.
    InputObject,
}

impl TypeEntryKind {
    /// Human-readable kind name used in change messages.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Scalar => "scalar type",
            Self::Object => "object type",
            Self::Interface => "interface type",
            Self::Union => "union type",
            Self::Enum => "enum type",
            Self::InputObject => "input object type",
        }
    }
}

/// An argument or input-field position.
#[derive(Debug, Clone)]
pub struct ArgumentEntry {
    /// The declared type.
    pub ty: Type,
    /// The printed default value, when one exists.
    pub default_value: Option<String>,
}

impl ArgumentEntry {
    /// True when a value must be supplied by the client.
    #[must_use]
    pub fn is_required(&self) -> bool {
        !self.ty.nullable && self.default_value.is_none()
    }
}

/// An output field of an object or interface type.
#[derive(Debug, Clone)]
pub struct FieldEntry {
    /// The declared return type.
    pub ty: Type,
    /// Arguments keyed by name.
    pub arguments: BTreeMap<String, ArgumentEntry>,
}

/// A named type with all its members, extensions already merged in.
#[derive(Debug, Clone)]
pub struct TypeEntry {
    /// The kind of the type.
    pub kind: TypeEntryKind,
    /// Output fields (object/interface).
    pub fields: BTreeMap<String, FieldEntry>,
    /// Input fields (input object).
    pub input_fields: BTreeMap<String, ArgumentEntry>,
    /// Union members.
    pub union_members: BTreeSet<String>,
    /// Enum values.
    pub enum_values: BTreeSet<String>,
    /// Implemented interfaces.
    pub implements: BTreeSet<String>,
}

impl TypeEntry {
    fn new(kind: TypeEntryKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
            input_fields: BTreeMap::new(),
            union_members: BTreeSet::new(),
            enum_values: BTreeSet::new(),
            implements: BTreeSet::new(),
        }
    }
}

/// A flattened schema: named types keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaIndex {
    /// All named types.
    pub types: BTreeMap<String, TypeEntry>,
}

impl SchemaIndex {
    /// Builds an index from a parsed document, merging `extend` definitions
    /// into their base types.
    #[must_use]
    pub fn from_document(doc: &ServiceDocument) -> Self {
        let mut index = Self::default();
        for definition in &doc.definitions {
            if let TypeSystemDefinition::Type(td) = definition {
                index.absorb(&td.node);
            }
        }
        index
    }

    /// Looks up a type entry by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeEntry> {
        self.types.get(name)
    }

    fn absorb(&mut self, td: &TypeDefinition) {
        let kind = kind_of(&td.kind);
        let entry = self
            .types
            .entry(td.name.node.to_string())
            .or_insert_with(|| TypeEntry::new(kind));
        if !td.extend {
            entry.kind = kind;
        }

        match &td.kind {
            TypeKind::Scalar => {}
            TypeKind::Object(object) => {
                for implemented in &object.implements {
                    entry.implements.insert(implemented.node.to_string());
                }
                for field in &object.fields {
                    entry.fields.insert(
                        field.node.name.node.to_string(),
                        field_entry(&field.node),
                    );
                }
            }
            TypeKind::Interface(interface) => {
                for implemented in &interface.implements {
                    entry.implements.insert(implemented.node.to_string());
                }
                for field in &interface.fields {
                    entry.fields.insert(
                        field.node.name.node.to_string(),
                        field_entry(&field.node),
                    );
                }
            }
            TypeKind::Union(union_type) => {
                for member in &union_type.members {
                    entry.union_members.insert(member.node.to_string());
                }
            }
            TypeKind::Enum(enum_type) => {
                for value in &enum_type.values {
                    entry.enum_values.insert(value.node.value.node.to_string());
                }
            }
            TypeKind::InputObject(input) => {
                for field in &input.fields {
                    entry.input_fields.insert(
                        field.node.name.node.to_string(),
                        ArgumentEntry {
                            ty: field.node.ty.node.clone(),
                            default_value: field
                                .node
                                .default_value
                                .as_ref()
                                .map(|v| v.node.to_string()),
                        },
                    );
                }
            }
        }
    }
}

fn field_entry(field: &async_graphql_parser::types::FieldDefinition) -> FieldEntry {
    FieldEntry {
        ty: field.ty.node.clone(),
        arguments: field
            .arguments
            .iter()
            .map(|argument| {
                (
                    argument.node.name.node.to_string(),
                    ArgumentEntry {
                        ty: argument.node.ty.node.clone(),
                        default_value: argument
                            .node
                            .default_value
                            .as_ref()
                            .map(|v| v.node.to_string()),
                    },
                )
            })
            .collect(),
    }
}

fn kind_of(kind: &TypeKind) -> TypeEntryKind {
    match kind {
        TypeKind::Scalar => TypeEntryKind::Scalar,
        TypeKind::Object(_) => TypeEntryKind::Object,
        TypeKind::Interface(_) => TypeEntryKind::Interface,
        TypeKind::Union(_) => TypeEntryKind::Union,
        TypeKind::Enum(_) => TypeEntryKind::Enum,
        TypeKind::InputObject(_) => TypeEntryKind::InputObject,
    }
}
