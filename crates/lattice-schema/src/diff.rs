//! Schema differ: compares two composed schemas and classifies every change.
//!
//! The differ is pure and deterministic: given the same two schemas it
//! produces the same totally-ordered change list. Classification follows
//! client impact:
//!
//! - `Breaking` removes or narrows something a deployed client may rely on
//! - `Dangerous` adds something that can change behavior at runtime
//!   (a new enum value an exhaustive client match won't cover, a new union
//!   member, a changed default)
//! - `Safe` covers purely additive changes

use async_graphql_parser::types::{BaseType, Type};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::index::{FieldEntry, SchemaIndex, TypeEntry};

/// How much a change can hurt a deployed client.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Criticality {
    /// Purely additive; no client can observe a regression.
    Safe,
    /// Additive but able to change runtime behavior of existing clients.
    Dangerous,
    /// Removes or narrows something a client may depend on.
    Breaking,
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "SAFE"),
            Self::Dangerous => write!(f, "DANGEROUS"),
            Self::Breaking => write!(f, "BREAKING"),
        }
    }
}

/// A single classified schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Dotted path to the changed member (`Type`, `Type.field`,
    /// `Type.field.argument`).
    pub path: String,
    /// Human-readable description of the change.
    pub message: String,
    /// Client impact classification.
    pub criticality: Criticality,
}

impl Change {
    fn new(criticality: Criticality, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            criticality,
        }
    }

    /// True when this change is breaking.
    #[must_use]
    pub fn is_breaking(&self) -> bool {
        self.criticality == Criticality::Breaking
    }
}

/// Diffs two schemas and returns the totally-ordered change list.
#[must_use]
pub fn diff_schemas(before: &SchemaIndex, after: &SchemaIndex) -> Vec<Change> {
    let mut changes = Vec::new();

    for (name, old) in &before.types {
        match after.get(name) {
            None => changes.push(Change::new(
                Criticality::Breaking,
                name.clone(),
                format!("Type '{name}' was removed"),
            )),
            Some(new) if new.kind != old.kind => changes.push(Change::new(
                Criticality::Breaking,
                name.clone(),
                format!(
                    "Type '{name}' changed from {} to {}",
                    old.kind.describe(),
                    new.kind.describe()
                ),
            )),
            Some(new) => diff_type(&mut changes, name, old, new),
        }
    }

    for name in after.types.keys() {
        if before.get(name).is_none() {
            changes.push(Change::new(
                Criticality::Safe,
                name.clone(),
                format!("Type '{name}' was added"),
            ));
        }
    }

    changes.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.message.cmp(&b.message)));
    changes
}

fn diff_type(changes: &mut Vec<Change>, name: &str, old: &TypeEntry, new: &TypeEntry) {
    diff_fields(changes, name, old, new);
    diff_input_fields(changes, name, old, new);
    diff_enum_values(changes, name, old, new);
    diff_union_members(changes, name, old, new);
    diff_implements(changes, name, old, new);
}

fn diff_fields(changes: &mut Vec<Change>, type_name: &str, old: &TypeEntry, new: &TypeEntry) {
    for (field_name, old_field) in &old.fields {
        let path = format!("{type_name}.{field_name}");
        let Some(new_field) = new.fields.get(field_name) else {
            changes.push(Change::new(
                Criticality::Breaking,
                path,
                format!(
                    "Field '{field_name}' was removed from {} '{type_name}'",
                    old.kind.describe()
                ),
            ));
            continue;
        };

        if old_field.ty != new_field.ty {
            let criticality = if is_safe_output_type_change(&old_field.ty, &new_field.ty) {
                Criticality::Safe
            } else {
                Criticality::Breaking
            };
            changes.push(Change::new(
                criticality,
                path.clone(),
                format!(
                    "Field '{type_name}.{field_name}' changed type from '{}' to '{}'",
                    old_field.ty, new_field.ty
                ),
            ));
        }

        diff_arguments(changes, &path, field_name, old_field, new_field);
    }

    for field_name in new.fields.keys() {
        if !old.fields.contains_key(field_name) {
            changes.push(Change::new(
                Criticality::Safe,
                format!("{type_name}.{field_name}"),
                format!(
                    "Field '{field_name}' was added to {} '{type_name}'",
                    new.kind.describe()
                ),
            ));
        }
    }
}

fn diff_arguments(
    changes: &mut Vec<Change>,
    field_path: &str,
    field_name: &str,
    old_field: &FieldEntry,
    new_field: &FieldEntry,
) {
    for (argument_name, old_argument) in &old_field.arguments {
        let path = format!("{field_path}.{argument_name}");
        let Some(new_argument) = new_field.arguments.get(argument_name) else {
            changes.push(Change::new(
                Criticality::Breaking,
                path,
                format!("Argument '{argument_name}' was removed from field '{field_path}'"),
            ));
            continue;
        };

        if old_argument.ty != new_argument.ty {
            let criticality = if is_safe_input_type_change(&old_argument.ty, &new_argument.ty) {
                Criticality::Safe
            } else {
                Criticality::Breaking
            };
            changes.push(Change::new(
                criticality,
                path.clone(),
                format!(
                    "Argument '{argument_name}' of field '{field_path}' changed type from '{}' to '{}'",
                    old_argument.ty, new_argument.ty
                ),
            ));
        } else if old_argument.default_value != new_argument.default_value {
            changes.push(Change::new(
                Criticality::Dangerous,
                path.clone(),
                format!(
                    "Default value of argument '{argument_name}' of field '{field_path}' changed"
                ),
            ));
        }
    }

    for (argument_name, new_argument) in &new_field.arguments {
        if old_field.arguments.contains_key(argument_name) {
            continue;
        }
        let (criticality, qualifier) = if new_argument.is_required() {
            (Criticality::Breaking, "Required argument")
        } else {
            (Criticality::Safe, "Argument")
        };
        changes.push(Change::new(
            criticality,
            format!("{field_path}.{argument_name}"),
            format!("{qualifier} '{argument_name}' was added to field '{field_name}'"),
        ));
    }
}

fn diff_input_fields(changes: &mut Vec<Change>, type_name: &str, old: &TypeEntry, new: &TypeEntry) {
    for (field_name, old_field) in &old.input_fields {
        let path = format!("{type_name}.{field_name}");
        let Some(new_field) = new.input_fields.get(field_name) else {
            changes.push(Change::new(
                Criticality::Breaking,
                path,
                format!("Input field '{field_name}' was removed from '{type_name}'"),
            ));
            continue;
        };

        if old_field.ty != new_field.ty {
            let criticality = if is_safe_input_type_change(&old_field.ty, &new_field.ty) {
                Criticality::Safe
            } else {
                Criticality::Breaking
            };
            changes.push(Change::new(
                criticality,
                path,
                format!(
                    "Input field '{type_name}.{field_name}' changed type from '{}' to '{}'",
                    old_field.ty, new_field.ty
                ),
            ));
        } else if old_field.default_value != new_field.default_value {
            changes.push(Change::new(
                Criticality::Dangerous,
                path,
                format!("Default value of input field '{type_name}.{field_name}' changed"),
            ));
        }
    }

    for (field_name, new_field) in &new.input_fields {
        if old.input_fields.contains_key(field_name) {
            continue;
        }
        let (criticality, qualifier) = if new_field.is_required() {
            (Criticality::Breaking, "Required input field")
        } else {
            (Criticality::Safe, "Input field")
        };
        changes.push(Change::new(
            criticality,
            format!("{type_name}.{field_name}"),
            format!("{qualifier} '{field_name}' was added to '{type_name}'"),
        ));
    }
}

fn diff_enum_values(changes: &mut Vec<Change>, type_name: &str, old: &TypeEntry, new: &TypeEntry) {
    for value in old.enum_values.difference(&new.enum_values) {
        changes.push(Change::new(
            Criticality::Breaking,
            format!("{type_name}.{value}"),
            format!("Enum value '{value}' was removed from enum '{type_name}'"),
        ));
    }
    for value in new.enum_values.difference(&old.enum_values) {
        changes.push(Change::new(
            Criticality::Dangerous,
            format!("{type_name}.{value}"),
            format!("Enum value '{value}' was added to enum '{type_name}'"),
        ));
    }
}

fn diff_union_members(changes: &mut Vec<Change>, type_name: &str, old: &TypeEntry, new: &TypeEntry) {
    for member in old.union_members.difference(&new.union_members) {
        changes.push(Change::new(
            Criticality::Breaking,
            format!("{type_name}.{member}"),
            format!("Member '{member}' was removed from union '{type_name}'"),
        ));
    }
    for member in new.union_members.difference(&old.union_members) {
        changes.push(Change::new(
            Criticality::Dangerous,
            format!("{type_name}.{member}"),
            format!("Member '{member}' was added to union '{type_name}'"),
        ));
    }
}

fn diff_implements(changes: &mut Vec<Change>, type_name: &str, old: &TypeEntry, new: &TypeEntry) {
    for interface in old.implements.difference(&new.implements) {
        changes.push(Change::new(
            Criticality::Breaking,
            format!("{type_name}.{interface}"),
            format!("'{type_name}' no longer implements interface '{interface}'"),
        ));
    }
    for interface in new.implements.difference(&old.implements) {
        changes.push(Change::new(
            Criticality::Dangerous,
            format!("{type_name}.{interface}"),
            format!("'{type_name}' now implements interface '{interface}'"),
        ));
    }
}

/// A field return type change is safe only when the base type is unchanged
/// and nullability does not widen: `T -> T!` is safe, `T! -> T` is breaking.
fn is_safe_output_type_change(old: &Type, new: &Type) -> bool {
    if !old.nullable && new.nullable {
        return false;
    }
    match (&old.base, &new.base) {
        (BaseType::Named(a), BaseType::Named(b)) => a == b,
        (BaseType::List(a), BaseType::List(b)) => is_safe_output_type_change(a, b),
        _ => false,
    }
}

/// An input position change is safe only when the base type is unchanged
/// and nullability does not tighten: `T! -> T` is safe, `T -> T!` is breaking.
fn is_safe_input_type_change(old: &Type, new: &Type) -> bool {
    if old.nullable && !new.nullable {
        return false;
    }
    match (&old.base, &new.base) {
        (BaseType::Named(a), BaseType::Named(b)) => a == b,
        (BaseType::List(a), BaseType::List(b)) => is_safe_input_type_change(a, b),
        _ => false,
    }
}
