//! Operation documents
//!
//! A request document is parsed with `graphql-parser` and lowered into an
//! owned tree in which variables are already substituted and `@skip` /
//! `@include` have been applied. The compilers only ever see this tree.

use crate::core::error::{EngineResult, InputError};
use crate::schema::DirectiveModel;
use graphql_parser::query::{
    Definition, Directive, OperationDefinition, Selection as GqlSelection, Type, TypeCondition,
    Value as GqlValue, VariableDefinition, parse_query,
};
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Response key of the introspection field resolved to the entity type name
pub const TYPENAME_FIELD: &str = "__typename";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

/// The operation selected for execution
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub selections: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(FieldSelection),
    FragmentSpread(String),
    InlineFragment {
        type_condition: Option<String>,
        selections: Vec<Selection>,
    },
}

/// A field with its arguments already resolved to JSON values
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: IndexMap<String, Value>,
    pub selections: Vec<Selection>,
}

impl FieldSelection {
    /// Key of this field in the response object
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Argument value, treating an explicit `null` as absent
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name).filter(|v| !v.is_null())
    }

    pub fn is_typename(&self) -> bool {
        self.name == TYPENAME_FIELD
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub type_condition: String,
    pub selections: Vec<Selection>,
}

/// Everything needed to compile one request
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub schema: Arc<DirectiveModel>,
    pub fragments: HashMap<String, Fragment>,
    pub operation: Operation,
    pub variables: Map<String, Value>,
}

impl QueryContext {
    /// Parse a document and select the operation to run
    ///
    /// With several operations in the document `operation_name` is required.
    pub fn parse(
        schema: Arc<DirectiveModel>,
        document: &str,
        variables: Option<HashMap<String, Value>>,
        operation_name: Option<&str>,
    ) -> EngineResult<Self> {
        let doc = parse_query::<String>(document)?;
        let provided = variables.unwrap_or_default();

        let operations: Vec<&OperationDefinition<'_, String>> = doc
            .definitions
            .iter()
            .filter_map(|def| match def {
                Definition::Operation(op) => Some(op),
                Definition::Fragment(_) => None,
            })
            .collect();

        let operation = match operation_name {
            Some(wanted) => operations
                .iter()
                .find(|op| operation_name_of(op) == Some(wanted))
                .copied()
                .ok_or_else(|| InputError::UnknownOperation {
                    name: wanted.to_string(),
                })?,
            None => match operations.as_slice() {
                [] => return Err(InputError::MissingOperation.into()),
                [single] => *single,
                _ => return Err(InputError::AmbiguousOperation.into()),
            },
        };

        let (kind, definitions, selection_set) = match operation {
            OperationDefinition::SelectionSet(set) => (OperationKind::Query, &[][..], set),
            OperationDefinition::Query(q) => {
                (OperationKind::Query, &q.variable_definitions[..], &q.selection_set)
            }
            OperationDefinition::Mutation(m) => (
                OperationKind::Mutation,
                &m.variable_definitions[..],
                &m.selection_set,
            ),
            OperationDefinition::Subscription(_) => {
                return Err(InputError::UnsupportedOperation {
                    kind: "subscription".to_string(),
                }
                .into());
            }
        };

        let variables = coerce_variables(definitions, &provided)?;
        let lowering = Lowering {
            variables: &variables,
        };

        let mut fragments = HashMap::new();
        for def in &doc.definitions {
            if let Definition::Fragment(fragment) = def {
                let TypeCondition::On(type_condition) = &fragment.type_condition;
                fragments.insert(
                    fragment.name.clone(),
                    Fragment {
                        type_condition: type_condition.clone(),
                        selections: lowering.selections(&fragment.selection_set.items)?,
                    },
                );
            }
        }

        let operation = Operation {
            kind,
            name: operation_name_of(operation).map(str::to_string),
            selections: lowering.selections(&selection_set.items)?,
        };

        tracing::debug!(
            operation = ?operation.name,
            kind = ?operation.kind,
            "parsed operation document"
        );

        Ok(Self {
            schema,
            fragments,
            operation,
            variables,
        })
    }

    /// Flatten a selection set for `type_name`
    ///
    /// Fragment spreads and inline fragments whose type condition matches are
    /// expanded in place. Fields sharing a response key are merged.
    pub fn collect_fields(
        &self,
        selections: &[Selection],
        type_name: &str,
    ) -> EngineResult<Vec<FieldSelection>> {
        let mut fields: IndexMap<String, FieldSelection> = IndexMap::new();
        let mut visited = HashSet::new();
        self.collect_into(selections, type_name, &mut fields, &mut visited)?;
        Ok(fields.into_values().collect())
    }

    /// Root fields of the selected operation
    pub fn root_fields(&self) -> EngineResult<Vec<FieldSelection>> {
        let mut fields: IndexMap<String, FieldSelection> = IndexMap::new();
        let mut visited = HashSet::new();
        self.collect_into(&self.operation.selections, "", &mut fields, &mut visited)?;
        Ok(fields.into_values().collect())
    }

    fn collect_into(
        &self,
        selections: &[Selection],
        type_name: &str,
        fields: &mut IndexMap<String, FieldSelection>,
        visited: &mut HashSet<String>,
    ) -> EngineResult<()> {
        for selection in selections {
            match selection {
                Selection::Field(field) => match fields.get_mut(field.response_key()) {
                    Some(existing) => existing.selections.extend(field.selections.iter().cloned()),
                    None => {
                        fields.insert(field.response_key().to_string(), field.clone());
                    }
                },
                Selection::FragmentSpread(name) => {
                    if !visited.insert(name.clone()) {
                        continue;
                    }
                    let fragment =
                        self.fragments
                            .get(name)
                            .ok_or_else(|| InputError::UnknownFragment {
                                name: name.clone(),
                            })?;
                    if applies_to(Some(&fragment.type_condition), type_name) {
                        self.collect_into(&fragment.selections, type_name, fields, visited)?;
                    }
                }
                Selection::InlineFragment {
                    type_condition,
                    selections,
                } => {
                    if applies_to(type_condition.as_deref(), type_name) {
                        self.collect_into(selections, type_name, fields, visited)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Root selections have no entity type; their fragments always apply
fn applies_to(type_condition: Option<&str>, type_name: &str) -> bool {
    match type_condition {
        None => true,
        Some(condition) => type_name.is_empty() || condition == type_name,
    }
}

fn operation_name_of<'a>(op: &'a OperationDefinition<'_, String>) -> Option<&'a str> {
    match op {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(q) => q.name.as_deref(),
        OperationDefinition::Mutation(m) => m.name.as_deref(),
        OperationDefinition::Subscription(s) => s.name.as_deref(),
    }
}

fn coerce_variables(
    definitions: &[VariableDefinition<'_, String>],
    provided: &HashMap<String, Value>,
) -> EngineResult<Map<String, Value>> {
    let mut coerced = Map::new();
    for def in definitions {
        let value = match (provided.get(&def.name), &def.default_value) {
            (Some(value), _) => value.clone(),
            (None, Some(default)) => constant_to_json(default)?,
            (None, None) if matches!(def.var_type, Type::NonNullType(_)) => {
                return Err(InputError::MissingVariable {
                    name: def.name.clone(),
                }
                .into());
            }
            (None, None) => Value::Null,
        };
        if value.is_null() && matches!(def.var_type, Type::NonNullType(_)) {
            return Err(InputError::MissingVariable {
                name: def.name.clone(),
            }
            .into());
        }
        coerced.insert(def.name.clone(), value);
    }
    Ok(coerced)
}

fn constant_to_json(value: &GqlValue<'_, String>) -> EngineResult<Value> {
    Lowering {
        variables: &Map::new(),
    }
    .value(value)
}

struct Lowering<'v> {
    variables: &'v Map<String, Value>,
}

impl Lowering<'_> {
    fn selections(&self, items: &[GqlSelection<'_, String>]) -> EngineResult<Vec<Selection>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                GqlSelection::Field(field) => {
                    if !self.included(&field.directives)? {
                        continue;
                    }
                    let mut arguments = IndexMap::new();
                    for (name, value) in &field.arguments {
                        arguments.insert(name.clone(), self.value(value)?);
                    }
                    out.push(Selection::Field(FieldSelection {
                        alias: field.alias.clone(),
                        name: field.name.clone(),
                        arguments,
                        selections: self.selections(&field.selection_set.items)?,
                    }));
                }
                GqlSelection::FragmentSpread(spread) => {
                    if self.included(&spread.directives)? {
                        out.push(Selection::FragmentSpread(spread.fragment_name.clone()));
                    }
                }
                GqlSelection::InlineFragment(inline) => {
                    if !self.included(&inline.directives)? {
                        continue;
                    }
                    out.push(Selection::InlineFragment {
                        type_condition: inline
                            .type_condition
                            .as_ref()
                            .map(|TypeCondition::On(name)| name.clone()),
                        selections: self.selections(&inline.selection_set.items)?,
                    });
                }
            }
        }
        Ok(out)
    }

    /// Evaluate `@skip(if:)` and `@include(if:)`
    fn included(&self, directives: &[Directive<'_, String>]) -> EngineResult<bool> {
        for directive in directives {
            let condition = directive
                .arguments
                .iter()
                .find(|(name, _)| name == "if")
                .map(|(_, value)| self.value(value))
                .transpose()?;
            let flag = condition.as_ref().and_then(Value::as_bool);
            match (directive.name.as_str(), flag) {
                ("skip", Some(true)) | ("include", Some(false)) => return Ok(false),
                ("skip" | "include", None) => {
                    return Err(InputError::MissingArgument {
                        field: format!("@{}", directive.name),
                        argument: "if".to_string(),
                    }
                    .into());
                }
                _ => {}
            }
        }
        Ok(true)
    }

    fn value(&self, value: &GqlValue<'_, String>) -> EngineResult<Value> {
        Ok(match value {
            GqlValue::Variable(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| InputError::MissingVariable { name: name.clone() })?,
            GqlValue::Null => Value::Null,
            GqlValue::Int(i) => match i.as_i64() {
                Some(i) => json!(i),
                None => {
                    return Err(InputError::InvalidValue {
                        field: "Int".to_string(),
                        message: "integer out of range".to_string(),
                    }
                    .into());
                }
            },
            GqlValue::Float(f) => json!(f),
            GqlValue::String(s) => json!(s),
            GqlValue::Boolean(b) => json!(b),
            GqlValue::Enum(e) => json!(e),
            GqlValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.value(item))
                    .collect::<EngineResult<Vec<_>>>()?,
            ),
            GqlValue::Object(fields) => {
                let mut map = Map::new();
                for (key, item) in fields {
                    map.insert(key.clone(), self.value(item)?);
                }
                Value::Object(map)
            }
        })
    }
}
