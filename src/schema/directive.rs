//! The directive model: per-field relationship metadata resolved once
//!
//! Built at schema load time from a [`SchemaDefinition`]. Every lookup the
//! compilers perform while walking a selection or a payload is a map read on
//! this immutable structure; nothing is derived per request.

use crate::core::error::{EngineResult, SchemaError};
use crate::core::naming::{pluralize, to_lower_camel, to_snake_case};
use crate::schema::definition::SchemaDefinition;
use crate::schema::model::{
    EntityType, Field, FieldType, ID_FIELD, RelationshipDirective, ScalarType,
};
use indexmap::IndexMap;
use std::collections::HashMap;

/// The resolved relational shape of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// Plain column of the owning table
    Column,
    /// Single related row found through `local_column` on the owning table
    ToOne { target: String, local_column: String },
    /// Related rows whose `foreign_column` points at the owning row
    ToMany {
        target: String,
        foreign_column: String,
    },
    /// Related rows linked through a join table
    ManyToMany {
        target: String,
        join_type: String,
        join_table: String,
        left_column: String,
        right_column: String,
    },
}

/// Everything the compilers need to know about one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub type_name: String,
    pub field_name: String,
    /// Related entity type for relationships and `ref` columns
    pub target_type: Option<String>,
    pub scalar_type: Option<ScalarType>,
    pub is_scalar: bool,
    pub is_list: bool,
    pub is_nullable: bool,
    /// Column on the owning table, if the field owns one
    pub column: Option<String>,
    pub directive: Option<RelationshipDirective>,
    pub relation: Relation,
}

/// A field of the root query type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootField {
    pub name: String,
    pub type_name: String,
    pub is_list: bool,
}

/// Immutable lookup of entity types, field metadata and root fields
#[derive(Debug, Clone)]
pub struct DirectiveModel {
    types: IndexMap<String, EntityType>,
    fields: HashMap<String, IndexMap<String, FieldInfo>>,
    roots: IndexMap<String, RootField>,
}

impl DirectiveModel {
    /// Build and validate the model from a schema definition
    pub fn build(definition: &SchemaDefinition) -> EngineResult<Self> {
        let mut types = IndexMap::new();
        for (type_name, type_def) in &definition.types {
            let fields = type_def
                .fields
                .iter()
                .map(|(name, def)| {
                    (
                        name.clone(),
                        Field {
                            name: name.clone(),
                            field_type: FieldType::parse(&def.type_name),
                            is_list: def.list,
                            is_nullable: def.nullable,
                            is_unique: def.unique,
                            directive: def.directive.clone(),
                        },
                    )
                })
                .collect();

            types.insert(
                type_name.clone(),
                EntityType {
                    name: type_name.clone(),
                    table: type_def
                        .table
                        .clone()
                        .unwrap_or_else(|| to_snake_case(type_name)),
                    fields,
                    is_join_table: type_def.join_table,
                },
            );
        }

        let mut fields = HashMap::new();
        for entity in types.values() {
            check_id_field(entity)?;
            let mut infos = IndexMap::new();
            for field in entity.fields.values() {
                infos.insert(field.name.clone(), resolve_field(&types, entity, field)?);
            }
            fields.insert(entity.name.clone(), infos);
        }

        let roots = match &definition.query {
            Some(query) => query
                .iter()
                .map(|(name, def)| {
                    if !types.contains_key(&def.type_name) {
                        return Err(SchemaError::UnknownType {
                            type_name: def.type_name.clone(),
                        }
                        .into());
                    }
                    Ok((
                        name.clone(),
                        RootField {
                            name: name.clone(),
                            type_name: def.type_name.clone(),
                            is_list: def.list,
                        },
                    ))
                })
                .collect::<EngineResult<IndexMap<_, _>>>()?,
            None => default_root_fields(&types),
        };

        tracing::debug!(
            types = types.len(),
            root_fields = roots.len(),
            "directive model built"
        );

        Ok(Self {
            types,
            fields,
            roots,
        })
    }

    /// Parse a YAML schema definition and build the model
    pub fn from_yaml_str(yaml: &str) -> EngineResult<Self> {
        Self::build(&SchemaDefinition::from_yaml_str(yaml)?)
    }

    pub fn entity(&self, type_name: &str) -> EngineResult<&EntityType> {
        self.types.get(type_name).ok_or_else(|| {
            SchemaError::UnknownType {
                type_name: type_name.to_string(),
            }
            .into()
        })
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.types.values()
    }

    /// Metadata of `type_name.field`
    ///
    /// An unknown field means the request was not validated against this
    /// schema; it is reported as a schema error rather than recovered.
    pub fn field_info(&self, type_name: &str, field: &str) -> EngineResult<&FieldInfo> {
        let infos = self
            .fields
            .get(type_name)
            .ok_or_else(|| SchemaError::UnknownType {
                type_name: type_name.to_string(),
            })?;
        infos.get(field).ok_or_else(|| {
            SchemaError::UnknownField {
                type_name: type_name.to_string(),
                field: field.to_string(),
            }
            .into()
        })
    }

    /// All fields of a type in declaration order
    pub fn fields_of(&self, type_name: &str) -> EngineResult<impl Iterator<Item = &FieldInfo>> {
        self.fields
            .get(type_name)
            .map(|infos| infos.values())
            .ok_or_else(|| {
                SchemaError::UnknownType {
                    type_name: type_name.to_string(),
                }
                .into()
            })
    }

    /// Resolve a column-backed field by its GraphQL name or by its column name
    ///
    /// Order tokens may spell a field either way (`createdAt_DESC`,
    /// `created_at_DESC`).
    pub fn column_field(&self, type_name: &str, name: &str) -> Option<&FieldInfo> {
        let infos = self.fields.get(type_name)?;
        if let Some(info) = infos.get(name) {
            return info.column.as_ref().map(|_| info);
        }
        let snake = to_snake_case(name);
        infos
            .values()
            .find(|info| info.column.as_deref() == Some(snake.as_str()))
    }

    pub fn root_field(&self, name: &str) -> EngineResult<&RootField> {
        self.roots.get(name).ok_or_else(|| {
            SchemaError::UnknownRootField {
                field: name.to_string(),
            }
            .into()
        })
    }

    pub fn root_fields(&self) -> impl Iterator<Item = &RootField> {
        self.roots.values()
    }
}

fn check_id_field(entity: &EntityType) -> EngineResult<()> {
    let valid = entity
        .field(ID_FIELD)
        .and_then(|f| f.field_type.as_scalar())
        .is_some_and(|scalar| scalar.is_identifier());
    if valid {
        Ok(())
    } else {
        Err(SchemaError::MissingIdField {
            type_name: entity.name.clone(),
        }
        .into())
    }
}

fn resolve_field(
    types: &IndexMap<String, EntityType>,
    entity: &EntityType,
    field: &Field,
) -> EngineResult<FieldInfo> {
    let invalid = |message: String| SchemaError::InvalidDirective {
        type_name: entity.name.clone(),
        field: field.name.clone(),
        message,
    };
    let require_type = |name: &str| -> Result<&EntityType, SchemaError> {
        types
            .get(name)
            .ok_or_else(|| invalid(format!("unknown type '{}'", name)))
    };

    let entity_target = match &field.field_type {
        FieldType::Entity(name) => Some(require_type(name)?.name.clone()),
        FieldType::Scalar(_) => None,
    };

    let (target_type, column, relation) = match &field.directive {
        None => {
            if entity_target.is_some() {
                return Err(invalid("relationship field requires a directive".to_string()).into());
            }
            (None, Some(to_snake_case(&field.name)), Relation::Column)
        }
        Some(RelationshipDirective::Ref { target }) => {
            require_type(target)?;
            match &entity_target {
                None => (
                    Some(target.clone()),
                    Some(to_snake_case(&field.name)),
                    Relation::Column,
                ),
                Some(typed) => {
                    if typed != target {
                        return Err(invalid(format!(
                            "field type '{}' does not match ref target '{}'",
                            typed, target
                        ))
                        .into());
                    }
                    let local_column = format!("{}_id", to_snake_case(&field.name));
                    (
                        Some(target.clone()),
                        Some(local_column.clone()),
                        Relation::ToOne {
                            target: target.clone(),
                            local_column,
                        },
                    )
                }
            }
        }
        Some(RelationshipDirective::Key { parent_field }) => {
            let target = entity_target
                .clone()
                .ok_or_else(|| invalid("key directive requires an entity type".to_string()))?;
            let parent = entity.field(parent_field).ok_or_else(|| {
                invalid(format!("key field '{}' does not exist", parent_field))
            })?;
            if !parent.is_scalar() {
                return Err(invalid(format!("key field '{}' is not a column", parent_field)).into());
            }
            (
                Some(target.clone()),
                None,
                Relation::ToOne {
                    target,
                    local_column: to_snake_case(parent_field),
                },
            )
        }
        Some(RelationshipDirective::Field {
            target,
            foreign_key,
        }) => {
            let target_entity = require_type(target)?;
            let fk = target_entity.field(foreign_key).ok_or_else(|| {
                invalid(format!(
                    "foreign key '{}' does not exist on '{}'",
                    foreign_key, target
                ))
            })?;
            if !fk.is_scalar() {
                return Err(invalid(format!("foreign key '{}' is not a column", foreign_key)).into());
            }
            (
                Some(target.clone()),
                None,
                Relation::ToMany {
                    target: target.clone(),
                    foreign_column: to_snake_case(foreign_key),
                },
            )
        }
        Some(RelationshipDirective::Type { target, keys }) => {
            let related = entity_target
                .clone()
                .ok_or_else(|| invalid("type directive requires an entity type".to_string()))?;
            let join = require_type(target)?;
            for key in keys {
                if !join.has_field(key) {
                    return Err(invalid(format!(
                        "join key '{}' does not exist on '{}'",
                        key, target
                    ))
                    .into());
                }
            }
            (
                Some(related.clone()),
                None,
                Relation::ManyToMany {
                    target: related,
                    join_type: join.name.clone(),
                    join_table: join.table.clone(),
                    left_column: to_snake_case(&keys[0]),
                    right_column: to_snake_case(&keys[1]),
                },
            )
        }
    };

    if field.is_unique && column.is_none() {
        return Err(invalid("only scalar and ref columns can be unique".to_string()).into());
    }

    Ok(FieldInfo {
        type_name: entity.name.clone(),
        field_name: field.name.clone(),
        target_type,
        scalar_type: field.field_type.as_scalar(),
        is_scalar: field.is_scalar(),
        is_list: field.is_list,
        is_nullable: field.is_nullable,
        column,
        directive: field.directive.clone(),
        relation,
    })
}

fn default_root_fields(types: &IndexMap<String, EntityType>) -> IndexMap<String, RootField> {
    let mut roots = IndexMap::new();
    for entity in types.values().filter(|t| !t.is_join_table) {
        let singular = to_lower_camel(&entity.name);
        let plural = pluralize(&singular);
        roots.insert(
            singular.clone(),
            RootField {
                name: singular,
                type_name: entity.name.clone(),
                is_list: false,
            },
        );
        roots.insert(
            plural.clone(),
            RootField {
                name: plural,
                type_name: entity.name.clone(),
                is_list: true,
            },
        );
    }
    roots
}
