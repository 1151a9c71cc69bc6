//! Entity types, fields and relationship directives

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Managed column names shared by every mutable entity
pub const ID_FIELD: &str = "id";
pub const VERSION_FIELD: &str = "version";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";
pub const IS_DELETED_FIELD: &str = "isDeleted";

/// The closed set of scalar types a column can have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    #[serde(rename = "ID")]
    Id,
    #[serde(rename = "UUID")]
    Uuid,
    Int,
    Float,
    String,
    Boolean,
    Date,
    #[serde(rename = "JSON")]
    Json,
}

impl ScalarType {
    /// Parse a GraphQL type name, returning `None` for entity type names
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ID" => Some(ScalarType::Id),
            "UUID" => Some(ScalarType::Uuid),
            "Int" => Some(ScalarType::Int),
            "Float" => Some(ScalarType::Float),
            "String" => Some(ScalarType::String),
            "Boolean" => Some(ScalarType::Boolean),
            "Date" => Some(ScalarType::Date),
            "JSON" => Some(ScalarType::Json),
            _ => None,
        }
    }

    /// Whether values of this type identify rows
    pub fn is_identifier(&self) -> bool {
        matches!(self, ScalarType::Id | ScalarType::Uuid)
    }
}

/// The declared type of a field: a scalar or another entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ScalarType),
    Entity(String),
}

impl FieldType {
    pub fn parse(name: &str) -> Self {
        match ScalarType::parse(name) {
            Some(scalar) => FieldType::Scalar(scalar),
            None => FieldType::Entity(name.to_string()),
        }
    }

    pub fn as_scalar(&self) -> Option<ScalarType> {
        match self {
            FieldType::Scalar(scalar) => Some(*scalar),
            FieldType::Entity(_) => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            FieldType::Scalar(ScalarType::Id) => "ID",
            FieldType::Scalar(ScalarType::Uuid) => "UUID",
            FieldType::Scalar(ScalarType::Int) => "Int",
            FieldType::Scalar(ScalarType::Float) => "Float",
            FieldType::Scalar(ScalarType::String) => "String",
            FieldType::Scalar(ScalarType::Boolean) => "Boolean",
            FieldType::Scalar(ScalarType::Date) => "Date",
            FieldType::Scalar(ScalarType::Json) => "JSON",
            FieldType::Entity(name) => name,
        }
    }
}

/// How a field maps onto the relational model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipDirective {
    /// Foreign key column on this table pointing at `target.id`
    Ref { target: String },
    /// To-one relationship through the foreign key column of `field` on this table
    Key {
        #[serde(rename = "field")]
        parent_field: String,
    },
    /// To-many relationship through `foreign_key` on the target table
    Field {
        target: String,
        #[serde(rename = "key")]
        foreign_key: String,
    },
    /// To-many relationship through the join table `target`;
    /// `keys[0]` points at this row, `keys[1]` at the related row
    Type { target: String, keys: [String; 2] },
}

/// A field of an entity type
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub is_list: bool,
    pub is_nullable: bool,
    pub is_unique: bool,
    pub directive: Option<RelationshipDirective>,
}

impl Field {
    /// Whether the field reads as a plain column value
    ///
    /// A `ref` field typed as the target entity owns a column too, but it is
    /// selected like a to-one relationship and therefore is not scalar.
    pub fn is_scalar(&self) -> bool {
        match &self.directive {
            None | Some(RelationshipDirective::Ref { .. }) => self.field_type.as_scalar().is_some(),
            Some(_) => false,
        }
    }
}

/// A relational entity: one table, ordered fields
#[derive(Debug, Clone, PartialEq)]
pub struct EntityType {
    pub name: String,
    /// SQL table name
    pub table: String,
    pub fields: IndexMap<String, Field>,
    pub is_join_table: bool,
}

impl EntityType {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Entities with a `version` column take part in optimistic locking
    pub fn is_versioned(&self) -> bool {
        self.has_field(VERSION_FIELD)
    }

    /// Entities with an `isDeleted` column are soft deleted
    pub fn is_soft_deletable(&self) -> bool {
        self.has_field(IS_DELETED_FIELD)
    }

    /// Fields written by the engine rather than taken from payloads
    pub fn is_managed_field(name: &str) -> bool {
        matches!(
            name,
            VERSION_FIELD | CREATED_AT_FIELD | UPDATED_AT_FIELD | IS_DELETED_FIELD
        )
    }
}
