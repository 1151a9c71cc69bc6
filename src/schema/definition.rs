//! Serializable schema definition
//!
//! The compiled entity schema is handed to the engine as data, typically a
//! YAML document:
//!
//! ```yaml
//! types:
//!   User:
//!     fields:
//!       id: { type: ID }
//!       version: { type: Int }
//!       name: { type: String }
//!       classId: { type: ID, nullable: true, directive: { ref: { target: Class } } }
//!       class: { type: Class, nullable: true, directive: { key: { field: classId } } }
//!       clubs:
//!         type: Club
//!         list: true
//!         directive: { type: { target: UserClub, keys: [userId, clubId] } }
//! query:
//!   user: { type: User }
//!   users: { type: User, list: true }
//! ```
//!
//! When `query` is omitted every non-join entity gets a singular root field
//! (`user`) and a list root field (`users`).

use crate::core::error::ConfigError;
use crate::schema::model::RelationshipDirective;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The whole schema: entity types and root query fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub types: IndexMap<String, TypeDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<IndexMap<String, RootFieldDefinition>>,
}

/// One entity type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// Synthetic many-to-many link type
    #[serde(default)]
    pub join_table: bool,

    /// Overrides the snake_case table name derived from the type name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    pub fields: IndexMap<String, FieldDefinition>,
}

/// One field of an entity type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default)]
    pub list: bool,

    #[serde(default)]
    pub nullable: bool,

    #[serde(default)]
    pub unique: bool,

    /// Single-key map such as `{ ref: { target: Class } }`
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_yaml::with::singleton_map"
    )]
    pub directive: Option<RelationshipDirective>,
}

/// A field of the root query type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootFieldDefinition {
    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default)]
    pub list: bool,
}

impl SchemaDefinition {
    /// Load a schema definition from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            file: Some(path.to_string()),
            message: e.to_string(),
        })
    }

    /// Load a schema definition from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_schema() {
        let def = SchemaDefinition::from_yaml_str(
            r#"
types:
  Club:
    fields:
      id: { type: ID }
      name: { type: String, unique: true }
"#,
        )
        .unwrap();

        let club = &def.types["Club"];
        assert!(!club.join_table);
        assert!(club.table.is_none());
        assert_eq!(club.fields.len(), 2);
        assert!(club.fields["name"].unique);
        assert!(!club.fields["name"].nullable);
        assert!(def.query.is_none());
    }

    #[test]
    fn test_relationship_directives_are_single_key_maps() {
        let def = SchemaDefinition::from_yaml_str(
            r#"
types:
  User:
    fields:
      id: { type: ID }
      classId: { type: ID, nullable: true, directive: { ref: { target: Class } } }
      class: { type: Class, nullable: true, directive: { key: { field: classId } } }
      clubs:
        type: Club
        list: true
        directive: { type: { target: UserClub, keys: [userId, clubId] } }
  Class:
    fields:
      id: { type: ID }
      users: { type: User, list: true, directive: { field: { target: User, key: classId } } }
"#,
        )
        .unwrap();

        let user = &def.types["User"].fields;
        assert_eq!(
            user["classId"].directive,
            Some(RelationshipDirective::Ref {
                target: "Class".to_string()
            })
        );
        assert_eq!(
            user["class"].directive,
            Some(RelationshipDirective::Key {
                parent_field: "classId".to_string()
            })
        );
        assert!(matches!(
            user["clubs"].directive,
            Some(RelationshipDirective::Type { .. })
        ));
        assert!(user["id"].directive.is_none());
        assert_eq!(
            def.types["Class"].fields["users"].directive,
            Some(RelationshipDirective::Field {
                target: "User".to_string(),
                foreign_key: "classId".to_string()
            })
        );

        let yaml = serde_yaml::to_string(&def).unwrap();
        assert!(yaml.contains("ref:"));
        let reparsed = SchemaDefinition::from_yaml_str(&yaml).unwrap();
        assert_eq!(reparsed.types["User"].fields["classId"].directive, user["classId"].directive);
    }

    #[test]
    fn test_field_order_is_preserved() {
        let def = SchemaDefinition::from_yaml_str(
            r#"
types:
  Club:
    fields:
      zeta: { type: String }
      id: { type: ID }
      alpha: { type: Int }
"#,
        )
        .unwrap();

        let names: Vec<&str> = def.types["Club"].fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zeta", "id", "alpha"]);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = SchemaDefinition::from_yaml_str("types: [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SchemaDefinition::from_yaml_file("/nonexistent/schema.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
