//! Entity schema and the directive model derived from it

pub mod definition;
pub mod directive;
pub mod model;

pub use definition::{FieldDefinition, RootFieldDefinition, SchemaDefinition, TypeDefinition};
pub use directive::{DirectiveModel, FieldInfo, Relation, RootField};
pub use model::{EntityType, Field, FieldType, RelationshipDirective, ScalarType};
