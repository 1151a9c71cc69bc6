//! Error types and naming helpers shared by every layer

pub mod error;
pub mod naming;

pub use error::{
    ConfigError, EngineError, EngineResult, InputError, ResponseError, SchemaError, StorageError,
};
