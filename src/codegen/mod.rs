//! Code generation for database-backed entities
//!
//! ```text
//! SchemaGenerationOptions -> component templates -> substitution -> GeneratedArtifact
//! ```
//!
//! - **fields**: field definitions, Drizzle column rendering and parsing
//! - **assembler**: `CodeAssembler`, which renders the connection, schema and
//!   repository files for one entity

pub mod assembler;
pub mod fields;

pub use assembler::{
    ArtifactRole, COMPONENTS_DIR, CodeAssembler, DEFAULT_CONNECTION_NAME, DEFAULT_DATABASE_TYPE,
    DEFAULT_ORM, GeneratedArtifact, GeneratedFile, SchemaGenerationOptions, content_digest,
};
pub use fields::{
    EMPTY_FIELDS_MARKER, FieldDefinition, FieldKind, ParsedField, column_imports,
    parse_field_declarations, render_columns, with_audit_timestamps,
};
