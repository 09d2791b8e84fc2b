//! Entity source assembly from ORM component templates

use crate::codegen::fields::{
    FieldDefinition, column_imports, lower_first, render_columns, to_camel_case, to_snake_case,
    with_audit_timestamps,
};
use crate::error::{FailureKind, GenerationError};
use crate::template::{LoadOptions, TemplateLoader, TemplateVariables};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_ORM: &str = "drizzle";
pub const DEFAULT_CONNECTION_NAME: &str = "main-db";
pub const DEFAULT_DATABASE_TYPE: &str = "postgresql";

/// Directory under the template root holding per-ORM component templates
pub const COMPONENTS_DIR: &str = "components";

const CONNECTION_TEMPLATE: &str = "connection.ts.mdx";
const SCHEMA_TEMPLATE: &str = "schema.mdx";
const REPOSITORY_TEMPLATE: &str = "repository.mdx";

fn default_orm() -> String {
    DEFAULT_ORM.to_string()
}

fn default_connection_name() -> String {
    DEFAULT_CONNECTION_NAME.to_string()
}

fn default_database_type() -> String {
    DEFAULT_DATABASE_TYPE.to_string()
}

/// Input for one entity's generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaGenerationOptions {
    pub entity_name: String,
    pub table_name: String,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    #[serde(default = "default_orm")]
    pub orm: String,
    #[serde(default = "default_connection_name")]
    pub connection_name: String,
    #[serde(default = "default_database_type")]
    pub database_type: String,
}

impl SchemaGenerationOptions {
    pub fn new(entity_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            table_name: table_name.into(),
            fields: Vec::new(),
            orm: default_orm(),
            connection_name: default_connection_name(),
            database_type: default_database_type(),
        }
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDefinition>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn with_orm(mut self, orm: impl Into<String>) -> Self {
        self.orm = orm.into();
        self
    }

    pub fn with_connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = name.into();
        self
    }

    pub fn with_database_type(mut self, database_type: impl Into<String>) -> Self {
        self.database_type = database_type.into();
        self
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.entity_name.trim().is_empty() {
            return Err(GenerationError::InvalidOptions(
                "entity name must not be empty".into(),
            ));
        }
        if self.table_name.trim().is_empty() {
            return Err(GenerationError::InvalidOptions(
                "table name must not be empty".into(),
            ));
        }
        if self.orm.trim().is_empty() || self.orm.contains(['/', '\\', '.']) {
            return Err(GenerationError::InvalidOptions(format!(
                "orm '{}' is not a plain component name",
                self.orm
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(GenerationError::InvalidOptions(
                    "field name must not be empty".into(),
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(GenerationError::InvalidOptions(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
        }
        Ok(())
    }

    fn component_path(&self, file: &str) -> PathBuf {
        Path::new(COMPONENTS_DIR).join(&self.orm).join(file)
    }

    /// `process.env.DATABASE_URL_<NAME>` for the configured connection
    pub fn database_url_expression(&self) -> String {
        let suffix: String = self
            .connection_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("process.env.DATABASE_URL_{suffix}")
    }
}

/// Logical role of a generated file
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactRole {
    Connection,
    Schema,
    Repository,
}

impl ArtifactRole {
    pub const ALL: [ArtifactRole; 3] = [
        ArtifactRole::Connection,
        ArtifactRole::Schema,
        ArtifactRole::Repository,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactRole::Connection => "connection",
            ArtifactRole::Schema => "schema",
            ArtifactRole::Repository => "repository",
        }
    }
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rendered source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFile {
    pub role: ArtifactRole,
    /// Suggested location relative to the service root
    pub path: String,
    pub content: String,
    pub sha256: String,
    pub unsubstituted_variables: Vec<String>,
    /// `unresolvedPlaceholder` when any placeholder survived substitution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl GeneratedFile {
    fn new(
        role: ArtifactRole,
        path: String,
        content: String,
        unsubstituted_variables: Vec<String>,
    ) -> Self {
        let sha256 = content_digest(&content);
        let failure =
            (!unsubstituted_variables.is_empty()).then_some(FailureKind::UnresolvedPlaceholder);
        Self {
            role,
            path,
            content,
            sha256,
            unsubstituted_variables,
            failure,
        }
    }
}

/// Generated sources for one entity, keyed by role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub entity_name: String,
    pub orm: String,
    pub files: BTreeMap<ArtifactRole, GeneratedFile>,
}

impl GeneratedArtifact {
    pub fn file(&self, role: ArtifactRole) -> Option<&GeneratedFile> {
        self.files.get(&role)
    }

    pub fn content(&self, role: ArtifactRole) -> Option<&str> {
        self.file(role).map(|file| file.content.as_str())
    }

    /// Union of unresolved placeholders across files, first seen first
    pub fn unsubstituted_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for file in self.files.values() {
            for name in &file.unsubstituted_variables {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    pub fn is_complete(&self) -> bool {
        self.files
            .values()
            .all(|file| file.unsubstituted_variables.is_empty())
    }
}

/// Hex SHA-256 of generated content
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Renders connection, schema and repository sources from component templates
#[derive(Clone)]
pub struct CodeAssembler {
    loader: Arc<TemplateLoader>,
    load_options: LoadOptions,
}

impl CodeAssembler {
    pub fn new(loader: Arc<TemplateLoader>) -> Self {
        Self {
            loader,
            load_options: LoadOptions::default(),
        }
    }

    pub fn with_load_options(mut self, options: LoadOptions) -> Self {
        self.load_options = options;
        self
    }

    pub fn loader(&self) -> &Arc<TemplateLoader> {
        &self.loader
    }

    /// Generate all three files for an entity
    pub fn generate(
        &self,
        options: &SchemaGenerationOptions,
    ) -> Result<GeneratedArtifact, GenerationError> {
        options.validate()?;
        let started = Instant::now();
        tracing::info!(
            entity = %options.entity_name,
            table = %options.table_name,
            orm = %options.orm,
            connection = %options.connection_name,
            fields = options.fields.len(),
            "generating entity sources"
        );

        let mut files = BTreeMap::new();
        for file in [
            self.generate_connection(options)?,
            self.generate_schema(options)?,
            self.generate_repository(options)?,
        ] {
            files.insert(file.role, file);
        }

        let artifact = GeneratedArtifact {
            entity_name: options.entity_name.clone(),
            orm: options.orm.clone(),
            files,
        };
        tracing::info!(
            entity = %artifact.entity_name,
            unresolved = artifact.unsubstituted_variables().len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "entity sources generated"
        );
        Ok(artifact)
    }

    pub fn generate_connection(
        &self,
        options: &SchemaGenerationOptions,
    ) -> Result<GeneratedFile, GenerationError> {
        options.validate()?;
        let variables = base_variables(options)
            .with("CONNECTION_NAME", &options.connection_name)
            .with("DATABASE_TYPE", &options.database_type)
            .with("DATABASE_URL", options.database_url_expression());
        let path = format!("src/database/{}.connection.ts", options.connection_name);
        self.render(ArtifactRole::Connection, CONNECTION_TEMPLATE, options, &variables, path)
    }

    pub fn generate_schema(
        &self,
        options: &SchemaGenerationOptions,
    ) -> Result<GeneratedFile, GenerationError> {
        options.validate()?;
        let fields = with_audit_timestamps(&options.fields);
        let imports = column_imports(&fields);
        let variables = base_variables(options)
            .with("FIELDS", render_columns(&fields))
            .with("COLUMN_IMPORTS", imports.join(", "));
        let path = format!(
            "src/database/schema/{}.schema.ts",
            to_snake_case(&options.table_name)
        );
        self.render(ArtifactRole::Schema, SCHEMA_TEMPLATE, options, &variables, path)
    }

    pub fn generate_repository(
        &self,
        options: &SchemaGenerationOptions,
    ) -> Result<GeneratedFile, GenerationError> {
        options.validate()?;
        let variables = base_variables(options);
        let module = to_snake_case(&options.entity_name).replace('_', "-");
        let path = format!("src/{module}/{module}.repository.ts");
        self.render(ArtifactRole::Repository, REPOSITORY_TEMPLATE, options, &variables, path)
    }

    fn render(
        &self,
        role: ArtifactRole,
        template_file: &str,
        options: &SchemaGenerationOptions,
        variables: &TemplateVariables,
        path: String,
    ) -> Result<GeneratedFile, GenerationError> {
        let template_path = options.component_path(template_file);
        let result =
            self.loader
                .load_and_substitute(&template_path, variables, self.load_options)?;
        if !result.is_complete() {
            tracing::warn!(
                role = %role,
                template = %template_path.display(),
                unresolved = ?result.unsubstituted_variables,
                "generated file has unresolved placeholders"
            );
        }
        Ok(GeneratedFile::new(
            role,
            path,
            result.content,
            result.unsubstituted_variables,
        ))
    }
}

/// Variables shared by every component template
fn base_variables(options: &SchemaGenerationOptions) -> TemplateVariables {
    TemplateVariables::new()
        .with("ENTITY_NAME", &options.entity_name)
        .with("ENTITY_NAME_LOWER", lower_first(&options.entity_name))
        .with("TABLE_NAME", &options.table_name)
        .with("SCHEMA", to_camel_case(&options.table_name))
        .with("ORM", &options.orm)
}
