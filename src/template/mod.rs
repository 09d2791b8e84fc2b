pub mod loader;
pub mod substitution;

pub use loader::{
    ACCEPTED_LANGUAGES, CacheStats, CodeBlock, LoadOptions, TEMPLATE_EXTENSIONS, Template,
    TemplateLoader, extract_code_blocks,
};
pub use substitution::{
    PLACEHOLDER_PATTERN, SubstitutionResult, TemplateValue, TemplateVariables, find_placeholders,
    substitute,
};
