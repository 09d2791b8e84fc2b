//! Extraction of diagnostics and contract declarations from tool output and sources
//!
//! Each extraction regex lives behind one `DiagnosticParser` implementation.
//! Parsers work line by line so a match never spans two lines.

use crate::validation::types::{BuildError, DiagnosticSeverity, TypeScriptError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

pub static TYPESCRIPT_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([^(]+)\((\d+),(\d+)\):\s*(error|warning)\s+(TS\d+)?:\s*(.+)")
        .expect("typescript diagnostic pattern compiles")
});

static BUILD_ERROR_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)error\s+(?:TS\d+)?:\s*(.+)").expect("build error pattern compiles"),
        Regex::new(r"(?i)Error:\s*(.+)").expect("build error pattern compiles"),
    ]
});

static SOURCE_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([^\s(:]+\.(?:ts|tsx|js|mjs|cjs))(?:\(\d+,\d+\)|:\d+:\d+)")
        .expect("source location pattern compiles")
});

pub static MESSAGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@MessagePattern\s*\(['"]([^'"]+)['"]\)"#).expect("message pattern compiles")
});

pub static EVENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@EventPattern\s*\(['"]([^'"]+)['"]\)"#).expect("event pattern compiles")
});

/// Decorator calls as emitted by the TypeScript compiler: `(0, microservices_1.MessagePattern)('…')`
static COMPILED_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\(0,\s*[\w$]+\.(MessagePattern|EventPattern)\)\s*\(['"]([^'"]+)['"]\)"#)
        .expect("compiled pattern compiles")
});

/// `service-name.action`
static CONTRACT_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9-]+\.[a-z][a-zA-Z0-9]*$").expect("contract shape pattern compiles")
});

/// Message printed when a build fails without a recognisable diagnostic
pub const GENERIC_BUILD_FAILURE: &str = "Build failed (see output for details)";

pub trait DiagnosticParser {
    type Diagnostic;

    fn parse(&self, text: &str) -> Vec<Self::Diagnostic>;
}

/// `file(line,col): error TS1234: message`
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeScriptDiagnosticParser;

impl DiagnosticParser for TypeScriptDiagnosticParser {
    type Diagnostic = TypeScriptError;

    fn parse(&self, text: &str) -> Vec<TypeScriptError> {
        text.lines()
            .filter_map(|line| {
                let caps = TYPESCRIPT_ERROR.captures(line)?;
                let severity = match &caps[4] {
                    "warning" => DiagnosticSeverity::Warning,
                    _ => DiagnosticSeverity::Error,
                };
                Some(TypeScriptError {
                    file: caps[1].trim().to_string(),
                    line: caps[2].parse().ok(),
                    column: caps[3].parse().ok(),
                    message: caps[6].trim().to_string(),
                    code: caps.get(5).map(|code| code.as_str().to_string()),
                    severity: Some(severity),
                })
            })
            .collect()
    }
}

/// Build tool output; first matching pattern per line wins
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildDiagnosticParser;

impl DiagnosticParser for BuildDiagnosticParser {
    type Diagnostic = BuildError;

    fn parse(&self, text: &str) -> Vec<BuildError> {
        text.lines()
            .filter_map(|line| {
                let message = BUILD_ERROR_PATTERNS
                    .iter()
                    .find_map(|pattern| pattern.captures(line))
                    .map(|caps| caps[1].trim().to_string())
                    .filter(|message| !message.is_empty())?;
                let file = SOURCE_LOCATION
                    .captures(line)
                    .map(|caps| caps[1].to_string());
                Some(BuildError { message, file })
            })
            .collect()
    }
}

impl BuildDiagnosticParser {
    /// Diagnostics for a failed build, never empty
    pub fn parse_failure(&self, text: &str) -> Vec<BuildError> {
        let mut errors = self.parse(text);
        if errors.is_empty() {
            errors.push(BuildError {
                message: GENERIC_BUILD_FAILURE.to_string(),
                file: None,
            });
        }
        errors
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ContractKind {
    Message,
    Event,
}

/// One contract pattern declaration found in a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractDeclaration {
    pub pattern: String,
    pub kind: ContractKind,
    /// 1-based
    pub line: usize,
}

impl ContractDeclaration {
    pub fn is_well_formed(&self) -> bool {
        is_well_formed_contract(&self.pattern)
    }
}

pub fn is_well_formed_contract(pattern: &str) -> bool {
    CONTRACT_SHAPE.is_match(pattern)
}

/// `@MessagePattern` / `@EventPattern` declarations, optionally with compiled call forms
#[derive(Debug, Clone, Copy, Default)]
pub struct ContractPatternParser {
    include_compiled: bool,
}

impl ContractPatternParser {
    /// Decorators in TypeScript sources
    pub fn source() -> Self {
        Self {
            include_compiled: false,
        }
    }

    /// Decorators plus compiled JavaScript call forms
    pub fn compiled() -> Self {
        Self {
            include_compiled: true,
        }
    }
}

impl DiagnosticParser for ContractPatternParser {
    type Diagnostic = ContractDeclaration;

    fn parse(&self, text: &str) -> Vec<ContractDeclaration> {
        let mut declarations = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            for caps in MESSAGE_PATTERN.captures_iter(line) {
                declarations.push(ContractDeclaration {
                    pattern: caps[1].to_string(),
                    kind: ContractKind::Message,
                    line: line_no,
                });
            }
            for caps in EVENT_PATTERN.captures_iter(line) {
                declarations.push(ContractDeclaration {
                    pattern: caps[1].to_string(),
                    kind: ContractKind::Event,
                    line: line_no,
                });
            }
            if self.include_compiled {
                for caps in COMPILED_PATTERN.captures_iter(line) {
                    let kind = match &caps[1] {
                        "EventPattern" => ContractKind::Event,
                        _ => ContractKind::Message,
                    };
                    declarations.push(ContractDeclaration {
                        pattern: caps[2].to_string(),
                        kind,
                        line: line_no,
                    });
                }
            }
        }
        declarations
    }
}
