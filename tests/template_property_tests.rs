//! Property tests for placeholder substitution

use proptest::prelude::*;
use svcforge::template::{TemplateVariables, find_placeholders, substitute};

// =============================================================================
// Generators
// =============================================================================

fn arb_name() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][A-Z_]{0,11}").unwrap()
}

/// Values never contain braces, so they cannot introduce placeholders
fn arb_value() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 ._-]{0,16}").unwrap()
}

/// Literal text that cannot form a placeholder on its own
fn arb_literal() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9 ;(){}=\n]{0,12}")
        .unwrap()
        .prop_map(|text| text.replace('{', "{ "))
}

/// Template made of literal chunks with `{NAME}` placeholders between them
fn arb_template() -> impl Strategy<Value = (String, Vec<String>)> {
    prop::collection::vec((arb_literal(), arb_name()), 0..8).prop_map(|parts| {
        let mut template = String::new();
        let mut names = Vec::new();
        for (literal, name) in parts {
            template.push_str(&literal);
            template.push('{');
            template.push_str(&name);
            template.push('}');
            names.push(name);
        }
        (template, names)
    })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_fully_bound_template_is_complete(
        (template, names) in arb_template(),
        value in arb_value(),
    ) {
        let vars: TemplateVariables = names.iter().map(|name| (name.clone(), value.clone())).collect();
        let result = substitute(&template, &vars);
        prop_assert!(result.is_complete());
        prop_assert!(find_placeholders(&result.content).is_empty());
    }

    #[test]
    fn prop_substitution_is_idempotent(
        (template, names) in arb_template(),
        value in arb_value(),
        bound in prop::collection::vec(any::<bool>(), 8),
    ) {
        let vars: TemplateVariables = names
            .iter()
            .zip(bound.iter())
            .filter(|(_, bind)| **bind)
            .map(|(name, _)| (name.clone(), value.clone()))
            .collect();
        let once = substitute(&template, &vars);
        let twice = substitute(&once.content, &vars);
        prop_assert_eq!(&once.content, &twice.content);
        prop_assert_eq!(once.unsubstituted_variables, twice.unsubstituted_variables);
    }

    #[test]
    fn prop_unresolved_names_are_reported_once(
        (template, names) in arb_template(),
    ) {
        let result = substitute(&template, &TemplateVariables::new());
        let mut expected = Vec::new();
        for name in &names {
            if !expected.contains(name) {
                expected.push(name.clone());
            }
        }
        prop_assert_eq!(result.content, template);
        prop_assert_eq!(result.unsubstituted_variables, expected);
    }

    #[test]
    fn prop_text_without_placeholders_is_unchanged(
        text in arb_literal(),
        value in arb_value(),
    ) {
        let vars = TemplateVariables::new().with("ENTITY_NAME", value);
        let result = substitute(&text, &vars);
        prop_assert_eq!(&result.content, &text);
        prop_assert!(result.is_complete());
    }
}
