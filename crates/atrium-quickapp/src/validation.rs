use std::sync::OnceLock;

use regex::Regex;

use crate::ParsedQuickApp;

const SHORT_DESCRIPTION_CHARS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Advisory finding from the validation pass. Never an error.
pub struct ValidationWarning {
    pub code: String,
    pub message: String,
}

impl ValidationWarning {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

fn network_call_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\bfetch\s*\(|\bXMLHttpRequest\b").expect("network pattern must compile")
    })
}

/// Inspects a parsed Quick App and returns advisory warnings: component
/// shape heuristics, a very short description, and a network call without
/// the corresponding inferred capability. Warnings never block anything.
pub fn validate_quick_app(parsed: &ParsedQuickApp) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let has_default_export = parsed.app_source.contains("export default");
    let has_named_app_export = parsed.app_source.contains("export function App")
        || parsed.app_source.contains("export const App");
    if !has_default_export && !has_named_app_export {
        warnings.push(ValidationWarning::new(
            "missing_default_export",
            "the App block has no default export and no named App export",
        ));
    }

    if !parsed.app_source.contains("function") && !parsed.app_source.contains("=>") {
        warnings.push(ValidationWarning::new(
            "component_shape",
            "the App block does not look like a component (no function found)",
        ));
    }

    if parsed.description.chars().count() < SHORT_DESCRIPTION_CHARS {
        warnings.push(ValidationWarning::new(
            "short_description",
            "description is very short; the catalog entry will look empty",
        ));
    }

    if network_call_pattern().is_match(&parsed.app_source)
        && !parsed
            .inferred_capabilities
            .iter()
            .any(|capability| capability == "network:http")
    {
        warnings.push(ValidationWarning::new(
            "missing_network_capability",
            "the App block performs a network call but 'network:http' was not inferred",
        ));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use crate::parse_quick_app;

    use super::*;

    fn doc(app_block: &str, description: &str) -> String {
        format!("---\nname: Probe\nicon: Radar\n---\n{description}\n\n```tsx App\n{app_block}\n```\n")
    }

    #[test]
    fn unit_well_formed_app_produces_no_warnings() {
        let parsed = parse_quick_app(&doc(
            "export default function Probe() { return <div />; }",
            "A long enough description for the catalog.",
        ))
        .expect("parse");
        assert!(validate_quick_app(&parsed).is_empty());
    }

    #[test]
    fn functional_missing_default_export_is_flagged() {
        let parsed = parse_quick_app(&doc(
            "function Probe() { return <div />; }",
            "A long enough description for the catalog.",
        ))
        .expect("parse");
        let warnings = validate_quick_app(&parsed);
        assert!(warnings
            .iter()
            .any(|warning| warning.code == "missing_default_export"));
    }

    #[test]
    fn unit_named_app_export_satisfies_export_heuristic() {
        let parsed = parse_quick_app(&doc(
            "export function App() { return <div />; }",
            "A long enough description for the catalog.",
        ))
        .expect("parse");
        let warnings = validate_quick_app(&parsed);
        assert!(!warnings
            .iter()
            .any(|warning| warning.code == "missing_default_export"));
    }

    #[test]
    fn functional_component_shape_and_short_description_are_flagged() {
        let parsed = parse_quick_app(&doc("export default 42;", "Tiny.")).expect("parse");
        let warnings = validate_quick_app(&parsed);
        let codes: Vec<&str> = warnings.iter().map(|warning| warning.code.as_str()).collect();
        assert!(codes.contains(&"component_shape"));
        assert!(codes.contains(&"short_description"));
    }

    #[test]
    fn regression_network_call_with_inferred_capability_is_not_flagged() {
        let parsed = parse_quick_app(&doc(
            "export default () => fetch('https://example.com');",
            "A long enough description for the catalog.",
        ))
        .expect("parse");
        let warnings = validate_quick_app(&parsed);
        assert!(!warnings
            .iter()
            .any(|warning| warning.code == "missing_network_capability"));
    }
}
