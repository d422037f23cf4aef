use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

/// Fallback id when slug generation produces an empty string.
pub const QUICK_APP_DEFAULT_ID: &str = "quick-app";

const QUICK_APP_ID_MAX_LEN: usize = 48;

/// Detection table mapping each capability to the source patterns that
/// imply it. Inference is a superset: any single match includes the
/// capability, false positives are acceptable.
const CAPABILITY_PATTERNS: &[(&str, &[&str])] = &[
    (
        "network:http",
        &[r"\bfetch\s*\(", r"\bXMLHttpRequest\b", r"\baxios\b"],
    ),
    (
        "network:websocket",
        &[r"new\s+WebSocket\b", r"\bEventSource\b"],
    ),
    (
        "storage:local",
        &[r"\blocalStorage\b", r"\buseStoredState\s*\("],
    ),
    (
        "storage:indexed",
        &[r"\bindexedDB\b", r"\buseCollection\s*\("],
    ),
    (
        "storage:files",
        &[r"\bshowOpenFilePicker\b", r"\bshowSaveFilePicker\b"],
    ),
    ("agent:query", &[r"\buseAgent\s*\(", r"\baskAgent\s*\("]),
    ("agent:context", &[r"\buseAiContext\s*\("]),
    ("notifications:toast", &[r"\bnotify\s*\(", r"\btoast\s*\("]),
    (
        "notifications:system",
        &[r"new\s+Notification\b", r"Notification\.requestPermission"],
    ),
    ("media:camera", &[r"\bgetUserMedia\b", r"\bImageCapture\b"]),
    ("media:microphone", &[r"\bMediaRecorder\b"]),
    ("media:screen", &[r"\bgetDisplayMedia\b"]),
    (
        "system:clipboard",
        &[r"\bclipboard\b", r"\bcopyToClipboard\s*\("],
    ),
    ("system:fullscreen", &[r"\brequestFullscreen\b"]),
    ("system:shell", &[r"\brunShellCommand\s*\("]),
];

fn compiled_patterns() -> &'static Vec<(&'static str, Vec<Regex>)> {
    static PATTERNS: OnceLock<Vec<(&'static str, Vec<Regex>)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        CAPABILITY_PATTERNS
            .iter()
            .map(|(tag, patterns)| {
                let compiled = patterns
                    .iter()
                    .map(|pattern| {
                        Regex::new(pattern).expect("capability pattern table must compile")
                    })
                    .collect();
                (*tag, compiled)
            })
            .collect()
    })
}

/// Scans the combined source text against the fixed detection table and
/// returns the matching capability tags, sorted and deduplicated.
pub fn infer_capabilities(combined_source: &str) -> Vec<String> {
    let mut inferred = BTreeSet::new();
    for (tag, patterns) in compiled_patterns() {
        if patterns
            .iter()
            .any(|pattern| pattern.is_match(combined_source))
        {
            inferred.insert((*tag).to_string());
        }
    }
    inferred.into_iter().collect()
}

/// Derives a stable id from the declared name: lower-cased, non-alphanumeric
/// runs collapsed to a single separator, trimmed, length-bounded. Empty
/// results fall back to [`QUICK_APP_DEFAULT_ID`].
pub fn generate_app_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    let mut pending_separator = false;
    for character in name.chars() {
        if character.is_ascii_alphanumeric() {
            if pending_separator && !id.is_empty() {
                id.push('-');
            }
            pending_separator = false;
            id.push(character.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    id.truncate(QUICK_APP_ID_MAX_LEN);
    let id = id.trim_matches('-').to_string();
    if id.is_empty() {
        QUICK_APP_DEFAULT_ID.to_string()
    } else {
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_generate_app_id_slugifies_names() {
        assert_eq!(generate_app_id("Pomodoro Timer"), "pomodoro-timer");
        assert_eq!(generate_app_id("  Notes!! Shelf  "), "notes-shelf");
        assert_eq!(generate_app_id("Déjà Vu"), "d-j-vu");
    }

    #[test]
    fn unit_generate_app_id_falls_back_for_empty_results() {
        assert_eq!(generate_app_id(""), QUICK_APP_DEFAULT_ID);
        assert_eq!(generate_app_id("!!!"), QUICK_APP_DEFAULT_ID);
    }

    #[test]
    fn unit_generate_app_id_bounds_length() {
        let long = "a".repeat(200);
        assert!(generate_app_id(&long).len() <= 48);
    }

    #[test]
    fn functional_infer_capabilities_matches_patterns() {
        let source = r#"
            const data = await fetch("https://api.example.com");
            const socket = new WebSocket(url);
            notify("done");
            navigator.clipboard.writeText(data);
        "#;
        let inferred = infer_capabilities(source);
        assert_eq!(
            inferred,
            vec![
                "network:http".to_string(),
                "network:websocket".to_string(),
                "notifications:toast".to_string(),
                "system:clipboard".to_string(),
            ]
        );
    }

    #[test]
    fn unit_infer_capabilities_is_sorted_and_deduplicated() {
        let source = "fetch(a); fetch(b); axios.get(c);";
        assert_eq!(infer_capabilities(source), vec!["network:http".to_string()]);
    }

    #[test]
    fn unit_infer_capabilities_on_plain_source_is_empty() {
        assert!(infer_capabilities("const x = 1 + 1;").is_empty());
    }
}
