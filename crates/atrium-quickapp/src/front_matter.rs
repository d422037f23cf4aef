use std::collections::BTreeMap;

use crate::{DockRequest, ParseError, ParsedWindow, ParsedWindowMode};

const FRONT_MATTER_FENCE: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq)]
enum FrontMatterValue {
    Scalar(String),
    List(Vec<String>),
    Object(BTreeMap<String, String>),
}

impl FrontMatterValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::List(_) => "list",
            Self::Object(_) => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Typed front-matter fields with defaults applied.
pub(crate) struct FrontMatterFields {
    pub name: String,
    pub icon: String,
    pub version: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub dock: DockRequest,
    pub window: ParsedWindow,
    pub declared_capabilities: Vec<String>,
    pub ai_prompt: Option<String>,
}

/// Splits the document into decoded front-matter fields and the remaining
/// body. The front-matter block must open the document.
pub(crate) fn extract_front_matter(text: &str) -> Result<(FrontMatterFields, String), ParseError> {
    let mut lines = text.lines();
    loop {
        match lines.next() {
            Some(line) if line.trim().is_empty() => continue,
            Some(line) if line.trim() == FRONT_MATTER_FENCE => break,
            _ => {
                return Err(ParseError::new(
                    "front_matter_missing",
                    "document must start with a --- front-matter block",
                ))
            }
        }
    }

    let mut raw_lines = Vec::new();
    let mut closed = false;
    for line in lines.by_ref() {
        if line.trim() == FRONT_MATTER_FENCE {
            closed = true;
            break;
        }
        raw_lines.push(line);
    }
    if !closed {
        return Err(ParseError::new(
            "front_matter_unterminated",
            "front-matter block is never closed with ---",
        ));
    }

    let entries = parse_entries(&raw_lines)?;
    let fields = typed_fields(entries)?;
    let body = lines.collect::<Vec<_>>().join("\n");
    Ok((fields, body))
}

fn parse_entries(
    raw_lines: &[&str],
) -> Result<BTreeMap<String, FrontMatterValue>, ParseError> {
    let mut entries = BTreeMap::new();
    let mut index = 0;
    while index < raw_lines.len() {
        let line = raw_lines[index];
        index += 1;
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with(' ') {
            return Err(ParseError::new(
                "front_matter_invalid_nesting",
                format!("unexpected indented line outside an object: '{}'", line.trim()),
            ));
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(ParseError::new(
                "front_matter_invalid_line",
                format!("expected 'key: value', got '{}'", line.trim()),
            ));
        };
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(ParseError::new(
                "front_matter_invalid_line",
                format!("missing key before ':' in '{}'", line.trim()),
            ));
        }
        let value = value.trim();

        if value.is_empty() {
            // Nested object: consume the following indented scalar lines.
            let mut object = BTreeMap::new();
            while index < raw_lines.len() && raw_lines[index].starts_with("  ") {
                let nested = raw_lines[index];
                index += 1;
                let Some((sub_key, sub_value)) = nested.trim().split_once(':') else {
                    return Err(ParseError::new(
                        "front_matter_invalid_line",
                        format!("expected nested 'key: value', got '{}'", nested.trim()),
                    ));
                };
                let sub_value = sub_value.trim();
                if sub_value.is_empty() {
                    return Err(ParseError::new(
                        "front_matter_invalid_nesting",
                        format!("'{}.{}' nests deeper than one level", key, sub_key.trim()),
                    ));
                }
                object.insert(sub_key.trim().to_string(), unquote(sub_value));
            }
            entries.insert(key, FrontMatterValue::Object(object));
        } else if let Some(inner) = value.strip_prefix('[') {
            let Some(inner) = inner.strip_suffix(']') else {
                return Err(ParseError::new(
                    "front_matter_invalid_value",
                    format!("inline array for '{}' is not closed with ]", key),
                ));
            };
            let items = inner
                .split(',')
                .map(|item| unquote(item.trim()))
                .filter(|item| !item.is_empty())
                .collect();
            entries.insert(key, FrontMatterValue::List(items));
        } else {
            entries.insert(key, FrontMatterValue::Scalar(unquote(value)));
        }
    }
    Ok(entries)
}

fn typed_fields(
    mut entries: BTreeMap<String, FrontMatterValue>,
) -> Result<FrontMatterFields, ParseError> {
    let name = take_required_scalar(&mut entries, "name")?;
    let icon = take_required_scalar(&mut entries, "icon")?;
    let version = take_scalar(&mut entries, "version")?.unwrap_or_else(|| "0.1.0".to_string());
    let category = take_scalar(&mut entries, "category")?;
    let tags = take_list(&mut entries, "tags")?;
    let declared_capabilities = take_list(&mut entries, "capabilities")?;

    let dock = match take_scalar(&mut entries, "dock")? {
        None => DockRequest::Disabled,
        Some(value) if value.eq_ignore_ascii_case("true") => DockRequest::Enabled,
        Some(value) if value.eq_ignore_ascii_case("false") => DockRequest::Disabled,
        Some(value) => match value.parse::<u32>() {
            Ok(position) => DockRequest::Position { position },
            Err(_) => {
                return Err(ParseError::new(
                    "front_matter_invalid_value",
                    format!("'dock' must be true, false, or a position, got '{}'", value),
                ))
            }
        },
    };

    let window = ParsedWindow {
        mode: match take_scalar(&mut entries, "window")? {
            None => None,
            Some(value) => Some(match value.to_ascii_lowercase().as_str() {
                "panel" => ParsedWindowMode::Panel,
                "fullscreen" => ParsedWindowMode::Fullscreen,
                "floating" => ParsedWindowMode::Floating,
                other => {
                    return Err(ParseError::new(
                        "front_matter_invalid_value",
                        format!(
                            "'window' must be panel, fullscreen, or floating, got '{}'",
                            other
                        ),
                    ))
                }
            }),
        },
        width: take_u32(&mut entries, "width")?,
        height: take_u32(&mut entries, "height")?,
        resizable: match take_scalar(&mut entries, "resizable")? {
            None => None,
            Some(value) if value.eq_ignore_ascii_case("true") => Some(true),
            Some(value) if value.eq_ignore_ascii_case("false") => Some(false),
            Some(value) => {
                return Err(ParseError::new(
                    "front_matter_invalid_value",
                    format!("'resizable' must be true or false, got '{}'", value),
                ))
            }
        },
    };

    let ai_prompt = match entries.remove("ai") {
        None => None,
        Some(FrontMatterValue::Object(mut object)) => object.remove("prompt"),
        Some(other) => {
            return Err(ParseError::new(
                "front_matter_invalid_value",
                format!("'ai' must be a nested object, got a {}", other.kind()),
            ))
        }
    };

    // Unrecognized top-level keys are tolerated: authors experiment, and the
    // platform favors zero-install simplicity over strictness here.
    Ok(FrontMatterFields {
        name,
        icon,
        version,
        category,
        tags,
        dock,
        window,
        declared_capabilities,
        ai_prompt,
    })
}

fn take_required_scalar(
    entries: &mut BTreeMap<String, FrontMatterValue>,
    key: &str,
) -> Result<String, ParseError> {
    match take_scalar(entries, key)? {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ParseError::new(
            "front_matter_missing_field",
            format!("front-matter is missing the required '{}' field", key),
        )),
    }
}

fn take_scalar(
    entries: &mut BTreeMap<String, FrontMatterValue>,
    key: &str,
) -> Result<Option<String>, ParseError> {
    match entries.remove(key) {
        None => Ok(None),
        Some(FrontMatterValue::Scalar(value)) => Ok(Some(value)),
        Some(other) => Err(ParseError::new(
            "front_matter_invalid_value",
            format!("'{}' must be a scalar, got a {}", key, other.kind()),
        )),
    }
}

fn take_list(
    entries: &mut BTreeMap<String, FrontMatterValue>,
    key: &str,
) -> Result<Vec<String>, ParseError> {
    match entries.remove(key) {
        None => Ok(Vec::new()),
        Some(FrontMatterValue::List(items)) => Ok(items),
        // A bare scalar where a list is expected is one of the small format
        // inconsistencies the parser tolerates.
        Some(FrontMatterValue::Scalar(value)) => Ok(vec![value]),
        Some(other) => Err(ParseError::new(
            "front_matter_invalid_value",
            format!("'{}' must be an inline array, got a {}", key, other.kind()),
        )),
    }
}

fn take_u32(
    entries: &mut BTreeMap<String, FrontMatterValue>,
    key: &str,
) -> Result<Option<u32>, ParseError> {
    match take_scalar(entries, key)? {
        None => Ok(None),
        Some(value) => value.parse::<u32>().map(Some).map_err(|_| {
            ParseError::new(
                "front_matter_invalid_value",
                format!("'{}' must be a non-negative integer, got '{}'", key, value),
            )
        }),
    }
}

fn unquote(value: &str) -> String {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}
