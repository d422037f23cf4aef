#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Tagged code blocks extracted from one document.
pub(crate) struct CodeBlocks {
    pub app: Option<String>,
    pub helpers: Option<String>,
    pub store: Option<String>,
    pub settings: Option<String>,
    pub stylesheet: Option<String>,
}

/// Extracts all fenced code blocks, keyed by their optional logical tag.
/// The first block per tag wins; an unterminated fence runs to end of input
/// (a tolerated format inconsistency).
pub(crate) fn extract_code_blocks(body: &str) -> CodeBlocks {
    let mut blocks = CodeBlocks::default();
    let mut current: Option<(String, String, Vec<&str>)> = None;

    for line in body.lines() {
        match current.as_mut() {
            Some((language, tag, collected)) => {
                if line.trim() == "```" {
                    let content = collected.join("\n");
                    assign_block(&mut blocks, language, tag, content);
                    current = None;
                } else {
                    collected.push(line);
                }
            }
            None => {
                if let Some(info) = line.trim().strip_prefix("```") {
                    let mut parts = info.split_whitespace();
                    let language = parts.next().unwrap_or_default().to_ascii_lowercase();
                    let tag = parts.next().unwrap_or_default().to_string();
                    current = Some((language, tag, Vec::new()));
                }
            }
        }
    }
    if let Some((language, tag, collected)) = current {
        assign_block(&mut blocks, &language, &tag, collected.join("\n"));
    }
    blocks
}

fn assign_block(blocks: &mut CodeBlocks, language: &str, tag: &str, content: String) {
    let slot = if tag.eq_ignore_ascii_case("app") {
        &mut blocks.app
    } else if tag.eq_ignore_ascii_case("helpers") {
        &mut blocks.helpers
    } else if tag.eq_ignore_ascii_case("store") {
        &mut blocks.store
    } else if tag.eq_ignore_ascii_case("settings") {
        &mut blocks.settings
    } else if tag.is_empty() && language == "css" {
        &mut blocks.stylesheet
    } else {
        return;
    };
    if slot.is_none() {
        *slot = Some(content);
    }
}

/// Extracts the description: the first contiguous run of non-heading,
/// non-table prose lines in the body, truncated to `max_chars`.
pub(crate) fn extract_description(body: &str, max_chars: usize) -> String {
    let mut collected: Vec<&str> = Vec::new();
    let mut in_fence = false;
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            if !collected.is_empty() {
                break;
            }
            continue;
        }
        if in_fence {
            continue;
        }
        let is_prose = !trimmed.is_empty()
            && !trimmed.starts_with('#')
            && !trimmed.starts_with('|');
        if is_prose {
            collected.push(trimmed);
        } else if !collected.is_empty() {
            break;
        }
    }
    let description = collected.join(" ");
    if description.chars().count() > max_chars {
        description.chars().take(max_chars).collect()
    } else {
        description
    }
}

/// Locates a markdown table under a `## <heading>` section and parses its
/// rows into (first cell, second cell) pairs. Absence is not an error.
pub(crate) fn extract_section_table(body: &str, heading: &str) -> Vec<(String, String)> {
    let mut lines = body.lines();
    for line in lines.by_ref() {
        if let Some(title) = line.trim().strip_prefix("##") {
            if title.trim().eq_ignore_ascii_case(heading) {
                break;
            }
        }
    }

    let mut rows = Vec::new();
    let mut seen_header = false;
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if rows.is_empty() && !seen_header {
                continue;
            }
            break;
        }
        if !trimmed.starts_with('|') {
            break;
        }
        let cells: Vec<&str> = trimmed
            .trim_matches('|')
            .split('|')
            .map(str::trim)
            .collect();
        if cells.len() < 2 {
            continue;
        }
        let is_separator = cells
            .iter()
            .all(|cell| !cell.is_empty() && cell.chars().all(|c| c == '-' || c == ':'));
        if is_separator {
            continue;
        }
        if !seen_header {
            seen_header = true;
            continue;
        }
        rows.push((cells[0].to_string(), cells[1].to_string()));
    }
    rows
}
