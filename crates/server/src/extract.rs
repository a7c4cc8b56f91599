#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedOutput {
    pub raw: String,
}

impl std::fmt::Display for MalformedOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "oracle output is not a JSON object ({} bytes)", self.raw.len())
    }
}

impl std::error::Error for MalformedOutput {}

pub fn extract_report(raw: &str) -> Result<serde_json::Value, MalformedOutput> {
    let text = strip_fences(raw.trim());

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text)
        && value.is_object()
    {
        return Ok(value);
    }

    if let Some(fragment) = first_json_object(&text)
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(&fragment)
    {
        return Ok(value);
    }

    Err(MalformedOutput {
        raw: raw.to_string(),
    })
}

fn strip_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !(trimmed.starts_with("```") && trimmed.ends_with("```")) {
        return trimmed.to_string();
    }

    let mut lines = trimmed.lines();
    let _ = lines.next();
    let mut out = String::new();
    for line in lines {
        if line.trim() == "```" {
            break;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

fn first_json_object(raw: &str) -> Option<String> {
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in raw.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' && in_string {
            escaped = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        if ch == '{' {
            if depth == 0 {
                start = Some(idx);
            }
            depth += 1;
            continue;
        }
        if ch == '}' {
            if depth == 0 {
                continue;
            }
            depth -= 1;
            if depth == 0
                && let Some(begin) = start
            {
                return Some(raw[begin..=idx].to_string());
            }
        }
    }
    None
}
