/// Turns raw model output into text that `serde_json` can parse.
///
/// Strips markdown code fences, drops prose before the first `{` and after the
/// last `}`, and removes trailing commas before `}` / `]`. Text with no object
/// at all is returned fence-stripped so the caller's parse fails normally.
pub fn normalize_json(raw: &str) -> String {
    let unfenced = strip_code_fences(raw);
    let trimmed = unfenced.trim();

    let object = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => return trimmed.to_string(),
    };

    remove_trailing_commas(object)
}

/// Removes fence markers and any language tag that follows an opening fence,
/// keeping whatever shares the line with them.
fn strip_code_fences(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 3..];
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        rest = &rest[tag_len..];
    }

    out.push_str(rest);
    out
}

fn remove_trailing_commas(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    out
}
