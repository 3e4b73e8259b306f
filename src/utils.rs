/// Escapes text for HTML and SVG bodies and attribute values.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Formats a rating the way it is shown to users: shortest exact form, or
/// an em dash when missing.
pub fn rating_label(rating: Option<f64>) -> String {
    match rating {
        Some(r) => format!("{r}"),
        None => "—".to_string(),
    }
}

/// Formats a coordinate with at most two decimals, dropping trailing zeros.
pub fn coord(value: f64) -> String {
    let s = format!("{:.2}", value);
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-0" => "0".to_string(),
        t => t.to_string(),
    }
}
