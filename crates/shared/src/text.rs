//! Text helpers for rendering user input into emails and logs.

/// Escapes the five HTML-significant characters.
pub fn escape_html(input: &str) -> String {
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

/// Escapes text for HTML and turns newlines into `<br>` tags.
pub fn html_paragraph(input: &str) -> String {
    escape_html(input).replace('\n', "<br>")
}

/// Returns at most `max_chars` characters of `input`, cut on a char boundary.
pub fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

/// Truncates to `max_chars` and appends `suffix` only when something was cut.
pub fn truncate_with_suffix(input: &str, max_chars: usize, suffix: &str) -> String {
    let head = truncate_chars(input, max_chars);
    if head.len() < input.len() {
        format!("{}{}", head, suffix)
    } else {
        head.to_string()
    }
}

/// Treats empty and whitespace-only strings as absent.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
