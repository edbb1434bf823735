use super::sections::SectionKind;

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

fn body_lines(body: &str) -> impl Iterator<Item = &str> {
    body.lines().map(str::trim).filter(|l| !l.is_empty())
}

/// Render one section body as an HTML fragment, or `None` when it has no text.
///
/// Cause-and-action lines become ordered list items; other sections become a
/// paragraph with `<br>` between lines.
pub fn section_fragment(kind: SectionKind, body: &str) -> Option<String> {
    let lines: Vec<String> = body_lines(body).map(escape_html).collect();
    if lines.is_empty() {
        return None;
    }

    let inner = match kind {
        SectionKind::CauseAndAction => {
            let items: String = lines.iter().map(|l| format!("<li>{}</li>", l)).collect();
            format!("<ol>{}</ol>", items)
        }
        _ => format!("<p>{}</p>", lines.join("<br>")),
    };

    Some(format!("<h3>{}</h3>{}", escape_html(kind.title()), inner))
}

// ── Tests ──
