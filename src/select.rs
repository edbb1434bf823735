/// A link found inside one index cell, with its visible label.
#[derive(Debug, Clone)]
pub struct Candidate<H> {
    pub label: String,
    pub handle: H,
}

impl<H> Candidate<H> {
    pub fn new(label: impl Into<String>, handle: H) -> Self {
        Self {
            label: label.into(),
            handle,
        }
    }
}

/// Pick the link whose trimmed label is longest. A cell may carry a one-glyph
/// marker link ("▲") next to the descriptive one.
///
/// Ties go to the earliest candidate. Returns `None` for an empty cell.
pub fn representative<H>(candidates: Vec<Candidate<H>>) -> Option<Candidate<H>> {
    let mut best: Option<(usize, Candidate<H>)> = None;
    for c in candidates {
        let len = c.label.trim().chars().count();
        match &best {
            Some((best_len, _)) if *best_len >= len => {}
            _ => best = Some((len, c)),
        }
    }
    best.map(|(_, mut c)| {
        c.label = c.label.trim().to_string();
        c
    })
}

// ── Tests ──
