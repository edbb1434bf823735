use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static PHENOMENON_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\s*현상\s*\]").unwrap());
static DRAWING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\s*참조\s*도면\s*\]").unwrap());
static CAUSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*원인\s*및\s*조치\s*\]").unwrap());

/// Bracketed headers of a manual page, in the order they must appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Phenomenon,
    ReferenceDrawing,
    CauseAndAction,
}

impl SectionKind {
    pub const ORDER: [SectionKind; 3] = [
        SectionKind::Phenomenon,
        SectionKind::ReferenceDrawing,
        SectionKind::CauseAndAction,
    ];

    pub fn title(self) -> &'static str {
        match self {
            SectionKind::Phenomenon => "현상",
            SectionKind::ReferenceDrawing => "참조 도면",
            SectionKind::CauseAndAction => "원인 및 조치",
        }
    }

    fn header_re(self) -> &'static Regex {
        match self {
            SectionKind::Phenomenon => &*PHENOMENON_RE,
            SectionKind::ReferenceDrawing => &*DRAWING_RE,
            SectionKind::CauseAndAction => &*CAUSE_RE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("header [{}] appears before [{}]", .later.title(), .earlier.title())]
    OutOfOrder {
        earlier: SectionKind,
        later: SectionKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region<'a> {
    pub kind: SectionKind,
    pub body: &'a str,
}

/// Split `text` into the regions under each bracketed header. A region runs
/// from the end of its header to the start of the next header, or to the end
/// of the text. Absent headers yield no region.
///
/// Only the first occurrence of a header opens its region; a repeat is body
/// text of whatever region it falls in.
pub fn split_regions(text: &str) -> Result<Vec<Region<'_>>, StructureError> {
    // (kind, header start, header end)
    let mut found: Vec<(SectionKind, usize, usize)> = Vec::new();
    for kind in SectionKind::ORDER {
        if let Some(m) = kind.header_re().find(text) {
            found.push((kind, m.start(), m.end()));
        }
    }

    for pair in found.windows(2) {
        let (earlier, earlier_start, _) = pair[0];
        let (later, later_start, _) = pair[1];
        if later_start < earlier_start {
            return Err(StructureError::OutOfOrder { earlier, later });
        }
    }

    let regions = found
        .iter()
        .enumerate()
        .map(|(i, &(kind, _, body_start))| {
            let body_end = found.get(i + 1).map(|&(_, s, _)| s).unwrap_or(text.len());
            Region {
                kind,
                body: &text[body_start..body_end],
            }
        })
        .collect();

    Ok(regions)
}

// ── Tests ──
