use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static UNSAFE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[\\/*?:"<>|]"#).unwrap());
static NEWLINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\r\n|\r|\n)+").unwrap());

/// Code prefix used when the detail page had no readable title.
pub const NO_CODE: &str = "NOCODE";
/// Substituted for a description that sanitizes to nothing.
pub const EMPTY_DESCRIPTION: &str = "내용없음";
/// Category used when a cell has no enclosing table row.
pub const NO_CATEGORY: &str = "분류없음";

/// Strip filesystem-unsafe characters and fold line breaks into single spaces.
pub fn sanitize(s: &str) -> String {
    let stripped = UNSAFE_RE.replace_all(s, "");
    NEWLINES_RE.replace_all(&stripped, " ").trim().to_string()
}

/// The sanitized parts of an entry's output name, displayed as
/// `{code}_{category}_{description}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseName {
    pub code: String,
    pub category: String,
    pub description: String,
}

impl BaseName {
    pub fn new(error_code: Option<&str>, category: &str, description: &str) -> Self {
        let code = error_code
            .map(sanitize)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| NO_CODE.to_string());

        let category = match sanitize(category) {
            c if c.is_empty() => NO_CATEGORY.to_string(),
            c => c,
        };

        let description = match sanitize(description) {
            d if d.is_empty() => EMPTY_DESCRIPTION.to_string(),
            d => d,
        };

        Self {
            code,
            category,
            description,
        }
    }
}

impl fmt::Display for BaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.code, self.category, self.description)
    }
}

// ── Tests ──
