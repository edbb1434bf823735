//! Recognized-text parser for manual screenshots.
//!
//! A well-formed page reads roughly:
//!
//! ```text
//! 검출 FLAG : A1/B2
//! 참조 도면 : D-104
//! [현상]
//! ...
//! [참조 도면]
//! ...
//! [원인 및 조치]
//! ...
//! ```
//!
//! Flag and drawing code are matched independently; the bracketed sections
//! are cut out in that fixed order. [`parse`] never fails: anything it cannot
//! read is reported through sentinel values, and a rejected section layout
//! only replaces the markup.

pub mod render;
pub mod sections;

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use sections::SectionKind;

static FLAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)검출[ \t]*(?i:flag)[ \t]*[:：][ \t]*([^\r\n]*)").unwrap());
static DRAWING_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)참조[ \t]*도면[ \t]*(?:번호|코드)?[ \t]*[:：][ \t]*([^\r\n]*)").unwrap()
});

pub const EXTRACTION_FAILED: &str = "extraction failed";
pub const NO_OCR_RESULT: &str = "no OCR result";
pub const PARSE_ERROR: &str = "parse error";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderedSections {
    pub phenomenon: Option<String>,
    pub reference_drawing: Option<String>,
    pub cause_and_action: Option<String>,
}

impl RenderedSections {
    fn set(&mut self, kind: SectionKind, fragment: String) {
        match kind {
            SectionKind::Phenomenon => self.phenomenon = Some(fragment),
            SectionKind::ReferenceDrawing => self.reference_drawing = Some(fragment),
            SectionKind::CauseAndAction => self.cause_and_action = Some(fragment),
        }
    }

    /// Present fragments concatenated in header order.
    pub fn html(&self) -> String {
        [
            &self.phenomenon,
            &self.reference_drawing,
            &self.cause_and_action,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Markup {
    Sections(RenderedSections),
    NoOcrResult,
    ParseError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManualRecord {
    pub flag: String,
    pub drawing_code: String,
    pub markup: Markup,
}

impl ManualRecord {
    pub fn no_ocr_result() -> Self {
        Self {
            flag: NO_OCR_RESULT.to_string(),
            drawing_code: NO_OCR_RESULT.to_string(),
            markup: Markup::NoOcrResult,
        }
    }


    /// The markup column as exported: section HTML, or the sentinel text.
    pub fn markup_html(&self) -> String {
        match &self.markup {
            Markup::Sections(s) => s.html(),
            Markup::NoOcrResult => NO_OCR_RESULT.to_string(),
            Markup::ParseError(reason) => format!(
                "<p class=\"parse-error\">{}: {}</p>",
                PARSE_ERROR,
                render::escape_html(reason)
            ),
        }
    }
}

fn capture_value(re: &Regex, text: &str) -> String {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| EXTRACTION_FAILED.to_string())
}

pub fn parse(text: &str) -> ManualRecord {
    if text.trim().is_empty() {
        return ManualRecord::no_ocr_result();
    }

    // Flag and code do not depend on the section layout.
    let flag = capture_value(&FLAG_RE, text);
    let drawing_code = capture_value(&DRAWING_CODE_RE, text);

    let markup = match sections::split_regions(text) {
        Ok(regions) => {
            let mut rendered = RenderedSections::default();
            for region in regions {
                if let Some(fragment) = render::section_fragment(region.kind, region.body) {
                    rendered.set(region.kind, fragment);
                }
            }
            Markup::Sections(rendered)
        }
        Err(e) => Markup::ParseError(e.to_string()),
    };

    ManualRecord {
        flag,
        drawing_code,
        markup,
    }
}

/// Parse OCR output given as ordered lines.
pub fn parse_lines(lines: &[String]) -> ManualRecord {
    parse(&lines.join("\n"))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const WELL_FORMED: &str = "\
검출 FLAG : A1/B2
참조 도면 : D-104
[현상]
운전 중 모터가 정지합니다.
[참조 도면]
인버터 결선도 3번
[원인 및 조치]
1. 입력 전원 확인
2. 과전류 보호 설정 확인
";

    #[test]
    fn well_formed_page() {
        let r = parse(WELL_FORMED);
        assert_eq!(r.flag, "A1/B2");
        assert_eq!(r.drawing_code, "D-104");
        let Markup::Sections(s) = &r.markup else {
            panic!("expected sections, got {:?}", r.markup);
        };
        assert_eq!(
            s.phenomenon.as_deref(),
            Some("<h3>현상</h3><p>운전 중 모터가 정지합니다.</p>")
        );
        assert_eq!(
            s.reference_drawing.as_deref(),
            Some("<h3>참조 도면</h3><p>인버터 결선도 3번</p>")
        );
        assert_eq!(
            s.cause_and_action.as_deref(),
            Some("<h3>원인 및 조치</h3><ol><li>1. 입력 전원 확인</li><li>2. 과전류 보호 설정 확인</li></ol>")
        );

        let html = r.markup_html();
        let p = html.find("현상").unwrap();
        let d = html.find("참조 도면").unwrap();
        let c = html.find("원인 및 조치").unwrap();
        assert!(p < d && d < c);
    }

    #[test]
    fn inverter_fixture() {
        let text = std::fs::read_to_string("tests/fixtures/inverter_oc.txt").unwrap();
        let r = parse(&text);
        assert_eq!(r.flag, "OC1/OC2");
        assert_eq!(r.drawing_code, "DWG-0412");
        let Markup::Sections(s) = &r.markup else {
            panic!("expected sections, got {:?}", r.markup);
        };
        assert_eq!(
            s.phenomenon.as_deref(),
            Some("<h3>현상</h3><p>가속 중 과전류 트립이 발생하고<br>모터가 프리런 정지합니다.</p>")
        );
        // the title line above the first header belongs to no section
        assert!(!r.markup_html().contains("STVF"));
        let cause = s.cause_and_action.as_deref().unwrap();
        assert_eq!(cause.matches("<li>").count(), 3);
        assert!(cause.contains("<li>IGBT 모듈 불량 → 서비스 센터 문의</li>"));
    }

    #[test]
    fn partial_fixture_degrades() {
        let text = std::fs::read_to_string("tests/fixtures/partial_ocr.txt").unwrap();
        let r = parse(&text);
        assert_eq!(r.flag, EXTRACTION_FAILED);
        assert_eq!(r.drawing_code, EXTRACTION_FAILED);
        assert_eq!(
            r.markup_html(),
            "<h3>현상</h3><p>표시부에 &quot;E-07&quot; 점멸</p>"
        );
    }

    #[test]
    fn flag_alone() {
        let r = parse("검출 FLAG : A1/B2");
        assert_eq!(r.flag, "A1/B2");
        assert_eq!(r.drawing_code, EXTRACTION_FAILED);
        assert_eq!(r.markup, Markup::Sections(RenderedSections::default()));
    }

    #[test]
    fn drawing_header_is_not_a_code() {
        let r = parse("[참조 도면]\n회로도 참고");
        assert_eq!(r.drawing_code, EXTRACTION_FAILED);
        assert_eq!(r.flag, EXTRACTION_FAILED);
    }

    #[test]
    fn drawing_code_variants() {
        assert_eq!(parse("참조도면 번호: X-1").drawing_code, "X-1");
        assert_eq!(parse("참조 도면 코드 ： Y2").drawing_code, "Y2");
        assert_eq!(parse("검출 flag:ZZ").flag, "ZZ");
    }

    #[test]
    fn missing_section_is_omitted() {
        let r = parse("[현상]\n소음 발생\n[원인 및 조치]\n베어링 교체");
        let Markup::Sections(s) = &r.markup else {
            panic!("expected sections");
        };
        assert!(s.reference_drawing.is_none());
        assert!(!r.markup_html().contains("참조 도면"));
        assert!(r.markup_html().contains("<li>베어링 교체</li>"));
    }

    #[test]
    fn empty_input_is_no_ocr_result() {
        assert_eq!(parse(""), ManualRecord::no_ocr_result());
        assert_eq!(parse("  \n\t "), ManualRecord::no_ocr_result());
        assert_eq!(parse_lines(&[]), ManualRecord::no_ocr_result());
    }

    #[test]
    fn bad_structure_is_parse_error() {
        let r = parse("검출 FLAG : A1\n[원인 및 조치]\nx\n[현상]\ny");
        assert_eq!(r.flag, "A1");
        assert_eq!(r.drawing_code, EXTRACTION_FAILED);
        assert!(matches!(r.markup, Markup::ParseError(_)));
        let html = r.markup_html();
        assert!(html.contains("parse error"));
        assert!(html.contains("appears before"));
    }

    #[test]
    fn header_quoted_in_body_keeps_codes_and_sections() {
        let r = parse(
            "검출 FLAG : A1/B2\n참조 도면 : D-7\n[현상]\n모터 정지, [현상] 재발 시\n[원인 및 조치]\n전원 확인",
        );
        assert_eq!(r.flag, "A1/B2");
        assert_eq!(r.drawing_code, "D-7");
        let Markup::Sections(s) = &r.markup else {
            panic!("expected sections, got {:?}", r.markup);
        };
        assert_eq!(
            s.phenomenon.as_deref(),
            Some("<h3>현상</h3><p>모터 정지, [현상] 재발 시</p>")
        );
        assert_eq!(
            s.cause_and_action.as_deref(),
            Some("<h3>원인 및 조치</h3><ol><li>전원 확인</li></ol>")
        );
    }

    #[test]
    fn never_panics_on_junk() {
        let inputs = [
            "[",
            "]]]][[[",
            "검출 FLAG :",
            "참조 도면 :\n\n",
            "[현상]",
            "[현상][참조 도면][원인 및 조치]",
            "\u{0}\u{ffff}검출",
            "FLAG : 검출",
        ];
        for input in inputs {
            let r = parse(input);
            assert!(!r.flag.is_empty());
            assert!(!r.drawing_code.is_empty());
        }
    }

    #[test]
    fn serializes_to_json() {
        let json = serde_json::to_value(parse("검출 FLAG : A1/B2")).unwrap();
        assert_eq!(json["flag"], "A1/B2");
        assert_eq!(json["markup"]["kind"], "sections");
    }
}
