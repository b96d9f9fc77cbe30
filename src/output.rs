//! User-facing text: exception reports, `-identify` lines and `-list` topics.
//!
//! # Output Format
//!
//! ## Exceptions
//!
//! One line per caught exception, in report order:
//!
//! ```text
//! wand: error: unbalanced parenthesis `)'
//! wand: warning: no images defined `-blur'
//! ```
//!
//! `--json` swaps this for a JSON array of `{severity, message, option}`.
//!
//! ## Identify
//!
//! ```text
//! rose.png PNG 70x46 70x46+0+0 8-bit sRGB
//! anim.gif[2] GIF 32x32 64x64+16+0 8-bit sRGB
//! ```
//!
//! ## Lists
//!
//! ```text
//!    Format  Mode  Description
//! -------------------------------------------------------------------------
//!       PNG  rw-   Portable Network Graphics
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stderr. Format
//! functions are pure.

use crate::color::NAMED_COLORS;
use crate::exception::{Exception, ExceptionKind, Severity};
use crate::image::Image;
use crate::keywords::{KEYWORD_FAMILIES, ListTopic, keyword_table};
use crate::resource::LimitTable;
use crate::stack::MAX_STACK_DEPTH;
use crate::wand::Wand;
use serde::Serialize;

/// Program name used as the prefix of every report line.
const PROGRAM: &str = "wand";

const RULE: &str =
    "-------------------------------------------------------------------------";

// ============================================================================
// Exceptions
// ============================================================================

/// Format caught exceptions, one line each, in report order.
pub fn format_exceptions(exceptions: &[Exception]) -> Vec<String> {
    exceptions
        .iter()
        .map(|e| format!("{PROGRAM}: {e}"))
        .collect()
}

pub fn print_exceptions(exceptions: &[Exception]) {
    for line in format_exceptions(exceptions) {
        eprintln!("{line}");
    }
}

#[derive(Serialize)]
struct ExceptionRecord<'a> {
    severity: Severity,
    message: String,
    option: &'a str,
}

/// Caught exceptions as a pretty JSON array.
pub fn exceptions_json(exceptions: &[Exception]) -> serde_json::Result<String> {
    let records: Vec<ExceptionRecord<'_>> = exceptions
        .iter()
        .map(|e| ExceptionRecord {
            severity: e.severity,
            message: e.kind.to_string(),
            option: &e.option,
        })
        .collect();
    serde_json::to_string_pretty(&records)
}

// ============================================================================
// Identify
// ============================================================================

/// One-line summary of an image, starting with its file name.
pub fn identify_line(image: &Image) -> String {
    let name = if image.scene > 0 {
        format!("{}[{}]", image.filename, image.scene)
    } else {
        image.filename.clone()
    };
    let (width, height) = image.dimensions();
    let page = if image.page.is_unset() {
        format!("{width}x{height}+0+0")
    } else {
        image.page.to_string()
    };
    format!(
        "{name} {} {width}x{height} {page} {}-bit {}",
        image.magick, image.depth, image.colorspace
    )
}

// ============================================================================
// -list topics
// ============================================================================

/// Render `-list <topic>`: one of the built-in topics or a keyword family.
///
/// Unknown topics are reported as an unrecognized `list` keyword.
pub fn list_topic(wand: &Wand, topic: &str) -> Result<String, ExceptionKind> {
    let parsed = topic.parse::<ListTopic>();
    if parsed.is_err()
        && let Some(names) = keyword_table(topic)
    {
        return Ok(lines(names.iter().map(|n| n.to_string())));
    }
    let text = match parsed? {
        ListTopic::List => lines(list_names()),
        ListTopic::Coder | ListTopic::Format => lines(format_formats(wand)),
        ListTopic::Color => lines(format_colors()),
        ListTopic::Configure => lines(format_configure()),
        ListTopic::Font => lines(wand.backend.fonts()),
        ListTopic::Resource => lines(format_resources(wand)),
    };
    Ok(text)
}

fn lines(items: impl IntoIterator<Item = String>) -> String {
    items.into_iter().map(|line| line + "\n").collect()
}

/// Every accepted `-list` argument, sorted.
fn list_names() -> Vec<String> {
    let mut names: Vec<String> = ListTopic::NAMES
        .iter()
        .map(|n| n.to_string())
        .chain(KEYWORD_FAMILIES.iter().map(|f| capitalize(f)))
        .collect();
    names.sort_unstable_by_key(|n| n.to_ascii_lowercase());
    names.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
    names
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn format_formats(wand: &Wand) -> Vec<String> {
    let mut out = vec!["   Format  Mode  Description".to_string(), RULE.to_string()];
    for format in wand.backend.formats() {
        let mode = format!(
            "{}{}-",
            if format.readable { 'r' } else { '-' },
            if format.writable { 'w' } else { '-' },
        );
        out.push(format!("{:>9}  {mode}   {}", format.name, format.description));
    }
    out
}

fn format_colors() -> Vec<String> {
    let mut out = vec![format!("{:<20} {}", "Name", "Color"), RULE.to_string()];
    for (name, color) in NAMED_COLORS {
        out.push(format!(
            "{name:<20} srgb({},{},{})",
            color.r, color.g, color.b
        ));
    }
    out
}

fn format_configure() -> Vec<String> {
    [
        ("NAME", env!("CARGO_PKG_NAME").to_string()),
        ("VERSION", env!("CARGO_PKG_VERSION").to_string()),
        ("GIT-HASH", env!("WAND_GIT_HASH").to_string()),
        ("BUILD", env!("WAND_BUILD_PROFILE").to_string()),
        ("QUANTUM-DEPTH", "8".to_string()),
        ("STACK-DEPTH", MAX_STACK_DEPTH.to_string()),
        ("THREADS", rayon::current_num_threads().to_string()),
    ]
    .into_iter()
    .map(|(key, value)| format!("{key:<14} {value}"))
    .collect()
}

fn format_resources(wand: &Wand) -> Vec<String> {
    LimitTable::snapshot(wand.resources.as_ref())
        .into_iter()
        .map(|(kind, limit)| format!("{:>10}: {limit}", kind.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::ResourceType;
    use crate::resource::{Limit, ResourceRegistry};
    use crate::test_helpers::*;

    // =========================================================================
    // Exception tests
    // =========================================================================

    fn exception(kind: ExceptionKind, option: &str) -> Exception {
        Exception {
            severity: kind.severity(),
            kind,
            option: option.to_string(),
        }
    }

    #[test]
    fn exception_lines_carry_program_and_option() {
        let lines = format_exceptions(&[exception(ExceptionKind::UnbalancedParenthesis, ")")]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("wand: "));
        assert!(lines[0].contains("unbalanced parenthesis"));
        assert!(lines[0].ends_with("`)'"));
    }

    #[test]
    fn exceptions_json_is_an_array() {
        let json = exceptions_json(&[
            exception(ExceptionKind::MissingArgument, "-resize"),
            exception(ExceptionKind::NoImagesDefined, "-blur"),
        ])
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let records = value.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["option"], "-resize");
        assert_eq!(records[1]["message"], "no images defined");
    }

    // =========================================================================
    // Identify tests
    // =========================================================================

    #[test]
    fn identify_line_layout() {
        let image = named_image("rose.png");
        let line = identify_line(&image);
        assert!(line.starts_with("rose.png PNG 4x4 4x4+0+0 "));
        assert!(line.contains("-bit"));
    }

    #[test]
    fn identify_line_marks_later_scenes_and_pages() {
        let mut image = named_image("anim.gif");
        image.scene = 2;
        image.page = crate::image::Page {
            width: 8,
            height: 8,
            x: 4,
            y: 0,
        };
        let line = identify_line(&image);
        assert!(line.starts_with("anim.gif[2] PNG 4x4 8x8+4+0 "), "{line}");
    }

    // =========================================================================
    // -list tests
    // =========================================================================

    #[test]
    fn list_keyword_family() {
        let (wand, _) = mock_wand();
        let text = list_topic(&wand, "compose").unwrap();
        assert!(text.lines().any(|l| l == "Over"));
    }

    #[test]
    fn list_list_names_topics_and_families() {
        let (wand, _) = mock_wand();
        let text = list_topic(&wand, "list").unwrap();
        let names: Vec<&str> = text.lines().collect();
        assert!(names.contains(&"Color"));
        assert!(names.contains(&"Gravity"));
        let mut sorted = names.clone();
        sorted.sort_by_key(|n| n.to_ascii_lowercase());
        assert_eq!(names, sorted);
    }

    #[test]
    fn list_formats_shows_modes() {
        let (wand, _) = mock_wand();
        let text = list_topic(&wand, "format").unwrap();
        assert!(text.lines().any(|l| l.contains("PNG") && l.contains("rw-")));
        assert_eq!(text, list_topic(&wand, "coder").unwrap());
    }

    #[test]
    fn list_colors_and_configure() {
        let (wand, _) = mock_wand();
        assert!(list_topic(&wand, "color").unwrap().contains("srgb(255,255,255)"));
        assert!(list_topic(&wand, "configure").unwrap().contains("STACK-DEPTH"));
    }

    #[test]
    fn list_resources_reflect_limits() {
        let (wand, _) = mock_wand();
        wand.resources.set_limit(ResourceType::Memory, Limit::Amount(1024.0 * 1024.0));
        let text = list_topic(&wand, "resource").unwrap();
        assert!(text.contains("1MiB"), "{text}");
        assert!(text.contains("unlimited"));
    }

    #[test]
    fn list_unknown_topic() {
        let (wand, _) = mock_wand();
        assert!(matches!(
            list_topic(&wand, "nonsense"),
            Err(ExceptionKind::UnrecognizedKeyword { kind: "list", .. })
        ));
    }
}
