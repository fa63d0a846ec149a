//! Import-block parsing and merging.
//!
//! Pure functions over text: no filesystem access, no locking. The block is
//! the maximal run of grammar-matching `require` statements from line 1 up
//! to the first blank line; the first chunk that fails the grammar stops
//! scanning, and everything from it on is preserved byte for byte.
//!
//! Recognized grammar (whitespace runs collapsed before matching):
//!
//! ```text
//! (const|let|var) <identifier> = require('<literal>');
//! (const|let|var) { a, b, ... } = require('<literal>');
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::resolver::ModuleCandidate;

lazy_static! {
    static ref IMPORT_RE: Regex = Regex::new(
        r"^(const|let|var) ([A-Za-z_$][A-Za-z0-9_$]*|\{ ?[^{}]*? ?\}) = require\( ?'([^']*)' ?\);$"
    )
    .expect("valid import grammar regex");
}

/// Rendering style for merged statements, taken from configuration.
#[derive(Debug, Clone)]
pub struct ImportStyle {
    pub declaration_keyword: String,
    pub text_width: Option<usize>,
    pub indent_unit: String,
}

impl Default for ImportStyle {
    fn default() -> Self {
        Self {
            declaration_keyword: "const".into(),
            text_width: None,
            indent_unit: "  ".into(),
        }
    }
}

/// One recognized statement: raw text (possibly multi-line) plus the fields
/// the grammar captured.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportStatement {
    raw: String,
    keyword: String,
    target: String,
    path: String,
}

impl ImportStatement {
    fn parse(chunk: &str) -> Option<Self> {
        let collapsed = collapse_ws(chunk);
        let caps = IMPORT_RE.captures(&collapsed)?;
        Some(Self {
            raw: chunk.to_string(),
            keyword: caps[1].to_string(),
            target: caps[2].to_string(),
            path: caps[3].to_string(),
        })
    }

    /// Dedup key: declaration keyword stripped, whitespace runs collapsed.
    /// Statements equal under this key are duplicates even when declared
    /// with different keywords.
    fn key(&self) -> String {
        let collapsed = collapse_ws(&self.raw);
        for keyword in ["const ", "let ", "var "] {
            if let Some(rest) = collapsed.strip_prefix(keyword) {
                return rest.to_string();
            }
        }
        collapsed
    }

    fn is_destructured(&self) -> bool {
        self.target.starts_with('{')
    }

    fn members(&self) -> Vec<String> {
        self.target
            .trim_start_matches('{')
            .trim_end_matches('}')
            .split(',')
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect()
    }
}

/// Merge an import for `identifier` from `candidate` into `buffer`.
///
/// Idempotent: repeating the same merge yields the same text.
pub fn merge(
    buffer: &str,
    identifier: &str,
    candidate: &ModuleCandidate,
    style: &ImportStyle,
) -> String {
    let lines: Vec<&str> = buffer.lines().collect();
    let (mut statements, consumed) = parse_block(&lines);

    let mut merged_in_place = false;
    if candidate.is_destructured {
        if let Some(existing) = statements
            .iter_mut()
            .find(|s| s.is_destructured() && s.path == candidate.import_path)
        {
            let mut members = existing.members();
            members.push(identifier.to_string());
            members.sort();
            members.dedup();
            // Rewrite in place, keeping the statement's own keyword.
            let keyword = existing.keyword.clone();
            *existing = render_destructured(&keyword, &members, &candidate.import_path, style);
            merged_in_place = true;
        }
    }

    if !merged_in_place {
        let statement = if candidate.is_destructured {
            render_destructured(
                &style.declaration_keyword,
                &[identifier.to_string()],
                &candidate.import_path,
                style,
            )
        } else {
            render_plain(identifier, candidate, style)
        };
        statements.push(statement);
    }

    statements.sort_by(|a, b| a.raw.cmp(&b.raw));
    let mut seen: HashSet<String> = HashSet::new();
    statements.retain(|s| seen.insert(s.key()));

    serialize(buffer, &lines, consumed, &statements)
}

/// Scan the leading import block: `(statements, consumed physical lines)`.
fn parse_block(lines: &[&str]) -> (Vec<ImportStatement>, usize) {
    let mut statements = Vec::new();
    let mut consumed = 0;

    let mut i = 0;
    while i < lines.len() {
        if lines[i].trim().is_empty() {
            break;
        }
        // Shortest chunk terminated by ';'.
        let mut j = i;
        while j < lines.len()
            && !lines[j].trim().is_empty()
            && !lines[j].trim_end().ends_with(';')
        {
            j += 1;
        }
        if j >= lines.len() || lines[j].trim().is_empty() {
            break; // unterminated trailing lines are not part of the block
        }
        let chunk = lines[i..=j].join("\n");
        match ImportStatement::parse(&chunk) {
            Some(statement) => {
                statements.push(statement);
                i = j + 1;
                consumed = i;
            }
            None => break,
        }
    }

    (statements, consumed)
}

fn render_plain(
    identifier: &str,
    candidate: &ModuleCandidate,
    style: &ImportStyle,
) -> ImportStatement {
    let line = format!(
        "{} {} = require('{}');",
        style.declaration_keyword, identifier, candidate.import_path
    );
    finish_statement(line, style)
}

fn render_destructured(
    keyword: &str,
    members: &[String],
    path: &str,
    style: &ImportStyle,
) -> ImportStatement {
    let line = format!(
        "{} {{ {} }} = require('{}');",
        keyword,
        members.join(", "),
        path
    );
    finish_statement(line, style)
}

/// Wrap after `=` onto an indented second line when the one-line form
/// exceeds the configured width, then reparse into statement fields.
fn finish_statement(line: String, style: &ImportStyle) -> ImportStatement {
    let raw = match style.text_width {
        Some(width) if line.len() > width => match line.split_once(" = ") {
            Some((lhs, rhs)) => format!("{lhs} =\n{}{rhs}", style.indent_unit),
            None => line,
        },
        _ => line,
    };
    ImportStatement::parse(&raw).unwrap_or_else(|| ImportStatement {
        raw: raw.clone(),
        keyword: String::new(),
        target: String::new(),
        path: String::new(),
    })
}

/// Splice the sorted statement list over the consumed lines, ensuring one
/// blank line before the preserved remainder.
fn serialize(
    buffer: &str,
    lines: &[&str],
    consumed: usize,
    statements: &[ImportStatement],
) -> String {
    let mut out = String::new();
    for statement in statements {
        out.push_str(&statement.raw);
        out.push('\n');
    }

    let rest = &lines[consumed..];
    if rest.is_empty() {
        return out;
    }
    if !rest[0].trim().is_empty() {
        out.push('\n');
    }
    out.push_str(&rest.join("\n"));
    if buffer.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(import_path: &str) -> ModuleCandidate {
        ModuleCandidate {
            lookup_path: Some("src".into()),
            import_path: import_path.into(),
            display_name: import_path.into(),
            is_destructured: false,
        }
    }

    fn destructured(import_path: &str) -> ModuleCandidate {
        ModuleCandidate {
            is_destructured: true,
            ..candidate(import_path)
        }
    }

    fn style() -> ImportStyle {
        ImportStyle::default()
    }

    #[test]
    fn merge_into_buffer_without_imports_adds_block_and_blank_line() {
        let out = merge("run();\n", "foo", &candidate("./foo"), &style());
        assert_eq!(out, "const foo = require('./foo');\n\nrun();\n");
    }

    #[test]
    fn merge_keeps_existing_imports_sorted() {
        let buffer = "const a = require('./a');\nconst b = require('./b');\n\ncode();\n";
        let out = merge(buffer, "c", &candidate("./c"), &style());
        assert_eq!(
            out,
            "const a = require('./a');\nconst b = require('./b');\nconst c = require('./c');\n\ncode();\n"
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let buffer = "const a = require('./a');\n\ncode();\n";
        let once = merge(buffer, "b", &candidate("./b"), &style());
        let twice = merge(&once, "b", &candidate("./b"), &style());
        assert_eq!(once, twice);
    }

    #[test]
    fn member_merges_into_existing_destructuring_statement() {
        let buffer = "const { foo } = require('./mod');\n\ncode();\n";
        let out = merge(buffer, "bar", &destructured("./mod"), &style());
        assert_eq!(out, "const { bar, foo } = require('./mod');\n\ncode();\n");
    }

    #[test]
    fn member_merge_keeps_the_statement_keyword_and_dedups() {
        let buffer = "var { foo } = require('./mod');\n\ncode();\n";
        let out = merge(buffer, "foo", &destructured("./mod"), &style());
        assert_eq!(out, "var { foo } = require('./mod');\n\ncode();\n");
    }

    #[test]
    fn new_destructured_import_renders_braced_member() {
        let out = merge("code();\n", "pick", &destructured("lodash"), &style());
        assert_eq!(out, "const { pick } = require('lodash');\n\ncode();\n");
    }

    #[test]
    fn use_strict_halts_scanning_and_import_lands_above() {
        let buffer = "\"use strict\";\n\ncode();\n";
        let out = merge(buffer, "foo", &candidate("./foo"), &style());
        assert_eq!(
            out,
            "const foo = require('./foo');\n\n\"use strict\";\n\ncode();\n"
        );
    }

    #[test]
    fn malformed_line_stops_the_block_and_is_preserved() {
        let buffer =
            "const a = require('./a');\nconst broken = 1;\nconst b = require('./b');\n\ncode();\n";
        let out = merge(buffer, "c", &candidate("./c"), &style());
        // Only the first statement is in the block; the rest of the prefix
        // stays verbatim, untouched and unaccounted.
        assert_eq!(
            out,
            "const a = require('./a');\nconst c = require('./c');\n\nconst broken = 1;\nconst b = require('./b');\n\ncode();\n"
        );
    }

    #[test]
    fn duplicate_under_different_keyword_collapses_to_first_after_sort() {
        let buffer = "var a = require('./a');\n\ncode();\n";
        let out = merge(buffer, "a", &candidate("./a"), &style());
        // "const ..." sorts before "var ..."; the keys match, first wins.
        assert_eq!(out, "const a = require('./a');\n\ncode();\n");
    }

    #[test]
    fn long_statement_wraps_after_the_equals_sign() {
        let opts = ImportStyle {
            text_width: Some(40),
            ..ImportStyle::default()
        };
        let out = merge(
            "code();\n",
            "reallyLongComponentName",
            &candidate("app/components/ReallyLongComponentName"),
            &opts,
        );
        assert_eq!(
            out,
            "const reallyLongComponentName =\n  require('app/components/ReallyLongComponentName');\n\ncode();\n"
        );
    }

    #[test]
    fn wrapped_statement_in_existing_block_is_parsed_as_one_statement() {
        let buffer =
            "const widget =\n  require('app/widget');\nconst a = require('./a');\n\ncode();\n";
        let out = merge(buffer, "b", &candidate("./b"), &style());
        assert_eq!(
            out,
            "const a = require('./a');\nconst b = require('./b');\nconst widget =\n  require('app/widget');\n\ncode();\n"
        );
    }

    #[test]
    fn blank_line_is_not_doubled_when_already_present() {
        let buffer = "const a = require('./a');\n\n\ncode();\n";
        let out = merge(buffer, "b", &candidate("./b"), &style());
        assert_eq!(
            out,
            "const a = require('./a');\nconst b = require('./b');\n\n\ncode();\n"
        );
    }

    #[test]
    fn empty_buffer_gets_a_single_statement() {
        let out = merge("", "foo", &candidate("./foo"), &style());
        assert_eq!(out, "const foo = require('./foo');\n");
    }

    #[test]
    fn unterminated_prefix_line_is_left_out_of_the_block() {
        let buffer = "const a = require('./a');\nconst dangling = require(\n\ncode();\n";
        let out = merge(buffer, "b", &candidate("./b"), &style());
        assert_eq!(
            out,
            "const a = require('./a');\nconst b = require('./b');\n\nconst dangling = require(\n\ncode();\n"
        );
    }
}
