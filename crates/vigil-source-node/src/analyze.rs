//! Line-oriented heuristics over C++ sources.
//!
//! This is pattern matching, not parsing: good enough to inventory includes,
//! count type and function definitions, and flag oversized functions, without
//! a real C++ front end. Preprocessor tricks and heavily macro'd code will
//! confuse it, which is acceptable for an advisory analysis.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    /// 1-based line of the signature.
    pub line: usize,
    /// Lines from signature through closing brace.
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceMetrics {
    pub lines: usize,
    pub includes: Vec<String>,
    pub functions: Vec<FunctionInfo>,
    pub classes: usize,
    pub using_namespace: usize,
    pub diagnostics: Vec<String>,
}

fn include_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*#\s*include\s*[<"]([^>"]+)[>"]"#).expect("static regex")
    })
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Definitions only; `class Foo;` forward declarations do not match.
    RE.get_or_init(|| Regex::new(r"^\s*(?:class|struct)\s+[A-Za-z_]\w*[^;]*$").expect("static regex"))
}

fn using_namespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\busing\s+namespace\b").expect("static regex"))
}

fn function_sig_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A return type, a name, an argument list, and no statement terminator:
    // `void Widget::draw(const Rect& area) const {`. Control-flow keywords
    // are filtered out by the caller.
    RE.get_or_init(|| {
        Regex::new(r"^[\w\s:<>,~&*]*?\b([A-Za-z_]\w*)\s*\([^;()]*\)\s*(?:const\s*)?\{?\s*$")
            .expect("static regex")
    })
}

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "switch", "catch", "return", "sizeof", "new", "delete",
];

/// Analyze one C++ translation unit.
pub fn analyze(source: &str, max_function_lines: usize) -> SourceMetrics {
    let mut metrics = SourceMetrics::default();
    let mut in_block_comment = false;

    // Functions whose opening brace has been seen: (name, start line, brace
    // depth before the open).
    let mut open_functions: Vec<(String, usize, usize)> = Vec::new();
    // A signature seen but whose `{` has not arrived yet (constructor
    // initializer lists put it on a later line).
    let mut pending: Option<(String, usize)> = None;
    let mut depth: usize = 0;

    for (idx, raw) in source.lines().enumerate() {
        metrics.lines = idx + 1;
        let line_no = idx + 1;
        let line = strip_comments(raw, &mut in_block_comment);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(captures) = include_re().captures(trimmed) {
            metrics.includes.push(captures[1].to_owned());
            continue;
        }
        if trimmed.starts_with('#') {
            // Other preprocessor directives carry no brace structure we trust.
            continue;
        }

        if class_re().is_match(trimmed) {
            metrics.classes += 1;
        }
        if using_namespace_re().is_match(trimmed) {
            metrics.using_namespace += 1;
        }

        // Signatures are only meaningful outside function bodies; class and
        // namespace scopes are fine.
        if pending.is_none() && open_functions.is_empty() {
            if let Some(captures) = function_sig_re().captures(trimmed) {
                let name = captures[1].to_owned();
                if !CONTROL_KEYWORDS.contains(&name.as_str()) {
                    pending = Some((name, line_no));
                }
            }
        }

        for ch in line.chars() {
            match ch {
                '{' => {
                    if let Some((name, start)) = pending.take() {
                        open_functions.push((name, start, depth));
                    }
                    depth += 1;
                }
                '}' => {
                    depth = depth.saturating_sub(1);
                    if let Some(pos) = open_functions
                        .iter()
                        .rposition(|(_, _, open_depth)| *open_depth == depth)
                    {
                        let (name, start, _) = open_functions.remove(pos);
                        let length = line_no - start + 1;
                        if length > max_function_lines {
                            metrics.diagnostics.push(format!(
                                "function '{name}' spans {length} lines (starts at line {start}, limit {max_function_lines})"
                            ));
                        }
                        metrics.functions.push(FunctionInfo {
                            name,
                            line: start,
                            length,
                        });
                    }
                }
                _ => {}
            }
        }

        // A pending signature followed by a terminator was a declaration.
        if trimmed.ends_with(';') {
            pending = None;
        }
    }

    metrics.functions.sort_by_key(|f| f.line);
    metrics
}

/// Drop `//` line comments and `/* ... */` block comments.
///
/// Comment markers inside string literals are mishandled; that is within the
/// advertised precision of this analysis.
fn strip_comments(line: &str, in_block_comment: &mut bool) -> String {
    let mut out = String::with_capacity(line.len());
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if *in_block_comment {
            if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                *in_block_comment = false;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'/') {
            break;
        }
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
            *in_block_comment = true;
            i += 2;
            continue;
        }
        out.push(bytes[i] as char);
        i += 1;
    }

    out
}
