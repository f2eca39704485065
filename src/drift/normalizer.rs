//! Code normalization for semantic comparison.
//!
//! Applies a fixed pipeline of transforms (strip comments, collapse
//! whitespace, drop empty lines, sort imports, normalize quotes) and hashes
//! the result. Two inputs with equal hashes are regarded as semantically
//! equivalent; the comparison is intentionally lossy about surface texture.

use regex::Regex;
use serde::Serialize;

/// Which transforms run. The pipeline order is fixed regardless of which
/// are enabled.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub strip_comments: bool,
    pub collapse_whitespace: bool,
    pub drop_empty_lines: bool,
    pub sort_imports: bool,
    pub normalize_quotes: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            strip_comments: true,
            collapse_whitespace: true,
            drop_empty_lines: true,
            sort_imports: true,
            normalize_quotes: true,
        }
    }
}

/// Outcome of normalizing one input.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationResult {
    pub normalized: String,
    /// 32-bit rolling hash of the normalized text, as 8 hex digits
    pub hash: String,
    /// Names of transforms that changed the text, in pipeline order
    pub transformations: Vec<String>,
    pub original_line_count: usize,
    pub normalized_line_count: usize,
}

/// Normalizes code for drift comparison.
pub struct Normalizer {
    config: NormalizerConfig,
    import_line: Regex,
    single_quoted: Regex,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self {
            config,
            import_line: Regex::new(
                r#"^\s*(import\s|from\s+\S+\s+import\s|use\s|#include\s|(const|let|var)\s+.*=\s*require\()"#,
            )
            .unwrap_or_else(|e| panic!("invalid import pattern: {e}")),
            single_quoted: Regex::new(r"'([^'\\]*)'")
                .unwrap_or_else(|e| panic!("invalid quote pattern: {e}")),
        }
    }

    /// True when the line looks like an import/include/require.
    pub fn is_import_line(&self, line: &str) -> bool {
        self.import_line.is_match(line)
    }

    /// Run the transform pipeline and hash the result.
    pub fn normalize(&self, code: &str) -> NormalizationResult {
        let original_line_count = code.lines().count();
        let mut text = code.to_string();
        let mut transformations = Vec::new();

        let steps: [(&str, bool); 5] = [
            ("strip_comments", self.config.strip_comments),
            ("collapse_whitespace", self.config.collapse_whitespace),
            ("drop_empty_lines", self.config.drop_empty_lines),
            ("sort_imports", self.config.sort_imports),
            ("normalize_quotes", self.config.normalize_quotes),
        ];

        for (name, enabled) in steps {
            if !enabled {
                continue;
            }
            let transformed = match name {
                "strip_comments" => strip_comments(&text),
                "collapse_whitespace" => collapse_whitespace(&text),
                "drop_empty_lines" => drop_empty_lines(&text),
                "sort_imports" => self.sort_imports(&text),
                "normalize_quotes" => self.normalize_quotes(&text),
                _ => text.clone(),
            };
            if transformed != text {
                transformations.push(name.to_string());
                text = transformed;
            }
        }

        let normalized_line_count = text.lines().count();
        NormalizationResult {
            hash: format!("{:08x}", rolling_hash(&text)),
            normalized: text,
            transformations,
            original_line_count,
            normalized_line_count,
        }
    }

    /// Sort import lines among themselves, keeping their positions.
    fn sort_imports(&self, text: &str) -> String {
        let lines: Vec<&str> = text.lines().collect();
        let mut imports: Vec<&str> = lines
            .iter()
            .copied()
            .filter(|l| self.import_line.is_match(l))
            .collect();
        imports.sort_unstable();
        let mut next = imports.into_iter();
        let rebuilt: Vec<&str> = lines
            .iter()
            .map(|&line| {
                if self.import_line.is_match(line) {
                    next.next().unwrap_or(line)
                } else {
                    line
                }
            })
            .collect();
        rebuilt.join("\n")
    }

    /// Rewrite simple single-quoted string literals to double quotes.
    fn normalize_quotes(&self, text: &str) -> String {
        self.single_quoted.replace_all(text, "\"$1\"").into_owned()
    }
}

/// Strip `/* */` blocks and both line-comment families.
///
/// `#` counts as a comment only when the line is not preprocessor or
/// shebang syntax (the language signal that `#` means something else).
/// Stripping both families unconditionally keeps normalization idempotent
/// on mixed-language output.
fn strip_comments(text: &str) -> String {
    let without_blocks = strip_block_comments(text);
    without_blocks
        .lines()
        .map(|line| {
            let mut kept = match line.find("//") {
                Some(index) => &line[..index],
                None => line,
            };
            let trimmed = kept.trim_start();
            let hash_is_syntax = trimmed.starts_with("#include")
                || trimmed.starts_with("#!")
                || trimmed.starts_with("#define")
                || trimmed.starts_with("#if")
                || trimmed.starts_with("#endif");
            if !hash_is_syntax {
                if let Some(index) = kept.find('#') {
                    kept = &kept[..index];
                }
            }
            kept.to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove `/* ... */` blocks, which may span lines.
fn strip_block_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find("/*") {
            Some(start) => {
                out.push_str(&rest[..start]);
                match rest[start..].find("*/") {
                    Some(end) => rest = &rest[start + end + 2..],
                    None => break, // unterminated block: drop the tail
                }
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}

/// Collapse intra-line whitespace runs to one space, preserving indentation
/// and trimming trailing whitespace.
fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| {
            let body_start = line
                .find(|c: char| !c.is_whitespace())
                .unwrap_or(line.len());
            let (indent, body) = line.split_at(body_start);
            let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
            format!("{indent}{collapsed}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn drop_empty_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 32-bit polynomial rolling hash (djb2 xor variant) over the bytes.
fn rolling_hash(text: &str) -> u32 {
    let mut hash: u32 = 5381;
    for byte in text.bytes() {
        hash = hash.wrapping_mul(33) ^ u32::from(byte);
    }
    hash
}
