//! Make blocking `input(` calls awaitable.
//!
//! Guest code calls `input(...)` as if it were synchronous. When any such
//! call is found, the rewriter wraps the whole script in an async routine,
//! prefixes every call with `await`, and ends with a top-level await of the
//! routine. A script without input calls is returned unchanged.
//!
//! Detection is line-based and lexical: comment text, string literals,
//! method calls (`obj.input(`), longer identifiers (`raw_input(`), function
//! definitions and calls that are already awaited never match. Calls inside
//! the replacement fields of single-line f-strings do match. Lines that
//! continue a triple-quoted string keep their original indentation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest body indent that leaves room for the `try:` level.
pub const MIN_INDENT: usize = 2;

/// Knobs for the wrapper the rewriter produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Name of the call that suspends for input.
    pub call_name: String,
    /// Spaces added in front of every body line. The wrapper's `try:` sits
    /// at half this depth, so it must be at least [`MIN_INDENT`].
    pub indent: usize,
    /// Name of the generated async routine.
    pub routine_name: String,
    /// Guest callable that reports an exception caught by the wrapper.
    pub reporter: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            call_name: "input".to_string(),
            indent: 8,
            routine_name: "__run_code".to_string(),
            reporter: "report_exception".to_string(),
        }
    }
}

/// Why a script that needed rewriting could not be rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    #[error("indent of {indent} leaves no room for the wrapper, need at least {min}", min = MIN_INDENT)]
    InvalidIndent { indent: usize },
    #[error("line {line} is indented with tabs and cannot be re-indented")]
    TabIndentation { line: usize },
    #[error("triple-quoted string opened on line {line} is never closed")]
    UnterminatedString { line: usize },
}

/// Output of one rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteResult {
    /// Source to execute.
    pub source: String,
    /// Whether `source` differs from the input.
    pub was_rewritten: bool,
    /// Set when rewriting was needed but failed and the original was kept.
    pub failure: Option<RewriteError>,
}

impl RewriteResult {
    fn unchanged(source: &str, failure: Option<RewriteError>) -> Self {
        Self {
            source: source.to_string(),
            was_rewritten: false,
            failure,
        }
    }
}

/// Stateless source transformer.
#[derive(Debug, Clone, Default)]
pub struct SourceRewriter {
    config: RewriteConfig,
}

impl SourceRewriter {
    #[must_use]
    pub const fn new(config: RewriteConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &RewriteConfig {
        &self.config
    }

    /// Rewrite `source` if it contains an input call.
    ///
    /// Never fails: when the script cannot be re-indented safely the
    /// original text is returned with [`RewriteResult::failure`] set.
    #[must_use]
    pub fn rewrite(&self, source: &str) -> RewriteResult {
        match self.try_rewrite(source) {
            Ok(Some(rewritten)) => RewriteResult {
                source: rewritten,
                was_rewritten: true,
                failure: None,
            },
            Ok(None) => RewriteResult::unchanged(source, None),
            Err(err) => {
                tracing::warn!(error = %err, "rewrite failed, running original source");
                RewriteResult::unchanged(source, Some(err))
            }
        }
    }

    /// Strict variant of [`Self::rewrite`]. `Ok(None)` means no rewrite
    /// was needed.
    ///
    /// # Errors
    /// Returns [`RewriteError`] when the script needs rewriting but its
    /// layout cannot be preserved.
    pub fn try_rewrite(&self, source: &str) -> Result<Option<String>, RewriteError> {
        let lines = scan(source, &self.config.call_name);
        if lines.iter().all(|line| line.calls.is_empty()) {
            return Ok(None);
        }
        if let Some(line) = lines.iter().find(|line| line.opens_unterminated) {
            return Err(RewriteError::UnterminatedString { line: line.number });
        }
        let indent = self.config.indent;
        if indent < MIN_INDENT {
            return Err(RewriteError::InvalidIndent { indent });
        }

        let pad = " ".repeat(indent);
        let mut body = Vec::with_capacity(lines.len());
        for line in &lines {
            let text = line.awaited(&self.config.call_name);
            if line.in_string {
                body.push(text);
            } else if text.trim().is_empty() {
                body.push(String::new());
            } else {
                let leading = &text[..text.len() - text.trim_start().len()];
                if leading.contains('\t') {
                    return Err(RewriteError::TabIndentation { line: line.number });
                }
                body.push(format!("{pad}{text}"));
            }
        }

        let RewriteConfig {
            routine_name,
            reporter,
            ..
        } = &self.config;
        tracing::debug!(calls = lines.iter().map(|l| l.calls.len()).sum::<usize>(), "rewrote input calls");
        let outer = " ".repeat(indent / 2);
        Ok(Some(format!(
            "import asyncio\n\nasync def {routine_name}():\n{outer}try:\n{body}\n{outer}except Exception as __bridge_exc:\n{pad}{reporter}(__bridge_exc)\n\nawait {routine_name}()\n",
            body = body.join("\n"),
        )))
    }
}

/// Rewrite with a default-configured rewriter.
#[must_use]
pub fn rewrite(source: &str) -> RewriteResult {
    SourceRewriter::default().rewrite(source)
}

struct ScannedLine<'a> {
    number: usize,
    text: &'a str,
    /// Line starts inside a triple-quoted string.
    in_string: bool,
    /// Line opens a triple-quoted string that never closes.
    opens_unterminated: bool,
    /// Byte offsets of call names that need an `await`.
    calls: Vec<usize>,
}

impl ScannedLine<'_> {
    fn awaited(&self, call_name: &str) -> String {
        let mut out = String::with_capacity(self.text.len() + self.calls.len() * 6);
        let mut last = 0;
        for &at in &self.calls {
            out.push_str(&self.text[last..at]);
            out.push_str("await ");
            out.push_str(call_name);
            last = at + call_name.len();
        }
        out.push_str(&self.text[last..]);
        out
    }
}

fn scan<'a>(source: &'a str, call_name: &str) -> Vec<ScannedLine<'a>> {
    let mut open: Option<(&'static [u8], usize)> = None;
    let mut lines = Vec::new();

    for (idx, text) in source.split('\n').enumerate() {
        let number = idx + 1;
        let in_string = open.is_some();
        let bytes = text.as_bytes();
        let mut calls = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            if let Some((quote, _)) = open {
                if bytes[i..].starts_with(quote) {
                    open = None;
                    i += 3;
                } else {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
                continue;
            }
            match bytes[i] {
                b'#' => break,
                q @ (b'"' | b'\'') => {
                    let triple: &'static [u8] = if q == b'"' { b"\"\"\"" } else { b"'''" };
                    if bytes[i..].starts_with(triple) {
                        open = Some((triple, number));
                        i += 3;
                    } else {
                        i = skip_short_string(bytes, i + 1, q);
                    }
                }
                b if is_ident_start(b) => {
                    let end = ident_end(bytes, i);
                    let word = &text[i..end];
                    let fstring_quote = bytes
                        .get(end)
                        .copied()
                        .filter(|&q| matches!(q, b'"' | b'\'') && is_fstring_prefix(word))
                        .filter(|&q| !bytes[end..].starts_with(&[q, q, q]));
                    if let Some(q) = fstring_quote {
                        i = scan_fstring(text, end + 1, q, call_name, &mut calls);
                        continue;
                    }
                    if word == call_name && is_call_site(text, i, end) {
                        calls.push(i);
                    }
                    i = end;
                }
                _ => i += 1,
            }
        }

        lines.push(ScannedLine {
            number,
            text,
            in_string,
            opens_unterminated: false,
            calls,
        });
    }

    if let Some((_, opened_on)) = open {
        if let Some(line) = lines.get_mut(opened_on - 1) {
            line.opens_unterminated = true;
        }
    }
    lines
}

fn skip_short_string(bytes: &[u8], mut i: usize, quote: u8) -> usize {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn is_fstring_prefix(word: &str) -> bool {
    word.len() <= 2
        && word.contains(['f', 'F'])
        && word.chars().all(|c| matches!(c, 'f' | 'F' | 'r' | 'R' | 'b' | 'B' | 'u' | 'U'))
}

/// Scan a single-line f-string body starting after its opening quote.
///
/// Literal text is skipped like any string; replacement fields are scanned
/// as code. Returns the offset just past the closing quote.
fn scan_fstring(text: &str, mut i: usize, quote: u8, call_name: &str, calls: &mut Vec<usize>) -> usize {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if depth == 0 {
            match b {
                b'\\' => i += 2,
                b'{' if bytes.get(i + 1) == Some(&b'{') => i += 2,
                b'{' => {
                    depth = 1;
                    i += 1;
                }
                _ if b == quote => return i + 1,
                _ => i += 1,
            }
            continue;
        }
        match b {
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                i += 1;
            }
            b'"' | b'\'' => i = skip_short_string(bytes, i + 1, b),
            b if is_ident_start(b) => {
                let end = ident_end(bytes, i);
                if &text[i..end] == call_name && is_call_site(text, i, end) {
                    calls.push(i);
                }
                i = end;
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

const fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

const fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn ident_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| !is_ident_byte(b))
        .map_or(bytes.len(), |n| start + n)
}

fn is_call_site(text: &str, start: usize, end: usize) -> bool {
    let opens_call = text[end..].trim_start_matches([' ', '\t']).starts_with('(');
    if !opens_call {
        return false;
    }
    let before = text[..start].trim_end_matches([' ', '\t']);
    if text[..start].ends_with('.') {
        return false;
    }
    !(ends_with_word(before, "await") || ends_with_word(before, "def"))
}

fn ends_with_word(text: &str, word: &str) -> bool {
    text.strip_suffix(word)
        .is_some_and(|rest| !rest.bytes().next_back().is_some_and(is_ident_byte))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapped(body: &str) -> String {
        format!(
            "import asyncio\n\nasync def __run_code():\n    try:\n{body}\n    except Exception as __bridge_exc:\n        report_exception(__bridge_exc)\n\nawait __run_code()\n"
        )
    }

    #[test]
    fn test_no_input_is_untouched() {
        let src = "print('hi')\nx = 1\n";
        let result = rewrite(src);
        assert!(!result.was_rewritten);
        assert_eq!(result.source, src);
        assert!(result.failure.is_none());
    }

    #[test]
    fn test_wraps_and_awaits() {
        let result = rewrite("x = input(\"name? \")\nprint(x)");
        assert!(result.was_rewritten);
        assert_eq!(
            result.source,
            wrapped("        x = await input(\"name? \")\n        print(x)")
        );
    }

    #[test]
    fn test_every_call_on_a_line() {
        let result = rewrite("a, b = input(), input('b')");
        assert_eq!(
            result.source,
            wrapped("        a, b = await input(), await input('b')")
        );
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let once = rewrite("if True:\n    n = int(input())\n\nprint(n)\n");
        assert!(once.was_rewritten);
        let twice = rewrite(&once.source);
        assert!(!twice.was_rewritten);
        assert_eq!(twice.source, once.source);
    }

    #[test]
    fn test_lookalikes_do_not_trigger() {
        let src = concat!(
            "# input( in a comment\n",
            "s = \"input(\"\n",
            "t = 'call input() later'\n",
            "v = raw_input(1)\n",
            "w = reader.input(2)\n",
            "inputs = [1]\n",
            "x = 1  # then input(\n",
        );
        let result = rewrite(src);
        assert!(!result.was_rewritten, "{}", result.source);
    }

    #[test]
    fn test_shadowing_definition_is_not_awaited() {
        let result = rewrite("def input(p):\n    return p\nx = input('a')");
        assert_eq!(
            result.source,
            wrapped("        def input(p):\n            return p\n        x = await input('a')")
        );
    }

    #[test]
    fn test_triple_quoted_continuation_keeps_indent() {
        let src = "doc = \"\"\"first\ninput( inside\n  kept\"\"\"\nx = input()";
        let result = rewrite(src);
        assert!(result.was_rewritten);
        assert_eq!(
            result.source,
            wrapped("        doc = \"\"\"first\ninput( inside\n  kept\"\"\"\n        x = await input()")
        );
    }

    #[test]
    fn test_blank_lines_stay_blank() {
        let result = rewrite("a = input()\n\n   \nb = 2");
        assert_eq!(result.source, wrapped("        a = await input()\n\n\n        b = 2"));
    }

    #[test]
    fn test_tab_indentation_falls_back() {
        let src = "if True:\n\tx = input()\n";
        let result = rewrite(src);
        assert!(!result.was_rewritten);
        assert_eq!(result.source, src);
        assert_eq!(result.failure, Some(RewriteError::TabIndentation { line: 2 }));
    }

    #[test]
    fn test_unterminated_triple_string_falls_back() {
        let src = "x = input()\ns = '''never closed\n";
        let result = rewrite(src);
        assert_eq!(result.source, src);
        assert_eq!(
            result.failure,
            Some(RewriteError::UnterminatedString { line: 2 })
        );
    }

    #[test]
    fn test_custom_config() {
        let rewriter = SourceRewriter::new(RewriteConfig {
            call_name: "ask".into(),
            indent: 4,
            routine_name: "main".into(),
            reporter: "log_exc".into(),
        });
        let result = rewriter.rewrite("ask('q')\ninput('untouched')");
        assert_eq!(
            result.source,
            "import asyncio\n\nasync def main():\n  try:\n    await ask('q')\n    input('untouched')\n  except Exception as __bridge_exc:\n    log_exc(__bridge_exc)\n\nawait main()\n"
        );
    }

    #[test]
    fn test_too_small_indent_falls_back() {
        let rewriter = SourceRewriter::new(RewriteConfig {
            indent: 1,
            ..RewriteConfig::default()
        });
        let src = "x = input()\n";
        let result = rewriter.rewrite(src);
        assert!(!result.was_rewritten);
        assert_eq!(result.source, src);
        assert_eq!(result.failure, Some(RewriteError::InvalidIndent { indent: 1 }));
    }

    #[test]
    fn test_fstring_replacement_field_is_awaited() {
        let result = rewrite("print(f\"hello {input('name? ')}\")");
        assert!(result.was_rewritten);
        assert_eq!(
            result.source,
            wrapped("        print(f\"hello {await input('name? ')}\")")
        );

        let result = rewrite("n = rf'{len(input())!r:>{w}}'");
        assert_eq!(result.source, wrapped("        n = rf'{len(await input())!r:>{w}}'"));
    }

    #[test]
    fn test_fstring_literal_text_does_not_trigger() {
        let src = concat!(
            "a = f\"{{input(}}\"\n",
            "b = f'{\"input(\"} and input('\n",
            "c = f\"\"\"{x}\"\"\"\n",
            "d = b'input('\n",
        );
        let result = rewrite(src);
        assert!(!result.was_rewritten, "{}", result.source);
    }
}
