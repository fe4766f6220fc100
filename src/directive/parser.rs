// ABOUTME: Line-based directive lexer/parser producing the Instruction tree.
//! Line-based directive lexer/parser. Turns source text into the
//! [`Instruction`] tree the execution machine walks.
//!
//! Directives are recognized one physical line at a time; everything that
//! isn't a directive line is scanned for `@{expr}` inline slots and turned
//! into a run of [`Instruction::Output`] fragments, so a source file with no
//! directives at all round-trips byte-for-byte.

use crate::directive::ast::{Conditional, Instruction, LoopKind};
use crate::error::BuilderError;

pub struct DirectiveParser {
    pub file: String,
}

impl DirectiveParser {
    pub fn new(file: impl Into<String>) -> Self {
        DirectiveParser { file: file.into() }
    }

    pub fn parse(&self, source: &str) -> Result<Vec<Instruction>, BuilderError> {
        let lines = split_lines_keep_ends(source);
        let mut pos = 0usize;
        let (instructions, trailing) = self.parse_block(&lines, &mut pos, &[])?;
        if let Some((keyword, line, _)) = trailing {
            return Err(self.err(line, format!("unexpected @{keyword} with no matching opener")));
        }
        Ok(instructions)
    }

    fn err(&self, line: usize, message: impl Into<String>) -> BuilderError {
        BuilderError::Parse {
            file: self.file.clone(),
            line,
            message: message.into(),
        }
    }

    /// Parses lines until EOF or one of `terminators` is seen as a bare
    /// directive keyword. Returns what was parsed plus, if a terminator
    /// stopped it, `(keyword, line_no, operand_text)` without consuming
    /// that line — callers like `@elseif` need to read their own operand.
    #[allow(clippy::type_complexity)]
    fn parse_block(
        &self,
        lines: &[&str],
        pos: &mut usize,
        terminators: &[&str],
    ) -> Result<(Vec<Instruction>, Option<(String, usize, String)>), BuilderError> {
        let mut out = Vec::new();
        while *pos < lines.len() {
            let line_no = *pos + 1;
            let raw = lines[*pos];
            let stripped = strip_comments(raw);
            let trimmed = stripped.trim_start();

            if let Some(rest) = trimmed.strip_prefix('@') {
                let (keyword, operand) = split_keyword(rest);
                if terminators.contains(&keyword.as_str()) {
                    return Ok((out, Some((keyword, line_no, operand.to_string()))));
                }
                *pos += 1;
                match keyword.as_str() {
                    "set" => out.push(self.parse_set(operand, line_no)?),
                    "include" => out.push(self.parse_include(operand, line_no)?),
                    "error" => out.push(Instruction::Error {
                        value: operand.trim().to_string(),
                        line: line_no,
                    }),
                    "warning" => out.push(Instruction::Warning {
                        value: operand.trim().to_string(),
                        line: line_no,
                    }),
                    "if" => out.push(self.parse_if(operand, line_no, lines, pos)?),
                    "while" => out.push(self.parse_loop(LoopKind::While, "endwhile", operand, line_no, lines, pos)?),
                    "repeat" => out.push(self.parse_loop(LoopKind::Repeat, "endrepeat", operand, line_no, lines, pos)?),
                    "macro" => out.push(self.parse_macro(operand, line_no, lines, pos)?),
                    "elseif" | "else" | "endif" | "endwhile" | "endrepeat" | "end" => {
                        return Err(self.err(line_no, format!("unexpected @{keyword}")));
                    }
                    other => return Err(self.err(line_no, format!("unknown directive @{other}"))),
                }
                continue;
            }

            *pos += 1;
            out.extend(parse_line_for_inline_slots(raw, line_no));
        }
        Ok((out, None))
    }

    fn parse_set(&self, operand: &str, line: usize) -> Result<Instruction, BuilderError> {
        let operand = operand.trim();
        let (variable, value) = match operand.find('=') {
            Some(idx) => (operand[..idx].trim(), operand[idx + 1..].trim()),
            None => return Err(self.err(line, "@set requires `name = expression`")),
        };
        if variable.is_empty() {
            return Err(self.err(line, "@set requires a variable name"));
        }
        Ok(Instruction::Set {
            variable: variable.to_string(),
            value: value.to_string(),
            line,
        })
    }

    fn parse_include(&self, operand: &str, line: usize) -> Result<Instruction, BuilderError> {
        let trimmed = operand.trim();
        let (once, rest) = match trimmed.strip_prefix("once") {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => (true, rest.trim_start()),
            _ => (false, trimmed),
        };
        if rest.is_empty() {
            return Err(self.err(line, "@include requires a source expression"));
        }
        Ok(Instruction::Include {
            value: rest.to_string(),
            once,
            line,
        })
    }

    fn parse_if(
        &self,
        operand: &str,
        line: usize,
        lines: &[&str],
        pos: &mut usize,
    ) -> Result<Instruction, BuilderError> {
        let (consequent, trailing) = self.parse_block(lines, pos, &["elseif", "else", "endif"])?;
        let mut cond = Conditional {
            test: operand.trim().to_string(),
            consequent,
            elseifs: Vec::new(),
            alternate: None,
            line,
        };

        let mut trailing = trailing.ok_or_else(|| self.err(line, "@if is missing a matching @endif"))?;
        loop {
            let (keyword, kw_line, operand) = trailing;
            match keyword.as_str() {
                "elseif" => {
                    let (body, next) = self.parse_block(lines, pos, &["elseif", "else", "endif"])?;
                    cond.elseifs.push(Conditional {
                        test: operand.trim().to_string(),
                        consequent: body,
                        elseifs: Vec::new(),
                        alternate: None,
                        line: kw_line,
                    });
                    trailing = next.ok_or_else(|| self.err(kw_line, "@elseif is missing a matching @endif"))?;
                }
                "else" => {
                    let (body, next) = self.parse_block(lines, pos, &["endif"])?;
                    next.ok_or_else(|| self.err(kw_line, "@else is missing a matching @endif"))?;
                    cond.alternate = Some(body);
                    return Ok(Instruction::Conditional(cond));
                }
                "endif" => return Ok(Instruction::Conditional(cond)),
                other => return Err(self.err(kw_line, format!("unexpected @{other} inside @if"))),
            }
        }
    }

    fn parse_loop(
        &self,
        kind: LoopKind,
        terminator: &str,
        operand: &str,
        line: usize,
        lines: &[&str],
        pos: &mut usize,
    ) -> Result<Instruction, BuilderError> {
        let condition = operand.trim().to_string();
        if condition.is_empty() {
            return Err(self.err(line, format!("@{} requires a condition", loop_keyword(kind))));
        }
        let (body, trailing) = self.parse_block(lines, pos, &[terminator])?;
        trailing.ok_or_else(|| {
            self.err(
                line,
                format!("@{} is missing a matching @{terminator}", loop_keyword(kind)),
            )
        })?;
        Ok(Instruction::Loop {
            kind,
            condition,
            body,
            line,
        })
    }

    fn parse_macro(
        &self,
        operand: &str,
        line: usize,
        lines: &[&str],
        pos: &mut usize,
    ) -> Result<Instruction, BuilderError> {
        let declaration = operand.trim().to_string();
        if declaration.is_empty() {
            return Err(self.err(line, "@macro requires a declaration"));
        }
        let (body, trailing) = self.parse_block(lines, pos, &["end"])?;
        trailing.ok_or_else(|| self.err(line, "@macro is missing a matching @end"))?;
        Ok(Instruction::Macro {
            declaration,
            body,
            line,
        })
    }
}

fn loop_keyword(kind: LoopKind) -> &'static str {
    match kind {
        LoopKind::While => "while",
        LoopKind::Repeat => "repeat",
    }
}

/// Splits `source` into lines, keeping each line's trailing `\n` (or `\r\n`)
/// attached so verbatim text reproduces exactly.
fn split_lines_keep_ends(source: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = source.as_bytes();
    for i in 0..bytes.len() {
        if bytes[i] == b'\n' {
            out.push(&source[start..=i]);
            start = i + 1;
        }
    }
    if start < source.len() {
        out.push(&source[start..]);
    }
    out
}

/// Splits `rest` (the text right after an `@`) into its keyword and operand.
fn split_keyword(rest: &str) -> (String, &str) {
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    (rest[..end].to_string(), &rest[end..])
}

/// Strips `//` line comments and `/* */` block comments, leaving quoted
/// string contents untouched so a literal `http://` or a `"//"` inside a
/// string isn't mistaken for a comment opener.
fn strip_comments(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    let mut in_string: Option<char> = None;
    while let Some(c) = chars.next() {
        if let Some(q) = in_string {
            out.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else if c == q {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                in_string = Some(c);
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                break;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c2 in chars.by_ref() {
                    if prev == '*' && c2 == '/' {
                        break;
                    }
                    prev = c2;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Scans a non-directive line for `@{expr}` slots, alternating verbatim and
/// computed `Output` instructions. Always yields at least one instruction,
/// even for an empty line, so the original text (including its newline)
/// round-trips when there are no directives.
fn parse_line_for_inline_slots(line: &str, line_no: usize) -> Vec<Instruction> {
    let mut out = Vec::new();
    let mut rest = line;
    loop {
        match rest.find("@{") {
            None => {
                out.push(Instruction::Output {
                    value: rest.to_string(),
                    computed: true,
                    line: line_no,
                });
                break;
            }
            Some(start) => {
                if start > 0 {
                    out.push(Instruction::Output {
                        value: rest[..start].to_string(),
                        computed: true,
                        line: line_no,
                    });
                }
                let after = &rest[start + 2..];
                match find_matching_brace(after) {
                    Some(end) => {
                        out.push(Instruction::Output {
                            value: after[..end].to_string(),
                            computed: false,
                            line: line_no,
                        });
                        rest = &after[end + 1..];
                    }
                    None => {
                        // Unterminated slot: treat the rest of the line as literal.
                        out.push(Instruction::Output {
                            value: rest[start..].to_string(),
                            computed: true,
                            line: line_no,
                        });
                        break;
                    }
                }
            }
        }
    }
    if out.is_empty() {
        out.push(Instruction::Output {
            value: String::new(),
            computed: true,
            line: line_no,
        });
    }
    out
}

/// Finds the index of the `}` that closes an `@{` slot, respecting nested
/// braces and quoted strings (so `@{a["}"]}` doesn't close early).
fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut chars = s.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if let Some(q) = in_string {
            if c == '\\' {
                chars.next();
            } else if c == q {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Instruction> {
        DirectiveParser::new("test.txt").parse(src).unwrap()
    }

    #[test]
    fn plain_text_round_trips_as_a_single_output() {
        let instrs = parse("hello world\n");
        assert_eq!(instrs.len(), 1);
        match &instrs[0] {
            Instruction::Output { value, computed, .. } => {
                assert_eq!(value, "hello world\n");
                assert!(*computed);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn inline_slot_splits_into_literal_and_expression_fragments() {
        let instrs = parse("x = @{1+1}!\n");
        assert_eq!(instrs.len(), 3);
        assert!(matches!(&instrs[0], Instruction::Output { computed: true, .. }));
        assert!(matches!(&instrs[1], Instruction::Output { computed: false, .. }));
        assert!(matches!(&instrs[2], Instruction::Output { computed: true, .. }));
    }

    #[test]
    fn set_directive_splits_name_and_expression() {
        let instrs = parse("@set x = 1 + 2\n");
        match &instrs[0] {
            Instruction::Set { variable, value, .. } => {
                assert_eq!(variable, "x");
                assert_eq!(value, "1 + 2");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn if_else_endif_builds_a_conditional() {
        let instrs = parse("@if x\nA\n@else\nB\n@endif\n");
        match &instrs[0] {
            Instruction::Conditional(cond) => {
                assert_eq!(cond.test, "x");
                assert!(cond.alternate.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn elseif_chain_is_captured() {
        let instrs = parse("@if a\n1\n@elseif b\n2\n@else\n3\n@endif\n");
        match &instrs[0] {
            Instruction::Conditional(cond) => {
                assert_eq!(cond.elseifs.len(), 1);
                assert_eq!(cond.elseifs[0].test, "b");
                assert!(cond.alternate.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_endif_is_a_parse_error() {
        assert!(DirectiveParser::new("t").parse("@if x\nA\n").is_err());
    }

    #[test]
    fn include_once_sets_the_flag() {
        let instrs = parse("@include once \"a.txt\"\n");
        match &instrs[0] {
            Instruction::Include { once, value, .. } => {
                assert!(*once);
                assert_eq!(value, "\"a.txt\"");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn line_comment_does_not_eat_a_url_inside_a_string() {
        let instrs = parse("@set x = \"http://example.com\" // trailing comment\n");
        match &instrs[0] {
            Instruction::Set { value, .. } => assert_eq!(value, "\"http://example.com\""),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn while_loop_requires_endwhile() {
        let instrs = parse("@while i < 3\nx\n@endwhile\n");
        assert!(matches!(&instrs[0], Instruction::Loop { kind: LoopKind::While, .. }));
    }

    #[test]
    fn macro_declaration_and_body_are_captured() {
        let instrs = parse("@macro Greet(name)\nhi @{name}\n@end\n");
        match &instrs[0] {
            Instruction::Macro { declaration, body, .. } => {
                assert_eq!(declaration, "Greet(name)");
                assert_eq!(body.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
