use crate::{ParseError, PatchError};
use rustpython_parser::ast::{self, Ranged};
use rustpython_parser::lexer::lex;
use rustpython_parser::text_size::{TextRange, TextSize};
use rustpython_parser::{Mode, Parse, Tok};
use std::ops::Range;
use tracing::debug;

/// The function whose call configures the package
const ENTRY_POINT: &str = "setup";
/// The keyword argument of [ENTRY_POINT] listing the extensions
const EXTENSIONS_KEYWORD: &str = "rust_extensions";
/// The constructor of a single extension entry
const EXTENSION_CONSTRUCTOR: &str = "RustExtension";
const OPTIONAL_KEYWORD: &str = "optional";
const OPTIONAL_VALUE: &str = "True";
/// Name under which the parser reports errors
const SOURCE_PATH: &str = "setup.py";

/// A token of the script with its byte range
type Spanned = (Tok, TextRange);

/// Replaces the bytes in `range` with `replacement`
#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    range: Range<usize>,
    replacement: String,
}

/// Sets `optional=True` on every `RustExtension(...)` passed as `rust_extensions` to the
/// top-level `setup(...)` call, inserting the argument where it is missing.
///
/// Only the value of `optional` (or the inserted argument) changes, the rest of the file
/// is returned exactly as it was.
pub fn set_optional_true(setup_py: &str) -> Result<String, PatchError> {
    let suite = ast::Suite::parse(setup_py, SOURCE_PATH)
        .map_err(|err| ParseError::at(setup_py, err.error.to_string(), err.offset))?;
    // Comments and line breaks inside the argument lists decide where an inserted
    // argument goes, the syntax tree doesn't have them
    let tokens = lex(setup_py, Mode::Module)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ParseError::at(setup_py, err.error.to_string(), err.location))?;

    let setup_call = find_setup_call(&suite)?;
    let Some(value) = keyword_argument(setup_call, EXTENSIONS_KEYWORD) else {
        return Err(PatchError::NotFound(format!(
            "The `{ENTRY_POINT}()` call has no `{EXTENSIONS_KEYWORD}` argument"
        )));
    };
    let extensions = match value {
        ast::Expr::List(ast::ExprList { elts, .. }) | ast::Expr::Tuple(ast::ExprTuple { elts, .. }) => {
            elts
        }
        other => {
            return Err(PatchError::Structure(format!(
                "Expected `{EXTENSIONS_KEYWORD}` to be a list or a tuple, found `{}`",
                source_text(setup_py, other.range())
            )));
        }
    };

    let mut edits = Vec::with_capacity(extensions.len());
    for entry in extensions {
        match entry {
            ast::Expr::Call(call) if is_call_to(call, EXTENSION_CONSTRUCTOR) => {
                edits.push(optional_edit(setup_py, &tokens, call)?);
            }
            other => {
                return Err(PatchError::Structure(format!(
                    "Expected every entry of `{EXTENSIONS_KEYWORD}` to be a `{EXTENSION_CONSTRUCTOR}(...)` call, found `{}`",
                    source_text(setup_py, other.range())
                )));
            }
        }
    }
    debug!("Making {} Rust extension(s) optional", edits.len());

    Ok(apply_edits(setup_py, edits))
}

fn source_text(source: &str, range: TextRange) -> String {
    source[range].trim().to_string()
}

fn is_call_to(call: &ast::ExprCall, name: &str) -> bool {
    matches!(call.func.as_ref(), ast::Expr::Name(ast::ExprName { id, .. }) if id.as_str() == name)
}

/// Finds the single `setup(...)` expression statement at module level.
///
/// Calls inside blocks, such as under `if __name__ == "__main__":`, are not considered.
fn find_setup_call(suite: &[ast::Stmt]) -> Result<&ast::ExprCall, PatchError> {
    let calls: Vec<&ast::ExprCall> = suite
        .iter()
        .filter_map(|stmt| match stmt {
            ast::Stmt::Expr(ast::StmtExpr { value, .. }) => match value.as_ref() {
                ast::Expr::Call(call) if is_call_to(call, ENTRY_POINT) => Some(call),
                _ => None,
            },
            _ => None,
        })
        .collect();

    match calls.as_slice() {
        [call] => Ok(*call),
        [] => Err(PatchError::NotFound(format!(
            "There is no top-level `{ENTRY_POINT}(...)` call"
        ))),
        calls => Err(PatchError::Structure(format!(
            "Expected exactly one top-level `{ENTRY_POINT}(...)` call, found {}",
            calls.len()
        ))),
    }
}

/// The value of the keyword argument `keyword` of `call`, not looking into nested calls
fn keyword_argument<'a>(call: &'a ast::ExprCall, keyword: &str) -> Option<&'a ast::Expr> {
    call.keywords
        .iter()
        .find(|argument| argument.arg.as_ref().is_some_and(|arg| arg.as_str() == keyword))
        .map(|argument| &argument.value)
}

/// Overwrites the value of `optional`, or appends `optional=True` if there is none
fn optional_edit(
    source: &str,
    tokens: &[Spanned],
    call: &ast::ExprCall,
) -> Result<Edit, PatchError> {
    let mut optional = call.keywords.iter().filter(|argument| {
        argument
            .arg
            .as_ref()
            .is_some_and(|arg| arg.as_str() == OPTIONAL_KEYWORD)
    });
    let Some(existing) = optional.next() else {
        let arguments = ArgumentList::find(tokens, call).ok_or_else(|| {
            PatchError::Structure(format!(
                "Failed to find the argument list of `{}`",
                source_text(source, call.range)
            ))
        })?;
        return Ok(arguments.append(source, &format!("{OPTIONAL_KEYWORD}={OPTIONAL_VALUE}")));
    };
    if let Some(repeated) = optional.next() {
        return Err(ParseError::at(
            source,
            format!("keyword argument repeated: {OPTIONAL_KEYWORD}"),
            repeated.range.start(),
        )
        .into());
    }
    Ok(Edit {
        range: existing.value.range().into(),
        replacement: OPTIONAL_VALUE.to_string(),
    })
}

/// The significant tokens of the parenthesized arguments of a call, comments and line
/// breaks left out
#[derive(Debug)]
struct ArgumentList<'a> {
    open: TextRange,
    inner: Vec<&'a Spanned>,
    close: TextRange,
}

impl<'a> ArgumentList<'a> {
    fn find(tokens: &'a [Spanned], call: &ast::ExprCall) -> Option<Self> {
        let func_end = call.func.range().end();
        let start = tokens.partition_point(|(_, range)| range.start() < func_end);
        let significant: Vec<&Spanned> = tokens[start..]
            .iter()
            .take_while(|(_, range)| range.end() <= call.range.end())
            .filter(|(tok, _)| !matches!(tok, Tok::Comment(_) | Tok::NonLogicalNewline))
            .collect();
        let [&(Tok::Lpar, open), ref inner @ .., &(Tok::Rpar, close)] = significant[..] else {
            return None;
        };
        Some(Self {
            open,
            inner: inner.to_vec(),
            close,
        })
    }

    /// Appends `argument`, following the layout of the existing arguments.
    ///
    /// With one argument per line, the new argument gets its own line at the same
    /// indentation, comments after the last argument stay on their line and the closing
    /// parenthesis keeps its indentation. Otherwise it is separated by a single space.
    fn append(&self, source: &str, argument: &str) -> Edit {
        let Some(&&(ref last_tok, last_range)) = self.inner.last() else {
            let at = offset(self.open.end());
            return Edit {
                range: at..at,
                replacement: argument.to_string(),
            };
        };
        let trailing_comma = matches!(last_tok, Tok::Comma);
        let arguments = if trailing_comma {
            &self.inner[..self.inner.len() - 1]
        } else {
            &self.inner[..]
        };

        let mut depth = 0usize;
        let mut separator_end = self.open.end();
        let mut argument_start = None;
        for (tok, range) in arguments.iter().copied() {
            if depth == 0 && matches!(tok, Tok::Comma) {
                separator_end = range.end();
                argument_start = None;
                continue;
            }
            argument_start.get_or_insert(range.start());
            match tok {
                Tok::Lpar | Tok::Lsqb | Tok::Lbrace => depth += 1,
                Tok::Rpar | Tok::Rsqb | Tok::Rbrace => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        let argument_start = argument_start.unwrap_or(separator_end);

        let before_argument = &source[offset(separator_end)..offset(argument_start)];
        let tail = offset(last_range.end())..offset(self.close.start());
        let before_close = &source[tail.clone()];
        let (leading, closing) = match (
            split_last_line(before_argument),
            split_last_line(before_close),
        ) {
            (Some((_, indentation)), Some((comments, closing))) => {
                (format!("{comments}{indentation}"), closing)
            }
            _ => (" ".to_string(), before_close),
        };

        let replacement = if trailing_comma {
            format!("{leading}{argument},{closing}")
        } else {
            format!(",{leading}{argument}{closing}")
        };
        Edit {
            range: tail,
            replacement,
        }
    }
}

fn offset(size: TextSize) -> usize {
    usize::from(size)
}

/// Splits whitespace and comments before the last line break, returning the text before
/// the break and the break with the indentation after it
fn split_last_line(trivia: &str) -> Option<(&str, &str)> {
    let index = trivia.rfind(['\n', '\r'])?;
    let start = if trivia[..=index].ends_with("\r\n") {
        index - 1
    } else {
        index
    };
    Some(trivia.split_at(start))
}

/// Applies non-overlapping edits, copying everything between them unchanged
fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|edit| edit.range.start);
    let mut patched = String::with_capacity(source.len() + 16 * edits.len());
    let mut copied = 0;
    for edit in edits {
        patched.push_str(&source[copied..edit.range.start]);
        patched.push_str(&edit.replacement);
        copied = edit.range.end;
    }
    patched.push_str(&source[copied..]);
    patched
}
