//! Plugin source parsing
//!
//! Thin layer over `deno_ast`: one parse entry point for plugin source plus
//! the span and binding helpers the bundler and the harness share.

use crate::translate::dialect;
use deno_ast::swc::ast::{Decl, ModuleDecl, ObjectPatProp, Pat, PropName, Stmt};
use deno_ast::swc::common::Span;
use deno_ast::swc::parser::token::Token;
use deno_ast::{
    MediaType, ModuleItemRef, ModuleSpecifier, ParseParams, ParsedSource, ProgramRef,
    StartSourcePos, TokenOrComment,
};
use std::ops::Range;

/// Parse plugin source, as TypeScript when it sniffs as the typed dialect.
///
/// Only fatal syntax errors fail; errors the parser recovers from are left
/// for the sandbox's own syntax check to report.
pub(crate) fn parse(code: &str) -> Result<ParsedSource, String> {
    let typed = dialect::is_typed(code);
    let (file, media_type) = if typed {
        ("file:///plugin.ts", MediaType::TypeScript)
    } else {
        ("file:///plugin.js", MediaType::JavaScript)
    };
    let specifier = ModuleSpecifier::parse(file).map_err(|e| e.to_string())?;

    deno_ast::parse_program(ParseParams {
        specifier,
        text: without_bom(code).into(),
        media_type,
        capture_tokens: false,
        scope_analysis: false,
        maybe_syntax: None,
    })
    .map_err(|e| e.to_string())
}

/// `code` without a leading byte order mark
pub(crate) fn without_bom(code: &str) -> &str {
    code.strip_prefix('\u{FEFF}').unwrap_or(code)
}

/// Byte range of `span` in the parsed text
pub(crate) fn byte_range(span: Span) -> Range<usize> {
    let origin = StartSourcePos::START_SOURCE_POS.as_byte_pos().0;
    span.lo.0.saturating_sub(origin) as usize..span.hi.0.saturating_sub(origin) as usize
}

/// 1-based line of byte `offset` in `text`
pub(crate) fn line_of(text: &str, offset: usize) -> usize {
    text.get(..offset)
        .map_or(0, |head| head.matches('\n').count())
        + 1
}

/// Names declared by top-level `function`, `class`, `const`, `let` and
/// `var` statements, exported or not, in declaration order
pub(crate) fn top_level_bindings(program: ProgramRef<'_>) -> Vec<String> {
    let mut names = Vec::new();
    for item in program.body() {
        let decl = match item {
            ModuleItemRef::Stmt(Stmt::Decl(decl)) => decl,
            ModuleItemRef::ModuleDecl(ModuleDecl::ExportDecl(export)) => &export.decl,
            _ => continue,
        };
        for name in declared_names(decl) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Names a declaration binds; empty for type-only declarations
pub(crate) fn declared_names(decl: &Decl) -> Vec<String> {
    match decl {
        Decl::Fn(function) => vec![function.ident.sym.to_string()],
        Decl::Class(class) => vec![class.ident.sym.to_string()],
        Decl::Var(var) => {
            let mut names = Vec::new();
            for declarator in &var.decls {
                pattern_names(&declarator.name, &mut names);
            }
            names
        }
        _ => Vec::new(),
    }
}

/// Identifiers bound by a destructuring pattern
pub(crate) fn pattern_names(pat: &Pat, names: &mut Vec<String>) {
    match pat {
        Pat::Ident(binding) => names.push(binding.id.sym.to_string()),
        Pat::Array(array) => {
            for elem in array.elems.iter().flatten() {
                pattern_names(elem, names);
            }
        }
        Pat::Rest(rest) => pattern_names(&rest.arg, names),
        Pat::Object(object) => {
            for prop in &object.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => pattern_names(&kv.value, names),
                    ObjectPatProp::Assign(assign) => names.push(assign.key.id.sym.to_string()),
                    ObjectPatProp::Rest(rest) => pattern_names(&rest.arg, names),
                }
            }
        }
        Pat::Assign(assign) => pattern_names(&assign.left, names),
        Pat::Invalid(_) | Pat::Expr(_) => {}
    }
}

/// Source-level keys of an object pattern (`{ a, b: c }` yields `a`, `b`)
pub(crate) fn pattern_keys(pat: &Pat) -> Vec<String> {
    let Pat::Object(object) = pat else {
        return Vec::new();
    };
    object
        .props
        .iter()
        .filter_map(|prop| match prop {
            ObjectPatProp::KeyValue(kv) => match &kv.key {
                PropName::Ident(ident) => Some(ident.sym.to_string()),
                PropName::Str(s) => Some(s.value.to_string()),
                _ => None,
            },
            ObjectPatProp::Assign(assign) => Some(assign.key.id.sym.to_string()),
            ObjectPatProp::Rest(_) => None,
        })
        .collect()
}

/// Decoded values of every string literal token in `code`.
///
/// Works on source the parser rejects: the lexer reports bad input as error
/// tokens and keeps going.
pub(crate) fn string_literals(code: &str) -> Vec<String> {
    deno_ast::lex(without_bom(code), MediaType::JavaScript)
        .into_iter()
        .filter_map(|item| match item.inner {
            TokenOrComment::Token(Token::Str { value, .. }) => Some(value.to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(code: &str) -> Vec<String> {
        let parsed = parse(code).unwrap();
        top_level_bindings(parsed.program_ref())
    }

    #[test]
    fn test_top_level_bindings_skip_nested_scopes() {
        let names = bindings(
            "const a = 1, { b, c: [d, ...e] } = obj;\nfunction f() { const inner = 1; }\nclass G {}\nif (x) { var hidden = 1; }\nexport let h = 2;\nasync function* gen() {}",
        );
        assert_eq!(names, vec!["a", "b", "d", "e", "f", "G", "h", "gen"]);
    }

    #[test]
    fn test_parse_reports_fatal_errors() {
        let err = parse("const broken = ;").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn test_non_ascii_source_parses() {
        let parsed = parse("const s = 'héllo wörld';\nexport const t = \"日本\";").unwrap();
        assert_eq!(top_level_bindings(parsed.program_ref()), vec!["s", "t"]);
    }

    #[test]
    fn test_unterminated_non_ascii_string_does_not_panic() {
        assert!(parse("const s = 'é").is_err());
        assert!(parse("const s = \"ü\nnext()").is_err());
        assert!(string_literals("const s = 'é")
            .iter()
            .all(|value| value != "@plugin/sdk"));
    }

    #[test]
    fn test_string_literals_decode_escapes() {
        let values = string_literals(r#"const a = '@plugin/sdk'; const b = "tab\there"; // 'skipped'"#);
        assert_eq!(values, vec!["@plugin/sdk", "tab\there"]);
    }

    #[test]
    fn test_byte_range_and_line_of_handle_multibyte_text() {
        let parsed = parse("const é = 1;\nconst z = 2;").unwrap();
        let last = parsed.program_ref().body().last().unwrap();
        let range = byte_range(deno_ast::swc::common::Spanned::span(&last));
        assert_eq!(&parsed.text()[range.clone()], "const z = 2;");
        assert_eq!(line_of(parsed.text(), range.start), 2);
    }

    #[test]
    fn test_byte_order_mark_is_ignored() {
        let parsed = parse("\u{FEFF}const a = 1;").unwrap();
        assert_eq!(top_level_bindings(parsed.program_ref()), vec!["a"]);
    }
}
