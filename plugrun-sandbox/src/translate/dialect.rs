//! Typed-dialect sniffing
//!
//! A fixed list of syntactic markers that only appear in TypeScript. The
//! patterns run over a token skeleton of the source, so nothing inside
//! strings, templates, regular expressions or comments can trigger them.

use crate::syntax;
use deno_ast::swc::parser::token::Token;
use deno_ast::{MediaType, TokenOrComment};
use regex::Regex;
use std::sync::LazyLock;

struct Marker {
    name: &'static str,
    pattern: LazyLock<Regex>,
}

macro_rules! marker {
    ($name:literal, $re:literal) => {
        Marker {
            name: $name,
            pattern: LazyLock::new(|| Regex::new($re).expect("marker pattern")),
        }
    };
}

static MARKERS: [Marker; 10] = [
    marker!(
        "interface or enum declaration",
        r"(?m)(^|[;{}])\s*(export\s+)?(declare\s+)?(const\s+)?(interface|enum)\s+[A-Za-z_$][\w$]*\s*(extends\b|\{)"
    ),
    marker!(
        "type alias",
        r"(?m)(^|[;{}])\s*(export\s+)?(declare\s+)?type\s+[A-Za-z_$][\w$]*\s*(<[^=;]*>\s*)?="
    ),
    marker!(
        "type-only import or export",
        r"\b(import|export)\s+type\s+[{*A-Za-z_$]"
    ),
    marker!(
        "annotated parameter",
        r"[(,]\s*[A-Za-z_$][\w$]*\s*\??\s*:\s*(string|number|boolean|any|unknown|void|never|object|bigint|symbol)(\s*\[\s*\])*\s*[,)=]"
    ),
    marker!(
        "annotated variable",
        r"\b(const|let|var)\s+[A-Za-z_$][\w$]*\s*:\s*[A-Za-z_${\[(]"
    ),
    marker!(
        "return type annotation",
        r"\)\s*:\s*(string|number|boolean|any|unknown|void|never|object|Promise\s*<|[A-Z][\w$]*(\s*<[^>]*>)?)(\s*\[\s*\])*\s*(\{|=\s*>)"
    ),
    marker!(
        "visibility modifier",
        r"(?m)(^|[;{}])\s*(public|private|protected|readonly)\s+[A-Za-z_$#]"
    ),
    marker!(
        "generic declaration",
        r"\b(function|class|interface)\s+[A-Za-z_$][\w$]*\s*<\s*[A-Za-z_$][\w$]*\s*(extends\b|,|>|=)"
    ),
    marker!(
        "type assertion",
        r"\bas\s+(string|number|boolean|any|unknown|const)\b"
    ),
    marker!(
        "implements clause",
        r"\bclass\s+[A-Za-z_$][\w$]*(\s*<[^>]*>)?(\s+extends\s+[\w$.]+)?\s+implements\s+[A-Za-z_$]"
    ),
];

/// Source with literals collapsed and comments dropped, one space between
/// tokens and a line break wherever the source had one
fn skeleton(code: &str) -> String {
    let code = syntax::without_bom(code);
    let mut out = String::with_capacity(code.len());
    let mut last_end = 0;
    for item in deno_ast::lex(code, MediaType::TypeScript) {
        let TokenOrComment::Token(token) = &item.inner else {
            continue;
        };
        if !out.is_empty() {
            let gap = code.get(last_end..item.range.start).unwrap_or_default();
            out.push(if gap.contains('\n') { '\n' } else { ' ' });
        }
        match token {
            Token::Str { .. } | Token::Template { .. } => out.push_str("\"\""),
            Token::Regex(..) => out.push_str("/r/"),
            _ => out.push_str(code.get(item.range.clone()).unwrap_or_default()),
        }
        last_end = item.range.end;
    }
    out
}

/// Names of the typed-dialect markers found in `code`
pub fn typed_markers(code: &str) -> Vec<&'static str> {
    let skeleton = skeleton(code);
    MARKERS
        .iter()
        .filter(|m| m.pattern.is_match(&skeleton))
        .map(|m| m.name)
        .collect()
}

/// Whether `code` looks like the typed dialect
pub fn is_typed(code: &str) -> bool {
    let skeleton = skeleton(code);
    MARKERS.iter().any(|m| m.pattern.is_match(&skeleton))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_javascript_is_not_typed() {
        let samples = [
            "module.exports = { add: (p) => p.a + p.b };",
            "class Greeter { greet(p) { return 'hi ' + p.name } }\nmodule.exports = { Greeter };",
            "const x = cond ? a : b; function f(a, b = 2) { return { a, b: number } }",
            "switch (k) { case f(x): { break } }",
            "import { a as b } from './m'; const type = 1;",
        ];
        for sample in samples {
            assert!(!is_typed(sample), "false positive on {sample}");
        }
    }

    #[test]
    fn test_each_marker_fires() {
        let cases = [
            ("interface Props { name: string }", "interface or enum declaration"),
            ("export enum Mode { A, B }", "interface or enum declaration"),
            ("type Id = string | number;", "type alias"),
            ("import type { Foo } from './foo';", "type-only import or export"),
            ("function add(a: number, b: number) { return a + b }", "annotated parameter"),
            ("let count: Map<string, number> = new Map();", "annotated variable"),
            ("function greet(p): Greeting { return p }", "return type annotation"),
            ("const f = (p): string => p.name;", "return type annotation"),
            ("class A {\n  private secret = 1\n}", "visibility modifier"),
            ("function first<T>(xs) { return xs[0] }", "generic declaration"),
            ("const n = value as number;", "type assertion"),
            ("class Echo implements Plugin {}", "implements clause"),
        ];
        for (code, marker) in cases {
            assert!(
                typed_markers(code).contains(&marker),
                "{marker} missed in {code}"
            );
        }
    }

    #[test]
    fn test_markers_inside_literals_are_ignored() {
        let code = "const doc = 'interface Foo { a: string }';\n// type X = number;\nconst t = `function f(a: number) {}`;";
        assert!(!is_typed(code));
    }

    #[test]
    fn test_non_ascii_and_unterminated_sources_do_not_panic() {
        assert!(!is_typed("const s = 'héllo wörld';"));
        assert!(!is_typed("const s = 'é"));
        assert!(is_typed("const s = 'é';\nlet n: number = 1;"));
    }
}
