//! Single-file bundler
//!
//! Treats the plugin source as the entry module and emits one script in the
//! CommonJS-style convention the harness provides (`module`, `exports`,
//! `require`). Imports of [`LIBRARY_NAMESPACE`] are bound to the in-memory
//! stub; nothing else can be resolved, because a plugin bundle is a single
//! file.

pub mod stub;

use crate::error::{Result, SandboxError};
use crate::syntax;
use crate::types::CompilationResult;
use deno_ast::swc::ast::{
    CallExpr, Callee, Decl, DefaultDecl, ExportAll, ExportDecl, ExportDefaultDecl,
    ExportSpecifier, Expr, ImportDecl, ImportSpecifier, Lit, ModuleDecl, NamedExport,
    VarDeclarator,
};
use deno_ast::swc::common::{BytePos, Span, Spanned};
use deno_ast::swc::visit::{Visit, VisitWith};
use deno_ast::ModuleItemRef;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub use stub::{LIBRARY_NAMESPACE, SDK_VERSION};

/// Identifier the bundled stub module is bound to
pub const SDK_BINDING: &str = "__plugrun_sdk";

/// How references to the host library are satisfied while lowering
#[derive(Debug, Clone, Copy)]
pub(crate) enum LibraryLink<'a> {
    /// The stub is defined once at the top of the bundle as [`SDK_BINDING`]
    Bundled,
    /// Every reference is replaced by this inline stub expression and other
    /// modules are left to the harness `require`
    Inline(&'a str),
}

impl LibraryLink<'_> {
    fn expression(&self) -> &str {
        match self {
            LibraryLink::Bundled => SDK_BINDING,
            LibraryLink::Inline(expr) => expr,
        }
    }
}

/// Output of module lowering
#[derive(Debug, Default)]
pub(crate) struct Lowered {
    pub code: String,
    pub has_module_syntax: bool,
    pub references_library: bool,
    pub library_names: BTreeSet<String>,
    pub warnings: Vec<String>,
}

/// Bundle `code` against the host library stub.
pub fn bundle(code: &str, bindings: &BTreeMap<String, Value>) -> Result<CompilationResult> {
    let lowered = lower(code, LibraryLink::Bundled, bindings)
        .map_err(|errors| SandboxError::Bundling(errors.join("\n")))?;

    let mut executable_code = String::with_capacity(lowered.code.len() + 4096);
    executable_code.push_str("const ");
    executable_code.push_str(SDK_BINDING);
    executable_code.push_str(" = ");
    executable_code.push_str(&stub::stub_expression(bindings));
    executable_code.push_str(";\n");
    executable_code.push_str(&lowered.code);

    let mut diagnostics = lowered.warnings;
    if lowered.has_module_syntax {
        diagnostics.push("ES module syntax lowered to CommonJS".to_string());
    }
    diagnostics.push(format!(
        "Bundled against {}@{}",
        LIBRARY_NAMESPACE, SDK_VERSION
    ));

    tracing::debug!(
        input_len = code.len(),
        output_len = executable_code.len(),
        resolved = lowered.library_names.len(),
        "Plugin bundled"
    );

    Ok(CompilationResult {
        executable_code,
        diagnostics,
        resolved_binding_names: lowered.library_names,
        typed_dialect: false,
        bundled: true,
        references_library: lowered.references_library,
    })
}

/// Whether the source imports or requires the host library.
///
/// Source the parser rejects falls back to a scan of its string literals.
pub fn references_library(code: &str) -> bool {
    let Ok(parsed) = syntax::parse(code) else {
        return names_library(code);
    };
    let mut finder = LibraryReferences::default();
    parsed.program_ref().visit_with(&mut finder);
    finder.found
}

fn names_library(code: &str) -> bool {
    syntax::string_literals(code)
        .iter()
        .any(|value| value == LIBRARY_NAMESPACE)
}

#[derive(Default)]
struct LibraryReferences {
    found: bool,
}

impl Visit for LibraryReferences {
    fn visit_import_decl(&mut self, import: &ImportDecl) {
        self.found |= &*import.src.value == LIBRARY_NAMESPACE;
    }

    fn visit_named_export(&mut self, export: &NamedExport) {
        self.found |= export
            .src
            .as_ref()
            .is_some_and(|src| &*src.value == LIBRARY_NAMESPACE);
    }

    fn visit_export_all(&mut self, export: &ExportAll) {
        self.found |= &*export.src.value == LIBRARY_NAMESPACE;
    }

    fn visit_call_expr(&mut self, call: &CallExpr) {
        if is_library_require(call) {
            self.found = true;
            return;
        }
        call.visit_children_with(self);
    }
}

/// `require("@plugin/sdk")` with a plain string argument
fn is_library_require(call: &CallExpr) -> bool {
    let Callee::Expr(callee) = &call.callee else {
        return false;
    };
    let Expr::Ident(ident) = &**callee else {
        return false;
    };
    if &*ident.sym != "require" {
        return false;
    }
    match call.args.as_slice() {
        [arg] if arg.spread.is_none() => {
            matches!(&*arg.expr, Expr::Lit(Lit::Str(s)) if &*s.value == LIBRARY_NAMESPACE)
        }
        _ => false,
    }
}

/// Rewrite module syntax and host-library references into plain script code.
///
/// Source that does not parse is passed through untouched with a warning;
/// the sandbox's syntax check reports the error.
pub(crate) fn lower(
    code: &str,
    link: LibraryLink<'_>,
    bindings: &BTreeMap<String, Value>,
) -> std::result::Result<Lowered, Vec<String>> {
    let parsed = match syntax::parse(code) {
        Ok(parsed) => parsed,
        Err(message) => {
            tracing::debug!(error = %message, "Plugin source did not parse; left as is");
            return Ok(Lowered {
                code: code.to_string(),
                references_library: names_library(code),
                warnings: vec![format!("Source left untranslated: {}", message)],
                ..Default::default()
            });
        }
    };
    let text: &str = parsed.text();

    let mut lowering = Lowering {
        text,
        link,
        bindings,
        edits: Vec::new(),
        footer: Vec::new(),
        errors: Vec::new(),
        out: Lowered::default(),
        temp_counter: 0,
    };
    let program = parsed.program_ref();
    for item in program.body() {
        if let ModuleItemRef::ModuleDecl(decl) = item {
            lowering.module_decl(decl);
        }
    }
    program.visit_with(&mut lowering);

    if !lowering.errors.is_empty() {
        return Err(lowering.errors);
    }

    let Lowering {
        mut edits,
        footer,
        mut out,
        ..
    } = lowering;

    edits.sort_by_key(|e| e.start);
    let mut result = String::with_capacity(text.len() + 256);
    let mut cursor = 0;
    for edit in &edits {
        let (Some(kept), Some(removed)) = (text.get(cursor..edit.start), text.get(edit.start..edit.end))
        else {
            continue;
        };
        result.push_str(kept);
        result.push_str(&edit.replacement);
        // Keep line numbers stable for stack traces
        let removed_lines = removed.matches('\n').count();
        let added_lines = edit.replacement.matches('\n').count();
        for _ in added_lines..removed_lines {
            result.push('\n');
        }
        cursor = edit.end;
    }
    result.push_str(text.get(cursor..).unwrap_or_default());

    if out.has_module_syntax {
        result.push_str("\nObject.defineProperty(exports, \"__esModule\", { value: true });");
    }
    for line in footer {
        result.push('\n');
        result.push_str(&line);
    }
    if out.has_module_syntax {
        result.push('\n');
    }

    out.code = result;
    Ok(out)
}

struct Edit {
    start: usize,
    end: usize,
    replacement: String,
}

struct Lowering<'t, 'b> {
    text: &'t str,
    link: LibraryLink<'b>,
    bindings: &'b BTreeMap<String, Value>,
    edits: Vec<Edit>,
    footer: Vec<String>,
    errors: Vec<String>,
    out: Lowered,
    temp_counter: usize,
}

impl Lowering<'_, '_> {
    fn module_decl(&mut self, decl: &ModuleDecl) {
        self.out.has_module_syntax = true;
        match decl {
            ModuleDecl::Import(import) => self.import(import),
            ModuleDecl::ExportDecl(export) => self.export_decl(export),
            ModuleDecl::ExportNamed(export) => self.export_named(export),
            ModuleDecl::ExportDefaultDecl(export) => self.export_default_decl(export),
            ModuleDecl::ExportDefaultExpr(export) => {
                self.edit(export.span.lo, export.expr.span().lo, "exports.default = ");
            }
            ModuleDecl::ExportAll(export) => self.export_all(export),
            ModuleDecl::TsNamespaceExport(export) => self.erase(export.span),
            ModuleDecl::TsImportEquals(import) => {
                self.error_at(import.span, "Unsupported import syntax")
            }
            ModuleDecl::TsExportAssignment(export) => {
                self.error_at(export.span, "Unsupported export form")
            }
        }
    }

    fn next_temp(&mut self) -> String {
        self.temp_counter += 1;
        format!("__plugrun_module_{}", self.temp_counter)
    }

    fn error_at(&mut self, span: Span, message: &str) {
        let line = syntax::line_of(self.text, syntax::byte_range(span).start);
        self.errors.push(format!("{} (line {})", message, line));
    }

    fn edit(&mut self, from: BytePos, to: BytePos, replacement: &str) {
        let range = syntax::byte_range(Span::new(from, to));
        self.edits.push(Edit {
            start: range.start,
            end: range.end,
            replacement: replacement.to_string(),
        });
    }

    fn replace(&mut self, span: Span, replacement: String) {
        let range = syntax::byte_range(span);
        self.edits.push(Edit {
            start: range.start,
            end: range.end,
            replacement,
        });
    }

    fn erase(&mut self, span: Span) {
        self.replace(span, String::new());
    }

    /// Expression for a module specifier, or `None` when it cannot be resolved
    fn module_expression(&mut self, specifier: &str, span: Span) -> Option<String> {
        if specifier == LIBRARY_NAMESPACE {
            self.out.references_library = true;
            return Some(self.link.expression().to_string());
        }
        match self.link {
            LibraryLink::Bundled => {
                self.error_at(
                    span,
                    &format!(
                        "Could not resolve \"{}\": only {} can be imported",
                        specifier, LIBRARY_NAMESPACE
                    ),
                );
                None
            }
            LibraryLink::Inline(_) => Some(format!("require({})", js_string(specifier))),
        }
    }

    fn note_library_name(&mut self, specifier: &str, name: &str) {
        if specifier != LIBRARY_NAMESPACE {
            return;
        }
        if stub::provides(name, self.bindings) {
            self.out.library_names.insert(name.to_string());
        } else {
            self.out.warnings.push(format!(
                "\"{}\" is not provided by {}",
                name, LIBRARY_NAMESPACE
            ));
        }
    }

    fn import(&mut self, import: &ImportDecl) {
        if import.type_only {
            return self.erase(import.span);
        }
        let specifier: &str = &import.src.value;

        // import "module";
        if import.specifiers.is_empty() {
            let replacement = if specifier == LIBRARY_NAMESPACE {
                self.out.references_library = true;
                String::new()
            } else {
                match self.module_expression(specifier, import.src.span) {
                    Some(expr) => format!("{};", expr),
                    None => return,
                }
            };
            return self.replace(import.span, replacement);
        }

        let Some(module_expr) = self.module_expression(specifier, import.src.span) else {
            return;
        };
        let is_library = specifier == LIBRARY_NAMESPACE;
        let temp = self.next_temp();
        let mut parts = vec![format!("const {} = {};", temp, module_expr)];
        let mut fields = Vec::new();

        for spec in &import.specifiers {
            match spec {
                ImportSpecifier::Default(default) => {
                    self.note_library_name(specifier, "default");
                    let local = &default.local.sym;
                    if is_library {
                        parts.push(format!("const {} = {}.default;", local, temp));
                    } else {
                        parts.push(format!(
                            "const {local} = {temp} && {temp}.__esModule ? {temp}.default : {temp};"
                        ));
                    }
                }
                ImportSpecifier::Namespace(namespace) => {
                    parts.push(format!("const {} = {};", namespace.local.sym, temp));
                }
                ImportSpecifier::Named(named) if named.is_type_only => {}
                ImportSpecifier::Named(named) => {
                    let local = named.local.sym.to_string();
                    let imported = named
                        .imported
                        .as_ref()
                        .map_or_else(|| local.clone(), |name| name.atom().to_string());
                    self.note_library_name(specifier, &imported);
                    if imported == local {
                        fields.push(local);
                    } else {
                        fields.push(format!("{}: {}", property_key(&imported), local));
                    }
                }
            }
        }
        if !fields.is_empty() {
            parts.push(format!("const {{ {} }} = {};", fields.join(", "), temp));
        }

        self.replace(import.span, parts.join(" "));
    }

    fn export_decl(&mut self, export: &ExportDecl) {
        let names = syntax::declared_names(&export.decl);
        if !matches!(export.decl, Decl::Fn(_) | Decl::Class(_) | Decl::Var(_)) {
            return self.error_at(export.span, "Unsupported export form");
        }
        if names.is_empty() {
            return self.error_at(export.span, "Exported declaration has no name");
        }
        self.edit(export.span.lo, export.decl.span().lo, "");
        for name in names {
            self.footer.push(format!("{} = {};", exports_member(&name), name));
        }
    }

    fn export_named(&mut self, export: &NamedExport) {
        if export.type_only {
            return self.erase(export.span);
        }

        let Some(src) = &export.src else {
            for spec in &export.specifiers {
                match spec {
                    ExportSpecifier::Named(named) if named.is_type_only => {}
                    ExportSpecifier::Named(named) => {
                        let local = named.orig.atom().to_string();
                        let exported = named
                            .exported
                            .as_ref()
                            .map_or_else(|| local.clone(), |name| name.atom().to_string());
                        self.footer
                            .push(format!("{} = {};", exports_member(&exported), local));
                    }
                    _ => return self.error_at(export.span, "Unsupported export specifier"),
                }
            }
            return self.erase(export.span);
        };

        let specifier: &str = &src.value;
        if let Some(expr) = self.module_expression(specifier, src.span) {
            let temp = self.next_temp();
            self.footer.push(format!("const {} = {};", temp, expr));
            for spec in &export.specifiers {
                let (imported, exported) = match spec {
                    ExportSpecifier::Named(named) if named.is_type_only => continue,
                    ExportSpecifier::Named(named) => {
                        let imported = named.orig.atom().to_string();
                        let exported = named
                            .exported
                            .as_ref()
                            .map_or_else(|| imported.clone(), |name| name.atom().to_string());
                        (imported, exported)
                    }
                    ExportSpecifier::Default(default) => {
                        ("default".to_string(), default.exported.sym.to_string())
                    }
                    ExportSpecifier::Namespace(namespace) => {
                        self.footer.push(format!(
                            "{} = {};",
                            exports_member(&namespace.name.atom().to_string()),
                            temp
                        ));
                        continue;
                    }
                };
                self.note_library_name(specifier, &imported);
                self.footer.push(format!(
                    "{} = {};",
                    exports_member(&exported),
                    member(&temp, &imported)
                ));
            }
        }
        self.erase(export.span);
    }

    fn export_default_decl(&mut self, export: &ExportDefaultDecl) {
        let (name, start) = match &export.decl {
            DefaultDecl::Fn(function) => (function.ident.as_ref(), function.function.span.lo),
            DefaultDecl::Class(class) => (class.ident.as_ref(), class.class.span.lo),
            DefaultDecl::TsInterfaceDecl(_) => return self.erase(export.span),
        };
        match name {
            Some(name) => {
                self.edit(export.span.lo, start, "");
                self.footer.push(format!("exports.default = {};", name.sym));
            }
            None => self.edit(export.span.lo, start, "exports.default = "),
        }
    }

    fn export_all(&mut self, export: &ExportAll) {
        if export.type_only {
            return self.erase(export.span);
        }
        if let Some(expr) = self.module_expression(&export.src.value, export.src.span) {
            self.footer.push(format!(
                "(function (m) {{ for (const k of Object.keys(m)) if (k !== \"default\" && !(k in exports)) exports[k] = m[k]; }})({});",
                expr
            ));
        }
        self.erase(export.span);
    }
}

impl Visit for Lowering<'_, '_> {
    // const { a, b: c } = require("@plugin/sdk")
    fn visit_var_declarator(&mut self, declarator: &VarDeclarator) {
        let requires_library = declarator
            .init
            .as_deref()
            .is_some_and(|init| matches!(init, Expr::Call(call) if is_library_require(call)));
        if requires_library {
            for key in syntax::pattern_keys(&declarator.name) {
                self.note_library_name(LIBRARY_NAMESPACE, &key);
            }
        }
        declarator.visit_children_with(self);
    }

    fn visit_call_expr(&mut self, call: &CallExpr) {
        if !is_library_require(call) {
            return call.visit_children_with(self);
        }
        self.out.references_library = true;
        let replacement = format!("({})", self.link.expression());
        self.replace(call.span, replacement);
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c == '$' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c == '$' || c.is_alphanumeric())
}

fn property_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        js_string(name)
    }
}

fn member(object: &str, name: &str) -> String {
    if is_identifier(name) {
        format!("{}.{}", object, name)
    } else {
        format!("{}[{}]", object, js_string(name))
    }
}

fn exports_member(name: &str) -> String {
    member("exports", name)
}
