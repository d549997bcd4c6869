//! Invocation harness
//!
//! The harness is one script that wraps the translated plugin in a
//! `(module, exports, require)` function, resolves the entry point against
//! the resulting surface, invokes it with the payload and reports a JSON
//! document back to the host.

pub mod resolver;

use crate::bundler::stub;
use crate::error::{Result, SandboxError};
use crate::syntax;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub use resolver::{strategies_for, EntryPoint, Strategy, CHILDREN_ENTRY_POINT};

/// Script reading the settled value of an async entry point after the
/// microtask checkpoint
pub const SETTLED_PROBE: &str = "globalThis.__pluginSettled";

/// Bindings the plugin function takes as parameters
const RESERVED_LOCALS: &[&str] = &["module", "exports", "require"];

const CONSOLE_SHIM: &str = r#"
  const __logs = [];
  const __errors = [];
  const __format = (args) =>
    args
      .map((value) => {
        if (typeof value === "string") return value;
        try {
          const json = JSON.stringify(value);
          return json === undefined ? String(value) : json;
        } catch (_) {
          return String(value);
        }
      })
      .join(" ");
  const console = {
    log: (...args) => { __logs.push(__format(args)); },
    info: (...args) => { __logs.push(__format(args)); },
    debug: (...args) => { __logs.push(__format(args)); },
    warn: (...args) => { __logs.push(__format(args)); },
    error: (...args) => { __errors.push(__format(args)); },
  };
  const __errorText = (error) => {
    const message =
      error !== null && typeof error === "object" && "message" in error
        ? error.message
        : String(error);
    const stack = error !== null && typeof error === "object" && error.stack ? error.stack : "";
    return "Error: " + message + "\n" + stack;
  };
  const __finish = (value) => {
    let output;
    try {
      output = String(value);
    } catch (error) {
      output = __errorText(error);
      __errors.push(output);
    }
    return JSON.stringify({ output, logs: __logs, errors: __errors });
  };
  const __fail = (error) => {
    const output = __errorText(error);
    __errors.push(output);
    return JSON.stringify({ output, logs: __logs, errors: __errors });
  };
"#;

const INVOKE: &str = r#"
  const __names = (surface) => {
    if (surface === null || surface === undefined) return [];
    const keys = Object.keys(surface);
    if (typeof surface === "function" && surface.name && !keys.includes(surface.name)) {
      keys.unshift(surface.name);
    }
    return keys;
  };
  const __surface = (() => {
    const exported = __loaded.exports;
    if (typeof exported === "function") return exported;
    if (exported !== null && typeof exported === "object" && Object.keys(exported).length > 0) {
      return exported;
    }
    const locals = {};
    for (const key of Object.keys(__loaded.locals)) {
      if (__loaded.locals[key] !== undefined) locals[key] = __loaded.locals[key];
    }
    return locals;
  })();
  const __target = __resolve(__surface, __segments);
  if (!__target) {
    return JSON.stringify({
      fault: { kind: "not_found", message: "no strategy matched", exports: __names(__surface) },
    });
  }
  let __result;
  try {
    __result = __target(...__args);
  } catch (error) {
    return __fail(error);
  }
  if (
    __result !== null &&
    (typeof __result === "object" || typeof __result === "function") &&
    typeof __result.then === "function"
  ) {
    globalThis.__pluginSettled = undefined;
    Promise.resolve(__result).then(
      (value) => { globalThis.__pluginSettled = __finish(value); },
      (error) => { globalThis.__pluginSettled = __fail(error); }
    );
    return JSON.stringify({ pending: true });
  }
  return __finish(__result);
"#;

/// Build the harness script for one invocation
pub fn build_harness(
    executable_code: &str,
    entry: &EntryPoint,
    payload: &Value,
    bindings: &BTreeMap<String, Value>,
) -> Result<String> {
    let payload_json = serde_json::to_string(payload).map_err(|e| {
        SandboxError::execution(format!("Payload could not be serialized: {}", e), 0)
    })?;
    let payload_literal = js_string(&payload_json);
    let segments_literal = serde_json::to_string(entry.segments()).unwrap_or_else(|_| "[]".into());
    let locals = local_capture(executable_code);

    let args = if entry.forwards_children() {
        "[__payload, __payload === null || __payload === undefined ? undefined : __payload.children]"
    } else {
        "[__payload]"
    };

    let mut script = String::with_capacity(executable_code.len() + 8192);
    script.push_str("(function () {");
    script.push_str(CONSOLE_SHIM);
    script.push_str(&resolver::resolver_script(entry));
    script.push_str("  const __payload = JSON.parse(");
    script.push_str(&payload_literal);
    script.push_str(");\n  const __segments = ");
    script.push_str(&segments_literal);
    script.push_str(";\n  const __args = ");
    script.push_str(args);
    script.push_str(";\n  let __sdk;\n  const __require = (name) => {\n    if (name === ");
    script.push_str(&js_string(stub::LIBRARY_NAMESPACE));
    script.push_str(") {\n      if (__sdk === undefined) __sdk = ");
    script.push_str(&stub::stub_expression(bindings));
    script.push_str(
        ";\n      return __sdk;\n    }\n    throw new Error(\"Cannot find module '\" + name + \"'\");\n  };\n",
    );
    script.push_str("  const __module = { exports: {} };\n  let __loaded;\n  try {\n");
    script.push_str("    __loaded = (function (module, exports, require) {\n");
    script.push_str(executable_code);
    script.push_str("\n;return { exports: module.exports, locals: {");
    script.push_str(&locals);
    script.push_str(
        "} };\n    })(__module, __module.exports, __require);\n  } catch (error) {\n",
    );
    script.push_str(
        "    return JSON.stringify({ fault: { kind: \"init\", message: __errorText(error) } });\n  }\n",
    );
    script.push_str(INVOKE);
    script.push_str("})()");
    Ok(script)
}

/// Object-literal body capturing the plugin's top-level declarations
fn local_capture(executable_code: &str) -> String {
    let Ok(parsed) = syntax::parse(executable_code) else {
        return String::new();
    };
    syntax::top_level_bindings(parsed.program_ref())
        .into_iter()
        .filter(|name| !RESERVED_LOCALS.contains(&name.as_str()) && !name.starts_with("__plugrun"))
        .map(|name| {
            format!(
                " {name}: typeof {name} === \"undefined\" ? undefined : {name},"
            )
        })
        .collect()
}

/// Script compiling `code` as a function body without running it.
///
/// Evaluates to a JSON document `{ "valid": bool, "message": string? }`.
pub fn syntax_check_script(code: &str) -> String {
    format!(
        r#"(function () {{
  try {{
    new Function("module", "exports", "require", {});
    return JSON.stringify({{ valid: true }});
  }} catch (error) {{
    return JSON.stringify({{ valid: false, message: String(error && error.message) }});
  }}
}})()"#,
        js_string(code)
    )
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// What the harness reports after evaluation
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HarnessOutput {
    Completed {
        output: String,
        #[serde(default)]
        logs: Vec<String>,
        #[serde(default)]
        errors: Vec<String>,
    },
    Pending {
        pending: bool,
    },
    Fault {
        fault: HarnessFault,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Init,
    NotFound,
}

/// Failure detected by the harness before the entry point ran
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HarnessFault {
    pub kind: FaultKind,
    pub message: String,
    #[serde(default)]
    pub exports: Vec<String>,
}

impl HarnessFault {
    pub fn into_error(self, entry: &EntryPoint, execution_time_ms: u64) -> SandboxError {
        let message = match self.kind {
            FaultKind::NotFound => {
                let available = if self.exports.is_empty() {
                    "(none)".to_string()
                } else {
                    self.exports.join(", ")
                };
                format!(
                    "Entry point \"{}\" not found. Available exports: {}",
                    entry, available
                )
            }
            FaultKind::Init => format!("Plugin initialization failed: {}", self.message),
        };
        SandboxError::execution(message, execution_time_ms)
    }
}

impl HarnessOutput {
    pub fn parse(raw: &str, execution_time_ms: u64) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| {
            SandboxError::execution(
                format!("Harness returned an unreadable result: {}", e),
                execution_time_ms,
            )
        })
    }
}

/// Result of [`syntax_check_script`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyntaxCheck {
    pub valid: bool,
    #[serde(default)]
    pub message: Option<String>,
}
