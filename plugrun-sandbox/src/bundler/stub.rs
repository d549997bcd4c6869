//! Host library stub
//!
//! Plugins import helpers from [`LIBRARY_NAMESPACE`]. There is no package
//! behind that name: every reference is satisfied by the module below, which
//! is generated in memory and versioned with this crate.

use serde_json::Value;
use std::collections::BTreeMap;

/// Reserved namespace satisfied by the stub
pub const LIBRARY_NAMESPACE: &str = "@plugin/sdk";

/// Version reported by the stub's metadata helpers
pub const SDK_VERSION: &str = "1.0.0";

/// Names the stub always exports
pub const STUB_EXPORTS: &[&str] = &[
    "VERSION",
    "PluginBase",
    "Component",
    "Tool",
    "definePlugin",
    "stringifyParams",
    "requireParams",
    "importMeta",
    "bindings",
    "default",
];

/// Factory taking the bindings object and returning the frozen module object.
/// The `VERSION` literal inside must match [`SDK_VERSION`].
const STUB_FACTORY: &str = r#"(function (bindings) {
  "use strict";
  const VERSION = "1.0.0";

  function stringifyParams(params) {
    if (params === undefined || params === null) return "";
    if (typeof params !== "object") return String(params);
    const keys = Object.keys(params).sort();
    return keys
      .map((k) => {
        const v = params[k];
        return k + "=" + (typeof v === "object" && v !== null ? JSON.stringify(v) : String(v));
      })
      .join("&");
  }

  function requireParams(params, names) {
    const missing = (names || []).filter(
      (n) => params === undefined || params === null || params[n] === undefined || params[n] === null
    );
    if (missing.length > 0) {
      throw new Error(
        "Missing required parameter" + (missing.length > 1 ? "s" : "") + ": " + missing.join(", ")
      );
    }
    return params;
  }

  function importMeta(name) {
    return { name: String(name), sdkVersion: VERSION };
  }

  class PluginBase {
    constructor(options) {
      this.options = options || {};
    }
    static get metadata() {
      return { name: this.name, sdkVersion: VERSION };
    }
    get metadata() {
      return this.constructor.metadata;
    }
    stringifyParams(params) {
      return stringifyParams(params);
    }
    requireParams(params, names) {
      return requireParams(params, names);
    }
    binding(name) {
      return bindings[name];
    }
  }

  class Component extends PluginBase {
    render(props, children) {
      return children === undefined ? "" : String(children);
    }
  }

  class Tool extends PluginBase {
    run(params) {
      throw new Error(this.constructor.name + ".run is not implemented");
    }
  }

  function definePlugin(meta, impl) {
    const target = impl || {};
    Object.defineProperty(target, "metadata", {
      value: Object.assign({ sdkVersion: VERSION }, meta || {}),
      enumerable: false,
    });
    return target;
  }

  const sdk = {
    VERSION,
    PluginBase,
    Component,
    Tool,
    definePlugin,
    stringifyParams,
    requireParams,
    importMeta,
    bindings: Object.freeze(Object.assign({}, bindings)),
  };
  for (const key of Object.keys(bindings)) {
    if (!(key in sdk)) sdk[key] = bindings[key];
  }
  sdk.default = sdk;
  return Object.freeze(sdk);
})"#;

/// Source of the stub factory
pub fn stub_factory() -> &'static str {
    STUB_FACTORY
}

/// Expression evaluating to the stub module object for `bindings`
pub fn stub_expression(bindings: &BTreeMap<String, Value>) -> String {
    let bindings_json =
        serde_json::to_string(bindings).unwrap_or_else(|_| "{}".to_string());
    format!("{}({})", stub_factory(), bindings_json)
}

/// Whether `name` is an export of the stub for these bindings
pub fn provides(name: &str, bindings: &BTreeMap<String, Value>) -> bool {
    STUB_EXPORTS.contains(&name) || bindings.contains_key(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stub_expression_embeds_bindings() {
        let mut bindings = BTreeMap::new();
        bindings.insert("apiBase".to_string(), json!("https://example.test"));
        let expr = stub_expression(&bindings);
        assert!(expr.starts_with("(function (bindings)"));
        assert!(expr.ends_with(r#"({"apiBase":"https://example.test"})"#));
        assert!(expr.contains(&format!("const VERSION = \"{}\";", SDK_VERSION)));
    }

    #[test]
    fn test_stub_is_deterministic() {
        let bindings = BTreeMap::new();
        assert_eq!(stub_expression(&bindings), stub_expression(&bindings));
    }

    #[test]
    fn test_provides() {
        let mut bindings = BTreeMap::new();
        bindings.insert("tenant".to_string(), json!("acme"));
        assert!(provides("PluginBase", &bindings));
        assert!(provides("tenant", &bindings));
        assert!(!provides("Nope", &bindings));
    }
}
