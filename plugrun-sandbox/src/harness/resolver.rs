//! Entry-point resolution
//!
//! An entry point is a dot-separated path into the plugin's exported
//! surface. Each [`Strategy`] knows which path shapes it handles and carries
//! a pure JavaScript function `(surface, segments) => callable | undefined`.
//! The harness tries the applicable strategies in [`Strategy::ORDER`].

use crate::error::{Result, SandboxError};
use serde::Serialize;
use std::fmt;

/// Entry point that forwards `payload.children` as a second argument
pub const CHILDREN_ENTRY_POINT: &str = "default";

/// Parsed entry-point path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPoint {
    raw: String,
    segments: Vec<String>,
}

impl EntryPoint {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let segments: Vec<String> = trimmed.split('.').map(str::to_string).collect();
        if trimmed.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(SandboxError::execution(
                format!("Invalid entry point \"{}\"", raw),
                0,
            ));
        }
        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Whether the invocation also receives `payload.children`
    pub fn forwards_children(&self) -> bool {
        self.raw == CHILDREN_ENTRY_POINT
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One way of locating the callable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// The surface itself is a plain function
    DirectCallable,
    /// A named export that is callable or exposes the name on an instance
    NamedExport,
    /// `Class.method` on a fresh instance, falling back to the static member
    ClassMethod,
    /// The lookup strategies retried against `surface.default`; a callable
    /// default is never returned for another name
    DefaultExport,
    /// `a.b.c...` traversal of nested namespaces
    NestedPath,
}

impl Strategy {
    /// Precedence, first match wins
    pub const ORDER: [Strategy; 5] = [
        Strategy::DirectCallable,
        Strategy::NamedExport,
        Strategy::ClassMethod,
        Strategy::DefaultExport,
        Strategy::NestedPath,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::DirectCallable => "direct-callable",
            Strategy::NamedExport => "named-export",
            Strategy::ClassMethod => "class-method",
            Strategy::DefaultExport => "default-export",
            Strategy::NestedPath => "nested-path",
        }
    }

    pub fn applies_to(self, entry: &EntryPoint) -> bool {
        match self {
            Strategy::DirectCallable | Strategy::NamedExport => entry.depth() == 1,
            Strategy::ClassMethod => entry.depth() == 2,
            Strategy::DefaultExport => true,
            Strategy::NestedPath => entry.depth() >= 3,
        }
    }

    /// JavaScript resolver function for this strategy.
    ///
    /// The default-export strategy takes a third argument, a function that
    /// reruns the remaining strategies, minus direct-callable, against
    /// another surface.
    pub fn script(self) -> &'static str {
        match self {
            Strategy::DirectCallable => DIRECT_CALLABLE_JS,
            Strategy::NamedExport => NAMED_EXPORT_JS,
            Strategy::ClassMethod => CLASS_METHOD_JS,
            Strategy::DefaultExport => DEFAULT_EXPORT_JS,
            Strategy::NestedPath => NESTED_PATH_JS,
        }
    }
}

/// Strategies applicable to `entry`, in precedence order
pub fn strategies_for(entry: &EntryPoint) -> Vec<Strategy> {
    Strategy::ORDER
        .into_iter()
        .filter(|s| s.applies_to(entry))
        .collect()
}

/// Helpers the strategy functions close over
pub(crate) const RESOLVER_PRELUDE: &str = r#"
  const __isClass = (v) =>
    typeof v === "function" && /^class[\s{]/.test(Function.prototype.toString.call(v));
  const __isCallable = (v) => typeof v === "function" && !__isClass(v);
  const __construct = (C) => {
    try {
      return { ok: true, value: new C() };
    } catch (error) {
      return { ok: false, error };
    }
  };
  const __methodOf = (holder, name) => {
    if (holder === null || holder === undefined) return undefined;
    const member = holder[name];
    return __isCallable(member) ? member.bind(holder) : undefined;
  };
"#;

const DIRECT_CALLABLE_JS: &str = r#"(surface, segments) => (__isCallable(surface) ? surface : undefined)"#;

const NAMED_EXPORT_JS: &str = r#"(surface, segments) => {
    if (surface === null || surface === undefined) return undefined;
    const name = segments[0];
    const target = surface[name];
    if (target === null || target === undefined) return undefined;
    if (__isCallable(target)) return target.bind(surface);
    if (typeof target === "function") {
      const made = __construct(target);
      return made.ok ? __methodOf(made.value, name) : undefined;
    }
    if (typeof target === "object") {
      const proto = Object.getPrototypeOf(target);
      if (proto && __isCallable(proto[name])) return proto[name].bind(target);
    }
    return undefined;
  }"#;

const CLASS_METHOD_JS: &str = r#"(surface, segments) => {
    if (surface === null || surface === undefined) return undefined;
    const holder = surface[segments[0]];
    const name = segments[1];
    if (holder === null || holder === undefined) return undefined;
    if (typeof holder === "function") {
      const constructible =
        __isClass(holder) || (holder.prototype && __isCallable(holder.prototype[name]));
      if (constructible) {
        const made = __construct(holder);
        if (made.ok) {
          const bound = __methodOf(made.value, name);
          if (bound) return bound;
        }
      }
      return __methodOf(holder, name);
    }
    if (typeof holder === "object") return __methodOf(holder, name);
    return undefined;
  }"#;

const DEFAULT_EXPORT_JS: &str = r#"(surface, segments, retry) => {
    if (surface === null || surface === undefined) return undefined;
    const inner = surface.default;
    if (inner === null || inner === undefined || inner === surface) return undefined;
    return retry(inner);
  }"#;

const NESTED_PATH_JS: &str = r#"(surface, segments) => {
    let parent = surface;
    for (let i = 0; i < segments.length - 1; i++) {
      if (parent === null || parent === undefined) return undefined;
      parent = parent[segments[i]];
    }
    if (parent === null || parent === undefined) return undefined;
    const last = segments[segments.length - 1];
    const direct = parent[last];
    if (__isCallable(direct)) return direct.bind(parent);
    if (typeof parent === "function") {
      const made = __construct(parent);
      if (made.ok) return __methodOf(made.value, last);
    }
    return undefined;
  }"#;

/// JavaScript defining `__resolve(surface, segments)` for `entry`
pub(crate) fn resolver_script(entry: &EntryPoint) -> String {
    let strategies = strategies_for(entry);
    let mut script = String::with_capacity(4096);
    script.push_str(RESOLVER_PRELUDE);
    script.push_str("  const __strategies = [\n");
    for strategy in &strategies {
        script.push_str("    [\"");
        script.push_str(strategy.name());
        script.push_str("\", ");
        script.push_str(strategy.script());
        script.push_str("],\n");
    }
    script.push_str(
        r#"  ];
  const __resolve = (surface, segments) => {
    const others = __strategies.filter(
      ([name]) => name !== "default-export" && name !== "direct-callable"
    );
    const retry = (target) => {
      for (const [, strategy] of others) {
        const found = strategy(target, segments);
        if (found) return found;
      }
      return undefined;
    };
    for (const [name, strategy] of __strategies) {
      const found =
        name === "default-export" ? strategy(surface, segments, retry) : strategy(surface, segments);
      if (found) return found;
    }
    return undefined;
  };
"#,
    );
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry_points() {
        let entry = EntryPoint::parse("ns.sub.fn").unwrap();
        assert_eq!(entry.segments(), ["ns", "sub", "fn"]);
        assert_eq!(entry.depth(), 3);
        assert!(!entry.forwards_children());

        assert!(EntryPoint::parse("default").unwrap().forwards_children());
        assert!(!EntryPoint::parse("Widget.default").unwrap().forwards_children());

        for bad in ["", "  ", "a..b", ".a", "a."] {
            let err = EntryPoint::parse(bad).unwrap_err();
            assert_eq!(err.code(), "EXECUTION_ERROR", "{bad:?}");
        }
    }

    #[test]
    fn test_strategies_by_shape() {
        let single = EntryPoint::parse("add").unwrap();
        assert_eq!(
            strategies_for(&single),
            vec![
                Strategy::DirectCallable,
                Strategy::NamedExport,
                Strategy::DefaultExport
            ]
        );

        let pair = EntryPoint::parse("Greeter.greet").unwrap();
        assert_eq!(
            strategies_for(&pair),
            vec![Strategy::ClassMethod, Strategy::DefaultExport]
        );

        let nested = EntryPoint::parse("a.b.c").unwrap();
        assert_eq!(
            strategies_for(&nested),
            vec![Strategy::DefaultExport, Strategy::NestedPath]
        );
    }

    #[test]
    fn test_resolver_script_lists_strategies_in_order() {
        let script = resolver_script(&EntryPoint::parse("add").unwrap());
        let direct = script.find("\"direct-callable\"").unwrap();
        let named = script.find("\"named-export\"").unwrap();
        let default = script.find("[\"default-export\"").unwrap();
        assert!(direct < named && named < default);
        assert!(!script.contains("[\"nested-path\""));
    }

    #[test]
    fn test_default_retry_skips_direct_callable() {
        let script = resolver_script(&EntryPoint::parse("mul").unwrap());
        assert!(script.contains("name !== \"direct-callable\""));
    }
}
