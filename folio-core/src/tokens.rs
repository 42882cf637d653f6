//! Design-token resolution.
//!
//! Any string value beginning with `$` is a token reference: the remainder
//! is a dotted path into the document's token tree, e.g. `$colors.primary`.
//!
//! ```json
//! { "colors": { "primary": "#4ade80", "accent": "$colors.primary" } }
//! ```
//!
//! Resolution never fails. A path that does not exist, or a chain of
//! references that loops back on itself, yields the original string and a
//! warning. Because chains are followed to their end, resolving an already
//! resolved value is a no-op.

use serde_json::{Map, Value};

/// Longest reference chain followed before giving up.
const MAX_CHAIN: usize = 16;

/// Deepest object nesting expanded by [`TokenResolver::resolve_deep`].
const MAX_DEPTH: usize = 32;

/// Resolves `$`-prefixed references against a token tree.
#[derive(Debug, Clone, Copy)]
pub struct TokenResolver<'a> {
    tokens: &'a Value,
}

impl<'a> TokenResolver<'a> {
    /// Create a resolver over the given token tree.
    #[must_use]
    pub fn new(tokens: &'a Value) -> Self {
        Self { tokens }
    }

    /// Resolve a single value.
    ///
    /// Non-string values and strings without a leading `$` are returned
    /// unchanged.
    #[must_use]
    pub fn resolve(&self, value: &Value) -> Value {
        let Value::String(reference) = value else {
            return value.clone();
        };
        if !reference.starts_with('$') {
            return value.clone();
        }

        let mut visited: Vec<&str> = Vec::new();
        let mut current: &str = reference;
        loop {
            let path = &current[1..];
            if visited.contains(&path) || visited.len() >= MAX_CHAIN {
                tracing::warn!("Token reference cycle at {}", reference);
                return value.clone();
            }
            visited.push(path);

            match self.lookup(path) {
                None => {
                    tracing::warn!("Token not found: {}", reference);
                    return value.clone();
                }
                Some(Value::String(next)) if next.starts_with('$') => current = next.as_str(),
                Some(found) => return found.clone(),
            }
        }
    }

    /// Resolve every string inside an object or array tree.
    #[must_use]
    pub fn resolve_deep(&self, value: &Value) -> Value {
        self.resolve_deep_at(value, 0)
    }

    fn resolve_deep_at(&self, value: &Value, depth: usize) -> Value {
        if depth > MAX_DEPTH {
            return value.clone();
        }
        match value {
            Value::String(_) => {
                let resolved = self.resolve(value);
                if resolved.is_object() || resolved.is_array() {
                    self.resolve_deep_at(&resolved, depth + 1)
                } else {
                    resolved
                }
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve_deep_at(item, depth + 1))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_deep_at(v, depth + 1)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    fn lookup(&self, path: &str) -> Option<&'a Value> {
        let mut current = self.tokens;
        for segment in path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Substitute `"$name"` strings in a component's defaults with the
/// instance prop `name`.
///
/// References with no matching instance prop are left untouched so that
/// token resolution can pick them up afterwards.
#[must_use]
pub fn resolve_prop_refs(template: &Value, props: &Map<String, Value>) -> Value {
    match template {
        Value::String(s) => s
            .strip_prefix('$')
            .and_then(|name| props.get(name))
            .cloned()
            .unwrap_or_else(|| template.clone()),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_prop_refs(item, props))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_prop_refs(v, props)))
                .collect(),
        ),
        _ => template.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tokens() -> Value {
        json!({
            "colors": {
                "primary": "#4ade80",
                "accent": "$colors.primary",
                "loop": "$colors.loop",
                "ping": "$colors.pong",
                "pong": "$colors.ping"
            },
            "fonts": { "heading": "Bebas Neue" },
            "sizes": [12, 16, 24],
            "card": { "fill": "$colors.primary", "radius": 8 }
        })
    }

    #[test]
    fn test_resolve_simple_path() {
        let tokens = tokens();
        let resolver = TokenResolver::new(&tokens);
        assert_eq!(resolver.resolve(&json!("$colors.primary")), json!("#4ade80"));
        assert_eq!(resolver.resolve(&json!("$fonts.heading")), json!("Bebas Neue"));
    }

    #[test]
    fn test_resolve_leaves_plain_values() {
        let tokens = tokens();
        let resolver = TokenResolver::new(&tokens);
        assert_eq!(resolver.resolve(&json!("#ffffff")), json!("#ffffff"));
        assert_eq!(resolver.resolve(&json!(42)), json!(42));
        assert_eq!(resolver.resolve(&json!(null)), json!(null));
    }

    #[test]
    fn test_missing_token_returns_original() {
        let tokens = tokens();
        let resolver = TokenResolver::new(&tokens);
        assert_eq!(resolver.resolve(&json!("$colors.missing")), json!("$colors.missing"));
        assert_eq!(resolver.resolve(&json!("$")), json!("$"));
    }

    #[test]
    fn test_array_index_segment() {
        let tokens = tokens();
        let resolver = TokenResolver::new(&tokens);
        assert_eq!(resolver.resolve(&json!("$sizes.2")), json!(24));
        assert_eq!(resolver.resolve(&json!("$sizes.9")), json!("$sizes.9"));
    }

    #[test]
    fn test_chained_reference_followed() {
        let tokens = tokens();
        let resolver = TokenResolver::new(&tokens);
        assert_eq!(resolver.resolve(&json!("$colors.accent")), json!("#4ade80"));
    }

    #[test]
    fn test_cycles_return_original() {
        let tokens = tokens();
        let resolver = TokenResolver::new(&tokens);
        assert_eq!(resolver.resolve(&json!("$colors.loop")), json!("$colors.loop"));
        assert_eq!(resolver.resolve(&json!("$colors.ping")), json!("$colors.ping"));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let tokens = tokens();
        let resolver = TokenResolver::new(&tokens);
        let inputs = [
            json!("$colors.primary"),
            json!("$colors.accent"),
            json!("$colors.loop"),
            json!("$colors.ping"),
            json!("$nope"),
            json!("$card"),
            json!("plain"),
            json!({ "fill": "$colors.accent", "list": ["$sizes.0", "$fonts"] }),
        ];
        for input in &inputs {
            let once = resolver.resolve_deep(input);
            let twice = resolver.resolve_deep(&once);
            assert_eq!(once, twice, "resolution of {input} not idempotent");

            let once = resolver.resolve(input);
            assert_eq!(resolver.resolve(&once), once);
        }
    }

    #[test]
    fn test_resolve_deep_nested() {
        let tokens = tokens();
        let resolver = TokenResolver::new(&tokens);
        let props = json!({
            "fill": "$colors.primary",
            "nested": { "font": "$fonts.heading" },
            "list": ["$sizes.1", "literal"],
            "card": "$card"
        });
        let resolved = resolver.resolve_deep(&props);
        assert_eq!(resolved["fill"], json!("#4ade80"));
        assert_eq!(resolved["nested"]["font"], json!("Bebas Neue"));
        assert_eq!(resolved["list"], json!([16, "literal"]));
        assert_eq!(resolved["card"], json!({ "fill": "#4ade80", "radius": 8 }));
    }

    #[test]
    fn test_prop_refs_prefer_instance_props() {
        let template = json!({
            "content": "$title",
            "color": "$colors.primary",
            "items": ["$title", 3]
        });
        let props = json!({ "title": "Hello" });
        let Value::Object(props) = props else {
            panic!("expected object");
        };

        let resolved = resolve_prop_refs(&template, &props);
        assert_eq!(resolved["content"], json!("Hello"));
        assert_eq!(resolved["color"], json!("$colors.primary"));
        assert_eq!(resolved["items"], json!(["Hello", 3]));
    }
}
