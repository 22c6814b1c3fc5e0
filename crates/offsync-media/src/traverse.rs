//! Structural traversal over arbitrary content payloads: URL
//! extraction and rewriting.

use serde_json::Value;

/// Depth bound for [`rewrite_urls`] / [`extract_object_paths`],
/// generous enough for any realistic CMS payload while still
/// rejecting pathological recursive structures.
const MAX_DEPTH: usize = 32;

/// Walks `data` collecting every string under `base` prefix, returning
/// the object path relative to `base` (with any leading slash
/// trimmed).
pub fn extract_object_paths(data: &Value, base: &str) -> Vec<String> {
    if base.is_empty() {
        return Vec::new();
    }
    let mut paths = Vec::new();
    collect(data, base, 0, &mut paths);
    paths
}

fn collect(value: &Value, base: &str, depth: usize, out: &mut Vec<String>) {
    if depth > MAX_DEPTH {
        return;
    }
    match value {
        Value::String(s) => {
            if let Some(rest) = s.strip_prefix(base) {
                out.push(rest.trim_start_matches('/').to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, base, depth + 1, out);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect(v, base, depth + 1, out);
            }
        }
        _ => {}
    }
}

/// Returns a deep copy of `data` with every occurrence of `from_base`
/// replaced by `to_base` in string values. Depth is bounded to
/// [`MAX_DEPTH`]; values past the bound are returned unmodified.
pub fn rewrite_urls(data: &Value, from_base: &str, to_base: &str) -> Value {
    rewrite(data, from_base, to_base, 0)
}

fn rewrite(value: &Value, from_base: &str, to_base: &str, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return value.clone();
    }
    match value {
        Value::String(s) if !from_base.is_empty() => Value::String(s.replace(from_base, to_base)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| rewrite(v, from_base, to_base, depth + 1))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), rewrite(v, from_base, to_base, depth + 1)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_object_paths_relative_to_base() {
        let data = json!({
            "title": "hi",
            "image": {"url": "https://master.example/uploads/img.jpg"},
            "gallery": ["https://master.example/uploads/a.jpg", "https://other.example/b.jpg"],
        });
        let mut paths = extract_object_paths(&data, "https://master.example/");
        paths.sort();
        assert_eq!(paths, vec!["uploads/a.jpg".to_string(), "uploads/img.jpg".to_string()]);
    }

    #[test]
    fn rewrite_urls_replaces_base_everywhere() {
        let data = json!({"url": "https://master.example/uploads/img.jpg", "n": 3});
        let rewritten = rewrite_urls(&data, "https://master.example", "https://local.example");
        assert_eq!(rewritten["url"], "https://local.example/uploads/img.jpg");
        assert_eq!(rewritten["n"], 3);
    }

    #[test]
    fn rewrite_is_its_own_inverse_for_single_base_payloads() {
        let data = json!({
            "url": "https://master.example/a.jpg",
            "nested": {"url": "https://master.example/b.jpg"},
        });
        let to_local = rewrite_urls(&data, "https://master.example", "https://local.example");
        let back = rewrite_urls(&to_local, "https://local.example", "https://master.example");
        assert_eq!(back, data);
    }
}
