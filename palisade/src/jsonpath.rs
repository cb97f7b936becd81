// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// Narrow path evaluation over a parsed JSON body.
//
// This is intentionally not a JSONPath engine. The config's deny paths only
// need "get the value at this path, which is a string or an array of
// strings": dot-separated object keys, numeric array indices, and `#` to map
// over an array (e.g. `messages.#.content`).

use serde_json::Value;

/// All string values selected by `path` in `root`. A path landing on a
/// string yields that string; landing on an array yields its string
/// elements; anything else yields nothing.
pub fn strings_at<'a>(root: &'a Value, path: &str) -> Vec<&'a str> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    collect(root, &segments, &mut out);
    out
}

fn collect<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a str>) {
    let Some((segment, rest)) = segments.split_first() else {
        match value {
            Value::String(s) => out.push(s),
            Value::Array(items) => out.extend(items.iter().filter_map(Value::as_str)),
            _ => {}
        }
        return;
    };

    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*segment) {
                collect(child, rest, out);
            }
        }
        Value::Array(items) => {
            if *segment == "#" {
                for item in items {
                    collect(item, rest, out);
                }
            } else if let Ok(index) = segment.parse::<usize>() {
                if let Some(item) = items.get(index) {
                    collect(item, rest, out);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_key_path_selects_string() {
        let v = json!({"query": "hello"});
        assert_eq!(strings_at(&v, "query"), vec!["hello"]);
    }

    #[test]
    fn nested_keys_and_index() {
        let v = json!({"input": {"messages": [{"content": "a"}, {"content": "b"}]}});
        assert_eq!(strings_at(&v, "input.messages.1.content"), vec!["b"]);
    }

    #[test]
    fn hash_maps_over_arrays() {
        let v = json!({"messages": [{"content": "one"}, {"content": "two"}, {"role": "x"}]});
        assert_eq!(strings_at(&v, "messages.#.content"), vec!["one", "two"]);
    }

    #[test]
    fn path_landing_on_string_array_yields_elements() {
        let v = json!({"inputs": ["a", 1, "b"]});
        assert_eq!(strings_at(&v, "inputs"), vec!["a", "b"]);
    }

    #[test]
    fn missing_path_yields_nothing() {
        let v = json!({"a": {"b": "c"}});
        assert!(strings_at(&v, "a.x.y").is_empty());
        assert!(strings_at(&v, "a.b.c").is_empty());
    }

    #[test]
    fn non_string_terminal_yields_nothing() {
        let v = json!({"n": 42});
        assert!(strings_at(&v, "n").is_empty());
    }
}
