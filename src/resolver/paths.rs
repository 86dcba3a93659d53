//! Rewriting of relative file references into addressable asset URIs.

use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

/// `"./a/b"`: explicitly relative.
static DOT_RELATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\./(?:[^/]+/?)*[^/]+$").expect("valid regex"));

/// `"a/b.ext"`: at least one directory segment and a file extension.
static NESTED_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[^/]+/)+[^/]+\.\w+$").expect("valid regex"));

/// Bytes escaped in the path part of an asset URI. Non-ASCII is always escaped.
const PATH_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Whether a string value looks like a relative file reference.
pub fn is_relative_reference(text: &str) -> bool {
    DOT_RELATIVE.is_match(text) || NESTED_FILE.is_match(text)
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// `scheme://` followed by `path` with forward slashes, percent-encoded.
pub fn asset_uri(scheme: &str, path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    format!("{}://{}", scheme, utf8_percent_encode(&text, PATH_ESCAPES))
}

/// Replace every relative file reference in `document` with an absolute
/// asset URI rooted at `base_dir`. Object keys are left alone.
pub fn rewrite_paths(document: &mut Value, base_dir: &Path, scheme: &str) -> usize {
    match document {
        Value::String(text) if is_relative_reference(text) => {
            let absolute = normalize(&base_dir.join(text.as_str()));
            *text = asset_uri(scheme, &absolute);
            1
        }
        Value::Array(items) => items
            .iter_mut()
            .map(|item| rewrite_paths(item, base_dir, scheme))
            .sum(),
        Value::Object(fields) => fields
            .values_mut()
            .map(|field| rewrite_paths(field, base_dir, scheme))
            .sum(),
        _ => 0,
    }
}
