//! Virtual-protocol handlers consumed by the rendering layer.
//!
//! Neither handler returns an error: every failure becomes a response with
//! a non-200 status and a diagnostic body.

use super::Resolver;
use crate::error::{serialize_error, ResolveError};
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl ProtocolResponse {
    fn ok(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: content_type.to_string(),
            body,
        }
    }

    fn text(status: u16, message: String) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: message.into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// Strip an optional `scheme://` prefix.
fn strip_scheme<'a>(request: &'a str, scheme: &str) -> &'a str {
    request
        .strip_prefix(scheme)
        .and_then(|rest| rest.strip_prefix("://"))
        .unwrap_or(request)
}

/// Percent-decode a request path. `None` when it does not decode to UTF-8.
fn decode_path(path: &str) -> Option<String> {
    percent_decode_str(path)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

/// Serves resolved item documents for `namespace/id` requests.
pub struct ItemProtocol {
    resolver: Arc<Resolver>,
    scheme: String,
}

impl ItemProtocol {
    pub fn new(resolver: Arc<Resolver>, scheme: impl Into<String>) -> Self {
        Self {
            resolver,
            scheme: scheme.into(),
        }
    }

    /// Handle `namespace/id`, with or without the `scheme://` prefix.
    pub async fn handle(&self, request: &str) -> ProtocolResponse {
        match self.serve(request).await {
            Ok(body) => ProtocolResponse::ok("application/json", body),
            Err(e) => {
                error!(request, "Item load failed: {}", e);
                ProtocolResponse::text(400, format!("Model Load Error:\n{}", serialize_error(&e)))
            }
        }
    }

    async fn serve(&self, request: &str) -> Result<Vec<u8>, ResolveError> {
        let decoded = decode_path(strip_scheme(request, &self.scheme))
            .ok_or_else(|| ResolveError::InvalidPath(request.to_string()))?;
        let (namespace, id) = decoded
            .trim_matches('/')
            .split_once('/')
            .filter(|(namespace, id)| !namespace.is_empty() && !id.is_empty() && !id.contains('/'))
            .ok_or_else(|| ResolveError::InvalidPath(request.to_string()))?;
        let document = self.resolver.resolve(namespace, id).await?;
        serde_json::to_vec(&document).map_err(|e| ResolveError::Document {
            path: request.to_string(),
            message: e.to_string(),
        })
    }
}

/// Serves files referenced by rewritten asset URIs, confined to the module root.
pub struct AssetProtocol {
    root: PathBuf,
    scheme: String,
}

impl AssetProtocol {
    pub fn new(root: impl Into<PathBuf>, scheme: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            scheme: scheme.into(),
        }
    }

    pub async fn handle(&self, request: &str) -> ProtocolResponse {
        let Some(decoded) = decode_path(strip_scheme(request, &self.scheme)) else {
            return ProtocolResponse::text(400, format!("Malformed asset path: {}", request));
        };
        let requested = PathBuf::from(decoded);

        let (Ok(root), Ok(path)) = (
            dunce::canonicalize(&self.root),
            dunce::canonicalize(&requested),
        ) else {
            debug!(request, "Asset not found");
            return ProtocolResponse::text(404, format!("Not found: {}", requested.display()));
        };
        if !path.starts_with(&root) {
            warn!(request, "Asset request outside the module root");
            return ProtocolResponse::text(403, format!("Forbidden: {}", requested.display()));
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => ProtocolResponse::ok(content_type_for(&path), bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ProtocolResponse::text(404, format!("Not found: {}", requested.display()))
            }
            Err(e) => ProtocolResponse::text(500, format!("Failed to read {}: {}", path.display(), e)),
        }
    }
}

/// Content type guessed from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("txt") => "text/plain; charset=utf-8",
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        _ => "application/octet-stream",
    }
}
