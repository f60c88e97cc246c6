//! Request routing for the two registry endpoints.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use offreg_core::{Registry, RegistryError};
use percent_encoding::percent_decode_str;
use tracing::{debug, trace, warn};

const JSON: &str = "application/json";
const OCTET_STREAM: &str = "application/octet-stream";

pub(crate) fn router(registry: Arc<Registry>) -> Router {
    Router::new().fallback(handle).with_state(registry)
}

/// A request the registry knows how to answer.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RegistryRequest {
    Metadata { name: String },
    Tarball { name: String, file: String },
}

/// Maps a raw request path onto a [`RegistryRequest`].
///
/// The path is percent-decoded first, so `@scope%2fname` and `@scope/name`
/// resolve to the same package.
pub(crate) fn parse_path(raw: &str) -> Option<RegistryRequest> {
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    let path = decoded.strip_prefix('/')?;

    match path.split_once("/-/") {
        None if is_package_name(path) => Some(RegistryRequest::Metadata {
            name: path.to_string(),
        }),
        Some((name, file)) if is_package_name(name) && is_segment(file) => {
            Some(RegistryRequest::Tarball {
                name: name.to_string(),
                file: file.to_string(),
            })
        }
        _ => None,
    }
}

fn is_segment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains('/')
}

fn is_package_name(name: &str) -> bool {
    match name.split_once('/') {
        None => is_segment(name) && !name.starts_with('@'),
        Some((scope, base)) => {
            scope
                .strip_prefix('@')
                .is_some_and(is_segment)
                && is_segment(base)
        }
    }
}

async fn handle(State(registry): State<Arc<Registry>>, method: Method, uri: Uri) -> Response {
    trace!(%method, path = uri.path(), "request");

    if method != Method::GET && method != Method::HEAD {
        return error_response(StatusCode::NOT_FOUND, "Not found");
    }
    let head = method == Method::HEAD;

    let Some(request) = parse_path(uri.path()) else {
        debug!(path = uri.path(), "no route");
        return error_response(StatusCode::NOT_FOUND, "Not found");
    };

    let result = match &request {
        RegistryRequest::Metadata { name } => metadata(&registry, name, head),
        RegistryRequest::Tarball { name, file } => tarball(&registry, name, file, head),
    };

    result.unwrap_or_else(|err| registry_error_response(&err))
}

fn metadata(registry: &Registry, name: &str, head: bool) -> Result<Response, RegistryError> {
    let document = registry.lookup_package_metadata(name)?;

    let bytes = match serde_json::to_vec(&document) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("failed to serialize metadata of '{name}': {err}");
            return Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error",
            ));
        }
    };

    let length = HeaderValue::from(bytes.len());
    let body = if head { Body::empty() } else { Body::from(bytes) };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(JSON)),
            (header::CONTENT_LENGTH, length),
        ],
        body,
    )
        .into_response())
}

fn tarball(
    registry: &Registry,
    name: &str,
    file: &str,
    head: bool,
) -> Result<Response, RegistryError> {
    let stream = registry.get_tarball_stream(name, file)?;
    let content_length = stream.content_length();

    // Dropping the stream stops the producer on its next chunk.
    let body = if head {
        Body::empty()
    } else {
        Body::from_stream(stream)
    };

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM))],
        body,
    )
        .into_response();

    if let Some(length) = content_length {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    Ok(response)
}

fn registry_error_response(err: &RegistryError) -> Response {
    match err {
        RegistryError::NotFound { .. } => {
            debug!("{err}");
            error_response(StatusCode::NOT_FOUND, "Not found")
        }
        RegistryError::ServiceUnavailable => {
            warn!("{err}");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
        }
        _ => {
            warn!("{err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static(JSON))],
        serde_json::json!({ "error": message }).to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(name: &str) -> Option<RegistryRequest> {
        Some(RegistryRequest::Metadata { name: name.into() })
    }

    fn tarball(name: &str, file: &str) -> Option<RegistryRequest> {
        Some(RegistryRequest::Tarball {
            name: name.into(),
            file: file.into(),
        })
    }

    #[test]
    fn test_parse_plain_paths() {
        assert_eq!(parse_path("/pkg"), metadata("pkg"));
        assert_eq!(parse_path("/pkg/-/pkg-1.0.0.tgz"), tarball("pkg", "pkg-1.0.0.tgz"));
    }

    #[test]
    fn test_parse_scoped_paths() {
        assert_eq!(parse_path("/@scope/pkg"), metadata("@scope/pkg"));
        assert_eq!(parse_path("/@scope%2fpkg"), metadata("@scope/pkg"));
        assert_eq!(parse_path("/@scope%2Fpkg"), metadata("@scope/pkg"));
        assert_eq!(
            parse_path("/@scope%2fpkg/-/pkg-1.0.0.tgz"),
            tarball("@scope/pkg", "pkg-1.0.0.tgz")
        );
        assert_eq!(
            parse_path("/@scope/pkg/-/pkg-1.0.0.tgz"),
            tarball("@scope/pkg", "pkg-1.0.0.tgz")
        );
    }

    #[test]
    fn test_parse_rejects_other_paths() {
        for path in [
            "/",
            "",
            "/pkg/",
            "/a/b",
            "/@scope",
            "/@/pkg",
            "/..",
            "/pkg/-/",
            "/pkg/-/..",
            "/pkg/-/sub/file.tgz",
            "/-/whoami",
            "/%ff",
        ] {
            assert_eq!(parse_path(path), None, "{path}");
        }
    }
}
