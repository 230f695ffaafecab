//! Per-call scratch object that assembles an `HttpRequest`.
//!
//! # Design
//! Base URL and relative path are concatenated verbatim; no encoding or
//! normalization happens here. Query parameters are kept apart from the
//! path so substitutions never touch them. Content-Type is held
//! separately from the other headers and merged at `build`, where it also
//! overrides whatever content type the body declared.

use crate::error::ConversionError;
use crate::http::{HttpMethod, HttpRequest, RequestBody};

#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: HttpMethod,
    base_url: String,
    relative_url: String,
    query: String,
    headers: Vec<(String, String)>,
    content_type: Option<String>,
    body: Option<RequestBody>,
}

impl RequestBuilder {
    pub fn new(method: HttpMethod, base_url: &str, relative_url: &str) -> Self {
        Self {
            method,
            base_url: base_url.to_string(),
            relative_url: relative_url.to_string(),
            query: String::new(),
            headers: Vec::new(),
            content_type: None,
            body: None,
        }
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), ConversionError> {
        if name.eq_ignore_ascii_case("Content-Type") {
            if !is_media_type(value) {
                return Err(ConversionError::new(format!("Malformed content type: {value}")));
            }
            self.content_type = Some(value.to_string());
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
        Ok(())
    }

    /// Replace every `{name}` in the relative URL with `value`.
    pub fn substitute_path_param(&mut self, name: &str, value: &str) {
        let placeholder = format!("{{{name}}}");
        self.relative_url = self.relative_url.replace(&placeholder, value);
    }

    pub fn append_query_param(&mut self, name: &str, value: &str) {
        self.query.push(if self.query.is_empty() { '?' } else { '&' });
        self.query.push_str(name);
        self.query.push('=');
        self.query.push_str(value);
    }

    pub fn set_body(&mut self, body: RequestBody) {
        self.body = Some(body);
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn build(&self) -> HttpRequest {
        let mut headers = self.headers.clone();
        let mut body = self.body.clone();

        let content_type = self
            .content_type
            .clone()
            .or_else(|| body.as_ref().and_then(|b| b.content_type.clone()));
        if let Some(content_type) = content_type {
            if let Some(body) = body.as_mut() {
                body.content_type = Some(content_type.clone());
            }
            headers.push(("Content-Type".to_string(), content_type));
        }

        HttpRequest {
            method: self.method,
            url: format!("{}{}{}", self.base_url, self.relative_url, self.query),
            headers,
            body,
        }
    }
}

/// Minimal `type/subtype[; params]` shape check.
pub(crate) fn is_media_type(value: &str) -> bool {
    let essence = value.split(';').next().unwrap_or("").trim();
    match essence.split_once('/') {
        Some((kind, subtype)) => {
            !kind.is_empty() && !subtype.is_empty() && !subtype.contains('/') && !essence.contains(' ')
        }
        None => false,
    }
}
