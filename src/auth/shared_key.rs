//! SharedKey request signing.

use std::collections::BTreeMap;

use crate::error::StorageResult;
use crate::request::StorageRequest;

use super::SharedKeyCredential;

/// Standard headers in string-to-sign order, after the verb.
const SIGNED_HEADERS: [&str; 11] = [
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

/// Signs the request in place by setting the `Authorization` header.
pub fn sign(request: &mut StorageRequest, credential: &SharedKeyCredential) -> StorageResult<()> {
    let string_to_sign = string_to_sign(request, credential.account());
    tracing::debug!("string to sign: {:?}", string_to_sign);

    let signature = credential.sign(&string_to_sign)?;
    request.insert_header(
        "authorization",
        &format!("SharedKey {}:{}", credential.account(), signature),
    )?;
    if let Some(value) = request.headers.get_mut(http::header::AUTHORIZATION) {
        value.set_sensitive(true);
    }
    Ok(())
}

/// Builds the SharedKey string-to-sign for a request.
pub fn string_to_sign(request: &StorageRequest, account: &str) -> String {
    let mut parts = Vec::with_capacity(SIGNED_HEADERS.len() + 1);

    parts.push(request.method.as_str().to_uppercase());

    for header in SIGNED_HEADERS {
        let value = match header {
            // Content-Length is empty when zero.
            "content-length" => match request.content_length() {
                0 => String::new(),
                len => len.to_string(),
            },
            // x-ms-date supersedes Date and is signed with the ms headers.
            "date" if request.header("x-ms-date").is_some() => String::new(),
            _ => request.header(header).unwrap_or("").to_string(),
        };
        parts.push(value);
    }

    format!(
        "{}\n{}{}",
        parts.join("\n"),
        canonicalized_headers(request),
        canonicalized_resource(request, account)
    )
}

/// Each `x-ms-*` header as `name:value\n`, whitespace runs collapsed.
fn canonicalized_headers(request: &StorageRequest) -> String {
    let mut result = String::new();
    for (name, value) in request.ms_headers() {
        let normalized_value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        result.push_str(name);
        result.push(':');
        result.push_str(&normalized_value);
        result.push('\n');
    }
    result
}

/// `/{account}{path}` then `\nkey:v1,v2` per query parameter, keys sorted.
fn canonicalized_resource(request: &StorageRequest, account: &str) -> String {
    let mut resource = format!("/{}{}", account, request.url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in request.url.query_pairs() {
        params
            .entry(key.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }

    for (key, mut values) in params {
        values.sort();
        resource.push('\n');
        resource.push_str(&key);
        resource.push(':');
        resource.push_str(&values.join(","));
    }

    resource
}
