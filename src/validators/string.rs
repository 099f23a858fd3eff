//! String validators.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;

use crate::diag::Diagnostics;

use super::{AttributeValidator, ValidationRequest};

const INVALID_VALUE: &str = "Invalid Attribute Value";

/// String must contain none of the given substrings.
#[derive(Debug, Clone)]
pub struct NotContain {
    substrings: Vec<String>,
}

/// Builds a [`NotContain`] validator.
#[must_use]
pub fn not_contain(substrings: &[&str]) -> NotContain {
    NotContain {
        substrings: substrings.iter().map(ToString::to_string).collect(),
    }
}

impl AttributeValidator for NotContain {
    fn description(&self) -> String {
        format!("value must not contain any of {:?}", self.substrings)
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        let Some(s) = req.value.as_str() else {
            return;
        };
        for needle in &self.substrings {
            if s.contains(needle.as_str()) {
                diags.error(
                    req.path.clone(),
                    INVALID_VALUE,
                    format!("Attribute {} must not contain {needle:?}", req.path),
                );
            }
        }
    }
}

/// String must be standard base64, optionally of a given content type.
#[derive(Debug, Clone)]
pub struct IsBase64 {
    content_types: Vec<String>,
}

/// Builds an [`IsBase64`] validator accepting any content.
#[must_use]
pub const fn is_base64() -> IsBase64 {
    IsBase64 {
        content_types: Vec::new(),
    }
}

/// Builds an [`IsBase64`] validator whose decoded bytes must sniff as one
/// of `content_types`.
#[must_use]
pub fn is_base64_of_content_type(content_types: &[&str]) -> IsBase64 {
    IsBase64 {
        content_types: content_types.iter().map(ToString::to_string).collect(),
    }
}

impl AttributeValidator for IsBase64 {
    fn description(&self) -> String {
        if self.content_types.is_empty() {
            String::from("value must be a base64 encoded string")
        } else {
            format!(
                "value must be a base64 encoded string of content type {:?}",
                self.content_types
            )
        }
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        let Some(s) = req.value.as_str() else {
            return;
        };
        let Ok(bytes) = STANDARD.decode(s) else {
            diags.error(
                req.path.clone(),
                INVALID_VALUE,
                format!("Attribute {} must be a valid base64 encoded string", req.path),
            );
            return;
        };
        if self.content_types.is_empty() {
            return;
        }
        let detected = sniff_content_type(&bytes);
        let media_type = detected.split(';').next().unwrap_or(detected);
        if !self.content_types.iter().any(|t| t == media_type) {
            diags.error(
                req.path.clone(),
                INVALID_VALUE,
                format!(
                    "Attribute {} must be base64 encoded content of type {:?}, detected {media_type}",
                    req.path, self.content_types
                ),
            );
        }
    }
}

/// Detects the media type of `bytes` from their leading signature.
#[must_use]
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"BM", "image/bmp"),
        (b"\x00\x00\x01\x00", "image/x-icon"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b\x08", "application/x-gzip"),
    ];

    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return "image/webp";
    }
    if let Some((_, media)) = SIGNATURES.iter().find(|(sig, _)| bytes.starts_with(sig)) {
        return media;
    }

    let trimmed = bytes.trim_ascii_start();
    let head: Vec<u8> = trimmed.iter().take(14).map(u8::to_ascii_lowercase).collect();
    if head.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }
    if head.starts_with(b"<!doctype html") || head.starts_with(b"<html") {
        return "text/html; charset=utf-8";
    }

    let textual = std::str::from_utf8(bytes).is_ok_and(|s| {
        !s.chars()
            .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\x0c'))
    });
    if textual {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}

/// String must parse as a JSON object.
#[derive(Debug, Clone, Copy)]
pub struct IsParseableJson;

/// Builds an [`IsParseableJson`] validator.
#[must_use]
pub const fn is_parseable_json() -> IsParseableJson {
    IsParseableJson
}

impl AttributeValidator for IsParseableJson {
    fn description(&self) -> String {
        String::from("value must be a parseable JSON object")
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        let Some(s) = req.value.as_str() else {
            return;
        };
        if serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(s).is_err() {
            diags.error(
                req.path.clone(),
                "Invalid JSON",
                format!("Attribute {} must be a valid JSON object", req.path),
            );
        }
    }
}

/// String must be one of a fixed set of values.
#[derive(Debug, Clone)]
pub struct OneOf {
    allowed: Vec<String>,
}

/// Builds a [`OneOf`] validator.
#[must_use]
pub fn one_of(allowed: &[&str]) -> OneOf {
    OneOf {
        allowed: allowed.iter().map(ToString::to_string).collect(),
    }
}

impl AttributeValidator for OneOf {
    fn description(&self) -> String {
        format!("value must be one of: {:?}", self.allowed)
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        let Some(s) = req.value.as_str() else {
            return;
        };
        if !self.allowed.iter().any(|a| a == s) {
            diags.error(
                req.path.clone(),
                INVALID_VALUE,
                format!("Attribute {} {}", req.path, self.description()),
            );
        }
    }
}

/// String length, in characters, must lie within an inclusive range.
#[derive(Debug, Clone, Copy)]
pub struct LengthBetween {
    min: usize,
    max: usize,
}

/// Builds a [`LengthBetween`] validator.
#[must_use]
pub const fn length_between(min: usize, max: usize) -> LengthBetween {
    LengthBetween { min, max }
}

impl AttributeValidator for LengthBetween {
    fn description(&self) -> String {
        format!("string length must be between {} and {}", self.min, self.max)
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        let Some(s) = req.value.as_str() else {
            return;
        };
        let len = s.chars().count();
        if len < self.min || len > self.max {
            diags.error(
                req.path.clone(),
                "Invalid Attribute Value Length",
                format!("Attribute {} {}", req.path, self.description()),
            );
        }
    }
}

/// String must match a regular expression.
#[derive(Debug, Clone)]
pub struct MatchesRegex {
    regex: Regex,
    message: String,
}

/// Builds a [`MatchesRegex`] validator reporting `message` on failure.
#[must_use]
pub fn matches_regex(regex: Regex, message: &str) -> MatchesRegex {
    MatchesRegex {
        regex,
        message: message.to_string(),
    }
}

impl AttributeValidator for MatchesRegex {
    fn description(&self) -> String {
        if self.message.is_empty() {
            format!("value must match regular expression '{}'", self.regex)
        } else {
            self.message.clone()
        }
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        let Some(s) = req.value.as_str() else {
            return;
        };
        if !self.regex.is_match(s) {
            diags.error(
                req.path.clone(),
                "Invalid Attribute Value Match",
                format!("Attribute {} {}", req.path, self.description()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{AttrType, Path, Value};

    fn check(validator: &dyn AttributeValidator, value: Value) -> Diagnostics {
        let path = Path::root().attr("field");
        let config = Value::object([("field", value.clone())]);
        let ty = AttrType::String;
        let req = ValidationRequest::new(&path, &value, &config, &ty);
        let mut diags = Diagnostics::new();
        validator.validate(&req, &mut diags);
        diags
    }

    #[test]
    fn test_not_contain() {
        let v = not_contain(&["${", "}"]);
        assert!(check(&v, Value::string("plain")).is_empty());
        assert_eq!(check(&v, Value::string("${x}")).error_count(), 2);
        assert!(check(&v, Value::Null).is_empty());
    }

    #[test]
    fn test_is_base64() {
        assert!(check(&is_base64(), Value::string("aGVsbG8=")).is_empty());
        assert_eq!(check(&is_base64(), Value::string("not base64!")).error_count(), 1);
    }

    #[test]
    fn test_is_base64_of_content_type() {
        let png = STANDARD.encode(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR");
        let v = is_base64_of_content_type(&["image/png", "image/jpeg"]);
        assert!(check(&v, Value::string(png)).is_empty());

        let text = STANDARD.encode(b"hello world");
        assert_eq!(check(&v, Value::string(text)).error_count(), 1);
    }

    #[test]
    fn test_sniff_content_type() {
        assert_eq!(sniff_content_type(b"GIF89a...."), "image/gif");
        assert_eq!(sniff_content_type(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff_content_type(b"  <?xml version"), "text/xml; charset=utf-8");
        assert_eq!(sniff_content_type(b"hello"), "text/plain; charset=utf-8");
        assert_eq!(sniff_content_type(&[0x00, 0x01, 0xfe]), "application/octet-stream");
    }

    #[test]
    fn test_is_parseable_json() {
        assert!(check(&is_parseable_json(), Value::string(r#"{"a": 1}"#)).is_empty());
        assert_eq!(check(&is_parseable_json(), Value::string("[1, 2]")).error_count(), 1);
        assert_eq!(check(&is_parseable_json(), Value::string("{")).error_count(), 1);
    }

    #[test]
    fn test_one_of_and_length() {
        let v = one_of(&["SANDBOX", "PRODUCTION"]);
        assert!(check(&v, Value::string("SANDBOX")).is_empty());
        assert_eq!(check(&v, Value::string("sandbox")).error_count(), 1);

        let v = length_between(1, 3);
        assert!(check(&v, Value::string("abc")).is_empty());
        assert_eq!(check(&v, Value::string("")).error_count(), 1);
        assert_eq!(check(&v, Value::string("abcd")).error_count(), 1);
    }

    #[test]
    fn test_matches_regex_message() {
        let v = matches_regex(Regex::new("^[A-Z]{2}$").expect("regex"), "must be a two letter code");
        let diags = check(&v, Value::string("abc"));
        assert!(diags.to_string().contains("must be a two letter code"));
        assert!(!diags.to_string().contains("abc"));
    }
}
