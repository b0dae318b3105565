//! Attribute value normalization and URL sanitization.

use trellis_reference::Value;
use url::Url;

const BAD_PROTOCOLS: [&str; 2] = ["javascript:", "vbscript:"];
const BAD_TAGS: [&str; 7] = ["a", "body", "link", "img", "iframe", "base", "form"];
const BAD_ATTRIBUTES: [&str; 5] = ["href", "src", "background", "action", "cite"];
const BASE_URL: &str = "https://www.example.com";

/// The protocol of `url` including the trailing colon, resolving relative
/// URLs against a fixed base.
pub fn default_protocol_for_url(url: &str) -> String {
    Url::parse(BASE_URL)
        .and_then(|base| base.join(url))
        .map_or_else(|_| ":".to_owned(), |parsed| format!("{}:", parsed.scheme()))
}

/// The string an attribute is set to, or `None` when the attribute should be
/// absent.
pub fn normalize_attribute_value(value: &Value) -> Option<String> {
    match value {
        Value::Undefined | Value::Null | Value::Bool(false) | Value::Function(_) => None,
        Value::Bool(true) => Some(String::new()),
        Value::SafeString(html) => Some(html.to_string()),
        other => Some(other.to_text()),
    }
}

/// Whether `attribute` on `tag` holds a URL worth checking. A missing tag is
/// treated as a bad one.
pub fn requires_sanitization(tag: Option<&str>, attribute: &str) -> bool {
    tag.is_none_or(|tag| BAD_TAGS.contains(&tag.to_ascii_lowercase().as_str()))
        && BAD_ATTRIBUTES.contains(&attribute.to_ascii_lowercase().as_str())
}

fn checks_data_uri(tag: Option<&str>, attribute: &str) -> bool {
    tag.is_some_and(|tag| tag.eq_ignore_ascii_case("embed")) && attribute.eq_ignore_ascii_case("src")
}

/// Prefix `value` with `unsafe:` when it would run script.
pub fn sanitize_attribute_value<F>(tag: Option<&str>, attribute: &str, value: String, protocol_for_url: F) -> String
where
    F: Fn(&str) -> String,
{
    if requires_sanitization(tag, attribute) {
        let protocol = protocol_for_url(&value).to_ascii_lowercase();
        if BAD_PROTOCOLS.contains(&protocol.as_str()) {
            return format!("unsafe:{value}");
        }
    }
    if checks_data_uri(tag, attribute) {
        return format!("unsafe:{value}");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test the protocol parser on absolute and relative URLs.
    ///
    /// # Panics
    /// Panics if a protocol is misread.
    #[test]
    fn reads_protocols() {
        assert_eq!(default_protocol_for_url("javascript:alert(1)"), "javascript:");
        assert_eq!(default_protocol_for_url("  JavaScript:alert(1)"), "javascript:");
        assert_eq!(default_protocol_for_url("/relative/path"), "https:");
        assert_eq!(default_protocol_for_url("mailto:someone@example.com"), "mailto:");
    }

    /// Test which values get the `unsafe:` prefix.
    ///
    /// # Panics
    /// Panics if a script URL survives or a safe one is rewritten.
    #[test]
    fn prefixes_script_urls() {
        let sanitize = |tag, attribute, value: &str| {
            sanitize_attribute_value(tag, attribute, value.to_owned(), default_protocol_for_url)
        };
        assert_eq!(sanitize(Some("a"), "href", "javascript:go()"), "unsafe:javascript:go()");
        assert_eq!(sanitize(Some("A"), "HREF", "vbscript:go"), "unsafe:vbscript:go");
        assert_eq!(sanitize(Some("a"), "href", "/home"), "/home");
        assert_eq!(sanitize(Some("div"), "href", "javascript:go()"), "javascript:go()");
        assert_eq!(sanitize(None, "src", "javascript:go()"), "unsafe:javascript:go()");
        assert_eq!(sanitize(Some("embed"), "src", "data:text/html,x"), "unsafe:data:text/html,x");
    }

    /// Test attribute normalization.
    ///
    /// # Panics
    /// Panics if a value normalizes wrongly.
    #[test]
    fn normalizes_values() {
        assert_eq!(normalize_attribute_value(&Value::Null), None);
        assert_eq!(normalize_attribute_value(&Value::Bool(false)), None);
        assert_eq!(normalize_attribute_value(&Value::Bool(true)), Some(String::new()));
        assert_eq!(normalize_attribute_value(&Value::from(3)), Some("3".to_owned()));
        assert_eq!(normalize_attribute_value(&Value::safe_string("<b>")), Some("<b>".to_owned()));
    }
}
