//! Minimal `{var}` URI-template matching for resource templates.

use std::collections::BTreeMap;

/// Match `uri` against a template like `agora://groups/{slug}`; returns the
/// captured variables on success. Variables match one path segment (no `/`).
pub fn match_template(template: &str, uri: &str) -> Option<BTreeMap<String, String>> {
    let template_segments: Vec<&str> = template.split('/').collect();
    let uri_segments: Vec<&str> = uri.split('/').collect();
    if template_segments.len() != uri_segments.len() {
        return None;
    }

    let mut params = BTreeMap::new();
    for (pattern, actual) in template_segments.iter().zip(&uri_segments) {
        if let Some(var) = pattern
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
        {
            if actual.is_empty() {
                return None;
            }
            params.insert(var.to_string(), (*actual).to_string());
        } else if pattern != actual {
            return None;
        }
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::match_template;

    #[test]
    fn matches_and_captures() {
        let params = match_template("agora://groups/{slug}", "agora://groups/rustaceans")
            .expect("matches");
        assert_eq!(params.get("slug").map(String::as_str), Some("rustaceans"));
    }

    #[test]
    fn literal_segments_must_match() {
        assert!(match_template("agora://groups/{slug}", "agora://events/rustaceans").is_none());
    }

    #[test]
    fn variables_do_not_span_segments() {
        assert!(match_template("agora://groups/{slug}", "agora://groups/a/b").is_none());
        assert!(match_template("agora://groups/{slug}", "agora://groups/").is_none());
    }

    #[test]
    fn multiple_variables() {
        let params = match_template(
            "agora://groups/{slug}/events/{event}",
            "agora://groups/rustaceans/events/june",
        )
        .expect("matches");
        assert_eq!(params.get("slug").map(String::as_str), Some("rustaceans"));
        assert_eq!(params.get("event").map(String::as_str), Some("june"));
    }
}
