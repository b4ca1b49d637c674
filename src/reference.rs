//! Validation of `repository[:tag]` references.
//!
//! The grammar follows the Docker distribution API spec: a repository name is
//! a sequence of `/`-separated path components, each one or more lowercase
//! alphanumerics optionally joined by a dot, an underscore, a double
//! underscore, or a run of dashes; a tag starts with an alphanumeric or
//! underscore and continues with alphanumerics, underscores, dots or dashes.
//! The whole reference (including the `:tag` part) must be shorter than 256
//! characters and the tag shorter than 129.

use once_cell::sync::Lazy;
use regex_automata::meta::Regex;

/// A full reference (repository plus optional `:tag`) must be shorter than this.
const MAX_REFERENCE_LEN: usize = 256;

/// A tag must be shorter than this.
const MAX_TAG_LEN: usize = 129;

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-zA-Z0-9_][a-zA-Z0-9_.-]*$").expect("valid tag pattern"));

// Multiple dashes and a bare double underscore are accepted as component
// separators, matching docker/distribution's internal regexp rather than the
// stricter one in the API documentation.
static COMPONENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new("^[a-z0-9]+(?:(?:[._]|__|-*)[a-z0-9]+)*$").expect("valid component pattern")
});

/// Split a reference into its repository part and optional tag part, at the
/// first `:`. No validation is performed.
pub fn split_reference(image: &str) -> (&str, Option<&str>) {
    match image.split_once(':') {
        Some((repository, tag)) => (repository, Some(tag)),
        None => (image, None),
    }
}

/// Check whether `image` is a syntactically valid `repository[:tag]`
/// reference. An absent tag is checked as if it were `latest`.
pub fn is_valid_reference(image: &str) -> bool {
    let (repository, tag) = split_reference(image);
    let tag = tag.unwrap_or("latest");

    image.len() < MAX_REFERENCE_LEN
        && tag.len() < MAX_TAG_LEN
        && TAG_RE.is_match(tag)
        && repository
            .split('/')
            .all(|component| COMPONENT_RE.is_match(component))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_reference() {
        assert_eq!(split_reference("busybox"), ("busybox", None));
        assert_eq!(split_reference("busybox:1.36"), ("busybox", Some("1.36")));
        // only the first colon separates the tag
        assert_eq!(split_reference("a:b:c"), ("a", Some("b:c")));
    }

    #[test]
    fn test_valid_repositories() {
        for image in [
            "busybox",
            "library/busybox",
            "a/b/c",
            "my-app",
            "my---app",
            "app.v2",
            "a__b",
            "a_b.c-d",
            "0numeric",
        ] {
            assert!(is_valid_reference(image), "{image} should be valid");
        }
    }

    #[test]
    fn test_invalid_repositories() {
        for image in [
            "",
            "Busybox",
            "library/Busybox",
            "-leading",
            ".leading",
            "_leading",
            "trailing-",
            "a..b",
            "a___b",
            "a_-b",
            "a//b",
            "a/",
            "/a",
        ] {
            assert!(!is_valid_reference(image), "{image} should be invalid");
        }
    }

    #[test]
    fn test_valid_tags() {
        for image in [
            "busybox:latest",
            "busybox:1.36.1",
            "busybox:_internal",
            "busybox:v2-rc.1",
            "busybox:UPPER",
        ] {
            assert!(is_valid_reference(image), "{image} should be valid");
        }
    }

    #[test]
    fn test_invalid_tags() {
        for image in ["busybox:", "busybox:.dot", "busybox:-dash", "busybox:a:b"] {
            assert!(!is_valid_reference(image), "{image} should be invalid");
        }
    }

    #[test]
    fn test_length_limits() {
        let long_repo = "a".repeat(254);
        assert!(is_valid_reference(&long_repo));
        assert!(!is_valid_reference(&"a".repeat(256)));

        // repository and tag count against the total limit together
        let image = format!("{long_repo}:t");
        assert_eq!(image.len(), 256);
        assert!(!is_valid_reference(&image));

        let tag = "t".repeat(128);
        assert!(is_valid_reference(&format!("busybox:{tag}")));
        assert!(!is_valid_reference(&format!("busybox:{tag}x")));
    }
}
