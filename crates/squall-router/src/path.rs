//! Route path components and component-wise matching
//!
//! ## Path Syntax
//! - `name` - Literal segment
//! - `:name` - Parameter (captures one segment)
//! - `*` or `**` - Catch-all (captures every remaining segment, final only)

use std::fmt;

/// One segment of a declared route path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathComponent {
    Literal(String),
    Parameter(String),
    CatchAll,
}

impl PathComponent {
    /// Parse a single segment
    pub fn parse(segment: &str) -> Self {
        if let Some(name) = segment.strip_prefix(':') {
            PathComponent::Parameter(name.to_string())
        } else if segment.starts_with('*') {
            PathComponent::CatchAll
        } else {
            PathComponent::Literal(segment.to_string())
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, PathComponent::Literal(_))
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self, PathComponent::Parameter(_))
    }

    pub fn is_catch_all(&self) -> bool {
        matches!(self, PathComponent::CatchAll)
    }

    /// Literal text, if this is a literal
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            PathComponent::Literal(s) => Some(s),
            _ => None,
        }
    }

    /// Same component with its literal text ASCII-lowercased
    pub fn lowercased(&self) -> Self {
        match self {
            PathComponent::Literal(s) => PathComponent::Literal(s.to_ascii_lowercase()),
            other => other.clone(),
        }
    }

    #[inline]
    fn literal_matches(literal: &str, segment: &[u8], case_sensitive: bool) -> bool {
        if case_sensitive {
            literal.as_bytes() == segment
        } else {
            literal.as_bytes().eq_ignore_ascii_case(segment)
        }
    }
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathComponent::Literal(s) => f.write_str(s),
            PathComponent::Parameter(name) => write!(f, ":{}", name),
            PathComponent::CatchAll => f.write_str("*"),
        }
    }
}

/// Invalid route path declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// `*` appears before the last segment
    CatchAllNotLast { path: String },
    /// `:` with no name
    EmptyParameterName { path: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::CatchAllNotLast { path } => {
                write!(f, "catch-all must be the last path component: {}", path)
            }
            PathError::EmptyParameterName { path } => {
                write!(f, "parameter without a name: {}", path)
            }
        }
    }
}

impl std::error::Error for PathError {}

/// Non-empty `/`-separated segments of a path
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Parse a declared route path into components
///
/// # Example
/// ```
/// use squall_router::{parse_path, PathComponent};
///
/// let components = parse_path("/users/:id/*").unwrap();
/// assert_eq!(components[0], PathComponent::Literal("users".to_string()));
/// assert_eq!(components[1], PathComponent::Parameter("id".to_string()));
/// assert_eq!(components[2], PathComponent::CatchAll);
/// ```
pub fn parse_path(path: &str) -> Result<Vec<PathComponent>, PathError> {
    let components: Vec<PathComponent> = split_path(path).map(PathComponent::parse).collect();
    for (index, component) in components.iter().enumerate() {
        match component {
            PathComponent::CatchAll if index + 1 != components.len() => {
                return Err(PathError::CatchAllNotLast {
                    path: path.to_string(),
                });
            }
            PathComponent::Parameter(name) if name.is_empty() => {
                return Err(PathError::EmptyParameterName {
                    path: path.to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(components)
}

/// Render components back into a `/a/:b/*` path
pub fn render_path(components: &[PathComponent]) -> String {
    if components.is_empty() {
        return "/".to_string();
    }
    let mut path = String::new();
    for component in components {
        path.push('/');
        path.push_str(&component.to_string());
    }
    path
}

/// Whether any component is a parameter or catch-all
pub fn has_parameters(components: &[PathComponent]) -> bool {
    components.iter().any(|c| !c.is_literal())
}

/// Whether the route ends in a catch-all
pub fn has_catch_all(components: &[PathComponent]) -> bool {
    components.last().is_some_and(PathComponent::is_catch_all)
}

/// Same-length positional match.
///
/// Literals must equal the request segment at the same index; parameters
/// always match.
pub fn matches_exact(components: &[PathComponent], segments: &[&[u8]], case_sensitive: bool) -> bool {
    if components.len() != segments.len() {
        return false;
    }
    components
        .iter()
        .zip(segments)
        .all(|(component, segment)| match component {
            PathComponent::Literal(literal) => {
                PathComponent::literal_matches(literal, segment, case_sensitive)
            }
            PathComponent::Parameter(_) | PathComponent::CatchAll => true,
        })
}

/// Prefix match for catch-all routes.
///
/// Walks the components; a catch-all accepts whatever remains, a literal must
/// equal the segment at its index and a parameter needs a segment to exist.
pub fn matches_catchall(components: &[PathComponent], segments: &[&[u8]], case_sensitive: bool) -> bool {
    for (index, component) in components.iter().enumerate() {
        match component {
            PathComponent::CatchAll => return true,
            PathComponent::Literal(literal) => match segments.get(index) {
                Some(segment) if PathComponent::literal_matches(literal, segment, case_sensitive) => {}
                _ => return false,
            },
            PathComponent::Parameter(_) => {
                if index >= segments.len() {
                    return false;
                }
            }
        }
    }
    components.len() == segments.len()
}

/// Positional parameter capture for a matched route.
///
/// Each parameter takes the segment at its index; a catch-all appends every
/// segment from its index onward.
pub fn capture_parameters<'a>(components: &[PathComponent], segments: &[&'a [u8]]) -> Vec<&'a [u8]> {
    let mut captured = Vec::new();
    for (index, component) in components.iter().enumerate() {
        match component {
            PathComponent::Parameter(_) => {
                if let Some(segment) = segments.get(index) {
                    captured.push(*segment);
                }
            }
            PathComponent::CatchAll => {
                captured.extend(segments.iter().skip(index).copied());
                break;
            }
            PathComponent::Literal(_) => {}
        }
    }
    captured
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<&[u8]> {
        split_path(path).map(str::as_bytes).collect()
    }

    #[test]
    fn test_parse_components() {
        let c = parse_path("/api/v1/users/:id").unwrap();
        assert_eq!(c.len(), 4);
        assert!(c[0].is_literal());
        assert_eq!(c[3], PathComponent::Parameter("id".to_string()));
        assert!(!has_catch_all(&c));
        assert!(has_parameters(&c));
    }

    #[test]
    fn test_parse_catch_all_variants() {
        assert_eq!(parse_path("/files/*").unwrap()[1], PathComponent::CatchAll);
        assert_eq!(parse_path("/files/**").unwrap()[1], PathComponent::CatchAll);
        assert_eq!(parse_path("/files/*path").unwrap()[1], PathComponent::CatchAll);
    }

    #[test]
    fn test_catch_all_must_be_last() {
        let err = parse_path("/a/*/b").unwrap_err();
        assert_eq!(
            err,
            PathError::CatchAllNotLast {
                path: "/a/*/b".to_string()
            }
        );
    }

    #[test]
    fn test_empty_parameter_name() {
        assert!(matches!(
            parse_path("/users/:"),
            Err(PathError::EmptyParameterName { .. })
        ));
    }

    #[test]
    fn test_root_and_trailing_slash() {
        assert!(parse_path("/").unwrap().is_empty());
        assert_eq!(parse_path("/users/").unwrap().len(), 1);
        assert_eq!(render_path(&[]), "/");
    }

    #[test]
    fn test_render_round_trip() {
        let c = parse_path("/users/:id/posts/*").unwrap();
        assert_eq!(render_path(&c), "/users/:id/posts/*");
    }

    #[test]
    fn test_matches_exact() {
        let c = parse_path("/users/:id").unwrap();
        assert!(matches_exact(&c, &segs("/users/42"), true));
        assert!(!matches_exact(&c, &segs("/posts/42"), true));
        assert!(!matches_exact(&c, &segs("/users/42/x"), true));
        assert!(!matches_exact(&c, &segs("/USERS/42"), true));
        assert!(matches_exact(&c, &segs("/USERS/42"), false));
    }

    #[test]
    fn test_matches_catchall_absorbs_tail() {
        let c = parse_path("/api/*").unwrap();
        assert!(matches_catchall(&c, &segs("/api"), true));
        assert!(matches_catchall(&c, &segs("/api/x"), true));
        assert!(matches_catchall(&c, &segs("/api/x/y/z"), true));
        assert!(!matches_catchall(&c, &segs("/other/x"), true));
        assert!(!matches_catchall(&c, &segs("/"), true));
    }

    #[test]
    fn test_matches_catchall_with_parameter() {
        let c = parse_path("/repos/:owner/*").unwrap();
        assert!(matches_catchall(&c, &segs("/repos/me/a/b"), true));
        assert!(matches_catchall(&c, &segs("/repos/me"), true));
        assert!(!matches_catchall(&c, &segs("/repos"), true));
    }

    #[test]
    fn test_capture_parameters() {
        let c = parse_path("/users/:id/posts/:post").unwrap();
        let s = segs("/users/42/posts/99");
        assert_eq!(capture_parameters(&c, &s), vec![b"42".as_slice(), b"99".as_slice()]);

        let c = parse_path("/files/:bucket/*").unwrap();
        let s = segs("/files/b1/docs/readme.md");
        assert_eq!(
            capture_parameters(&c, &s),
            vec![b"b1".as_slice(), b"docs".as_slice(), b"readme.md".as_slice()]
        );
    }

    #[test]
    fn test_lowercased_component() {
        let c = PathComponent::Literal("Status".to_string());
        assert_eq!(c.lowercased(), PathComponent::Literal("status".to_string()));
        let p = PathComponent::Parameter("Id".to_string());
        assert_eq!(p.lowercased(), p);
    }
}
