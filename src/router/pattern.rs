//! Path template and raw pattern compilation.
//!
//! Templates such as `/user/{id}/post/{postId}` compile to anchored expressions like
//! `^/user/(?P<id>[^/]+)/post/(?P<postId>[^/]+)$`. Literal text is escaped, so a `.`
//! in a template matches a dot and nothing else.

use super::core::ParamVec;
use super::error::RegistrationError;
use regex::Regex;
use std::sync::Arc;

/// One placeholder matches a single path segment.
const SEGMENT: &str = "[^/]+";
/// A catch-all placeholder matches the rest of the path, separators included.
const REMAINDER: &str = ".+";

/// How a route pattern was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// `{name}` placeholders, one segment each
    Template,
    /// Like `Template`, but the last placeholder swallows the remaining path
    CatchAll,
    /// A caller-supplied expression with its own named groups
    Raw,
}

/// A compiled, fully anchored route matcher.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    kind: PatternKind,
    regex: Regex,
    param_names: Vec<Arc<str>>,
}

#[derive(Debug, PartialEq)]
enum Piece<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

impl RoutePattern {
    /// Compile a path template.
    pub fn template(template: &str) -> Result<Self, RegistrationError> {
        Self::compile_template(template, PatternKind::Template)
    }

    /// Compile a path template whose last placeholder is catch-all.
    pub fn catch_all(template: &str) -> Result<Self, RegistrationError> {
        Self::compile_template(template, PatternKind::CatchAll)
    }

    /// Wrap a raw, un-anchored expression so it only matches whole paths.
    pub fn raw(pattern: &str) -> Result<Self, RegistrationError> {
        if is_anchored(pattern) {
            return Err(RegistrationError::PreAnchored {
                pattern: pattern.to_string(),
            });
        }
        let anchored = format!("^(?:{pattern})$");
        let regex = Regex::new(&anchored).map_err(|source| RegistrationError::Regex {
            pattern: pattern.to_string(),
            source,
        })?;
        let param_names = regex.capture_names().flatten().map(Arc::from).collect();
        Ok(Self {
            source: pattern.to_string(),
            kind: PatternKind::Raw,
            regex,
            param_names,
        })
    }

    fn compile_template(template: &str, kind: PatternKind) -> Result<Self, RegistrationError> {
        let normalized = if template.starts_with('/') {
            template.to_string()
        } else {
            format!("/{template}")
        };
        let pieces = parse_template(&normalized)?;

        let last_placeholder = pieces
            .iter()
            .rposition(|p| matches!(p, Piece::Placeholder(_)));
        if kind == PatternKind::CatchAll && last_placeholder.is_none() {
            return Err(RegistrationError::CatchAllWithoutPlaceholder {
                template: normalized,
            });
        }

        let mut pattern = String::with_capacity(normalized.len() + 16);
        pattern.push('^');
        let mut param_names = Vec::new();
        for (idx, piece) in pieces.iter().enumerate() {
            match piece {
                Piece::Literal(text) => pattern.push_str(&regex::escape(text)),
                Piece::Placeholder(name) => {
                    let class = if kind == PatternKind::CatchAll && Some(idx) == last_placeholder {
                        REMAINDER
                    } else {
                        SEGMENT
                    };
                    pattern.push_str("(?P<");
                    pattern.push_str(name);
                    pattern.push('>');
                    pattern.push_str(class);
                    pattern.push(')');
                    param_names.push(Arc::from(*name));
                }
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|source| RegistrationError::Regex {
            pattern: normalized.clone(),
            source,
        })?;
        Ok(Self {
            source: normalized,
            kind,
            regex,
            param_names,
        })
    }

    /// The template or raw expression as registered (templates gain a leading `/`).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// The anchored expression used for matching.
    #[must_use]
    pub fn as_regex(&self) -> &Regex {
        &self.regex
    }

    /// Names this pattern can capture, in declaration order.
    #[must_use]
    pub fn param_names(&self) -> &[Arc<str>] {
        &self.param_names
    }

    /// Match a whole path and return the named captures.
    ///
    /// Groups that did not take part in the match are left out.
    #[must_use]
    pub fn captures(&self, path: &str) -> Option<ParamVec> {
        let caps = self.regex.captures(path)?;
        let mut params = ParamVec::new();
        for name in &self.param_names {
            if let Some(m) = caps.name(name) {
                params.push((Arc::clone(name), m.as_str().to_string()));
            }
        }
        Some(params)
    }
}

/// Join a namespace and a template into `/namespace/template`.
///
/// Leading and trailing slashes on either side are normalized away, so
/// `namespaced("watch", "/get/{key}")` and `namespaced("/watch/", "get/{key}")` both
/// yield `/watch/get/{key}`.
#[must_use]
pub fn namespaced(namespace: &str, template: &str) -> String {
    let ns = namespace.trim_matches('/');
    let rest = template.trim_matches('/');
    match (ns.is_empty(), rest.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{rest}"),
        (false, true) => format!("/{ns}"),
        (false, false) => format!("/{ns}/{rest}"),
    }
}

fn parse_template(template: &str) -> Result<Vec<Piece<'_>>, RegistrationError> {
    let mut pieces = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            pieces.push(Piece::Literal(&rest[..open]));
        }
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| RegistrationError::UnterminatedPlaceholder {
                template: template.to_string(),
            })?;
        let name = &after[..close];
        if !is_identifier(name) {
            return Err(RegistrationError::InvalidPlaceholder {
                template: template.to_string(),
                name: name.to_string(),
            });
        }
        pieces.push(Piece::Placeholder(name));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }
    Ok(pieces)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_anchored(pattern: &str) -> bool {
    pattern.starts_with('^') || (pattern.ends_with('$') && !pattern.ends_with("\\$"))
}
