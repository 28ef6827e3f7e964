use thiserror::Error;

/// Route registration error
///
/// Returned by the registration surface when a template, raw pattern or method set
/// cannot be compiled into a route. Registration errors are startup bugs; request-time
/// misses are not errors and simply yield no match.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// A method name that is not a valid HTTP token
    #[error("invalid HTTP method `{method}`")]
    InvalidMethod { method: String },

    /// The route options declared an empty method set
    #[error("route `{pattern}` declares no HTTP methods")]
    NoMethods { pattern: String },

    /// A `{` without its closing `}`
    #[error("unterminated placeholder in template `{template}`")]
    UnterminatedPlaceholder { template: String },

    /// Placeholder names must be identifiers (`[A-Za-z_][A-Za-z0-9_]*`)
    #[error("invalid placeholder name `{name}` in template `{template}`")]
    InvalidPlaceholder { template: String, name: String },

    /// A catch-all registration needs a placeholder to make greedy
    #[error("catch-all template `{template}` has no placeholder")]
    CatchAllWithoutPlaceholder { template: String },

    /// Raw patterns are anchored by the matcher and must not anchor themselves
    #[error("raw pattern `{pattern}` must not be anchored with ^ or $")]
    PreAnchored { pattern: String },

    /// The generated or raw expression failed to compile (includes duplicate names)
    #[error("pattern `{pattern}` failed to compile: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
