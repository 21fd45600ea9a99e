use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Failed to load policy file `{path}`")]
    #[diagnostic(
        code(pathz::authz::policy_load),
        help("Check that the file exists and is readable")
    )]
    PolicyLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported policy file `{0}`")]
    #[diagnostic(
        code(pathz::authz::unsupported_format),
        help("Policy files must use the `.kdl` or `.json` extension")
    )]
    UnsupportedFormat(String),

    #[error("Invalid policy: {0}")]
    #[diagnostic(
        code(pathz::authz::invalid_policy),
        help("Each policy file must contain `rule` and `group` KDL nodes")
    )]
    InvalidPolicy(String),

    #[error("Invalid path `{path}`: {reason}")]
    #[diagnostic(
        code(pathz::authz::invalid_path),
        help("Path syntax: /name[key=value]/name, keys within a segment must be unique")
    )]
    InvalidPath { path: String, reason: String },

    #[error("Policy contains no rules")]
    #[diagnostic(
        code(pathz::authz::empty_policy),
        help("An installed policy needs at least one rule; an empty store already denies everything")
    )]
    EmptyPolicy,

    #[error("Rule `{0}` has no principal")]
    #[diagnostic(
        code(pathz::authz::missing_principal),
        help("Every rule names exactly one of `user` or `group`")
    )]
    MissingPrincipal(String),

    #[error("Rule `{0}` has no access mode")]
    #[diagnostic(
        code(pathz::authz::rule_mode),
        help("Set mode=\"read\" or mode=\"write\" on the rule")
    )]
    UnspecifiedRuleMode(String),

    #[error("Access mode must be read or write")]
    #[diagnostic(code(pathz::authz::unspecified_mode))]
    UnspecifiedMode,

    #[error("Key `{conflicting}` in rule `{rule_id}` conflicts with key `{existing}` at `{position}`")]
    #[diagnostic(
        code(pathz::authz::key_mismatch),
        help("All rules sharing a path position must key that position by the same key names")
    )]
    KeyMismatch {
        rule_id: String,
        position: String,
        existing: String,
        conflicting: String,
    },

    #[error("Key `{key}` in rule `{rule_id}` has no value")]
    #[diagnostic(
        code(pathz::authz::missing_key_value),
        help("Use `*` to match any value of a key")
    )]
    MissingKeyValue { rule_id: String, key: String },

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(pathz::authz::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev")
    )]
    KdlParse(String),

    #[error("JSON error: {0}")]
    #[diagnostic(code(pathz::authz::json))]
    Json(#[from] serde_json::Error),

    #[error("A policy rotation is already in progress")]
    #[diagnostic(code(pathz::authz::rotation_in_progress))]
    RotationInProgress,

    #[error("Policy version cannot be empty")]
    #[diagnostic(code(pathz::authz::empty_version))]
    EmptyVersion,

    #[error("Policy with version `{0}` already exists")]
    #[diagnostic(
        code(pathz::authz::version_exists),
        help("Set `force_overwrite` to reinstall the same version")
    )]
    VersionExists(String),

    #[error("Rotation finalized without a successful upload")]
    #[diagnostic(code(pathz::authz::nothing_to_finalize))]
    NothingToFinalize,

    #[error("I/O error: {0}")]
    #[diagnostic(code(pathz::authz::io))]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        AuthzError::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
