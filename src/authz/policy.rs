use crate::authz::errors::AuthzError;
use crate::authz::path::Path;
use crate::authz::types::*;
use kdl::KdlDocument;

/// Parse a KDL document string into a policy document.
pub fn parse_kdl_document(source: &str) -> Result<PolicyDocument, AuthzError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| AuthzError::KdlParse(e.to_string()))?;

    let mut policy = PolicyDocument::default();

    for node in doc.nodes() {
        match node.name().value() {
            "rule" => {
                let id = first_string_arg(node).ok_or_else(|| {
                    AuthzError::InvalidPolicy(
                        "rule node requires an id argument (e.g. rule \"r1\" path=\"/a/b\" user=\"alice\" mode=\"read\" action=\"permit\")"
                            .into(),
                    )
                })?;

                let path = string_prop(node, "path").ok_or_else(|| {
                    AuthzError::InvalidPolicy(format!(
                        "rule `{id}` missing `path` property (e.g. path=\"/interfaces/interface[name=*]\")"
                    ))
                })?;
                let path: Path = path.parse()?;

                let principal = match (string_prop(node, "user"), string_prop(node, "group")) {
                    (Some(_), Some(_)) => {
                        return Err(AuthzError::InvalidPolicy(format!(
                            "rule `{id}` sets both `user` and `group`"
                        )))
                    }
                    (Some(user), None) => Some(Principal::User(user.to_string())),
                    (None, Some(group)) => Some(Principal::Group(group.to_string())),
                    (None, None) => None,
                };

                let mode = match string_prop(node, "mode") {
                    Some(m) => m.parse::<Mode>().map_err(|e| {
                        AuthzError::InvalidPolicy(format!("rule `{id}`: {e}"))
                    })?,
                    None => Mode::Unspecified,
                };

                let action = match string_prop(node, "action") {
                    Some(a) => a.parse::<Action>().map_err(|e| {
                        AuthzError::InvalidPolicy(format!("rule `{id}`: {e}"))
                    })?,
                    None => Action::Unspecified,
                };

                policy.rules.push(AuthorizationRule {
                    id,
                    path,
                    principal,
                    mode,
                    action,
                });
            }
            "group" => {
                let name = first_string_arg(node).ok_or_else(|| {
                    AuthzError::InvalidPolicy(
                        "group node requires a name argument (e.g. group \"admins\" { - \"alice\" })"
                            .into(),
                    )
                })?;

                policy.groups.push(GroupDefinition {
                    name,
                    members: dash_list(node),
                });
            }
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(policy)
}

fn string_prop<'a>(node: &'a kdl::KdlNode, key: &str) -> Option<&'a str> {
    node.get(key).and_then(|v| v.as_string())
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &kdl::KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Extract dash-list children: nodes named "-" whose first argument is a string.
/// Example KDL:
/// ```kdl
/// group "admins" {
///     - "alice"
///     - "bob"
/// }
/// ```
fn dash_list(node: &kdl::KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_rule() {
        let kdl = r#"
rule "r1" path="/a/b[k1=v1]/c" user="alice" mode="write" action="permit"
"#;
        let policy = parse_kdl_document(kdl).unwrap();
        assert_eq!(policy.rules.len(), 1);
        let rule = &policy.rules[0];
        assert_eq!(rule.id, "r1");
        assert_eq!(rule.path.to_string(), "/a/b[k1=v1]/c");
        assert_eq!(rule.principal, Some(Principal::User("alice".into())));
        assert_eq!(rule.mode, Mode::Write);
        assert_eq!(rule.action, Action::Permit);
    }

    #[test]
    fn test_parse_group_rule_and_members() {
        let kdl = r#"
group "ops" {
    - "alice"
    - "bob"
}

rule "r2" path="/" group="ops" mode="read" action="deny"
"#;
        let policy = parse_kdl_document(kdl).unwrap();
        assert_eq!(policy.groups.len(), 1);
        assert_eq!(policy.groups[0].name, "ops");
        assert_eq!(policy.groups[0].members, vec!["alice", "bob"]);
        let rule = &policy.rules[0];
        assert_eq!(rule.principal, Some(Principal::Group("ops".into())));
        assert!(rule.path.is_root());
        assert_eq!(rule.action, Action::Deny);
    }

    #[test]
    fn test_parse_missing_mode_and_action() {
        let kdl = r#"rule "r1" path="/a" user="alice""#;
        let policy = parse_kdl_document(kdl).unwrap();
        assert_eq!(policy.rules[0].mode, Mode::Unspecified);
        assert_eq!(policy.rules[0].action, Action::Unspecified);
    }

    #[test]
    fn test_parse_missing_path() {
        let kdl = r#"rule "r1" user="alice" mode="read" action="permit""#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidPolicy(_)));
    }

    #[test]
    fn test_parse_both_principals() {
        let kdl = r#"rule "r1" path="/a" user="alice" group="ops" mode="read" action="permit""#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidPolicy(_)));
    }

    #[test]
    fn test_parse_unknown_mode() {
        let kdl = r#"rule "r1" path="/a" user="alice" mode="execute" action="permit""#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidPolicy(_)));
    }

    #[test]
    fn test_parse_invalid_path() {
        let kdl = r#"rule "r1" path="/a/b[k1" user="alice" mode="read" action="permit""#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidPath { .. }));
    }

    #[test]
    fn test_parse_syntax_error() {
        let err = parse_kdl_document("rule \"r1").unwrap_err();
        assert!(matches!(err, AuthzError::KdlParse(_)));
    }
}
