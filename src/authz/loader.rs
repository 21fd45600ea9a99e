use std::path::Path as FsPath;

use crate::authz::errors::AuthzError;
use crate::authz::path::canonicalize;
use crate::authz::policy::parse_kdl_document;
use crate::authz::types::*;
use crate::authz::PolicySnapshot;

/// Read a policy document from disk. The encoding is chosen by extension:
/// `.kdl` or `.json`.
pub fn load_policy_file(path: &FsPath) -> Result<PolicyDocument, AuthzError> {
    let contents =
        std::fs::read_to_string(path).map_err(|source| AuthzError::PolicyLoadError {
            path: path.display().to_string(),
            source,
        })?;

    let document = match path.extension().and_then(|ext| ext.to_str()) {
        Some("kdl") => parse_kdl_document(&contents)?,
        Some("json") => serde_json::from_str(&contents)?,
        _ => return Err(AuthzError::UnsupportedFormat(path.display().to_string())),
    };

    tracing::debug!(
        file = %path.display(),
        rules = document.rules.len(),
        groups = document.groups.len(),
        "Read policy document"
    );

    Ok(document)
}

/// Compile a policy document into an immutable snapshot.
///
/// Any invalid rule rejects the whole document; nothing partially built
/// escapes this function.
pub fn compile_policy(document: PolicyDocument) -> Result<PolicySnapshot, AuthzError> {
    if document.rules.is_empty() {
        return Err(AuthzError::EmptyPolicy);
    }

    let mut root = PolicyNode::default();
    for rule in &document.rules {
        insert_rule(&mut root, rule)?;
    }

    let mut groups = GroupRegistry::new();
    for group in &document.groups {
        groups.insert(group);
    }

    let snapshot = PolicySnapshot {
        root,
        groups,
        document,
    };

    tracing::info!(
        rules = snapshot.document.rules.len(),
        groups = snapshot.groups.len(),
        nodes = snapshot.root.node_count(),
        "Compiled authorization policy"
    );

    Ok(snapshot)
}

/// Descend the trie along the rule's pattern, creating nodes on demand, and
/// register the rule's permission at the terminus.
fn insert_rule(root: &mut PolicyNode, rule: &AuthorizationRule) -> Result<(), AuthzError> {
    let principal = rule
        .principal
        .as_ref()
        .ok_or_else(|| AuthzError::MissingPrincipal(rule.id.clone()))?;
    if rule.mode == Mode::Unspecified {
        return Err(AuthzError::UnspecifiedRuleMode(rule.id.clone()));
    }

    let segments = rule.path.segments();
    let mut node = root;
    for (idx, segment) in segments.iter().enumerate() {
        node = node.children.entry(segment.name.clone()).or_default();

        for (key, value) in &segment.keys {
            if value.is_empty() {
                return Err(AuthzError::MissingKeyValue {
                    rule_id: rule.id.clone(),
                    key: key.clone(),
                });
            }
            if let Some(existing) = node.key.as_ref().filter(|k| *k != key) {
                return Err(AuthzError::KeyMismatch {
                    rule_id: rule.id.clone(),
                    position: canonicalize(&segments[..=idx]),
                    existing: existing.clone(),
                    conflicting: key.clone(),
                });
            }
            node.key = Some(key.clone());
            node = node.key_children.entry(value.clone()).or_default();
        }
    }

    node.rule = Some(rule.path.to_string());
    let permission = match principal {
        Principal::User(name) => node.users.entry(name.clone()).or_default(),
        Principal::Group(name) => node.groups.entry(name.clone()).or_default(),
    };
    permission.update(rule.action, rule.mode, &rule.id);
    Ok(())
}
