use crate::authz::errors::AuthzError;
use crate::authz::path::{Path, WILDCARD};
use crate::authz::types::{Action, Decision, GroupRegistry, Mode, PolicyNode, RuleAction};
use crate::authz::PolicySnapshot;

/// Decide whether `user` may access `path` in `mode`.
///
/// Returns `Action::Unspecified` when no rule applies. Leaf paths give the
/// most precise answer: rules below a subtree path are not consulted.
pub fn authorize(
    snapshot: &PolicySnapshot,
    user: &str,
    path: &Path,
    mode: Mode,
) -> Result<Decision, AuthzError> {
    if mode == Mode::Unspecified {
        return Err(AuthzError::UnspecifiedMode);
    }

    let query = Query {
        user,
        path,
        mode,
        groups: &snapshot.groups,
    };
    let decision = snapshot.root.walk(&query, 0, None);
    log_decision(&decision, user, path, mode);
    Ok(decision)
}

/// Same as [`authorize`] for a request that splits its path into a
/// prefix and a relative path.
pub fn authorize_with_prefix(
    snapshot: &PolicySnapshot,
    user: &str,
    prefix: &Path,
    path: &Path,
    mode: Mode,
) -> Result<Decision, AuthzError> {
    authorize(snapshot, user, &prefix.join(path), mode)
}

/// Denied and unmatched requests are always logged for audit.
pub(crate) fn log_decision(decision: &Decision, user: &str, path: &Path, mode: Mode) {
    match decision.action {
        Action::Unspecified => tracing::debug!(
            user,
            %mode,
            %path,
            "Request matched no authorization rule, denied"
        ),
        Action::Deny => tracing::debug!(
            user,
            %mode,
            %path,
            rule = %decision.matched_rule,
            rule_id = %decision.rule_id,
            "Request denied by authorization rule"
        ),
        Action::Permit => {}
    }
}

struct Query<'a> {
    user: &'a str,
    path: &'a Path,
    mode: Mode,
    groups: &'a GroupRegistry,
}

impl PolicyNode {
    /// Longest-match walk. `segment` indexes the query path; `key_idx` is set
    /// while consuming the keys of that segment one at a time.
    fn walk(&self, query: &Query<'_>, segment: usize, key_idx: Option<usize>) -> Decision {
        let local = self.local_decision(query);

        let Some(current) = query.path.segments().get(segment) else {
            return local;
        };

        match key_idx {
            Some(idx) => {
                let Some((key, value)) = current.keys.iter().nth(idx) else {
                    return local;
                };
                if self.key.as_deref() != Some(key.as_str()) {
                    tracing::trace!(
                        expected = ?self.key,
                        got = %key,
                        "Key name not indexed at this position"
                    );
                    return local;
                }

                let (next_segment, next_key) = if idx + 1 == current.keys.len() {
                    (segment + 1, None)
                } else {
                    (segment, Some(idx + 1))
                };

                // Exact value first; the wildcard only when the exact branch
                // is missing or inconclusive.
                let exact = self.key_children.get(value.as_str());
                let wildcard = if value == WILDCARD {
                    None
                } else {
                    self.key_children.get(WILDCARD)
                };
                for child in exact.into_iter().chain(wildcard) {
                    let decision = child.walk(query, next_segment, next_key);
                    if decision.is_decisive() {
                        return decision;
                    }
                }
                local
            }
            None => {
                if let Some(child) = self.children.get(&current.name) {
                    let decision = if current.keys.is_empty() {
                        child.walk(query, segment + 1, None)
                    } else {
                        child.walk(query, segment, Some(0))
                    };
                    if decision.is_decisive() {
                        return decision;
                    }
                }
                local
            }
        }
    }

    /// User rules at this node; group rules only if no user rule matched.
    fn local_decision(&self, query: &Query<'_>) -> Decision {
        let mut decision = Decision::default();
        let rule = self.rule.as_deref().unwrap_or_default();

        if let Some(slot) = self
            .users
            .get(query.user)
            .and_then(|p| p.slot(query.mode))
        {
            decision.apply(slot, rule);
        }
        if decision.is_decisive() {
            return decision;
        }

        // Among matching groups, deny wins, then the smallest rule id.
        let chosen = self
            .groups
            .iter()
            .filter(|(group, _)| query.groups.is_member(group, query.user))
            .filter_map(|(_, permission)| permission.slot(query.mode))
            .filter(|slot| slot.action != Action::Unspecified)
            .min_by(|a, b| group_precedence(a).cmp(&group_precedence(b)));
        if let Some(slot) = chosen {
            decision.apply(slot, rule);
        }
        decision
    }
}

fn group_precedence(slot: &RuleAction) -> (bool, &str) {
    (slot.action != Action::Deny, slot.rule_id.as_str())
}
