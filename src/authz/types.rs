use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::authz::path::Path;

/// Access mode. Read and write grants are independent of each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Unspecified,
    Read,
    Write,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Mode::Read),
            "write" => Ok(Mode::Write),
            "unspecified" => Ok(Mode::Unspecified),
            other => Err(format!("unknown mode `{other}` (expected \"read\" or \"write\")")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Unspecified => "unspecified",
            Mode::Read => "read",
            Mode::Write => "write",
        };
        f.write_str(s)
    }
}

/// Rule effect. `Unspecified` doubles as "no rule matched" in a decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Unspecified,
    Permit,
    Deny,
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permit" => Ok(Action::Permit),
            "deny" => Ok(Action::Deny),
            "unspecified" => Ok(Action::Unspecified),
            other => Err(format!(
                "unknown action `{other}` (expected \"permit\" or \"deny\")"
            )),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Unspecified => "unspecified",
            Action::Permit => "permit",
            Action::Deny => "deny",
        };
        f.write_str(s)
    }
}

/// Subject a rule is written against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    User(String),
    Group(String),
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::User(name) => write!(f, "user/{name}"),
            Principal::Group(name) => write!(f, "group/{name}"),
        }
    }
}

/// A single path-based rule as it appears in a policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RuleRecord", into = "RuleRecord")]
pub struct AuthorizationRule {
    pub id: String,
    pub path: Path,
    /// `None` when the document named no principal; rejected at compile time.
    pub principal: Option<Principal>,
    pub mode: Mode,
    pub action: Action,
}

/// Wire shape of a rule: the principal is one of two optional fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleRecord {
    id: String,
    path: Path,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    #[serde(default)]
    mode: Mode,
    #[serde(default)]
    action: Action,
}

impl TryFrom<RuleRecord> for AuthorizationRule {
    type Error = String;

    fn try_from(r: RuleRecord) -> Result<Self, Self::Error> {
        let principal = match (r.user, r.group) {
            (Some(_), Some(_)) => {
                return Err(format!("rule `{}` names both a user and a group", r.id))
            }
            (Some(user), None) => Some(Principal::User(user)),
            (None, Some(group)) => Some(Principal::Group(group)),
            (None, None) => None,
        };
        Ok(Self {
            id: r.id,
            path: r.path,
            principal,
            mode: r.mode,
            action: r.action,
        })
    }
}

impl From<AuthorizationRule> for RuleRecord {
    fn from(rule: AuthorizationRule) -> Self {
        let (user, group) = match rule.principal {
            Some(Principal::User(u)) => (Some(u), None),
            Some(Principal::Group(g)) => (None, Some(g)),
            None => (None, None),
        };
        Self {
            id: rule.id,
            path: rule.path,
            user,
            group,
            mode: rule.mode,
            action: rule.action,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

/// Parsed policy: the raw document the store keeps next to its compiled index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub rules: Vec<AuthorizationRule>,
    #[serde(default)]
    pub groups: Vec<GroupDefinition>,
}

/// Outcome of one authorization query.
///
/// `Action::Unspecified` with empty `rule_id`/`matched_rule` means no rule
/// applied; callers must treat it as a denial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub action: Action,
    pub rule_id: String,
    pub matched_rule: String,
}

impl Decision {
    pub fn is_permitted(&self) -> bool {
        self.action == Action::Permit
    }

    /// A deeper result only overrides a shallower one when it is decisive.
    pub(crate) fn is_decisive(&self) -> bool {
        self.action != Action::Unspecified && !self.matched_rule.is_empty()
    }

    /// Fold a permission slot in. Deny is sticky: once recorded it is never
    /// replaced.
    pub(crate) fn apply(&mut self, slot: &RuleAction, rule: &str) {
        if self.action == Action::Deny || slot.action == Action::Unspecified {
            return;
        }
        self.action = slot.action;
        self.rule_id.clone_from(&slot.rule_id);
        self.matched_rule = rule.to_string();
    }
}

// ---------- Compiled index ----------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleAction {
    pub action: Action,
    pub rule_id: String,
}

/// Read and write slots for one principal at one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permission {
    pub read: RuleAction,
    pub write: RuleAction,
}

impl Permission {
    pub fn slot(&self, mode: Mode) -> Option<&RuleAction> {
        match mode {
            Mode::Read => Some(&self.read),
            Mode::Write => Some(&self.write),
            Mode::Unspecified => None,
        }
    }

    /// Record a rule's action. An unspecified action is a no-op and a
    /// recorded deny is never downgraded.
    pub fn update(&mut self, action: Action, mode: Mode, rule_id: &str) {
        if action == Action::Unspecified {
            return;
        }
        let slot = match mode {
            Mode::Read => &mut self.read,
            Mode::Write => &mut self.write,
            Mode::Unspecified => return,
        };
        if slot.action == Action::Deny {
            return;
        }
        slot.action = action;
        slot.rule_id = rule_id.to_string();
    }
}

/// One position in the policy trie.
///
/// A node is a possible rule terminus (`users`, `groups`, `rule`) and may
/// continue either by segment name (`children`) or, for keyed segments, by
/// the value of its single assigned key (`key`, `key_children`). Multi-key
/// segments chain one key per node in key-name order.
#[derive(Debug, Clone, Default)]
pub struct PolicyNode {
    pub users: HashMap<String, Permission>,
    /// Ordered so that group evaluation never depends on hash order.
    pub groups: BTreeMap<String, Permission>,
    /// Canonical path of the rules terminating here.
    pub rule: Option<String>,
    pub children: HashMap<String, PolicyNode>,
    pub key: Option<String>,
    /// Exact key values plus the wildcard token.
    pub key_children: HashMap<String, PolicyNode>,
}

impl PolicyNode {
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .values()
            .chain(self.key_children.values())
            .map(PolicyNode::node_count)
            .sum::<usize>()
    }
}

/// Group name -> member usernames, rebuilt on every policy load.
#[derive(Debug, Clone, Default)]
pub struct GroupRegistry {
    members: HashMap<String, HashSet<String>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicate group definitions merge their member lists.
    pub fn insert(&mut self, group: &GroupDefinition) {
        self.members
            .entry(group.name.clone())
            .or_default()
            .extend(group.members.iter().cloned());
    }

    pub fn is_member(&self, group: &str, user: &str) -> bool {
        self.members
            .get(group)
            .map(|m| m.contains(user))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
