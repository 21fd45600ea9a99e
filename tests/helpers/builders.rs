use pathz::authz::types::{AuthorizationRule, GroupDefinition, Principal};
use pathz::{Action, Mode, PolicyDocument};

/// Builder for rules in tests. The rule id defaults to
/// `<path>_<mode>_<action>_<user|group>` so assertions can name it.
pub struct RuleBuilder {
    path: String,
    principal: Principal,
    mode: Mode,
    action: Action,
}

impl RuleBuilder {
    pub fn user(name: &str, path: &str) -> Self {
        Self {
            path: path.to_string(),
            principal: Principal::User(name.to_string()),
            mode: Mode::Read,
            action: Action::Permit,
        }
    }

    pub fn group(name: &str, path: &str) -> Self {
        Self {
            principal: Principal::Group(name.to_string()),
            ..Self::user("", path)
        }
    }

    pub fn write(mut self) -> Self {
        self.mode = Mode::Write;
        self
    }

    pub fn deny(mut self) -> Self {
        self.action = Action::Deny;
        self
    }

    pub fn build(self) -> AuthorizationRule {
        let kind = match self.principal {
            Principal::User(_) => "user",
            Principal::Group(_) => "group",
        };
        AuthorizationRule {
            id: rule_id(&self.path, self.mode, self.action, kind),
            path: self.path.parse().expect("invalid rule path"),
            principal: Some(self.principal),
            mode: self.mode,
            action: self.action,
        }
    }
}

pub fn rule_id(path: &str, mode: Mode, action: Action, kind: &str) -> String {
    format!("{path}_{mode}_{action}_{kind}")
}

/// Builder for whole policy documents
#[derive(Default)]
pub struct PolicyBuilder {
    document: PolicyDocument,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, rule: RuleBuilder) -> Self {
        self.document.rules.push(rule.build());
        self
    }

    pub fn group(mut self, name: &str, members: &[&str]) -> Self {
        self.document.groups.push(GroupDefinition {
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        });
        self
    }

    pub fn build(self) -> PolicyDocument {
        self.document
    }
}
