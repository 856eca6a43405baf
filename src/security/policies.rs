//! The four named admission policies.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audit::AuditDispatcher;
use crate::config::{GuardConfig, PolicyConfig};
use crate::security::clock::Clock;
use crate::security::escalation::Escalation;
use crate::security::rate_limit::{AdmissionGate, GateStats};

/// Liveness endpoint, exempt from inspection and admission.
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyName {
    Chat,
    Api,
    Auth,
    Admin,
}

impl PolicyName {
    pub const ALL: [PolicyName; 4] = [
        PolicyName::Chat,
        PolicyName::Api,
        PolicyName::Auth,
        PolicyName::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyName::Chat => "chat",
            PolicyName::Api => "api",
            PolicyName::Auth => "auth",
            PolicyName::Admin => "admin",
        }
    }

    /// Which policy governs a request path. The health endpoint is never limited.
    pub fn for_path(path: &str) -> Option<PolicyName> {
        if path == HEALTH_PATH {
            None
        } else if path.starts_with("/api/v1/chat") {
            Some(PolicyName::Chat)
        } else if path.starts_with("/api/v1/auth") {
            Some(PolicyName::Auth)
        } else if path.starts_with("/admin") {
            Some(PolicyName::Admin)
        } else {
            Some(PolicyName::Api)
        }
    }
}

impl fmt::Display for PolicyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown policy '{s}'"))
    }
}

/// Target of an unblock operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnblockScope {
    Policy(PolicyName),
    All,
}

impl FromStr for UnblockScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(UnblockScope::All),
            other => other.parse().map(UnblockScope::Policy),
        }
    }
}

/// One independently-stated gate per policy, built once at startup.
pub struct AdmissionPolicies {
    chat: Arc<AdmissionGate>,
    api: Arc<AdmissionGate>,
    auth: Arc<AdmissionGate>,
    admin: Arc<AdmissionGate>,
}

impl AdmissionPolicies {
    pub fn from_config(
        config: &GuardConfig,
        clock: Arc<dyn Clock>,
        audit: AuditDispatcher,
    ) -> Self {
        let escalation = Escalation::new(config.escalation.suspicion_threshold);
        let policies = &config.policies;
        let gate = |name: PolicyName, policy: &PolicyConfig| {
            Arc::new(AdmissionGate::new(
                name.as_str(),
                policy,
                escalation,
                clock.clone(),
                audit.clone(),
            ))
        };

        Self {
            chat: gate(PolicyName::Chat, &policies.chat),
            api: gate(PolicyName::Api, &policies.api),
            auth: gate(PolicyName::Auth, &policies.auth),
            admin: gate(PolicyName::Admin, &policies.admin),
        }
    }

    pub fn get(&self, name: PolicyName) -> &Arc<AdmissionGate> {
        match name {
            PolicyName::Chat => &self.chat,
            PolicyName::Api => &self.api,
            PolicyName::Auth => &self.auth,
            PolicyName::Admin => &self.admin,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (PolicyName, &Arc<AdmissionGate>)> + '_ {
        PolicyName::ALL.into_iter().map(move |name| (name, self.get(name)))
    }

    /// Clear blocks for `identifier` in one policy or all of them.
    pub fn unblock(&self, identifier: &str, scope: UnblockScope) -> bool {
        match scope {
            UnblockScope::Policy(name) => self.get(name).unblock(identifier),
            UnblockScope::All => {
                let mut cleared = false;
                for (_, gate) in self.iter() {
                    cleared |= gate.unblock(identifier);
                }
                cleared
            }
        }
    }

    pub fn stats(&self) -> BTreeMap<PolicyName, GateStats> {
        self.iter().map(|(name, gate)| (name, gate.stats())).collect()
    }
}
