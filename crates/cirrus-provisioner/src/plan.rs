use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::addr::{ResourceKind, TaskAddr};
use crate::error::ProvisionerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Create,
    Replace,
}

/// One change a plan run would make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub kind: ResourceKind,
    pub name: String,
    pub action: PlanAction,
    pub operation: String,
    /// Fully resolved request body. References to planned resources carry
    /// their placeholder identifiers.
    pub fields: Value,
    /// Symbolic identifier, `${kind.name.id}`.
    pub identifier: String,
}

impl PlanRecord {
    pub fn addr(&self) -> TaskAddr {
        TaskAddr::new(self.kind, self.name.clone())
    }
}

/// Changes a run would make, in dependency order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub records: Vec<PlanRecord>,
}

impl Plan {
    /// Placeholder identifier for a resource that doesn't exist yet.
    pub fn placeholder(addr: &TaskAddr) -> String {
        format!("${{{}.{}.id}}", addr.kind, addr.name)
    }

    /// Sort records by their task's position in `order`, breaking ties by
    /// address, so the same graph always yields the same plan.
    pub fn from_records(mut records: Vec<PlanRecord>, order: &[TaskAddr]) -> Self {
        let position: HashMap<&TaskAddr, usize> =
            order.iter().enumerate().map(|(i, a)| (a, i)).collect();
        records.sort_by_cached_key(|r| {
            let addr = r.addr();
            (position.get(&addr).copied().unwrap_or(usize::MAX), addr)
        });
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn record(&self, addr: &TaskAddr) -> Option<&PlanRecord> {
        self.records
            .iter()
            .find(|r| r.kind == addr.kind && r.name == addr.name)
    }

    pub fn count(&self, action: PlanAction) -> usize {
        self.records.iter().filter(|r| r.action == action).count()
    }

    pub fn to_json(&self) -> Result<String, ProvisionerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ProvisionerError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("no changes");
        }
        write!(
            f,
            "{} to create, {} to replace",
            self.count(PlanAction::Create),
            self.count(PlanAction::Replace)
        )
    }
}
