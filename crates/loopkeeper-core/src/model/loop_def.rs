//! Loop definitions: the root aggregate owning its activity instances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::activity::LoopActivityInstance;
use crate::error::ValidationError;

/// A user-defined, repeatable, ordered sequence of activities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loop {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub activity_instances: Vec<LoopActivityInstance>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_starred: bool,
}

fn default_true() -> bool {
    true
}

impl Loop {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            activity_instances: Vec::new(),
            active: true,
            start_date: None,
            tags: Vec::new(),
            is_starred: false,
        }
    }

    /// Append an instance at the end of the loop, assigning its `order`.
    pub fn push_activity(&mut self, mut instance: LoopActivityInstance) {
        instance.order = self.activity_instances.len();
        self.activity_instances.push(instance);
    }

    pub fn with_activity(mut self, instance: LoopActivityInstance) -> Self {
        self.push_activity(instance);
        self
    }

    pub fn len(&self) -> usize {
        self.activity_instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activity_instances.is_empty()
    }

    /// Instances sorted by `order`.
    pub fn ordered_instances(&self) -> Vec<&LoopActivityInstance> {
        let mut ordered: Vec<&LoopActivityInstance> = self.activity_instances.iter().collect();
        ordered.sort_by_key(|i| i.order);
        ordered
    }

    /// Rewrite `order` into a dense 0-based permutation, keeping relative order.
    pub fn normalize_order(&mut self) {
        self.activity_instances.sort_by_key(|i| i.order);
        for (position, instance) in self.activity_instances.iter_mut().enumerate() {
            instance.order = position;
        }
    }

    /// Check the structural invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::EmptyLoopId);
        }

        let mut seen = HashSet::new();
        for (position, instance) in self.activity_instances.iter().enumerate() {
            if instance.id.trim().is_empty() {
                return Err(ValidationError::EmptyInstanceId { position });
            }
            if !seen.insert(instance.id.as_str()) {
                return Err(ValidationError::DuplicateInstanceId(instance.id.clone()));
            }
        }

        for (expected, instance) in self.ordered_instances().into_iter().enumerate() {
            if instance.order != expected {
                return Err(ValidationError::NonDenseOrder {
                    expected,
                    found: instance.order,
                });
            }
        }
        Ok(())
    }
}
