//! Activity templates and the per-loop instances that reference them.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::navigation::TargetDescriptor;

/// Where a template came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    /// Shipped with the application.
    Predefined,
    /// Created by the user.
    #[default]
    Custom,
}

/// Reusable definition an activity instance points at. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTemplate {
    pub id: String,
    pub title: String,
    pub icon: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: TemplateKind,
    #[serde(default)]
    pub default_navigation_target: Option<TargetDescriptor>,
}

impl ActivityTemplate {
    pub fn predefined(id: &str, title: &str, icon: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            icon: icon.to_string(),
            description: None,
            kind: TemplateKind::Predefined,
            default_navigation_target: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_navigation(mut self, target: impl Into<TargetDescriptor>) -> Self {
        self.default_navigation_target = Some(target.into());
        self
    }
}

/// Amount attached to an activity ("20 pushups", "2 pages").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    pub fn label(&self) -> String {
        if self.value.fract() == 0.0 {
            format!("{} {}", self.value as i64, self.unit)
        } else {
            format!("{} {}", self.value, self.unit)
        }
    }
}

/// Checklist item attached to an activity instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAction {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub done: bool,
}

impl SubAction {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            done: false,
        }
    }
}

/// Sub-actions as stored by older versions: either bare text or an object
/// that may lack an id.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSubAction {
    Text(String),
    Object {
        #[serde(default)]
        id: Option<String>,
        text: String,
        #[serde(default)]
        done: bool,
    },
}

/// Canonicalize a sub-action list. Legacy entries get a positional id so
/// the same stored list always yields the same ids. Ids are unique within
/// the list: a generated id never reuses an explicit one, and a repeated
/// explicit id is replaced on its later occurrences.
fn deserialize_sub_actions<'de, D>(deserializer: D) -> Result<Vec<SubAction>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<RawSubAction> = Option::deserialize(deserializer)?.unwrap_or_default();
    let explicit: HashSet<String> = raw
        .iter()
        .filter_map(|entry| match entry {
            RawSubAction::Object { id: Some(id), .. } if !id.trim().is_empty() => Some(id.clone()),
            _ => None,
        })
        .collect();

    let mut taken = HashSet::new();
    let fresh_id = |index: usize, taken: &mut HashSet<String>| {
        let base = format!("legacy-{index}");
        let mut candidate = base.clone();
        let mut n = 0;
        while explicit.contains(&candidate) || taken.contains(&candidate) {
            n += 1;
            candidate = format!("{base}-{n}");
        }
        taken.insert(candidate.clone());
        candidate
    };

    let mut sub_actions = Vec::with_capacity(raw.len());
    for (index, entry) in raw.into_iter().enumerate() {
        let (id, text, done) = match entry {
            RawSubAction::Text(text) => (None, text, false),
            RawSubAction::Object { id, text, done } => {
                (id.filter(|id| !id.trim().is_empty()), text, done)
            }
        };
        let id = match id {
            Some(id) if taken.insert(id.clone()) => id,
            _ => fresh_id(index, &mut taken),
        };
        sub_actions.push(SubAction { id, text, done });
    }
    Ok(sub_actions)
}

/// Loop-specific configuration of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopActivityInstance {
    pub id: String,
    pub template_id: String,
    /// Position within the loop; dense 0..n-1.
    pub order: usize,
    #[serde(default)]
    pub overridden_title: Option<String>,
    #[serde(default)]
    pub quantity: Option<Quantity>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_sub_actions")]
    pub sub_actions: Vec<SubAction>,
    #[serde(default)]
    pub navigate_target: Option<TargetDescriptor>,
    #[serde(default)]
    pub auto_complete_on_timer_end: bool,
}

impl LoopActivityInstance {
    pub fn new(id: impl Into<String>, template_id: impl Into<String>, order: usize) -> Self {
        Self {
            id: id.into(),
            template_id: template_id.into(),
            order,
            overridden_title: None,
            quantity: None,
            duration_minutes: None,
            sub_actions: Vec::new(),
            navigate_target: None,
            auto_complete_on_timer_end: false,
        }
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn with_sub_actions<I, S>(mut self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sub_actions = texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| SubAction::new(format!("{}-sub-{index}", self.id), text))
            .collect();
        self
    }

    pub fn with_auto_complete(mut self, enabled: bool) -> Self {
        self.auto_complete_on_timer_end = enabled;
        self
    }

    /// Configured duration, treating zero as "no timer".
    pub fn timed_duration_minutes(&self) -> Option<u32> {
        self.duration_minutes.filter(|m| *m > 0)
    }

    pub fn done_sub_action_ids(&self) -> Vec<String> {
        self.sub_actions
            .iter()
            .filter(|s| s.done)
            .map(|s| s.id.clone())
            .collect()
    }
}
