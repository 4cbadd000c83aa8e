//! Activity template catalog.
//!
//! The engine only reads templates. Catalog management lives elsewhere.

use std::collections::HashMap;

use crate::model::ActivityTemplate;
use crate::navigation::{NavigationMode, NavigationTarget, TargetType};

/// Read-only template lookup.
pub trait ActivityCatalog {
    fn get_template_by_id(&self, id: &str) -> Option<ActivityTemplate>;

    /// Templates for `ids` in the requested order; unknown ids are skipped.
    fn get_templates_by_ids(&self, ids: &[&str]) -> Vec<ActivityTemplate> {
        ids.iter()
            .filter_map(|id| self.get_template_by_id(id))
            .collect()
    }
}

/// Catalog backed by a map, used by tests and by hosts that preload templates.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    templates: HashMap<String, ActivityTemplate>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog seeded with the templates shipped with the application.
    pub fn with_predefined() -> Self {
        let mut catalog = Self::new();
        for template in predefined_templates() {
            catalog.insert(template);
        }
        catalog
    }

    pub fn insert(&mut self, template: ActivityTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl ActivityCatalog for InMemoryCatalog {
    fn get_template_by_id(&self, id: &str) -> Option<ActivityTemplate> {
        self.templates.get(id).cloned()
    }
}

/// Templates shipped with the application.
pub fn predefined_templates() -> Vec<ActivityTemplate> {
    vec![
        ActivityTemplate::predefined("wake-up", "Wake Up", "🌅")
            .with_description("Get out of bed without snoozing"),
        ActivityTemplate::predefined("hydrate", "Drink Water", "💧"),
        ActivityTemplate::predefined("stretch", "Stretch", "🧘")
            .with_description("Loosen up neck, back and legs"),
        ActivityTemplate::predefined("exercise", "Exercise", "🏃"),
        ActivityTemplate::predefined("meditate", "Meditate", "🧠"),
        ActivityTemplate::predefined("journal", "Journal", "📓")
            .with_navigation(NavigationTarget::new(TargetType::Note, NavigationMode::Create)),
        ActivityTemplate::predefined("review-actions", "Review Actions", "✅")
            .with_navigation(NavigationTarget::new(TargetType::Action, NavigationMode::Review)),
        ActivityTemplate::predefined("capture-spark", "Capture a Spark", "✨")
            .with_navigation(NavigationTarget::new(TargetType::Spark, NavigationMode::Create)),
        ActivityTemplate::predefined("study-path", "Study Path", "🧭")
            .with_navigation(NavigationTarget::new(TargetType::Path, NavigationMode::Select)),
        ActivityTemplate::predefined("read", "Read", "📖"),
        ActivityTemplate::predefined("plan-day", "Plan the Day", "🗓"),
    ]
}
