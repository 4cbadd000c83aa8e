//! What the execution view shows for one activity.

use serde::{Deserialize, Serialize};

use crate::catalog::ActivityCatalog;
use crate::model::LoopActivityInstance;
use crate::navigation::{get_navigation_target, NavigationTarget};
use crate::storage::DisplayConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDisplay {
    pub activity_id: String,
    pub title: String,
    pub icon: String,
    pub description: Option<String>,
    pub duration_minutes: Option<u32>,
    /// e.g. "20 pushups"
    pub quantity_label: Option<String>,
    pub sub_actions_done: usize,
    pub sub_actions_total: usize,
    pub navigation: Option<NavigationTarget>,
    /// Set when the instance carries a target that could not be resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_error: Option<String>,
}

/// Resolve display values for `instance` at position `index`.
///
/// The instance's own title wins over the template's. Without a template the
/// placeholder title is `"{prefix} {index + 1}"` with the placeholder icon.
pub fn resolve_display(
    instance: &LoopActivityInstance,
    index: usize,
    catalog: &dyn ActivityCatalog,
    config: &DisplayConfig,
) -> ActivityDisplay {
    let template = catalog.get_template_by_id(&instance.template_id);
    if template.is_none() {
        tracing::debug!(
            activity_id = %instance.id,
            template_id = %instance.template_id,
            "template not found; using placeholder"
        );
    }

    let title = instance
        .overridden_title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| template.as_ref().map(|t| t.title.clone()))
        .unwrap_or_else(|| format!("{} {}", config.placeholder_title_prefix, index + 1));
    let icon = template
        .as_ref()
        .map(|t| t.icon.clone())
        .unwrap_or_else(|| config.placeholder_icon.clone());

    let (navigation, navigation_error) = match get_navigation_target(instance, template.as_ref()) {
        Ok(target) => (target, None),
        Err(e) => (None, Some(e.to_string())),
    };

    ActivityDisplay {
        activity_id: instance.id.clone(),
        title,
        icon,
        description: template.as_ref().and_then(|t| t.description.clone()),
        duration_minutes: instance.timed_duration_minutes(),
        quantity_label: instance.quantity.as_ref().map(|q| q.label()),
        sub_actions_done: instance.sub_actions.iter().filter(|s| s.done).count(),
        sub_actions_total: instance.sub_actions.len(),
        navigation,
        navigation_error,
    }
}
