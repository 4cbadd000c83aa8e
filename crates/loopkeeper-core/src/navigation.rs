//! Navigation targets.
//!
//! An activity can hand off to another entry type (a note to write, a path
//! to review, ...). The engine only describes the target; the caller performs
//! the navigation.
//!
//! Stored targets arrive either as a tagged object (`{"type": "note",
//! "mode": "create"}`) or as a legacy string (`"note"`, `"note:review"`).
//! Both are normalized into [`TargetDescriptor`] when deserialized. A target
//! whose type cannot be recognised is kept verbatim as
//! [`TargetDescriptor::Unrecognized`] so loading a loop never fails because
//! of it; the error surfaces from [`get_navigation_target`] instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NavigationError;
use crate::model::{ActivityTemplate, LoopActivityInstance};

/// Entry type an activity can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Note,
    Action,
    Spark,
    Path,
    Saga,
}

impl TargetType {
    /// Mode used when a legacy string names only the type.
    pub fn default_mode(&self) -> NavigationMode {
        match self {
            TargetType::Note | TargetType::Action | TargetType::Spark => NavigationMode::Create,
            TargetType::Path | TargetType::Saga => NavigationMode::View,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Note => "note",
            TargetType::Action => "action",
            TargetType::Spark => "spark",
            TargetType::Path => "path",
            TargetType::Saga => "saga",
        }
    }
}

impl FromStr for TargetType {
    type Err = NavigationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "note" | "notes" => Ok(TargetType::Note),
            "action" | "actions" => Ok(TargetType::Action),
            "spark" | "sparks" => Ok(TargetType::Spark),
            "path" | "paths" => Ok(TargetType::Path),
            "saga" | "sagas" => Ok(TargetType::Saga),
            _ => Err(NavigationError::UnknownTargetType(s.to_string())),
        }
    }
}

/// What the destination screen should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationMode {
    Create,
    Review,
    View,
    Select,
}

impl NavigationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationMode::Create => "create",
            NavigationMode::Review => "review",
            NavigationMode::View => "view",
            NavigationMode::Select => "select",
        }
    }
}

impl FromStr for NavigationMode {
    type Err = NavigationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "new" => Ok(NavigationMode::Create),
            "review" => Ok(NavigationMode::Review),
            "view" | "open" => Ok(NavigationMode::View),
            "select" | "pick" => Ok(NavigationMode::Select),
            _ => Err(NavigationError::UnknownMode(s.to_string())),
        }
    }
}

/// A resolved navigation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NavigationTarget {
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub mode: NavigationMode,
}

impl NavigationTarget {
    pub fn new(target_type: TargetType, mode: NavigationMode) -> Self {
        Self { target_type, mode }
    }

    /// Parse the legacy string form: `"note"`, `"note:review"` or `"note/review"`.
    pub fn parse(raw: &str) -> Result<Self, NavigationError> {
        let mut parts = raw.splitn(2, |c: char| c == ':' || c == '/');
        let target_type: TargetType = parts.next().unwrap_or_default().parse()?;
        let mode = match parts.next() {
            Some(mode) if !mode.trim().is_empty() => mode.parse()?,
            _ => target_type.default_mode(),
        };
        Ok(Self { target_type, mode })
    }
}

impl fmt::Display for NavigationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type.as_str(), self.mode.as_str())
    }
}

/// Canonical stored form of a navigation target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawTarget", into = "RawTarget")]
pub enum TargetDescriptor {
    Resolved(NavigationTarget),
    /// Kept verbatim so it round-trips; reported on resolution.
    Unrecognized(String),
}

impl TargetDescriptor {
    pub fn resolve(&self) -> Result<NavigationTarget, NavigationError> {
        match self {
            TargetDescriptor::Resolved(target) => Ok(*target),
            TargetDescriptor::Unrecognized(raw) => NavigationTarget::parse(raw),
        }
    }
}

impl From<NavigationTarget> for TargetDescriptor {
    fn from(target: NavigationTarget) -> Self {
        TargetDescriptor::Resolved(target)
    }
}

/// Wire shapes accepted for a navigation target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawTarget {
    Tagged {
        #[serde(rename = "type")]
        target_type: String,
        #[serde(default)]
        mode: Option<String>,
    },
    Text(String),
}

impl From<RawTarget> for TargetDescriptor {
    fn from(raw: RawTarget) -> Self {
        let text = match raw {
            RawTarget::Tagged { target_type, mode } => match mode {
                Some(mode) => format!("{target_type}:{mode}"),
                None => target_type,
            },
            RawTarget::Text(text) => text,
        };
        match NavigationTarget::parse(&text) {
            Ok(target) => TargetDescriptor::Resolved(target),
            Err(_) => TargetDescriptor::Unrecognized(text),
        }
    }
}

impl From<TargetDescriptor> for RawTarget {
    fn from(descriptor: TargetDescriptor) -> Self {
        match descriptor {
            TargetDescriptor::Resolved(target) => RawTarget::Tagged {
                target_type: target.target_type.as_str().to_string(),
                mode: Some(target.mode.as_str().to_string()),
            },
            TargetDescriptor::Unrecognized(raw) => RawTarget::Text(raw),
        }
    }
}

/// Where an activity wants to hand off to, if anywhere.
///
/// The instance override wins over the template default. An unrecognised
/// target is an error for the caller to report; the loop itself stays
/// advanceable.
pub fn get_navigation_target(
    activity: &LoopActivityInstance,
    template: Option<&ActivityTemplate>,
) -> Result<Option<NavigationTarget>, NavigationError> {
    let descriptor = activity
        .navigate_target
        .as_ref()
        .or_else(|| template.and_then(|t| t.default_navigation_target.as_ref()));

    match descriptor {
        Some(descriptor) => descriptor.resolve().map(Some).map_err(|e| {
            tracing::warn!(
                activity_id = %activity.id,
                error = %e,
                "cannot resolve navigation target"
            );
            e
        }),
        None => Ok(None),
    }
}
