use serde::{Deserialize, Serialize};

/// One repository mutation decoded from a changelog action.
///
/// `AddPackage` and `RemovePackage` carry a package coordinate relative to the
/// packages directory (`<pyversion>/<letter>/<project>/<filename>`); removals
/// may contain `*` wildcards because the changelog does not record the
/// interpreter version or the exact file name of a removed release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum ChangeEvent {
    AddPackage(String),
    AddProject(String),
    RemovePackage(String),
    RemoveProject(String),
}

impl ChangeEvent {
    pub fn name(&self) -> &str {
        match self {
            ChangeEvent::AddPackage(name)
            | ChangeEvent::AddProject(name)
            | ChangeEvent::RemovePackage(name)
            | ChangeEvent::RemoveProject(name) => name,
        }
    }

    /// Whether backward replay undoes this event
    pub fn is_addition(&self) -> bool {
        matches!(self, ChangeEvent::AddPackage(_) | ChangeEvent::AddProject(_))
    }
}

impl std::fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeEvent::AddPackage(name) => write!(f, "AddPackage({})", name),
            ChangeEvent::AddProject(name) => write!(f, "AddProject({})", name),
            ChangeEvent::RemovePackage(name) => write!(f, "RemovePackage({})", name),
            ChangeEvent::RemoveProject(name) => write!(f, "RemoveProject({})", name),
        }
    }
}

/// A decoded event together with the time it was journaled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedChange {
    pub event: ChangeEvent,
    pub timestamp: i64,
}

impl TimedChange {
    pub fn new(event: ChangeEvent, timestamp: i64) -> Self {
        Self { event, timestamp }
    }
}

/// Raw changelog line: `name;version;timestamp;action;serial`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub name: String,
    /// Release version, or `None` when the changelog says literally `None`
    pub version: Option<String>,
    pub timestamp: i64,
    pub action: String,
    pub serial: i64,
}

/// Classification of a changelog action string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AddFile { pyversion: String, filename: String },
    AddRole { role: String, user: String },
    Create,
    Remove,
    RemoveFile { filename: String },
    DeleteRole { role: String, user: String },
    Other,
}
