//! Local mirror work item model.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Kind of work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkItemType {
    Epic,
    Feature,
    #[serde(rename = "User Story")]
    UserStory,
    Task,
    Bug,
    Issue,
}

impl WorkItemType {
    pub const ALL: [WorkItemType; 6] = [
        Self::Epic,
        Self::Feature,
        Self::UserStory,
        Self::Task,
        Self::Bug,
        Self::Issue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "Epic",
            Self::Feature => "Feature",
            Self::UserStory => "User Story",
            Self::Task => "Task",
            Self::Bug => "Bug",
            Self::Issue => "Issue",
        }
    }
}

impl FromStr for WorkItemType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        match normalized.as_str() {
            "epic" => Ok(Self::Epic),
            "feature" => Ok(Self::Feature),
            "user story" => Ok(Self::UserStory),
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            "issue" => Ok(Self::Issue),
            _ => Err(AppError::invalid_input_field(
                format!("Unknown work item type '{}'", s.trim()),
                "type",
            )),
        }
    }
}

impl std::fmt::Display for WorkItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work item priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl FromStr for Priority {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(AppError::invalid_input_field(
                format!("Unknown priority '{}'", s.trim()),
                "priority",
            )),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work item status. A stored NULL reads as [`WorkItemStatus::New`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkItemStatus {
    New,
    Active,
    Resolved,
    Closed,
}

impl WorkItemStatus {
    pub const ALL: [WorkItemStatus; 4] = [Self::New, Self::Active, Self::Resolved, Self::Closed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Active => "Active",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
        }
    }
}

impl FromStr for WorkItemStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(Self::New),
            "active" => Ok(Self::Active),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            _ => Err(AppError::invalid_input_field(
                format!("Unknown status '{}'", s.trim()),
                "status",
            )),
        }
    }
}

impl std::fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A work item stored in the local mirror.
///
/// Enumerated columns are stored as their display strings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkItem {
    pub id: i64,

    /// Owning project (FK to projects).
    pub project_id: i64,

    pub title: String,

    pub description: Option<String>,

    /// One of [`WorkItemType`].
    pub item_type: String,

    /// One of [`Priority`].
    pub priority: String,

    /// One of [`WorkItemStatus`], or NULL until first updated.
    pub status: Option<String>,

    pub created_by: String,

    /// Creation time (Unix seconds).
    pub created_at: i64,
}

impl WorkItem {
    /// Effective status; unset reads as `New`.
    pub fn status_enum(&self) -> WorkItemStatus {
        self.status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(WorkItemStatus::New)
    }
}

/// Raw form payload for `POST /mirror/add_item/{project_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkItemForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub priority: String,
}

/// Validated work item ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWorkItem {
    pub title: String,
    pub description: Option<String>,
    pub item_type: WorkItemType,
    pub priority: Priority,
}

impl TryFrom<WorkItemForm> for NewWorkItem {
    type Error = AppError;

    fn try_from(form: WorkItemForm) -> Result<Self, Self::Error> {
        let title = form.title.trim();
        if title.is_empty() {
            return Err(AppError::invalid_input_field("Title is required", "title"));
        }

        Ok(Self {
            title: title.to_string(),
            description: form
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            item_type: form.item_type.parse()?,
            priority: form.priority.parse()?,
        })
    }
}

/// Insert a work item under `project_id`. Status starts unset.
pub async fn create_work_item(
    pool: &sqlx::SqlitePool,
    project_id: i64,
    item: &NewWorkItem,
    owner: &str,
) -> Result<WorkItem, sqlx::Error> {
    sqlx::query_as::<_, WorkItem>(
        r#"
        INSERT INTO work_items (project_id, title, description, item_type, priority, created_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id, project_id, title, description, item_type, priority, status, created_by, created_at
        "#,
    )
    .bind(project_id)
    .bind(&item.title)
    .bind(&item.description)
    .bind(item.item_type.as_str())
    .bind(item.priority.as_str())
    .bind(owner)
    .bind(chrono::Utc::now().timestamp())
    .fetch_one(pool)
    .await
}

/// List work items of a project, newest first.
pub async fn list_work_items(
    pool: &sqlx::SqlitePool,
    project_id: i64,
) -> Result<Vec<WorkItem>, sqlx::Error> {
    sqlx::query_as::<_, WorkItem>(
        r#"
        SELECT id, project_id, title, description, item_type, priority, status, created_by, created_at
        FROM work_items WHERE project_id = ?
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
}

/// Look up a work item by primary key.
pub async fn get_work_item(
    pool: &sqlx::SqlitePool,
    item_id: i64,
) -> Result<Option<WorkItem>, sqlx::Error> {
    sqlx::query_as::<_, WorkItem>(
        r#"
        SELECT id, project_id, title, description, item_type, priority, status, created_by, created_at
        FROM work_items WHERE id = ?
        "#,
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await
}

/// Set the status of one work item. Returns `false` if no row matched.
pub async fn update_status(
    pool: &sqlx::SqlitePool,
    item_id: i64,
    project_id: i64,
    status: WorkItemStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE work_items SET status = ? WHERE id = ? AND project_id = ?")
        .bind(status.as_str())
        .bind(item_id)
        .bind(project_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
