//! Local mirror project model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A project stored in the local mirror.
///
/// Ownership is keyed on the creator's display name, not a stable subject id.
/// Two identities sharing a display name see each other's projects.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    /// Local project ID.
    pub id: i64,

    pub name: String,

    pub description: Option<String>,

    /// Display name of the identity that created the project.
    pub created_by: String,

    /// Creation time (Unix seconds).
    pub created_at: i64,
}

/// Form payload for `POST /mirror/create_project`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Insert a project owned by `owner` and return the stored row.
pub async fn create_project(
    pool: &sqlx::SqlitePool,
    new_project: &NewProject,
    owner: &str,
) -> Result<Project, sqlx::Error> {
    let description = new_project
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    sqlx::query_as::<_, Project>(
        "INSERT INTO projects (name, description, created_by, created_at)
         VALUES (?, ?, ?, ?)
         RETURNING id, name, description, created_by, created_at",
    )
    .bind(new_project.name.trim())
    .bind(description)
    .bind(owner)
    .bind(chrono::Utc::now().timestamp())
    .fetch_one(pool)
    .await
}

/// List the projects created by `owner`, newest first.
pub async fn list_projects_for_owner(
    pool: &sqlx::SqlitePool,
    owner: &str,
) -> Result<Vec<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "SELECT id, name, description, created_by, created_at
         FROM projects WHERE created_by = ?
         ORDER BY created_at DESC, id DESC",
    )
    .bind(owner)
    .fetch_all(pool)
    .await
}

/// Look up a project by primary key, only if `owner` created it.
pub async fn get_project_for_owner(
    pool: &sqlx::SqlitePool,
    project_id: i64,
    owner: &str,
) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "SELECT id, name, description, created_by, created_at
         FROM projects WHERE id = ? AND created_by = ?",
    )
    .bind(project_id)
    .bind(owner)
    .fetch_optional(pool)
    .await
}
