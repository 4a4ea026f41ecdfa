//! Data models for the local mirror.
//!
//! Models derive `Serialize` for template contexts and `FromRow` for SQLx
//! queries. Each module also carries the queries for its table.

pub mod project;
pub mod work_item;

pub use project::{NewProject, Project};
pub use work_item::{NewWorkItem, Priority, WorkItem, WorkItemForm, WorkItemStatus, WorkItemType};
