//! Business logic services.
//!
//! The remote API client and the YAML flow built on it, the identity and
//! session layers, rendering, and the HTTP server that ties them together.

pub mod dashboard;
pub mod devops_client;
pub mod identity;
pub mod renderer;
pub mod session;
pub mod web_server;
pub mod yaml_sync;

pub use devops_client::{DevOpsApi, DevOpsClient, DevOpsClientConfig};
pub use identity::IdentityClient;
pub use renderer::Renderer;
pub use session::{RequestContext, SessionStore, UserIdentity};
pub use web_server::{build_router, AppState};
pub use yaml_sync::YamlSynchronizer;
