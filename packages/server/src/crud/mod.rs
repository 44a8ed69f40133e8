//! Generic CRUD engine: entity configurations, the alias registry and the
//! list and edit controllers that drive any registered entity.

pub mod attachments;
pub mod config;
pub mod descriptor;
pub mod edit;
pub mod error;
pub mod form;
pub mod list;
pub mod notice;
pub mod registry;
pub mod relation;
pub mod render;
pub mod resource;
pub mod translatable;
pub mod validation;

use std::sync::Arc;

use common::storage::BlobStore;
use sea_orm::DatabaseConnection;

use crate::services::activity::ActivityLogger;
use crate::services::images::ImageOptimizer;
use crate::services::permissions::PermissionCache;

pub use config::{EntityConfig, RuleContext};
pub use edit::{EditController, EditState};
pub use error::{CrudError, ValidationErrors};
pub use list::ListController;
pub use notice::{Notice, Severity};
pub use registry::Registry;
pub use resource::CrudResource;

/// Whoever is driving a controller.
pub trait Actor: Send + Sync {
    fn actor_id(&self) -> Option<i32>;

    fn has_permission(&self, permission: &str) -> bool;

    /// Never says which permission was missing.
    fn authorize(&self, permission: &str) -> Result<(), CrudError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(CrudError::Authorization)
        }
    }
}

/// Collaborators shared by every controller action.
#[derive(Clone)]
pub struct CrudContext {
    pub db: DatabaseConnection,
    pub store: Arc<dyn BlobStore>,
    pub activity: ActivityLogger,
    pub permissions: Arc<PermissionCache>,
    pub images: ImageOptimizer,
}

impl CrudContext {
    /// Drop cached permission sets when `resource` decides who may do what.
    pub(crate) fn permissions_changed(&self, resource: &dyn CrudResource) {
        if resource.affects_permissions() {
            self.permissions.invalidate_all();
        }
    }
}
