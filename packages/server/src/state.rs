use std::sync::Arc;

use common::storage::BlobStore;
use common::storage::filesystem::FilesystemBlobStore;
use dashmap::DashMap;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::configs;
use crate::crud::{CrudContext, Registry};
use crate::services::activity::ActivityLogger;
use crate::services::images::ImageOptimizer;
use crate::services::permissions::PermissionCache;
use crate::services::settings::SettingsService;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub registry: Arc<Registry>,
    pub blob_store: Arc<dyn BlobStore>,
    pub permissions: Arc<PermissionCache>,
    pub settings: Arc<SettingsService>,
    pub activity: ActivityLogger,
    pub images: ImageOptimizer,
    pub staging: Arc<DeleteStaging>,
}

impl AppState {
    /// Wire every service on top of an already-synced connection.
    pub async fn build(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<Self> {
        let registry = configs::registry(config.admin.locales())?;
        let blob_store: Arc<dyn BlobStore> = Arc::new(
            FilesystemBlobStore::open(
                &config.storage.path,
                config.storage.disk.clone(),
                config.storage.max_blob_size,
            )
            .await?,
        );
        let activity = ActivityLogger::new(db.clone());
        let images = ImageOptimizer::new(db.clone(), blob_store.clone(), config.images.clone());

        Ok(Self {
            permissions: Arc::new(PermissionCache::new(db.clone())),
            settings: Arc::new(SettingsService::new(db.clone(), activity.clone())),
            registry: Arc::new(registry),
            staging: Arc::new(DeleteStaging::default()),
            config: Arc::new(config),
            blob_store,
            activity,
            images,
            db,
        })
    }

    pub fn crud_context(&self) -> CrudContext {
        CrudContext {
            db: self.db.clone(),
            store: self.blob_store.clone(),
            activity: self.activity.clone(),
            permissions: self.permissions.clone(),
            images: self.images.clone(),
        }
    }
}

/// Deletions a user has requested but not yet confirmed, one per
/// `(user, alias)`.
#[derive(Default)]
pub struct DeleteStaging {
    pending: DashMap<(i32, String), i32>,
}

impl DeleteStaging {
    pub fn stage(&self, user_id: i32, alias: &str, id: i32) {
        self.pending.insert((user_id, alias.to_string()), id);
    }

    pub fn clear(&self, user_id: i32, alias: &str) -> Option<i32> {
        self.pending
            .remove(&(user_id, alias.to_string()))
            .map(|(_, id)| id)
    }
}
