use std::io::Cursor;
use std::sync::Arc;

use common::storage::{BlobStore, ContentHash};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::ImagesConfig;
use crate::crud::CrudError;
use crate::crud::attachments::purge_orphans;
use crate::entity::attachment;

/// Re-encodes freshly uploaded images in the background.
///
/// The save that uploaded the image has already committed with the
/// original bytes. The optimizer stores a smaller copy, repoints the
/// attachment and drops the original blob once nothing references it.
/// Failures are logged and never retried.
#[derive(Clone)]
pub struct ImageOptimizer {
    db: DatabaseConnection,
    store: Arc<dyn BlobStore>,
    config: ImagesConfig,
}

impl ImageOptimizer {
    pub fn new(db: DatabaseConnection, store: Arc<dyn BlobStore>, config: ImagesConfig) -> Self {
        Self { db, store, config }
    }

    pub fn schedule(&self, row: attachment::Model) {
        if !self.config.optimize || format_for(&row.mime_type).is_none() {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            match this.optimize(&row).await {
                Ok(true) => info!(attachment = row.id, "image optimized"),
                Ok(false) => debug!(attachment = row.id, "image left as uploaded"),
                Err(e) => warn!(attachment = row.id, error = %e, "image optimization failed"),
            }
        });
    }

    /// Returns `false` when the image was already small enough or the
    /// attachment changed underneath.
    pub async fn optimize(&self, row: &attachment::Model) -> Result<bool, CrudError> {
        let failed = |e: &dyn std::fmt::Display| CrudError::ImageProcessing(e.to_string());

        let old = ContentHash::from_hex(&row.storage_path).map_err(|e| failed(&e))?;
        let bytes = self.store.get(&old).await.map_err(|e| failed(&e))?;
        let mime = row.mime_type.clone();
        let max = self.config.max_dimension;
        let encoded = tokio::task::spawn_blocking(move || downscale(&bytes, &mime, max))
            .await
            .map_err(|e| failed(&e))??;
        let Some((encoded, width, height)) = encoded else {
            return Ok(false);
        };

        let blob = self.store.put(&encoded).await.map_err(|e| failed(&e))?;
        let new_path = blob.hash.to_hex();
        let result = attachment::Entity::update_many()
            .col_expr(attachment::Column::StoragePath, Expr::value(new_path.clone()))
            .col_expr(attachment::Column::ByteSize, Expr::value(blob.size as i64))
            .col_expr(
                attachment::Column::Metadata,
                Expr::value(json!({ "width": width, "height": height, "optimized": true })),
            )
            .filter(attachment::Column::Id.eq(row.id))
            .filter(attachment::Column::StoragePath.eq(row.storage_path.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            if blob.created {
                purge_orphans(&self.db, self.store.as_ref(), &[new_path]).await;
            }
            return Ok(false);
        }
        purge_orphans(&self.db, self.store.as_ref(), &[row.storage_path.clone()]).await;
        Ok(true)
    }
}

fn format_for(mime: &str) -> Option<ImageFormat> {
    match ImageFormat::from_mime_type(mime)? {
        f @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP | ImageFormat::Gif) => {
            Some(f)
        }
        _ => None,
    }
}

/// Shrink to fit `max` on both sides, keeping the format. `None` when the
/// image already fits.
pub fn downscale(
    bytes: &[u8],
    mime: &str,
    max: u32,
) -> Result<Option<(Vec<u8>, u32, u32)>, CrudError> {
    let format = format_for(mime)
        .ok_or_else(|| CrudError::ImageProcessing(format!("unsupported image type {mime}")))?;
    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| CrudError::ImageProcessing(e.to_string()))?;
    if img.width() <= max && img.height() <= max {
        return Ok(None);
    }
    let resized = img.resize(max, max, FilterType::Lanczos3);
    let resized = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
        _ => resized,
    };
    let mut out = Vec::new();
    resized
        .write_to(&mut Cursor::new(&mut out), format)
        .map_err(|e| CrudError::ImageProcessing(e.to_string()))?;
    Ok(Some((out, resized.width(), resized.height())))
}
