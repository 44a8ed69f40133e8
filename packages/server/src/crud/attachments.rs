use std::collections::HashMap;
use std::io::Cursor;

use chrono::Utc;
use common::storage::{BlobStore, ContentHash, StorageError};
use sea_orm::sea_query::Query;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::descriptor::Field;
use super::error::CrudError;
use super::form::UploadedFile;
use crate::entity::{attachable, attachment};
use crate::utils::filename::clean_upload_name;

/// Public view of an attachment.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct AttachmentSummary {
    pub id: i32,
    pub filename: String,
    pub mime_type: String,
    pub byte_size: i64,
    pub collection: String,
    #[schema(value_type = Object)]
    pub metadata: Value,
    pub url: String,
}

impl From<attachment::Model> for AttachmentSummary {
    fn from(model: attachment::Model) -> Self {
        Self {
            url: download_url(model.id),
            id: model.id,
            filename: model.filename,
            mime_type: model.mime_type,
            byte_size: model.byte_size,
            collection: model.collection_name,
            metadata: model.metadata,
        }
    }
}

pub fn download_url(id: i32) -> String {
    format!("/api/v1/attachments/{id}")
}

/// A blob written ahead of the transaction that will link it.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub field: String,
    pub collection: String,
    pub single: bool,
    pub filename: String,
    pub mime: String,
    pub size: u64,
    pub hash: ContentHash,
    /// The blob did not exist before this upload.
    pub fresh: bool,
    pub metadata: Value,
}

/// Write uploaded bytes to the blob store. Single-valued fields keep only
/// their last file.
pub async fn store_uploads(
    store: &dyn BlobStore,
    files: &[(Field, Vec<UploadedFile>)],
) -> Result<Vec<StoredUpload>, CrudError> {
    let mut stored = Vec::new();
    for (field, uploads) in files {
        let chosen: &[UploadedFile] = if field.multiple {
            uploads
        } else {
            match uploads.last() {
                Some(last) => std::slice::from_ref(last),
                None => &[],
            }
        };
        for upload in chosen {
            let filename = clean_upload_name(&upload.filename)
                .map_err(|e| CrudError::validation(&field.name, e.to_string()))?;
            let mime = upload.mime();
            let blob = store.put(&upload.bytes).await.map_err(|e| match e {
                StorageError::SizeLimitExceeded { limit, .. } => CrudError::validation(
                    &field.name,
                    format!(
                        "The {} may not be greater than {} kilobytes.",
                        field.name,
                        limit / 1024
                    ),
                ),
                other => CrudError::UploadFailed(other.to_string()),
            })?;
            debug!(hash = %blob.hash, size = blob.size, created = blob.created, "stored upload");
            stored.push(StoredUpload {
                field: field.name.clone(),
                collection: field.collection_name().to_string(),
                single: !field.multiple,
                metadata: image_metadata(&mime, &upload.bytes),
                filename,
                mime,
                size: blob.size,
                hash: blob.hash,
                fresh: blob.created,
            });
        }
    }
    Ok(stored)
}

/// Width and height for decodable images; `{}` for everything else.
pub fn image_metadata(mime: &str, bytes: &[u8]) -> Value {
    if !mime.starts_with("image/") {
        return json!({});
    }
    let dimensions = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_dimensions().ok());
    match dimensions {
        Some((width, height)) => json!({ "width": width, "height": height }),
        None => json!({}),
    }
}

/// Create the attachment row and link it to its owner.
pub async fn attach(
    txn: &DatabaseTransaction,
    owner_type: &str,
    owner_id: i32,
    upload: &StoredUpload,
    disk: &str,
) -> Result<attachment::Model, DbErr> {
    let row = attachment::ActiveModel {
        filename: Set(upload.filename.clone()),
        storage_path: Set(upload.hash.to_hex()),
        disk: Set(disk.to_string()),
        mime_type: Set(upload.mime.clone()),
        byte_size: Set(upload.size as i64),
        collection_name: Set(upload.collection.clone()),
        metadata: Set(upload.metadata.clone()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    attachable::ActiveModel {
        attachment_id: Set(row.id),
        owner_type: Set(owner_type.to_string()),
        owner_id: Set(owner_id),
    }
    .insert(txn)
    .await?;
    Ok(row)
}

fn owned_by(owner_type: &str, owner_id: i32) -> sea_orm::sea_query::SelectStatement {
    Query::select()
        .column(attachable::Column::AttachmentId)
        .from(attachable::Entity)
        .and_where(attachable::Column::OwnerType.eq(owner_type))
        .and_where(attachable::Column::OwnerId.eq(owner_id))
        .to_owned()
}

/// Attachments linked to an owner, oldest first.
pub async fn for_owner<C: ConnectionTrait>(
    conn: &C,
    owner_type: &str,
    owner_id: i32,
) -> Result<Vec<attachment::Model>, DbErr> {
    attachment::Entity::find()
        .filter(attachment::Column::Id.in_subquery(owned_by(owner_type, owner_id)))
        .order_by_asc(attachment::Column::Id)
        .all(conn)
        .await
}

/// First attachment of `collection` for each owner, for image columns.
pub async fn first_in_collection(
    db: &DatabaseConnection,
    owner_type: &str,
    owner_ids: &[i32],
    collection: &str,
) -> Result<HashMap<i32, AttachmentSummary>, DbErr> {
    if owner_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let links = attachable::Entity::find()
        .filter(attachable::Column::OwnerType.eq(owner_type))
        .filter(attachable::Column::OwnerId.is_in(owner_ids.iter().copied()))
        .all(db)
        .await?;
    let rows: HashMap<i32, attachment::Model> = attachment::Entity::find()
        .filter(attachment::Column::Id.is_in(links.iter().map(|l| l.attachment_id)))
        .filter(attachment::Column::CollectionName.eq(collection))
        .all(db)
        .await?
        .into_iter()
        .map(|row| (row.id, row))
        .collect();

    let mut firsts: HashMap<i32, attachment::Model> = HashMap::new();
    for link in links {
        let Some(row) = rows.get(&link.attachment_id) else {
            continue;
        };
        match firsts.get(&link.owner_id) {
            Some(current) if current.id <= row.id => {}
            _ => {
                firsts.insert(link.owner_id, row.clone());
            }
        }
    }
    Ok(firsts
        .into_iter()
        .map(|(owner, row)| (owner, row.into()))
        .collect())
}

/// Remove one owner link. The attachment row goes with its last link;
/// returns its storage path so the blob can be purged after commit.
pub async fn unlink(
    txn: &DatabaseTransaction,
    attachment_id: i32,
    owner_type: &str,
    owner_id: i32,
) -> Result<Option<String>, DbErr> {
    attachable::Entity::delete_many()
        .filter(attachable::Column::AttachmentId.eq(attachment_id))
        .filter(attachable::Column::OwnerType.eq(owner_type))
        .filter(attachable::Column::OwnerId.eq(owner_id))
        .exec(txn)
        .await?;

    let remaining = attachable::Entity::find()
        .filter(attachable::Column::AttachmentId.eq(attachment_id))
        .count(txn)
        .await?;
    if remaining > 0 {
        return Ok(None);
    }
    let Some(row) = attachment::Entity::find_by_id(attachment_id).one(txn).await? else {
        return Ok(None);
    };
    attachment::Entity::delete_by_id(attachment_id).exec(txn).await?;
    Ok(Some(row.storage_path))
}

/// Unlink every attachment of `collection` from the owner.
pub async fn clear_collection(
    txn: &DatabaseTransaction,
    owner_type: &str,
    owner_id: i32,
    collection: &str,
) -> Result<Vec<String>, DbErr> {
    let current = for_owner(txn, owner_type, owner_id).await?;
    let mut orphans = Vec::new();
    for row in current.into_iter().filter(|r| r.collection_name == collection) {
        orphans.extend(unlink(txn, row.id, owner_type, owner_id).await?);
    }
    Ok(orphans)
}

/// Unlink everything the owner holds, ahead of deleting it.
pub async fn detach_all(
    txn: &DatabaseTransaction,
    owner_type: &str,
    owner_id: i32,
) -> Result<Vec<String>, DbErr> {
    let current = for_owner(txn, owner_type, owner_id).await?;
    let mut orphans = Vec::new();
    for row in current {
        orphans.extend(unlink(txn, row.id, owner_type, owner_id).await?);
    }
    Ok(orphans)
}

/// Delete blobs no attachment row points at any more. Failures are logged.
pub async fn purge_orphans(db: &DatabaseConnection, store: &dyn BlobStore, paths: &[String]) {
    for path in paths {
        let referenced = attachment::Entity::find()
            .filter(attachment::Column::StoragePath.eq(path.as_str()))
            .count(db)
            .await;
        match referenced {
            Ok(0) => {}
            Ok(_) => continue,
            Err(e) => {
                warn!(path = %path, error = %e, "could not check blob references");
                continue;
            }
        }
        let deleted = match ContentHash::from_hex(path) {
            Ok(hash) => store.delete(&hash).await,
            Err(e) => Err(e),
        };
        match deleted {
            Ok(true) => debug!(path = %path, "purged orphaned blob"),
            Ok(false) => {}
            Err(e) => warn!(path = %path, error = %e, "failed to purge orphaned blob"),
        }
    }
}

/// Remove blobs this request created when the transaction linking them
/// rolled back.
pub async fn discard_unreferenced(
    db: &DatabaseConnection,
    store: &dyn BlobStore,
    uploads: &[StoredUpload],
) {
    let fresh: Vec<String> = uploads
        .iter()
        .filter(|u| u.fresh)
        .map(|u| u.hash.to_hex())
        .collect();
    purge_orphans(db, store, &fresh).await;
}
