use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use common::InvalidatingCache;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QuerySelect, Set,
};
use tracing::{debug, info};

use crate::crud::Registry;
use crate::crud::descriptor::Ability;
use crate::entity::{permission, role, role_permission, user, user_role};

/// Permissions that do not belong to a CRUD resource.
pub const SERVICE_PERMISSIONS: &[(&str, &str)] = &[
    ("settings.view", "View settings"),
    ("settings.update", "Change settings"),
    ("activity.view", "Browse the activity log"),
];

/// A user together with everything their roles allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub active: bool,
    pub roles: BTreeSet<String>,
    pub permissions: HashSet<String>,
}

impl Principal {
    pub fn has_permission(&self, slug: &str) -> bool {
        self.active && self.permissions.contains(slug)
    }
}

/// Process-wide `user id -> Principal` cache.
///
/// Any write that can change a permission set must call
/// [`invalidate_all`](Self::invalidate_all) before returning.
pub struct PermissionCache {
    db: DatabaseConnection,
    cache: InvalidatingCache<i32, Principal>,
}

impl PermissionCache {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            cache: InvalidatingCache::new(),
        }
    }

    /// `DbErr::RecordNotFound` when the user does not exist.
    pub async fn principal(&self, user_id: i32) -> Result<Arc<Principal>, DbErr> {
        let db = self.db.clone();
        self.cache
            .get_or_try_load(user_id, || async move { load_principal(&db, user_id).await })
            .await
    }

    pub fn invalidate(&self, user_id: i32) {
        self.cache.invalidate(&user_id);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

async fn load_principal<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<Principal, DbErr> {
    let user = user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("user {user_id}")))?;

    let role_ids: Vec<i32> = user_role::Entity::find()
        .select_only()
        .column(user_role::Column::RoleId)
        .filter(user_role::Column::UserId.eq(user_id))
        .into_tuple()
        .all(db)
        .await?;
    let roles: BTreeSet<String> = role::Entity::find()
        .filter(role::Column::Id.is_in(role_ids.clone()))
        .all(db)
        .await?
        .into_iter()
        .map(|r| r.name)
        .collect();

    let permission_ids: Vec<i32> = role_permission::Entity::find()
        .select_only()
        .column(role_permission::Column::PermissionId)
        .filter(role_permission::Column::RoleId.is_in(role_ids))
        .into_tuple()
        .all(db)
        .await?;
    let permissions = permission::Entity::find()
        .filter(permission::Column::Id.is_in(permission_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.slug)
        .collect();

    debug!(user_id, "loaded permissions");
    Ok(Principal {
        id: user.id,
        name: user.name,
        email: user.email,
        active: user.is_active,
        roles,
        permissions,
    })
}

/// Every permission slug the registry and services check.
pub fn known_permissions(registry: &Registry) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for resource in registry.iter() {
        let d = resource.descriptor();
        for ability in Ability::ALL {
            out.push((
                d.permission(ability),
                format!("{} {}", ability.as_str(), d.plural_name.to_lowercase()),
            ));
        }
    }
    out.extend(
        SERVICE_PERMISSIONS
            .iter()
            .map(|(slug, description)| (slug.to_string(), description.to_string())),
    );
    out
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub permissions_created: usize,
    pub admin_grants: usize,
}

/// Insert missing permissions and grant all of them to the admin role,
/// creating the role if needed. Existing rows are left alone.
pub async fn sync_permissions(
    db: &DatabaseConnection,
    registry: &Registry,
) -> Result<SyncReport, DbErr> {
    let mut report = SyncReport::default();
    let now = Utc::now();

    for (slug, description) in known_permissions(registry) {
        let exists = permission::Entity::find()
            .filter(permission::Column::Slug.eq(slug.as_str()))
            .one(db)
            .await?
            .is_some();
        if exists {
            continue;
        }
        permission::ActiveModel {
            slug: Set(slug.clone()),
            description: Set(Some(description)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;
        debug!(%slug, "permission created");
        report.permissions_created += 1;
    }

    let admin = match role::Entity::find()
        .filter(role::Column::Name.eq(role::ADMIN_ROLE))
        .one(db)
        .await?
    {
        Some(admin) => admin,
        None => {
            role::ActiveModel {
                name: Set(role::ADMIN_ROLE.to_string()),
                description: Set(Some("Full access".into())),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(db)
            .await?
        }
    };

    let granted: HashSet<i32> = role_permission::Entity::find()
        .select_only()
        .column(role_permission::Column::PermissionId)
        .filter(role_permission::Column::RoleId.eq(admin.id))
        .into_tuple::<i32>()
        .all(db)
        .await?
        .into_iter()
        .collect();
    let missing: Vec<role_permission::ActiveModel> = permission::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .filter(|p| !granted.contains(&p.id))
        .map(|p| role_permission::ActiveModel {
            role_id: Set(admin.id),
            permission_id: Set(p.id),
        })
        .collect();
    report.admin_grants = missing.len();
    if !missing.is_empty() {
        role_permission::Entity::insert_many(missing)
            .on_conflict(
                OnConflict::columns([
                    role_permission::Column::RoleId,
                    role_permission::Column::PermissionId,
                ])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
    }

    if report != SyncReport::default() {
        info!(
            created = report.permissions_created,
            granted = report.admin_grants,
            "permissions synchronised"
        );
    }
    Ok(report)
}
