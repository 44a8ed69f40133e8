use anyhow::Context;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use tracing::info;

use crate::entity::{role, user, user_role};
use crate::utils::hash;

/// Find or create the admin role.
pub async fn ensure_admin_role<C: ConnectionTrait>(db: &C) -> Result<role::Model, DbErr> {
    if let Some(existing) = role::Entity::find()
        .filter(role::Column::Name.eq(role::ADMIN_ROLE))
        .one(db)
        .await?
    {
        return Ok(existing);
    }

    let now = Utc::now();
    let created = role::ActiveModel {
        name: Set(role::ADMIN_ROLE.to_string()),
        description: Set(Some("Full access".into())),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!("Seeded admin role");
    Ok(created)
}

/// Create (or reset) an active administrator account.
///
/// An existing account with the same email gets the new password and is
/// re-activated; either way it ends up holding the admin role.
pub async fn create_admin(
    db: &DatabaseConnection,
    name: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<user::Model> {
    let email = email.trim().to_lowercase();
    anyhow::ensure!(email.contains('@'), "`{email}` is not an email address");
    anyhow::ensure!(password.len() >= 8, "password must be at least 8 characters");

    let hashed = hash::hash_password(password)
        .map_err(|e| anyhow::anyhow!("password hash error: {e}"))?;
    let now = Utc::now();

    let txn = db.begin().await?;
    let admin_role = ensure_admin_role(&txn).await?;
    let account = match user::Entity::find()
        .filter(user::Column::Email.eq(email.as_str()))
        .one(&txn)
        .await?
    {
        Some(existing) => {
            let mut active: user::ActiveModel = existing.into();
            active.password = Set(hashed);
            active.is_active = Set(true);
            active.updated_at = Set(now);
            active.update(&txn).await?
        }
        None => {
            user::ActiveModel {
                name: Set(name.trim().to_string()),
                email: Set(email.clone()),
                password: Set(hashed),
                is_active: Set(true),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
    };

    let link = user_role::ActiveModel {
        user_id: Set(account.id),
        role_id: Set(admin_role.id),
    };
    let linked = user_role::Entity::insert(link)
        .on_conflict(
            OnConflict::columns([user_role::Column::UserId, user_role::Column::RoleId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await;
    match linked {
        Ok(_) | Err(DbErr::RecordNotInserted) => {}
        Err(e) => return Err(e).context("linking admin role"),
    }
    txn.commit().await?;

    info!(user_id = account.id, %email, "Administrator ready");
    Ok(account)
}
