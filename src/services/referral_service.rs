use crate::entities::referral_entity as referral;
use crate::error::{AppError, AppResult};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

/// Get-or-create a referral by its source text.
pub async fn get_or_create<C: ConnectionTrait>(conn: &C, source: &str) -> AppResult<referral::Model> {
    let source = source.trim();
    if source.is_empty() {
        return Err(AppError::ValidationError("Referral source is empty".into()));
    }
    if let Some(existing) = referral::Entity::find()
        .filter(referral::Column::Source.eq(source))
        .one(conn)
        .await?
    {
        return Ok(existing);
    }
    Ok(referral::ActiveModel {
        source: Set(source.to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await?)
}
