//! Player database entity.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database entity for the players table.
#[derive(Debug, Clone, FromRow)]
pub struct PlayerEntity {
    pub id: i64,
    pub player_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<PlayerEntity> for domain::models::Player {
    fn from(entity: PlayerEntity) -> Self {
        Self {
            id: entity.player_id,
            name: entity.name,
        }
    }
}
