use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Share {
    pub id: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub attachment_id: String,
    pub created_by: String,
    pub expires_at: String,
    pub max_views: Option<i64>,
    pub view_count: i64,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateShareRequest {
    pub attachment_id: String,
    pub expires_in_hours: Option<i64>,
    pub max_views: Option<i64>,
}
