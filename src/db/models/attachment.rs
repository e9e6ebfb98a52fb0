use serde::{Deserialize, Serialize};

/// Attachment metadata; the bytes are only loaded when served.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AttachmentMeta {
    pub id: String,
    pub registration_id: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_by: String,
    pub created_at: String,
}

pub const SELECT_ATTACHMENT_META: &str =
    "SELECT id, registration_id, filename, content_type, size_bytes, uploaded_by, created_at
     FROM attachments";

#[derive(Debug, Deserialize)]
pub struct UploadAttachmentRequest {
    pub filename: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Base64 file contents.
    pub data: String,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}
