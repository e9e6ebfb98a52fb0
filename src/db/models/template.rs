use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub content: String,
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Clinical and notes templates share one shape but live in separate tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemplateKind {
    Clinical,
    Notes,
}

impl TemplateKind {
    pub fn table(&self) -> &'static str {
        match self {
            TemplateKind::Clinical => "clinical_templates",
            TemplateKind::Notes => "notes_templates",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TemplateKind::Clinical => "Clinical template",
            TemplateKind::Notes => "Notes template",
        }
    }

    pub fn resource(&self) -> &'static str {
        match self {
            TemplateKind::Clinical => "clinical_template",
            TemplateKind::Notes => "notes_template",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub content: Option<String>,
    pub is_default: Option<bool>,
}
