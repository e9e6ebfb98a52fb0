use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Registration {
    pub id: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub health_card: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub language: Option<String>,
    pub disposition: Option<String>,
    pub referral_site: Option<String>,
    pub physician: Option<String>,
    pub consent: bool,
    pub status: String,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

pub const SELECT_REGISTRATION: &str =
    "SELECT id, first_name, last_name, date_of_birth, health_card, email, phone, gender,
            address, city, postal_code, language, disposition, referral_site, physician,
            consent, status, created_by, created_at, updated_at
     FROM admin_registrations";

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Deserialize)]
pub struct CreateRegistrationRequest {
    pub first_name: String,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub health_card: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub language: Option<String>,
    pub disposition: Option<String>,
    pub referral_site: Option<String>,
    pub physician: Option<String>,
    #[serde(default)]
    pub consent: bool,
}

/// Partial update: absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateRegistrationRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub health_card: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub language: Option<String>,
    pub disposition: Option<String>,
    pub referral_site: Option<String>,
    pub physician: Option<String>,
    pub consent: Option<bool>,
    pub status: Option<String>,
}

impl Registration {
    pub fn apply(mut self, u: UpdateRegistrationRequest) -> Registration {
        fn keep(new: Option<String>, old: Option<String>) -> Option<String> {
            new.or(old)
        }
        if let Some(first_name) = u.first_name {
            self.first_name = first_name;
        }
        self.last_name = keep(u.last_name, self.last_name);
        self.date_of_birth = keep(u.date_of_birth, self.date_of_birth);
        self.health_card = keep(u.health_card, self.health_card);
        self.email = keep(u.email, self.email);
        self.phone = keep(u.phone, self.phone);
        self.gender = keep(u.gender, self.gender);
        self.address = keep(u.address, self.address);
        self.city = keep(u.city, self.city);
        self.postal_code = keep(u.postal_code, self.postal_code);
        self.language = keep(u.language, self.language);
        self.disposition = keep(u.disposition, self.disposition);
        self.referral_site = keep(u.referral_site, self.referral_site);
        self.physician = keep(u.physician, self.physician);
        if let Some(consent) = u.consent {
            self.consent = consent;
        }
        if let Some(status) = u.status {
            self.status = status;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> Registration {
        Registration {
            id: "r1".into(),
            first_name: "Ada".into(),
            last_name: Some("Lovelace".into()),
            date_of_birth: Some("1990-01-02".into()),
            health_card: None,
            email: Some("ada@example.org".into()),
            phone: None,
            gender: None,
            address: None,
            city: Some("Toronto".into()),
            postal_code: None,
            language: None,
            disposition: None,
            referral_site: None,
            physician: None,
            consent: true,
            status: STATUS_PENDING.into(),
            created_by: "admin".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn test_apply_keeps_absent_fields() {
        let updated = stored().apply(UpdateRegistrationRequest {
            city: Some("Ottawa".into()),
            ..Default::default()
        });
        assert_eq!(updated.city.as_deref(), Some("Ottawa"));
        assert_eq!(updated.first_name, "Ada");
        assert_eq!(updated.last_name.as_deref(), Some("Lovelace"));
        assert!(updated.consent);
        assert_eq!(updated.status, STATUS_PENDING);
    }
}
