pub mod backup_codes;
pub mod jwt;
pub mod pin;
pub mod rbac;
pub mod secret_box;
pub mod totp;
pub mod two_factor;
