pub mod attachments;
pub mod audit_log;
pub mod auth;
pub mod dispositions;
pub mod health;
pub mod metrics;
pub mod notes;
pub mod referral_sites;
pub mod registrations;
pub mod shares;
pub mod templates;
pub mod test_records;
pub mod two_factor;
pub mod users;
