pub mod admin_user;
pub mod attachment;
pub mod disposition;
pub mod note;
pub mod referral_site;
pub mod registration;
pub mod share;
pub mod template;
pub mod test_record;
