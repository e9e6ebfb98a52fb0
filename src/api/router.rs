use axum::{routing::{get, post, put}, Router};
use std::sync::Arc;
use super::AppState;
use super::handlers;

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        // Health + metrics (public)
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::metrics::prometheus_metrics))
        // Sign-in (public, challenge token where needed)
        .route("/api/admin/login", post(handlers::auth::login))
        .route("/api/admin/logout", post(handlers::auth::logout))
        .route("/api/admin/2fa/verify", post(handlers::auth::verify_email_code))
        .route("/api/admin/2fa/resend", post(handlers::auth::resend_code))
        .route("/api/admin/2fa/totp/verify", post(handlers::auth::verify_totp))
        // Second factor management (protected)
        .route("/api/admin/2fa/status", get(handlers::two_factor::status))
        .route("/api/admin/2fa/totp/setup", post(handlers::two_factor::setup_totp))
        .route("/api/admin/2fa/totp/enable", post(handlers::two_factor::enable_totp))
        .route("/api/admin/2fa/totp/disable", post(handlers::two_factor::disable_totp))
        .route("/api/admin/2fa/backup-codes/regenerate", post(handlers::two_factor::regenerate_backup_codes))
        // Registrations (protected)
        .route("/api/admin-register", post(handlers::registrations::create))
        .route("/api/admin-registrations", get(handlers::registrations::list))
        .route(
            "/api/admin-registration/{id}",
            get(handlers::registrations::get)
                .put(handlers::registrations::update)
                .delete(handlers::registrations::delete),
        )
        .route("/api/admin-registration/{id}/finalize", post(handlers::registrations::finalize))
        // Tests, notes and attachments of one registration (protected)
        .route("/api/admin-registration/{id}/test", post(handlers::test_records::create))
        .route("/api/admin-registration/{id}/tests", get(handlers::test_records::list))
        .route(
            "/api/admin-registration/{id}/test/{test_id}",
            put(handlers::test_records::update).delete(handlers::test_records::delete),
        )
        .route(
            "/api/admin-registration/{id}/notes",
            get(handlers::notes::list).post(handlers::notes::create),
        )
        .route(
            "/api/admin-registration/{id}/notes/{note_id}",
            put(handlers::notes::update).delete(handlers::notes::delete),
        )
        .route(
            "/api/admin-registration/{id}/attachments",
            get(handlers::attachments::list).post(handlers::attachments::upload),
        )
        .route(
            "/api/admin-registration/{id}/attachments/{attachment_id}",
            axum::routing::delete(handlers::attachments::delete),
        )
        // Attachment shares (create/revoke protected, fetch public)
        .route("/api/share-attachment", post(handlers::shares::create))
        .route("/api/share-attachment/{token}", axum::routing::delete(handlers::shares::revoke))
        .route("/api/shared-attachment/{token}", get(handlers::shares::fetch))
        // Templates (protected)
        .route(
            "/api/clinical-templates",
            get(handlers::templates::list_clinical).post(handlers::templates::create_clinical),
        )
        .route(
            "/api/clinical-templates/{id}",
            put(handlers::templates::update_clinical).delete(handlers::templates::delete_clinical),
        )
        .route(
            "/api/notes-templates",
            get(handlers::templates::list_notes).post(handlers::templates::create_notes),
        )
        .route(
            "/api/notes-templates/{id}",
            put(handlers::templates::update_notes).delete(handlers::templates::delete_notes),
        )
        // Lookups (protected)
        .route("/api/dispositions", get(handlers::dispositions::list).post(handlers::dispositions::create))
        .route(
            "/api/dispositions/{id}",
            put(handlers::dispositions::update).delete(handlers::dispositions::delete),
        )
        .route("/api/referral-sites", get(handlers::referral_sites::list).post(handlers::referral_sites::create))
        .route(
            "/api/referral-sites/{id}",
            put(handlers::referral_sites::update).delete(handlers::referral_sites::delete),
        )
        // Admin users (super_admin only)
        .route("/api/admin/users", get(handlers::users::list).post(handlers::users::create))
        .route("/api/admin/users/{id}", put(handlers::users::update).delete(handlers::users::delete))
        .route("/api/admin/users/{id}/pin", put(handlers::users::reset_pin))
        .route("/api/admin/users/{id}/unlock", post(handlers::users::unlock))
        // Audit log (super_admin only)
        .route("/api/admin/audit-log", get(handlers::audit_log::list))
        .with_state(state)
}
