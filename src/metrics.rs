use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide API counters, exposed on `/metrics`.
#[derive(Default)]
pub struct ApiMetrics {
    pub logins_succeeded: AtomicU64,
    pub logins_failed: AtomicU64,
    pub codes_sent: AtomicU64,
    pub lockouts: AtomicU64,
    pub registrations_created: AtomicU64,
    pub shares_created: AtomicU64,
    pub shares_accessed: AtomicU64,
}

impl ApiMetrics {
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Serialize to Prometheus text exposition format.
    pub fn to_prometheus_text(&self) -> String {
        let ok = self.logins_succeeded.load(Ordering::Relaxed);
        let failed = self.logins_failed.load(Ordering::Relaxed);
        let codes = self.codes_sent.load(Ordering::Relaxed);
        let lockouts = self.lockouts.load(Ordering::Relaxed);
        let registrations = self.registrations_created.load(Ordering::Relaxed);
        let shares_created = self.shares_created.load(Ordering::Relaxed);
        let shares_accessed = self.shares_accessed.load(Ordering::Relaxed);

        format!(
            "# HELP clinic_logins_total Admin sign-in attempts by outcome\n\
             # TYPE clinic_logins_total counter\n\
             clinic_logins_total{{outcome=\"success\"}} {ok}\n\
             clinic_logins_total{{outcome=\"failure\"}} {failed}\n\
             # HELP clinic_2fa_codes_sent_total Email verification codes sent\n\
             # TYPE clinic_2fa_codes_sent_total counter\n\
             clinic_2fa_codes_sent_total {codes}\n\
             # HELP clinic_lockouts_total Accounts locked after repeated failures\n\
             # TYPE clinic_lockouts_total counter\n\
             clinic_lockouts_total {lockouts}\n\
             # HELP clinic_registrations_created_total Registrations created\n\
             # TYPE clinic_registrations_created_total counter\n\
             clinic_registrations_created_total {registrations}\n\
             # HELP clinic_shares_total Attachment share links by event\n\
             # TYPE clinic_shares_total counter\n\
             clinic_shares_total{{event=\"created\"}} {shares_created}\n\
             clinic_shares_total{{event=\"accessed\"}} {shares_accessed}\n"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        let m = ApiMetrics::default();
        ApiMetrics::inc(&m.logins_failed);
        ApiMetrics::inc(&m.logins_failed);
        ApiMetrics::inc(&m.shares_created);
        let text = m.to_prometheus_text();
        assert!(text.contains("clinic_logins_total{outcome=\"failure\"} 2"));
        assert!(text.contains("clinic_shares_total{event=\"created\"} 1"));
        assert!(text.contains("clinic_lockouts_total 0"));
    }
}
