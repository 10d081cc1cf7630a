// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Spam Protection
//!
//! Checks run on every public form submission, cheapest first:
//!
//! 1. **Honeypot**: a hidden field that humans leave empty
//! 2. **Rate limit**: per site and client IP, one-hour window
//! 3. **Timing**: a signed time token issued when the form was rendered
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Reject automated submissions before a lead is created
//!
//! Time tokens have the form `"{unix_ts}:{hex(HMAC-SHA256(secret, unix_ts))}"`.
//! A missing token is accepted (clients without JavaScript, cached pages) and
//! only logged.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::domain::cache::{CacheError, CacheStore};
use crate::domain::lead::FormData;
use crate::domain::site::{FormConfiguration, SiteId};

type HmacSha256 = Hmac<Sha256>;

pub const TIME_TOKEN_LIFETIME_SECS: i64 = 3600;
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpamVerdict {
    Clean,
    Spam { reason: String },
    RateLimited,
}

/// Issues and verifies form time tokens.
#[derive(Clone)]
pub struct TimeTokenSigner {
    secret: Arc<str>,
}

impl TimeTokenSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Arc::from(secret.into()),
        }
    }

    pub fn issue(&self) -> String {
        self.issue_at(Utc::now().timestamp())
    }

    pub fn issue_at(&self, unix_ts: i64) -> String {
        let timestamp = unix_ts.to_string();
        let signature = self.sign(&timestamp);
        format!("{timestamp}:{signature}")
    }

    fn sign(&self, timestamp: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(timestamp.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Validate a submitted token against `now`. `Err` carries the rejection
    /// reason.
    pub fn check(&self, token: &str, min_seconds: u64, now: i64) -> Result<(), String> {
        if token.is_empty() {
            record_time_token_issue("missing", "Time token missing; timing check skipped");
            return Ok(());
        }

        let Some((timestamp, signature)) = token.split_once(':') else {
            record_time_token_issue("malformed", "Time token malformed; rejecting submission");
            return Err("Invalid time token format".to_string());
        };

        let expected = self.sign(timestamp);
        if !bool::from(signature.as_bytes().ct_eq(expected.as_bytes())) {
            record_time_token_issue(
                "invalid_signature",
                "Time token signature mismatch; rejecting submission",
            );
            return Err("Invalid time token signature".to_string());
        }

        let Ok(issued_at) = timestamp.parse::<i64>() else {
            record_time_token_issue(
                "malformed",
                "Time token timestamp invalid; rejecting submission",
            );
            return Err("Invalid timestamp in time token".to_string());
        };

        let elapsed = now - issued_at;
        if elapsed > TIME_TOKEN_LIFETIME_SECS {
            record_time_token_issue("expired", "Time token expired; rejecting submission");
            return Err("Time token expired".to_string());
        }

        let min_seconds = i64::try_from(min_seconds).unwrap_or(i64::MAX);
        if elapsed < min_seconds {
            record_time_token_issue("too_fast", "Form submitted too quickly; rejecting submission");
            return Err(format!(
                "Submitted too quickly ({elapsed}s < {min_seconds}s minimum)"
            ));
        }

        Ok(())
    }
}

fn record_time_token_issue(status: &'static str, message: &str) {
    warn!(
        event = "form_time_token",
        time_token_status = status,
        "{}",
        message
    );
    metrics::counter!(format!("forms.time_token.{status}")).increment(1);
}

/// A honeypot value counts when it is a non-empty string or any other
/// truthy JSON value.
pub fn honeypot_triggered(data: &FormData, field: &str) -> bool {
    match data.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Number(_)) => true,
    }
}

pub fn rate_limit_key(site_id: SiteId, ip: &str) -> String {
    format!("form_rate_limit:{site_id}:{ip}")
}

pub struct SpamCheck<'a> {
    pub data: &'a FormData,
    pub site_id: SiteId,
    pub client_ip: &'a str,
    pub time_token: &'a str,
    pub config: &'a FormConfiguration,
}

#[derive(Clone)]
pub struct SpamGuard {
    cache: Arc<dyn CacheStore>,
    signer: TimeTokenSigner,
}

impl SpamGuard {
    pub fn new(cache: Arc<dyn CacheStore>, signer: TimeTokenSigner) -> Self {
        Self { cache, signer }
    }

    pub fn signer(&self) -> &TimeTokenSigner {
        &self.signer
    }

    pub async fn run(&self, check: SpamCheck<'_>) -> SpamVerdict {
        self.run_at(check, Utc::now().timestamp()).await
    }

    pub async fn run_at(&self, check: SpamCheck<'_>, now: i64) -> SpamVerdict {
        let verdict = self.evaluate(&check, now).await;
        match &verdict {
            SpamVerdict::Clean => {}
            SpamVerdict::Spam { reason } => {
                warn!(site_id = %check.site_id, client_ip = check.client_ip, reason = %reason, "Submission rejected as spam");
                metrics::counter!("sum_spam_rejections_total", "kind" => "spam").increment(1);
            }
            SpamVerdict::RateLimited => {
                warn!(site_id = %check.site_id, client_ip = check.client_ip, "Submission rate limited");
                metrics::counter!("sum_spam_rejections_total", "kind" => "rate_limit").increment(1);
            }
        }
        verdict
    }

    async fn evaluate(&self, check: &SpamCheck<'_>, now: i64) -> SpamVerdict {
        if honeypot_triggered(check.data, &check.config.honeypot_field_name) {
            return SpamVerdict::Spam {
                reason: "Honeypot field filled".to_string(),
            };
        }

        if self
            .rate_limited(check.site_id, check.client_ip, check.config.rate_limit_per_ip_per_hour)
            .await
        {
            return SpamVerdict::RateLimited;
        }

        match self
            .signer
            .check(check.time_token, check.config.min_seconds_to_submit, now)
        {
            Ok(()) => SpamVerdict::Clean,
            Err(reason) => SpamVerdict::Spam { reason },
        }
    }

    /// Count this submission and report whether the limit is exceeded.
    /// Cache failures fail open.
    pub async fn rate_limited(&self, site_id: SiteId, ip: &str, max_per_hour: u32) -> bool {
        if max_per_hour == 0 {
            return false;
        }
        let key = rate_limit_key(site_id, ip);
        match self.increment_counter(&key).await {
            Ok(count) => {
                debug!(key = %key, count, "Rate limit counter updated");
                count > i64::from(max_per_hour)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Rate limit counter update failed");
                false
            }
        }
    }

    async fn increment_counter(&self, key: &str) -> Result<i64, CacheError> {
        if self
            .cache
            .add(key, Value::from(1), Some(RATE_LIMIT_WINDOW))
            .await?
        {
            return Ok(1);
        }
        let count = match self.cache.incr(key, 1).await {
            Ok(count) => count,
            Err(CacheError::Missing(_)) | Err(CacheError::NotInteger(_)) => {
                let current = self
                    .cache
                    .get(key)
                    .await?
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                let next = current + 1;
                self.cache
                    .set(key, Value::from(next), Some(RATE_LIMIT_WINDOW))
                    .await?;
                return Ok(next);
            }
            Err(e) => return Err(e),
        };
        self.cache.touch(key, RATE_LIMIT_WINDOW).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache_store::InMemoryCacheStore;
    use serde_json::json;

    const NOW: i64 = 1_750_000_000;

    fn guard() -> SpamGuard {
        SpamGuard::new(
            Arc::new(InMemoryCacheStore::new()),
            TimeTokenSigner::new("test-secret"),
        )
    }

    fn data(pairs: &[(&str, Value)]) -> FormData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn submission<'a>(
        data: &'a FormData,
        site_id: SiteId,
        time_token: &'a str,
        config: &'a FormConfiguration,
    ) -> SpamCheck<'a> {
        SpamCheck {
            data,
            site_id,
            client_ip: "9.9.9.9",
            time_token,
            config,
        }
    }

    #[test]
    fn test_token_format() {
        let signer = TimeTokenSigner::new("k");
        let token = signer.issue_at(NOW);
        let (ts, sig) = token.split_once(':').unwrap();
        assert_eq!(ts, NOW.to_string());
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_token_checks() {
        let signer = TimeTokenSigner::new("test-secret");

        assert!(signer.check("", 3, NOW).is_ok());
        assert_eq!(
            signer.check("no-colon", 3, NOW).unwrap_err(),
            "Invalid time token format"
        );
        assert_eq!(
            signer.check(&format!("{NOW}:deadbeef"), 3, NOW).unwrap_err(),
            "Invalid time token signature"
        );

        let other = TimeTokenSigner::new("other-secret").issue_at(NOW - 10);
        assert_eq!(
            signer.check(&other, 3, NOW).unwrap_err(),
            "Invalid time token signature"
        );

        let fresh = signer.issue_at(NOW - 1);
        assert_eq!(
            signer.check(&fresh, 3, NOW).unwrap_err(),
            "Submitted too quickly (1s < 3s minimum)"
        );

        let stale = signer.issue_at(NOW - TIME_TOKEN_LIFETIME_SECS - 1);
        assert_eq!(signer.check(&stale, 3, NOW).unwrap_err(), "Time token expired");

        let good = signer.issue_at(NOW - 30);
        assert!(signer.check(&good, 3, NOW).is_ok());
    }

    #[test]
    fn test_non_integer_timestamp_with_valid_signature() {
        let signer = TimeTokenSigner::new("test-secret");
        let token = format!("abc:{}", signer.sign("abc"));
        assert_eq!(
            signer.check(&token, 3, NOW).unwrap_err(),
            "Invalid timestamp in time token"
        );
    }

    #[test]
    fn test_honeypot_values() {
        assert!(!honeypot_triggered(&data(&[]), "company"));
        assert!(!honeypot_triggered(&data(&[("company", json!(""))]), "company"));
        assert!(honeypot_triggered(&data(&[("company", json!("Acme"))]), "company"));
        assert!(honeypot_triggered(&data(&[("company", json!(true))]), "company"));
    }

    #[tokio::test]
    async fn test_rate_limit_counts_per_site_and_ip() {
        let guard = guard();
        let site = SiteId::new();
        for _ in 0..2 {
            assert!(!guard.rate_limited(site, "1.2.3.4", 2).await);
        }
        assert!(guard.rate_limited(site, "1.2.3.4", 2).await);
        assert!(!guard.rate_limited(site, "5.6.7.8", 2).await);
        assert!(!guard.rate_limited(SiteId::new(), "1.2.3.4", 2).await);
    }

    #[tokio::test]
    async fn test_zero_limit_disables() {
        let guard = guard();
        let site = SiteId::new();
        for _ in 0..50 {
            assert!(!guard.rate_limited(site, "1.2.3.4", 0).await);
        }
    }

    #[tokio::test]
    async fn test_checks_run_cheapest_first() {
        let guard = guard();
        let config = FormConfiguration {
            rate_limit_per_ip_per_hour: 1,
            ..FormConfiguration::default()
        };
        let site = SiteId::new();
        let spammy = data(&[("company", json!("bots inc"))]);

        // The honeypot rejects before the counter is touched.
        let verdict = guard
            .run_at(submission(&spammy, site, "", &config), NOW)
            .await;
        assert_eq!(
            verdict,
            SpamVerdict::Spam {
                reason: "Honeypot field filled".into()
            }
        );

        let clean = data(&[]);
        let token = guard.signer().issue_at(NOW - 10);
        assert_eq!(
            guard.run_at(submission(&clean, site, &token, &config), NOW).await,
            SpamVerdict::Clean
        );
        assert_eq!(
            guard.run_at(submission(&clean, site, &token, &config), NOW).await,
            SpamVerdict::RateLimited
        );
    }
}
