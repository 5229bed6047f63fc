use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use connect_db::models::decode_ts;

use crate::clock::SharedClock;
use crate::error::{OtpRejection, ServiceError, ServiceResult};
use crate::mailer::{Mailer, otp_mail};
use crate::store::Store;

/// A freshly issued code. The code only ever leaves the service by mail.
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies the one-time activation codes, one live code per email.
#[derive(Clone)]
pub struct OtpService {
    store: Store,
    mailer: Arc<dyn Mailer>,
    clock: SharedClock,
    ttl: Duration,
    mail_timeout: StdDuration,
}

impl OtpService {
    pub fn new(store: Store, mailer: Arc<dyn Mailer>, clock: SharedClock, ttl: Duration, mail_timeout: StdDuration) -> Self {
        Self {
            store,
            mailer,
            clock,
            ttl,
            mail_timeout,
        }
    }

    /// Generates a code, mails it, then stores it, replacing any earlier code
    /// for the address. Nothing is stored if the mail can't be sent.
    pub async fn issue(&self, email: &str) -> ServiceResult<IssuedOtp> {
        let email = normalize_email(email)?;
        let code = generate_code();
        let now = self.clock.now();
        let expires_at = now + self.ttl;

        let mail = otp_mail(&email, &code, expires_at, self.ttl.num_minutes());
        match tokio::time::timeout(self.mail_timeout, self.mailer.send(&mail)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Failed to send OTP mail to {}: {:#}", email, e);
                return Err(ServiceError::External(e.context("sending OTP mail")));
            }
            Err(_) => {
                warn!("OTP mail to {} timed out after {:?}", email, self.mail_timeout);
                return Err(ServiceError::External(anyhow::anyhow!("OTP mail timed out")));
            }
        }

        let hash = code_hash(&email, &code);
        let key = email.clone();
        self.store
            .run(move |db| db.upsert_otp(&key, &hash, expires_at, now))
            .await?;

        info!("Issued OTP for {} (expires {})", email, expires_at);
        Ok(IssuedOtp {
            email,
            code,
            expires_at,
        })
    }

    /// Checks `candidate` against the latest code for `email`. A verified
    /// code stays usable until it expires.
    pub async fn verify(&self, email: &str, candidate: &str) -> ServiceResult<()> {
        let email = normalize_email(email)?;
        let key = email.clone();
        let record = self
            .store
            .run(move |db| db.get_otp(&key))
            .await?
            .ok_or(OtpRejection::NotFound)?;

        let now = self.clock.now();
        let expires_at = decode_ts(&record.expires_at)?;
        if now > expires_at {
            debug!("OTP for {} expired at {}", email, expires_at);
            return Err(OtpRejection::Expired.into());
        }

        if code_hash(&email, candidate.trim()) != record.code_hash {
            debug!("OTP mismatch for {}", email);
            return Err(OtpRejection::Mismatch.into());
        }

        let key = email.clone();
        self.store.run(move |db| db.mark_otp_verified(&key, now)).await?;
        info!("OTP verified for {}", email);
        Ok(())
    }

    /// Same as `issue`: the new code replaces the old one and the window restarts.
    pub async fn resend(&self, email: &str) -> ServiceResult<IssuedOtp> {
        self.issue(email).await
    }
}

/// Lowercases and trims an address, rejecting anything not shaped like
/// `local@domain.tld`.
pub fn normalize_email(raw: &str) -> ServiceResult<String> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .rsplit_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(email)
    } else {
        Err(ServiceError::validation(format!("invalid email address '{}'", raw.trim())))
    }
}

fn generate_code() -> String {
    rand::rng().random_range(100_000..=999_999).to_string()
}

/// Codes are salted with their address before hashing.
fn code_hash(email: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn email_shape_is_checked() {
        assert_eq!(normalize_email("  Ada@Example.COM ").unwrap(), "ada@example.com");
        for bad in ["", "ada", "ada@", "@x.com", "ada@x", "a da@x.com", "a@b@c.com", "ada@.com"] {
            assert!(matches!(normalize_email(bad), Err(ServiceError::Validation(_))), "{bad}");
        }
    }

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let n: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&n));
        }
    }

    #[tokio::test]
    async fn verify_accepts_latest_code_within_window() {
        let fx = Fixture::new();
        let issued = fx.otp.issue("ada@example.com").await.unwrap();
        assert_eq!(fx.mailer.sent().len(), 1);

        fx.clock.advance(Duration::seconds(299));
        fx.otp.verify("ada@example.com", &issued.code).await.unwrap();

        // Not consumed: a second verify inside the window still succeeds.
        fx.otp.verify("ADA@example.com", &format!(" {} ", issued.code)).await.unwrap();
    }

    #[tokio::test]
    async fn verify_reports_expiry_after_ttl() {
        let fx = Fixture::new();
        let issued = fx.otp.issue("ada@example.com").await.unwrap();

        fx.clock.advance(Duration::seconds(300));
        fx.otp.verify("ada@example.com", &issued.code).await.unwrap();

        fx.clock.advance(Duration::seconds(1));
        assert!(matches!(
            fx.otp.verify("ada@example.com", &issued.code).await,
            Err(ServiceError::Otp(OtpRejection::Expired))
        ));
    }

    #[tokio::test]
    async fn resend_invalidates_previous_code() {
        let fx = Fixture::new();
        let first = fx.otp.issue("ada@example.com").await.unwrap();
        let mut second = fx.otp.resend("ada@example.com").await.unwrap();
        while second.code == first.code {
            second = fx.otp.resend("ada@example.com").await.unwrap();
        }

        assert!(matches!(
            fx.otp.verify("ada@example.com", &first.code).await,
            Err(ServiceError::Otp(OtpRejection::Mismatch))
        ));
        fx.otp.verify("ada@example.com", &second.code).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.otp.verify("nobody@example.com", "123456").await,
            Err(ServiceError::Otp(OtpRejection::NotFound))
        ));
    }

    #[tokio::test]
    async fn failed_mail_persists_nothing() {
        let fx = Fixture::with_failing_mailer();
        assert!(matches!(
            fx.otp.issue("ada@example.com").await,
            Err(ServiceError::External(_))
        ));
        assert!(fx.db.get_otp("ada@example.com").unwrap().is_none());
    }
}
