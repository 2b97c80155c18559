//! SMTP verification abstraction.
//!
//! Delivery is owned by external infrastructure; the console only checks
//! that a stored SMTP configuration looks usable. The `EmailTester` trait
//! is the seam: production wiring can implement a real SMTP handshake,
//! while the default implementation logs the probe and reports success so
//! local setups work without a mail server.

use anyhow::Result;
use secrecy::SecretString;
use tracing::info;

/// Connection parameters for a verification probe.
#[derive(Clone, Debug)]
pub struct EmailProbe {
    pub host: String,
    pub port: u16,
    pub from_address: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub use_tls: bool,
}

pub trait EmailTester: Send + Sync {
    /// Verify the configuration or return an error describing why it is
    /// unusable. Must not send real mail.
    fn test(&self, probe: &EmailProbe) -> Result<()>;
}

/// Local dev tester that logs the probe instead of opening a connection.
#[derive(Clone, Debug)]
pub struct LogEmailTester;

impl EmailTester for LogEmailTester {
    fn test(&self, probe: &EmailProbe) -> Result<()> {
        info!(
            host = %probe.host,
            port = probe.port,
            from = %probe.from_address,
            tls = probe.use_tls,
            "smtp verification stub"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{EmailProbe, EmailTester, LogEmailTester};
    use secrecy::SecretString;

    #[test]
    fn log_tester_accepts_any_probe() {
        let probe = EmailProbe {
            host: "smtp.acme.com".to_string(),
            port: 587,
            from_address: "alerts@acme.com".to_string(),
            username: Some("alerts".to_string()),
            password: Some(SecretString::from("s3cret")),
            use_tls: true,
        };
        assert!(LogEmailTester.test(&probe).is_ok());
    }

    #[test]
    fn probe_debug_never_prints_the_password() {
        let probe = EmailProbe {
            host: "smtp.acme.com".to_string(),
            port: 587,
            from_address: "alerts@acme.com".to_string(),
            username: None,
            password: Some(SecretString::from("s3cret")),
            use_tls: false,
        };
        let rendered = format!("{probe:?}");
        assert!(!rendered.contains("s3cret"));
    }
}
