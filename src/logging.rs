use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing_subscriber::EnvFilter;

pub const REDACTED_EMAIL: &str = "[REDACTED_EMAIL]";
pub const REDACTED_SECRET: &str = "[REDACTED]";
pub const REDACTED_CARD: &str = "[REDACTED_CARD]";

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("email regex")
});

static SECRET_MEMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)"(password|passwd|secret|api_key|apikey|token|access_token|refresh_token)"\s*:\s*"(?:[^"\\]|\\.)*""#,
    )
    .expect("secret member regex")
});

static CARD_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d(?:[ \-]?\d){12,18}\b").expect("card number regex"));

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Scrubs emails, secret-looking JSON members and card-shaped digit runs from
/// text headed for a log sink.
pub fn redact(text: &str) -> Cow<'_, str> {
    let mut scrubbed = Cow::Borrowed(text);

    if SECRET_MEMBER.is_match(&scrubbed) {
        let replaced = SECRET_MEMBER
            .replace_all(&scrubbed, format!(r#""$1": "{REDACTED_SECRET}""#).as_str())
            .into_owned();
        scrubbed = Cow::Owned(replaced);
    }
    if EMAIL.is_match(&scrubbed) {
        let replaced = EMAIL.replace_all(&scrubbed, REDACTED_EMAIL).into_owned();
        scrubbed = Cow::Owned(replaced);
    }
    if CARD_NUMBER.is_match(&scrubbed) {
        let replaced = CARD_NUMBER.replace_all(&scrubbed, REDACTED_CARD).into_owned();
        scrubbed = Cow::Owned(replaced);
    }

    scrubbed
}

/// Display wrapper that runs [`redact`] on the wrapped text.
#[derive(Debug, Clone, Copy)]
pub struct Redacted<'a>(pub &'a str);

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&redact(self.0))
    }
}

/// Client supplied file name, reduced to a short printable form for logs.
#[derive(Debug, Clone)]
pub struct SanitizedFilename(String);

impl SanitizedFilename {
    const MAX_CHARS: usize = 64;

    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Self::sanitize(name.as_ref()))
    }

    fn sanitize(name: &str) -> String {
        let cleaned: String = name
            .chars()
            .filter(|c| !c.is_control())
            .take(Self::MAX_CHARS)
            .collect();
        if cleaned.is_empty() {
            "<unnamed>".to_string()
        } else {
            cleaned
        }
    }
}

impl fmt::Display for SanitizedFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sanitized wrapper for IP addresses that masks the last octet
#[derive(Debug, Clone)]
pub struct SanitizedIpAddr(String);

impl SanitizedIpAddr {
    pub fn new(ip: impl fmt::Display) -> Self {
        Self(Self::sanitize(&ip.to_string()))
    }

    fn sanitize(ip: &str) -> String {
        if ip.contains(':') {
            match ip.rfind(':') {
                Some(last_colon) => format!("{}:****", &ip[..last_colon]),
                None => "***".to_string(),
            }
        } else if let Some(last_dot) = ip.rfind('.') {
            format!("{}.***", &ip[..last_dot])
        } else {
            "***".to_string()
        }
    }
}

impl fmt::Display for SanitizedIpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Security event types for structured logging
#[derive(Debug, Clone, Copy)]
pub enum SecurityEvent {
    ValidationRejected,
    DangerousContent,
    UploadAccepted,
    UploadRejected,
    PathTraversalAttempt,
    SymlinkRejected,
    RateLimitExceeded,
    UnexpectedFailure,
}

impl SecurityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEvent::ValidationRejected => "validation_rejected",
            SecurityEvent::DangerousContent => "dangerous_content",
            SecurityEvent::UploadAccepted => "upload_accepted",
            SecurityEvent::UploadRejected => "upload_rejected",
            SecurityEvent::PathTraversalAttempt => "path_traversal_attempt",
            SecurityEvent::SymlinkRejected => "symlink_rejected",
            SecurityEvent::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEvent::UnexpectedFailure => "unexpected_failure",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            SecurityEvent::DangerousContent
                | SecurityEvent::PathTraversalAttempt
                | SecurityEvent::SymlinkRejected
                | SecurityEvent::RateLimitExceeded
                | SecurityEvent::UnexpectedFailure
        )
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log a security event with sanitized context
#[macro_export]
macro_rules! log_security_event {
    ($event:expr, $($field:tt)*) => {
        if $event.is_critical() {
            tracing::warn!(
                security_event = %$event,
                event_type = "security",
                $($field)*
            );
        } else {
            tracing::info!(
                security_event = %$event,
                event_type = "security",
                $($field)*
            );
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_email() {
        assert_eq!(
            redact("lookup failed for jane.doe+notes@example.co.uk today"),
            format!("lookup failed for {REDACTED_EMAIL} today")
        );
    }

    #[test]
    fn test_redact_secret_members() {
        let scrubbed = redact(r#"{"user": "bob", "password": "hunter2", "API_KEY": "abc\"def", "token":"t0k"}"#);
        assert!(!scrubbed.contains("hunter2"));
        assert!(!scrubbed.contains("abc"));
        assert!(!scrubbed.contains("t0k"));
        assert!(scrubbed.contains(r#""user": "bob""#));
        assert!(scrubbed.contains(r#""password": "[REDACTED]""#));
    }

    #[test]
    fn test_redact_card_numbers() {
        for card in ["4111111111111111", "4111 1111 1111 1111", "4111-1111-1111-1111"] {
            let text = format!("charge {card} declined");
            let scrubbed = redact(&text);
            assert_eq!(scrubbed, format!("charge {REDACTED_CARD} declined"));
        }
    }

    #[test]
    fn test_redact_leaves_short_numbers() {
        let text = "note 42 has priority 1.5 and id 999999";
        assert!(matches!(redact(text), Cow::Borrowed(_)));
    }

    #[test]
    fn test_redacted_display() {
        assert_eq!(
            Redacted("contact admin@example.com").to_string(),
            format!("contact {REDACTED_EMAIL}")
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(SanitizedFilename::new("photo\n.png").to_string(), "photo.png");
        assert_eq!(SanitizedFilename::new("").to_string(), "<unnamed>");
        assert_eq!(
            SanitizedFilename::new("a".repeat(200)).to_string().chars().count(),
            64
        );
    }

    #[test]
    fn test_sanitize_ipv4() {
        assert_eq!(
            SanitizedIpAddr::new("192.168.1.100").to_string(),
            "192.168.1.***"
        );
        assert_eq!(SanitizedIpAddr::new("10.0.0.1").to_string(), "10.0.0.***");
    }

    #[test]
    fn test_sanitize_ipv6() {
        assert_eq!(
            SanitizedIpAddr::new("2001:0db8:85a3:0000:0000:8a2e:0370:7334").to_string(),
            "2001:0db8:85a3:0000:0000:8a2e:0370:****"
        );
    }

    #[test]
    fn test_security_event_critical() {
        assert!(SecurityEvent::PathTraversalAttempt.is_critical());
        assert!(SecurityEvent::RateLimitExceeded.is_critical());
        assert!(!SecurityEvent::UploadAccepted.is_critical());
    }
}
