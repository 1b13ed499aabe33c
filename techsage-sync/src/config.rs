use std::time::Duration;

use crate::api::BlogId;

/// How the live channel reconnects after losing its connection
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Space between a closure and the next connection attempt
    pub delay: Duration,

    /// Consecutive failed attempts after which the channel gives up, `None`
    /// meaning never
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyncConfig {
    /// Host (and port) of the API, without scheme
    pub api_host: String,

    /// Whether to use https and wss
    pub secure: bool,

    pub retry: RetryPolicy,

    /// How long a comment sent over the live channel may stay unconfirmed
    /// before the section checks with the server
    pub ack_timeout: Duration,
}

impl SyncConfig {
    /// Builds a configuration with default timings. `host` may carry an
    /// `http://` or `https://` scheme, which then decides `secure`
    pub fn new(host: &str) -> SyncConfig {
        let (api_host, secure) = match host.strip_prefix("https://") {
            Some(h) => (h, true),
            None => (host.strip_prefix("http://").unwrap_or(host), false),
        };
        SyncConfig {
            api_host: String::from(api_host.trim_end_matches('/')),
            secure,
            retry: RetryPolicy::default(),
            ack_timeout: Duration::from_secs(10),
        }
    }

    pub fn rest_base(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.api_host)
    }

    pub fn channel_url(&self, blog: &BlogId) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}/ws/comments/{}/", scheme, self.api_host, blog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_decides_security() {
        let c = SyncConfig::new("https://api.techsage.example/");
        assert!(c.secure);
        assert_eq!(c.api_host, "api.techsage.example");
        assert_eq!(c.rest_base(), "https://api.techsage.example");
        assert_eq!(
            c.channel_url(&BlogId(String::from("b1"))),
            "wss://api.techsage.example/ws/comments/b1/"
        );

        let c = SyncConfig::new("localhost:8000");
        assert!(!c.secure);
        assert_eq!(
            c.channel_url(&BlogId(String::from("b1"))),
            "ws://localhost:8000/ws/comments/b1/"
        );
    }

    #[test]
    fn retry_bounds() {
        let unbounded = RetryPolicy::default();
        assert_eq!(unbounded.delay, Duration::from_secs(5));
        assert!(unbounded.allows(u32::MAX));

        let bounded = RetryPolicy {
            delay: Duration::from_secs(1),
            max_attempts: Some(3),
        };
        assert!(bounded.allows(3));
        assert!(!bounded.allows(4));
    }
}
