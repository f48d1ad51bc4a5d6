use std::time::Duration;

/// Tunable timers and retry bounds for a [`crate::Client`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub request_timeout: Duration,
    pub message_timeout: Duration,
    pub message_max_retry: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            message_timeout: Duration::from_secs(10),
            message_max_retry: 5,
        }
    }
}
