//! Backend configuration
//!
//! Every timing and paging knob of the session layer and the background
//! workers lives here. Use [`BackendConfig::builder`] to override a subset;
//! zero values fall back to the defaults, except an explicit zero discovery
//! backoff.

use std::time::Duration;

/// Transport family searched during discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// USB HID (CTAPHID)
    Hid,
    /// PC/SC smartcard reader (NFCCTAP)
    Pcsc,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Hid => write!(f, "HID"),
            TransportKind::Pcsc => write!(f, "PCSC"),
        }
    }
}

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_DISCOVERY_ATTEMPTS: u32 = 3;
const DEFAULT_DISCOVERY_BACKOFF: Duration = Duration::from_millis(200);
const DEFAULT_PAGE_SIZE: u32 = 23;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_REFRESH_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Session layer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Upper bound on one wire call, probe included
    pub command_timeout: Duration,

    /// Discovery passes before giving up with `NoDeviceFound`
    pub discovery_attempts: u32,

    /// Sleep between discovery passes
    pub discovery_backoff: Duration,

    /// Records requested per Enumerate page
    pub page_size: u32,

    /// Presence poller tick
    pub poll_interval: Duration,

    /// Directory refresher tick
    pub refresh_interval: Duration,

    /// How long user operations wait for an in-flight refresh
    pub refresh_wait_timeout: Duration,

    /// Transport families in discovery priority order
    pub transports: Vec<TransportKind>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            discovery_attempts: DEFAULT_DISCOVERY_ATTEMPTS,
            discovery_backoff: DEFAULT_DISCOVERY_BACKOFF,
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            refresh_wait_timeout: DEFAULT_REFRESH_WAIT_TIMEOUT,
            transports: vec![TransportKind::Hid, TransportKind::Pcsc],
        }
    }
}

impl BackendConfig {
    /// Create a new configuration builder
    pub fn builder() -> BackendConfigBuilder {
        BackendConfigBuilder::default()
    }
}

/// Builder for BackendConfig
#[derive(Debug, Default)]
pub struct BackendConfigBuilder {
    command_timeout: Duration,
    discovery_attempts: u32,
    discovery_backoff: Option<Duration>,
    page_size: u32,
    poll_interval: Duration,
    refresh_interval: Duration,
    refresh_wait_timeout: Duration,
    transports: Vec<TransportKind>,
}

impl BackendConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn discovery_attempts(mut self, attempts: u32) -> Self {
        self.discovery_attempts = attempts;
        self
    }

    pub fn discovery_backoff(mut self, backoff: Duration) -> Self {
        self.discovery_backoff = Some(backoff);
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn refresh_wait_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_wait_timeout = timeout;
        self
    }

    pub fn transports(mut self, transports: Vec<TransportKind>) -> Self {
        self.transports = transports;
        self
    }

    pub fn build(self) -> BackendConfig {
        fn or_default(value: Duration, default: Duration) -> Duration {
            if value.is_zero() { default } else { value }
        }

        BackendConfig {
            command_timeout: or_default(self.command_timeout, DEFAULT_COMMAND_TIMEOUT),
            discovery_attempts: if self.discovery_attempts == 0 {
                DEFAULT_DISCOVERY_ATTEMPTS
            } else {
                self.discovery_attempts
            },
            // An explicit zero backoff is kept
            discovery_backoff: self.discovery_backoff.unwrap_or(DEFAULT_DISCOVERY_BACKOFF),
            page_size: if self.page_size == 0 {
                DEFAULT_PAGE_SIZE
            } else {
                self.page_size
            },
            poll_interval: or_default(self.poll_interval, DEFAULT_POLL_INTERVAL),
            refresh_interval: or_default(self.refresh_interval, DEFAULT_REFRESH_INTERVAL),
            refresh_wait_timeout: or_default(
                self.refresh_wait_timeout,
                DEFAULT_REFRESH_WAIT_TIMEOUT,
            ),
            transports: if self.transports.is_empty() {
                vec![TransportKind::Hid, TransportKind::Pcsc]
            } else {
                self.transports
            },
        }
    }
}
