//! Check dispatcher: selects and runs the probe matching a service's kind.
use async_trait::async_trait;
use rand::random;
use reqwest::{Client, redirect};
use std::net::IpAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::service::{CheckKind, Service, UnknownCheckKind};
use crate::config::MonitorConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("Malformed target: {0}")]
    MalformedTarget(String),
    #[error(transparent)]
    UnrecognizedKind(#[from] UnknownCheckKind),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Unhealthy status code: {0}")]
    BadStatus(u16),
    #[error("ICMP unavailable: {0}")]
    PingUnavailable(String),
}

/// Low-level network primitives used by the checks.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Opens (and drops) a TCP connection to `host:port`.
    async fn tcp_connect(&self, host: &str, port: u16, timeout: Duration)
    -> Result<(), CheckError>;

    /// Sends one ICMP echo request and waits for the reply.
    async fn ping(&self, host: &str, timeout: Duration) -> Result<Duration, CheckError>;

    /// Issues a GET without following redirects and returns the status code.
    async fn http_get(&self, url: &str, timeout: Duration) -> Result<u16, CheckError>;
}

/// `Prober` backed by tokio sockets, `surge-ping` and `reqwest`.
pub struct NetworkProber {
    http_client: Client,
}

impl NetworkProber {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { http_client })
    }

    async fn resolve(host: &str) -> Result<IpAddr, CheckError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }
        let mut addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| CheckError::Transport(format!("DNS resolution failed: {e}")))?;
        addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| CheckError::Transport("DNS resolution returned no addresses".into()))
    }

    async fn ping_once(target_addr: IpAddr, timeout: Duration) -> Result<Duration, CheckError> {
        let config = match target_addr {
            IpAddr::V4(_) => surge_ping::Config::default(),
            IpAddr::V6(_) => surge_ping::Config::builder()
                .kind(surge_ping::ICMP::V6)
                .build(),
        };
        let client = surge_ping::Client::new(&config)
            .map_err(|e| CheckError::PingUnavailable(e.to_string()))?;
        let mut pinger = client
            .pinger(target_addr, surge_ping::PingIdentifier(random()))
            .await;
        pinger.timeout(timeout);
        match pinger.ping(surge_ping::PingSequence(0), &[]).await {
            Ok((_reply, rtt)) => Ok(rtt),
            Err(surge_ping::SurgeError::Timeout { .. }) => Err(CheckError::Timeout(timeout)),
            Err(e) => Err(CheckError::Transport(e.to_string())),
        }
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn tcp_connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<(), CheckError> {
        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(CheckError::Transport(e.to_string())),
            Err(_) => Err(CheckError::Timeout(timeout)),
        }
    }

    async fn ping(&self, host: &str, timeout: Duration) -> Result<Duration, CheckError> {
        // The outer timeout also bounds DNS resolution.
        let attempt = async {
            let target_addr = Self::resolve(host).await?;
            Self::ping_once(target_addr, timeout).await
        };
        tokio::time::timeout(timeout, attempt)
            .await
            .unwrap_or(Err(CheckError::Timeout(timeout)))
    }

    async fn http_get(&self, url: &str, timeout: Duration) -> Result<u16, CheckError> {
        let response = self
            .http_client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CheckError::Timeout(timeout)
                } else {
                    CheckError::Transport(e.to_string())
                }
            })?;
        Ok(response.status().as_u16())
    }
}

/// Per-kind time bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckTimeouts {
    pub tcp: Duration,
    pub ping: Duration,
    pub http: Duration,
}

impl Default for CheckTimeouts {
    fn default() -> Self {
        Self {
            tcp: Duration::from_secs(2),
            ping: Duration::from_secs(2),
            http: Duration::from_secs(5),
        }
    }
}

impl From<&MonitorConfig> for CheckTimeouts {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            tcp: Duration::from_secs(config.tcp_timeout_secs.max(1)),
            ping: Duration::from_secs(config.ping_timeout_secs.max(1)),
            http: Duration::from_secs(config.http_timeout_secs.max(1)),
        }
    }
}

/// Splits a `host:port` target. Exactly one `:` is allowed and the port must
/// be numeric.
pub fn parse_tcp_target(target: &str) -> Result<(&str, u16), CheckError> {
    let malformed = || CheckError::MalformedTarget(target.to_string());
    let mut parts = target.split(':');
    let (Some(host), Some(port), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed());
    };
    if host.is_empty() {
        return Err(malformed());
    }
    let port = port.parse::<u16>().map_err(|_| malformed())?;
    Ok((host, port))
}

/// Reduces a ping target to a bare host. URLs are accepted and stripped to
/// their host part.
pub fn ping_host(target: &str) -> Result<String, CheckError> {
    let target = target.trim();
    let host = if target.contains("://") {
        reqwest::Url::parse(target)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.trim_matches(['[', ']']).to_string()))
    } else {
        Some(target.to_string())
    };
    match host {
        Some(h) if !h.is_empty() && !h.contains(char::is_whitespace) => Ok(h),
        _ => Err(CheckError::MalformedTarget(target.to_string())),
    }
}

/// Runs one check per service and turns every outcome into a verdict.
pub struct CheckDispatcher<P: Prober = NetworkProber> {
    prober: P,
    timeouts: CheckTimeouts,
}

impl CheckDispatcher<NetworkProber> {
    pub fn from_config(config: &MonitorConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            NetworkProber::new(&config.user_agent)?,
            CheckTimeouts::from(config),
        ))
    }
}

impl<P: Prober> CheckDispatcher<P> {
    pub fn new(prober: P, timeouts: CheckTimeouts) -> Self {
        Self { prober, timeouts }
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    /// Returns the health verdict of `service`. Never fails: every error is
    /// logged with context and reported as unhealthy.
    pub async fn check(&self, service: &Service) -> bool {
        let start_time = Instant::now();
        match self.run_check(service).await {
            Ok(()) => {
                info!(
                    service = %service.name,
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "Check passed."
                );
                true
            }
            Err(e) => {
                warn!(
                    service = %service.name,
                    target = %service.target,
                    error = %e,
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "Check failed."
                );
                false
            }
        }
    }

    /// Runs the probe for `service` and reports why it failed, if it did.
    pub async fn run_check(&self, service: &Service) -> Result<(), CheckError> {
        let kind = service.kind.clone()?;
        debug!(service = %service.name, kind = %kind, "Running check.");
        match kind {
            CheckKind::Tcp => self.tcp(&service.target).await,
            CheckKind::Ping => self.ping(&service.target).await,
            CheckKind::Http => self.http(&service.target).await,
        }
    }

    pub async fn tcp(&self, target: &str) -> Result<(), CheckError> {
        let (host, port) = parse_tcp_target(target)?;
        self.prober.tcp_connect(host, port, self.timeouts.tcp).await
    }

    pub async fn ping(&self, target: &str) -> Result<(), CheckError> {
        let host = ping_host(target)?;
        let rtt = self.prober.ping(&host, self.timeouts.ping).await?;
        debug!(host = %host, rtt_ms = rtt.as_millis() as u64, "Ping reply received.");
        Ok(())
    }

    /// Any status below 400 counts as healthy, redirects included.
    pub async fn http(&self, target: &str) -> Result<(), CheckError> {
        let status = self.prober.http_get(target, self.timeouts.http).await?;
        if status < 400 {
            Ok(())
        } else {
            Err(CheckError::BadStatus(status))
        }
    }
}
