//! Network health check
//!
//! A set of well-known hostnames must resolve to as many distinct IPv4 addresses as there are
//! hostnames. Fewer distinct addresses means a captive portal, transparent proxy or DNS hijack is
//! answering for everyone, and anything fetched would be garbage. The check is throttled to run on
//! the first item and then once every `interval_items` items.

use crate::config::HealthCheckConfig;
use crate::error::{ProcessError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hostname resolution seam
#[async_trait]
pub trait Resolver: Send + Sync {
    /// First IPv4 address of `host`
    async fn resolve(&self, host: &str) -> std::io::Result<Ipv4Addr>;
}

/// Resolver backed by the system resolver
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<Ipv4Addr> {
        tokio::net::lookup_host((host, 80))
            .await?
            .find_map(|addr| match addr.ip() {
                std::net::IpAddr::V4(v4) => Some(v4),
                std::net::IpAddr::V6(_) => None,
            })
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{host} has no IPv4 address"),
                )
            })
    }
}

/// Throttled health check shared by all pipelines of a process
pub struct HealthCheck {
    config: HealthCheckConfig,
    resolver: Arc<dyn Resolver>,
    items_seen: AtomicU64,
}

impl HealthCheck {
    /// Create a health check using the given resolver
    pub fn new(config: HealthCheckConfig, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            config,
            resolver,
            items_seen: AtomicU64::new(0),
        }
    }

    /// Count one item and run the check if it is due
    pub async fn check_if_due(&self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let seen = self.items_seen.fetch_add(1, Ordering::SeqCst);
        if seen % self.config.interval_items.max(1) != 0 {
            return Ok(());
        }
        self.check().await
    }

    /// Resolve every hostname and require all addresses to be distinct
    pub async fn check(&self) -> Result<()> {
        let mut addresses = HashSet::new();
        for host in &self.config.hostnames {
            match self.resolver.resolve(host).await {
                Ok(ip) => {
                    tracing::debug!(host = %host, ip = %ip, "resolved health check host");
                    addresses.insert(ip);
                }
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "health check host did not resolve");
                }
            }
        }

        let expected = self.config.hostnames.len();
        if addresses.len() < expected {
            tracing::error!(
                distinct = addresses.len(),
                expected,
                "network health check failed"
            );
            return Err(ProcessError::NetworkIntercepted {
                distinct: addresses.len(),
                expected,
            }
            .into());
        }
        Ok(())
    }
}
