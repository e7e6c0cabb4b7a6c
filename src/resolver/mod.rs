use std::collections::HashMap;
use std::net::IpAddr;

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Reverse-DNS lookup backend.
pub trait ReverseLookup: Send + Sync {
    /// Resolve an IP address to a host name.
    fn lookup(&self, ip: IpAddr) -> impl std::future::Future<Output = Result<String>> + Send;
}

/// Reverse lookup through the operating system resolver.
///
/// `getnameinfo` blocks, so the call runs on tokio's blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLookup;

impl ReverseLookup for SystemLookup {
    async fn lookup(&self, ip: IpAddr) -> Result<String> {
        tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip))
            .await
            .context("reverse lookup task failed")?
            .with_context(|| format!("reverse lookup for {ip}"))
    }
}

/// Memoizing host resolver for sample sources.
///
/// Successful lookups are cached forever. Failures fall back to the IP's
/// string form and are not cached, so the next sample from the same address
/// retries the lookup. Owned by the single receive task, hence `&mut self`.
pub struct HostResolver<L> {
    lookup: L,
    enabled: bool,
    cache: HashMap<IpAddr, String>,
}

impl<L: ReverseLookup> HostResolver<L> {
    pub fn new(lookup: L, enabled: bool) -> Self {
        Self {
            lookup,
            enabled,
            cache: HashMap::with_capacity(64),
        }
    }

    /// Returns the host name for `ip`, or its string form if unresolvable.
    pub async fn resolve(&mut self, ip: IpAddr) -> String {
        if !self.enabled {
            return ip.to_string();
        }

        if let Some(host) = self.cache.get(&ip) {
            return host.clone();
        }

        match self.lookup.lookup(ip).await {
            Ok(host) => {
                debug!(%ip, host = %host, "resolved sample source");
                self.cache.insert(ip, host.clone());
                host
            }
            Err(e) => {
                warn!(%ip, error = %e, "host lookup failed, using address");
                ip.to_string()
            }
        }
    }

    /// Number of cached entries.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::bail;

    use super::*;

    #[derive(Clone, Default)]
    struct CountingLookup {
        calls: Arc<AtomicUsize>,
        failing: Arc<AtomicBool>,
    }

    impl ReverseLookup for CountingLookup {
        async fn lookup(&self, ip: IpAddr) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                bail!("resolver unavailable");
            }
            Ok(format!("host-{ip}"))
        }
    }

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

    #[tokio::test]
    async fn test_second_resolve_hits_cache() {
        let lookup = CountingLookup::default();
        let mut resolver = HostResolver::new(lookup.clone(), true);

        assert_eq!(resolver.resolve(IP).await, "host-10.0.0.7");
        assert_eq!(resolver.resolve(IP).await, "host-10.0.0.7");

        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.cached(), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_falls_back_and_is_retried() {
        let lookup = CountingLookup::default();
        lookup.failing.store(true, Ordering::SeqCst);
        let mut resolver = HostResolver::new(lookup.clone(), true);

        assert_eq!(resolver.resolve(IP).await, "10.0.0.7");
        assert_eq!(resolver.cached(), 0);

        lookup.failing.store(false, Ordering::SeqCst);
        assert_eq!(resolver.resolve(IP).await, "host-10.0.0.7");
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.cached(), 1);
    }

    #[tokio::test]
    async fn test_disabled_resolver_skips_lookup() {
        let lookup = CountingLookup::default();
        let mut resolver = HostResolver::new(lookup.clone(), false);

        assert_eq!(resolver.resolve(IP).await, "10.0.0.7");
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }
}
