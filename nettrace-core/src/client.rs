//! Unified network client.
//!
//! [`NetTraceClient`] owns the shared configuration, the injected protocol
//! backends and one global semaphore bounding how many operations run at once.
//! It is cheap to clone and safe to share across tasks.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio::sync::{Semaphore, SemaphorePermit, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::NetworkConfig;
use crate::error::{ErrorCode, NetTraceError, NetTraceResult};
use crate::limiter::ConcurrencyLimiter;
use crate::retry::RetryPolicy;
use crate::services::dns::{self, DnsBackend, HickoryBackend};
use crate::services::icmp::{IcmpProber, SystemProber};
use crate::services::whois::{self, TcpWhoisTransport, WhoisTransport};
use crate::services::{ping, ssl, traceroute};
use crate::types::{
    DnsRecordType, DnsResult, PingOptions, PingResult, SslResult, TraceHop, TraceOptions,
    WhoisResult,
};

/// Every diagnostic operation the engine offers.
///
/// Streaming operations return once the target is validated and resolved;
/// results then arrive on the receiver, which closes when the run ends or
/// `cancel` fires. Non-streaming operations return `CANCELLED` when `cancel`
/// fires first.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    async fn ping(
        &self,
        cancel: CancellationToken,
        host: &str,
        options: PingOptions,
    ) -> NetTraceResult<mpsc::Receiver<PingResult>>;

    async fn traceroute(
        &self,
        cancel: CancellationToken,
        host: &str,
        options: TraceOptions,
    ) -> NetTraceResult<mpsc::Receiver<TraceHop>>;

    async fn dns_lookup(
        &self,
        cancel: CancellationToken,
        domain: &str,
        record_type: DnsRecordType,
    ) -> NetTraceResult<DnsResult>;

    /// Query several record types concurrently; an empty slice means the default set.
    async fn dns_lookup_many(
        &self,
        cancel: CancellationToken,
        domain: &str,
        record_types: &[DnsRecordType],
    ) -> NetTraceResult<DnsResult>;

    async fn whois_lookup(&self, cancel: CancellationToken, query: &str)
    -> NetTraceResult<WhoisResult>;

    async fn ssl_check(
        &self,
        cancel: CancellationToken,
        host: &str,
        port: u16,
    ) -> NetTraceResult<SslResult>;
}

struct ClientContext {
    config: NetworkConfig,
    policy: RetryPolicy,
    prober: Arc<dyn IcmpProber>,
    dns: Arc<dyn DnsBackend>,
    whois: Arc<dyn WhoisTransport>,
    semaphore: Arc<Semaphore>,
    dns_limiter: ConcurrencyLimiter,
}

/// The production [`NetworkClient`].
///
/// ```rust,no_run
/// use nettrace_core::{NetTraceClient, NetworkClient, NetworkConfig, DnsRecordType};
/// use tokio_util::sync::CancellationToken;
/// # async fn demo() -> nettrace_core::NetTraceResult<()> {
/// let client = NetTraceClient::new(NetworkConfig::default())?;
/// let result = client
///     .dns_lookup(CancellationToken::new(), "example.com", DnsRecordType::A)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NetTraceClient {
    ctx: Arc<ClientContext>,
}

impl NetTraceClient {
    /// Client with the system ICMP, DNS and WHOIS backends.
    pub fn new(config: NetworkConfig) -> NetTraceResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: NetworkConfig) -> NetTraceClientBuilder {
        NetTraceClientBuilder {
            config,
            prober: None,
            dns: None,
            whois: None,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.ctx.config
    }

    /// Global permits currently free.
    pub fn available_permits(&self) -> usize {
        self.ctx.semaphore.available_permits()
    }

    /// Wait for a global permit, giving up when `cancel` fires.
    async fn permit(
        &self,
        cancel: &CancellationToken,
        operation: &str,
    ) -> NetTraceResult<SemaphorePermit<'_>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(NetTraceError::cancelled(operation)),
            permit = self.ctx.semaphore.acquire() => permit.map_err(|e| {
                NetTraceError::system(ErrorCode::Internal, "Operation semaphore closed")
                    .with_source(e)
            }),
        }
    }
}

impl std::fmt::Debug for NetTraceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetTraceClient")
            .field("config", &self.ctx.config)
            .field("available_permits", &self.available_permits())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl NetworkClient for NetTraceClient {
    async fn ping(
        &self,
        cancel: CancellationToken,
        host: &str,
        options: PingOptions,
    ) -> NetTraceResult<mpsc::Receiver<PingResult>> {
        ping::ping(
            Arc::clone(&self.ctx.prober),
            Arc::clone(&self.ctx.semaphore),
            self.ctx.policy,
            cancel,
            host,
            options,
        )
        .await
    }

    async fn traceroute(
        &self,
        cancel: CancellationToken,
        host: &str,
        options: TraceOptions,
    ) -> NetTraceResult<mpsc::Receiver<TraceHop>> {
        traceroute::traceroute(
            Arc::clone(&self.ctx.prober),
            Arc::clone(&self.ctx.semaphore),
            self.ctx.policy,
            cancel,
            host,
            options,
        )
        .await
    }

    async fn dns_lookup(
        &self,
        cancel: CancellationToken,
        domain: &str,
        record_type: DnsRecordType,
    ) -> NetTraceResult<DnsResult> {
        let _permit = self.permit(&cancel, "dns").await?;
        dns::lookup(
            self.ctx.dns.as_ref(),
            self.ctx.policy,
            &cancel,
            domain,
            record_type,
        )
        .await
    }

    async fn dns_lookup_many(
        &self,
        cancel: CancellationToken,
        domain: &str,
        record_types: &[DnsRecordType],
    ) -> NetTraceResult<DnsResult> {
        let _permit = self.permit(&cancel, "dns").await?;
        dns::lookup_many(
            Arc::clone(&self.ctx.dns),
            &self.ctx.dns_limiter,
            self.ctx.policy,
            &cancel,
            domain,
            record_types,
        )
        .await
    }

    async fn whois_lookup(
        &self,
        cancel: CancellationToken,
        query: &str,
    ) -> NetTraceResult<WhoisResult> {
        let _permit = self.permit(&cancel, "whois").await?;
        whois::lookup(self.ctx.whois.as_ref(), self.ctx.policy, &cancel, query).await
    }

    async fn ssl_check(
        &self,
        cancel: CancellationToken,
        host: &str,
        port: u16,
    ) -> NetTraceResult<SslResult> {
        let _permit = self.permit(&cancel, "ssl").await?;
        ssl::ssl_check(&self.ctx.policy, &cancel, host, port).await
    }
}

/// Builder for [`NetTraceClient`]; backends not supplied use the system ones.
#[must_use]
pub struct NetTraceClientBuilder {
    config: NetworkConfig,
    prober: Option<Arc<dyn IcmpProber>>,
    dns: Option<Arc<dyn DnsBackend>>,
    whois: Option<Arc<dyn WhoisTransport>>,
}

impl NetTraceClientBuilder {
    pub fn prober(mut self, prober: Arc<dyn IcmpProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn dns_backend(mut self, backend: Arc<dyn DnsBackend>) -> Self {
        self.dns = Some(backend);
        self
    }

    pub fn whois_transport(mut self, transport: Arc<dyn WhoisTransport>) -> Self {
        self.whois = Some(transport);
        self
    }

    /// Validate the configuration and assemble the client.
    pub fn build(self) -> NetTraceResult<NetTraceClient> {
        self.config.validate()?;
        let config = self.config;

        let dns = self.dns.unwrap_or_else(|| {
            Arc::new(HickoryBackend::new(&config.dns_server_ips(), config.timeout))
        });
        let prober = self.prober.unwrap_or_else(|| Arc::new(SystemProber));
        let whois = self.whois.unwrap_or_else(|| Arc::new(TcpWhoisTransport));

        debug!(
            "[CLIENT] Ready: {} concurrent operations, {} DNS queries in flight, {} retries",
            config.max_concurrency, config.dns_concurrency, config.retry_attempts
        );

        Ok(NetTraceClient {
            ctx: Arc::new(ClientContext {
                policy: config.retry_policy(),
                semaphore: Arc::new(Semaphore::new(config.max_concurrency)),
                dns_limiter: ConcurrencyLimiter::new(config.dns_concurrency),
                prober,
                dns,
                whois,
                config,
            }),
        })
    }
}
