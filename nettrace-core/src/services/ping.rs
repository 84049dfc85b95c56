//! ICMP echo driver.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use futures::stream::FuturesOrdered;
use log::{debug, info, warn};
use tokio::sync::{Semaphore, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::icmp::{IcmpProber, ProbeReply, ProbeRequest, next_identifier};
use super::{resolve_host, validate_host};
use crate::error::{ErrorCode, NetTraceResult};
use crate::retry::RetryPolicy;
use crate::types::{NetworkHost, PingOptions, PingResult, ProbeError};

/// Results buffered ahead of a slow consumer.
const CHANNEL_CAPACITY: usize = 32;

/// Validate, resolve once, then stream one [`PingResult`] per echo request.
///
/// The returned receiver closes after `options.count` results or when `cancel` fires.
pub(crate) async fn ping(
    prober: Arc<dyn IcmpProber>,
    semaphore: Arc<Semaphore>,
    policy: RetryPolicy,
    cancel: CancellationToken,
    host: &str,
    options: PingOptions,
) -> NetTraceResult<mpsc::Receiver<PingResult>> {
    options.validate()?;
    let hostname = validate_host(host, ErrorCode::PingValidationFailed)?;
    let ip = resolve_host(&cancel, policy, &hostname, options.ipv6).await?;

    info!(
        "[PING] {} ({}): {} requests, {} data bytes",
        hostname, ip, options.count, options.packet_size
    );

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let target = NetworkHost::new(hostname, ip);
    tokio::spawn(async move {
        let _permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };
        run_probes(prober, cancel, target, options, tx).await;
    });

    Ok(rx)
}

async fn run_probes(
    prober: Arc<dyn IcmpProber>,
    cancel: CancellationToken,
    target: NetworkHost,
    options: PingOptions,
    tx: mpsc::Sender<PingResult>,
) {
    let identifier = next_identifier();
    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut in_flight = FuturesOrdered::new();
    let mut sent: u32 = 0;

    loop {
        let can_send = sent < options.count;
        if !can_send && in_flight.is_empty() {
            break;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("[PING] {} cancelled after {} requests", target, sent);
                return;
            }
            Some(result) = in_flight.next(), if !in_flight.is_empty() => {
                if cancel.is_cancelled() || tx.send(result).await.is_err() {
                    return;
                }
            }
            _ = ticker.tick(), if can_send => {
                sent += 1;
                // count is capped at 10 000, so the sequence never wraps
                #[allow(clippy::cast_possible_truncation)]
                let sequence = sent as u16;
                let request = ProbeRequest {
                    target: target.ip,
                    ttl: options.ttl,
                    identifier,
                    sequence,
                    payload_size: options.packet_size,
                    timeout: options.timeout,
                };
                in_flight.push_back(probe_once(prober.clone(), target.clone(), request));
            }
        }
    }

    debug!("[PING] {} finished, {} requests sent", target, sent);
}

/// Send one echo request and turn whatever happens into a [`PingResult`].
async fn probe_once(
    prober: Arc<dyn IcmpProber>,
    host: NetworkHost,
    request: ProbeRequest,
) -> PingResult {
    let timestamp = Utc::now();
    let outcome = tokio::time::timeout(request.timeout, prober.probe(request)).await;

    let (rtt, ttl, error) = match outcome {
        Ok(Ok(Some(ProbeReply::Echo { rtt, ttl, .. }))) => (Some(rtt), ttl, None),
        Ok(Ok(Some(ProbeReply::Unreachable { from, code, .. }))) => (
            None,
            None,
            Some(ProbeError::Unreachable(unreachable_reason(from, code))),
        ),
        Ok(Ok(Some(ProbeReply::TimeExceeded { from, .. }))) => (
            None,
            None,
            Some(ProbeError::Unreachable(format!("time to live exceeded at {from}"))),
        ),
        Ok(Ok(None)) | Err(_) => (None, None, Some(ProbeError::Timeout)),
        Ok(Err(e)) => {
            warn!("[PING] Request {} to {} failed: {}", request.sequence, host, e);
            (None, None, Some(ProbeError::Io(e.to_string())))
        }
    };

    PingResult {
        host,
        sequence: request.sequence,
        rtt,
        ttl,
        size: request.payload_size,
        timestamp,
        error,
    }
}

/// Human-readable text for an ICMP destination-unreachable code.
fn unreachable_reason(from: IpAddr, code: u8) -> String {
    let reason = match (from.is_ipv6(), code) {
        (false, 0) => "network unreachable",
        (false, 1) | (true, 3) => "host unreachable",
        (false, 2) => "protocol unreachable",
        (false, 3) | (true, 4) => "port unreachable",
        (false, 13) | (true, 1) => "communication administratively prohibited",
        (true, 0) => "no route to destination",
        _ => "destination unreachable",
    };
    format!("{reason} (from {from}, code {code})")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    /// Answers every request after `delay`, or never when `delay` is `None`.
    struct ScriptedProber {
        delay: Option<Duration>,
        seen: Mutex<Vec<u16>>,
    }

    #[async_trait]
    impl IcmpProber for ScriptedProber {
        async fn probe(&self, request: ProbeRequest) -> io::Result<Option<ProbeReply>> {
            self.seen.lock().unwrap().push(request.sequence);
            match self.delay {
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(Some(ProbeReply::Echo {
                        from: request.target,
                        rtt: delay,
                        ttl: Some(57),
                    }))
                }
                None => std::future::pending().await,
            }
        }
    }

    fn prober(delay: Option<Duration>) -> Arc<ScriptedProber> {
        Arc::new(ScriptedProber {
            delay,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn options(count: u32) -> PingOptions {
        PingOptions {
            count,
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(100),
            ..PingOptions::default()
        }
    }

    async fn start(
        prober: Arc<ScriptedProber>,
        cancel: CancellationToken,
        host: &str,
        options: PingOptions,
    ) -> NetTraceResult<mpsc::Receiver<PingResult>> {
        ping(
            prober,
            Arc::new(Semaphore::new(1)),
            RetryPolicy::no_retry(Duration::from_secs(1)),
            cancel,
            host,
            options,
        )
        .await
    }

    #[tokio::test]
    async fn test_results_arrive_in_sequence_order() {
        let mut rx = start(
            prober(Some(Duration::from_millis(5))),
            CancellationToken::new(),
            "192.0.2.1",
            options(4),
        )
        .await
        .unwrap();

        let mut sequences = Vec::new();
        while let Some(result) = rx.recv().await {
            assert!(result.is_success());
            assert_eq!(result.ttl, Some(57));
            sequences.push(result.sequence);
        }
        assert_eq!(sequences, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_timeouts_are_results() {
        let mut rx = start(
            prober(None),
            CancellationToken::new(),
            "203.0.113.1",
            options(3),
        )
        .await
        .unwrap();

        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        assert_eq!(results.len(), 3);
        assert!(
            results
                .iter()
                .all(|r| r.error.as_ref().is_some_and(ProbeError::is_timeout))
        );
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_before_probing() {
        let scripted = prober(None);
        let err = start(
            scripted.clone(),
            CancellationToken::new(),
            "192.0.2.1",
            options(0),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PingValidationFailed);
        assert!(scripted.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_closes_stream() {
        let cancel = CancellationToken::new();
        let mut rx = start(
            prober(Some(Duration::from_millis(1))),
            cancel.clone(),
            "192.0.2.1",
            PingOptions {
                count: 1000,
                interval: Duration::from_millis(20),
                ..options(1000)
            },
        )
        .await
        .unwrap();

        assert!(rx.recv().await.is_some());
        cancel.cancel();

        let mut remaining = 0;
        while rx.recv().await.is_some() {
            remaining += 1;
        }
        // At most what was already buffered when the token fired.
        assert!(remaining < CHANNEL_CAPACITY);
    }

    #[test]
    fn test_unreachable_reason() {
        let from: IpAddr = "192.0.2.254".parse().unwrap();
        assert!(unreachable_reason(from, 1).starts_with("host unreachable"));
        let from6: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(unreachable_reason(from6, 4).starts_with("port unreachable"));
    }

    #[tokio::test]
    #[ignore = "requires network access and ICMP socket permission"]
    async fn test_ping_localhost() {
        let mut rx = ping(
            Arc::new(crate::services::icmp::SystemProber),
            Arc::new(Semaphore::new(1)),
            RetryPolicy::no_retry(Duration::from_secs(2)),
            CancellationToken::new(),
            "127.0.0.1",
            options(2),
        )
        .await
        .unwrap();
        let first = rx.recv().await.unwrap();
        assert!(first.is_success(), "{:?}", first.error);
    }
}
