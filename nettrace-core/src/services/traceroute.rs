//! TTL-stepping path discovery over ICMP echo.

use std::net::IpAddr;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use super::icmp::{IcmpProber, ProbeReply, ProbeRequest, next_identifier};
use super::{resolve_host, validate_host};
use crate::error::{ErrorCode, NetTraceResult};
use crate::retry::RetryPolicy;
use crate::types::{TraceHop, TraceOptions};

const CHANNEL_CAPACITY: usize = 16;

/// Validate, resolve the destination, then stream one [`TraceHop`] per TTL.
///
/// The stream ends at the destination, after `max_hops`, or on cancellation.
/// A hop interrupted by cancellation is not emitted.
pub(crate) async fn traceroute(
    prober: Arc<dyn IcmpProber>,
    semaphore: Arc<Semaphore>,
    policy: RetryPolicy,
    cancel: CancellationToken,
    host: &str,
    options: TraceOptions,
) -> NetTraceResult<mpsc::Receiver<TraceHop>> {
    options.validate()?;
    let hostname = validate_host(host, ErrorCode::TracerouteValidationFailed)?;
    let destination = resolve_host(&cancel, policy, &hostname, options.ipv6).await?;

    info!(
        "[TRACE] traceroute to {} ({}), {} hops max, {} byte packets",
        hostname, destination, options.max_hops, options.packet_size
    );

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let _permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };
        walk_path(prober, cancel, destination, options, tx).await;
    });

    Ok(rx)
}

async fn walk_path(
    prober: Arc<dyn IcmpProber>,
    cancel: CancellationToken,
    destination: IpAddr,
    options: TraceOptions,
    tx: mpsc::Sender<TraceHop>,
) {
    let identifier = next_identifier();
    let mut sequence: u16 = 0;

    for ttl in 1..=options.max_hops {
        let probes: Vec<_> = (0..options.queries)
            .map(|_| {
                sequence = sequence.wrapping_add(1);
                let request = ProbeRequest {
                    target: destination,
                    ttl,
                    identifier,
                    sequence,
                    payload_size: options.packet_size,
                    timeout: options.timeout,
                };
                probe_hop(prober.clone(), request)
            })
            .collect();

        let replies = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("[TRACE] {} cancelled at hop {}", destination, ttl);
                return;
            }
            replies = join_all(probes) => replies,
        };

        let hop = build_hop(ttl, destination, &replies);
        let reached = hop.reached;
        debug!(
            "[TRACE] hop {:>2}: {}",
            ttl,
            hop.address.map_or_else(|| "*".to_string(), |a| a.to_string())
        );

        if cancel.is_cancelled() || tx.send(hop).await.is_err() {
            return;
        }
        if reached {
            debug!("[TRACE] reached {} after {} hops", destination, ttl);
            return;
        }
    }

    debug!(
        "[TRACE] {} not reached within {} hops",
        destination, options.max_hops
    );
}

async fn probe_hop(prober: Arc<dyn IcmpProber>, request: ProbeRequest) -> Option<ProbeReply> {
    match tokio::time::timeout(request.timeout, prober.probe(request)).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            warn!(
                "[TRACE] Probe at ttl {} to {} failed: {}",
                request.ttl, request.target, e
            );
            None
        }
        Err(_) => None,
    }
}

/// Fold the replies of one TTL into a hop, keeping probe order in `rtts`.
fn build_hop(ttl: u8, destination: IpAddr, replies: &[Option<ProbeReply>]) -> TraceHop {
    let address = replies.iter().flatten().map(ProbeReply::responder).next();
    let reached = replies.iter().flatten().any(|r| r.responder() == destination);
    let rtts: Vec<_> = replies.iter().map(|r| r.map(|r| r.rtt())).collect();

    TraceHop {
        hop: ttl,
        address,
        timeout: rtts.iter().all(Option::is_none),
        rtts,
        reached,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    /// Simulated path: router `10.0.0.<ttl>` answers until `distance`, where the
    /// destination replies. `silent` TTLs never answer.
    struct PathProber {
        distance: u8,
        silent: Vec<u8>,
    }

    #[async_trait]
    impl IcmpProber for PathProber {
        async fn probe(&self, request: ProbeRequest) -> io::Result<Option<ProbeReply>> {
            if self.silent.contains(&request.ttl) {
                return Ok(None);
            }
            let rtt = Duration::from_millis(u64::from(request.ttl));
            if request.ttl >= self.distance {
                return Ok(Some(ProbeReply::Echo {
                    from: request.target,
                    rtt,
                    ttl: Some(60),
                }));
            }
            Ok(Some(ProbeReply::TimeExceeded {
                from: IpAddr::from([10, 0, 0, request.ttl]),
                rtt,
            }))
        }
    }

    fn options(max_hops: u8) -> TraceOptions {
        TraceOptions {
            max_hops,
            timeout: Duration::from_millis(50),
            ..TraceOptions::default()
        }
    }

    async fn collect(prober: PathProber, options: TraceOptions) -> Vec<TraceHop> {
        let mut rx = traceroute(
            Arc::new(prober),
            Arc::new(Semaphore::new(1)),
            RetryPolicy::no_retry(Duration::from_secs(1)),
            CancellationToken::new(),
            "198.51.100.9",
            options,
        )
        .await
        .unwrap();
        let mut hops = Vec::new();
        while let Some(hop) = rx.recv().await {
            hops.push(hop);
        }
        hops
    }

    #[tokio::test]
    async fn test_stops_at_destination() {
        let hops = collect(
            PathProber {
                distance: 4,
                silent: vec![2],
            },
            options(30),
        )
        .await;

        assert_eq!(hops.len(), 4);
        assert_eq!(
            hops.iter().map(|h| h.hop).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert!(hops[1].timeout);
        assert_eq!(hops[1].rtts, vec![None, None, None]);
        assert_eq!(hops[0].address, Some(IpAddr::from([10, 0, 0, 1])));
        assert!(hops[3].reached);
        assert_eq!(hops[3].address, Some("198.51.100.9".parse().unwrap()));
        assert!(hops[..3].iter().all(|h| !h.reached));
    }

    #[tokio::test]
    async fn test_stops_at_max_hops() {
        let hops = collect(
            PathProber {
                distance: 50,
                silent: vec![],
            },
            options(5),
        )
        .await;
        assert_eq!(hops.len(), 5);
        assert!(hops.iter().all(|h| h.rtts.len() == 3));
        assert!(!hops.iter().any(|h| h.reached));
    }

    #[tokio::test]
    async fn test_invalid_options() {
        let err = traceroute(
            Arc::new(PathProber {
                distance: 1,
                silent: vec![],
            }),
            Arc::new(Semaphore::new(1)),
            RetryPolicy::no_retry(Duration::from_secs(1)),
            CancellationToken::new(),
            "198.51.100.9",
            options(0),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TracerouteValidationFailed);
    }

    #[tokio::test]
    async fn test_cancel_before_first_hop_emits_nothing() {
        let cancel = CancellationToken::new();
        let mut rx = traceroute(
            Arc::new(PathProber {
                distance: 3,
                silent: vec![],
            }),
            Arc::new(Semaphore::new(1)),
            RetryPolicy::no_retry(Duration::from_secs(1)),
            cancel.clone(),
            "198.51.100.9",
            options(30),
        )
        .await
        .unwrap();
        cancel.cancel();
        // The spawned task may not have started yet; either way nothing follows the cancel.
        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert!(count <= 1);
    }

    #[test]
    fn test_build_hop_partial_answers() {
        let dest: IpAddr = "192.0.2.1".parse().unwrap();
        let router: IpAddr = "10.1.1.1".parse().unwrap();
        let replies = vec![
            None,
            Some(ProbeReply::TimeExceeded {
                from: router,
                rtt: Duration::from_millis(4),
            }),
            None,
        ];
        let hop = build_hop(7, dest, &replies);
        assert_eq!(hop.address, Some(router));
        assert_eq!(hop.rtts, vec![None, Some(Duration::from_millis(4)), None]);
        assert!(!hop.timeout);
        assert!(!hop.reached);
    }
}
