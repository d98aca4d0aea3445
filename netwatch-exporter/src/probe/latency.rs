//! ICMP latency probe
//!
//! Sends `count` echo requests and reports the mean round trip of the
//! replies received. Two backends:
//! - datagram ICMP socket, measured directly (no privileges needed where the
//!   platform allows it)
//! - the system `ping` command, whose summary line is parsed
//!
//! `auto` prefers the socket and falls back to the command when the socket
//! cannot be opened or the host has no IPv4 address.

use super::icmp::IcmpSocket;
use super::{ProbeError, ProbeResult};
use crate::config::{LatencyConfig, LatencyMethod};
use std::net::{IpAddr, Ipv4Addr};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

pub struct LatencyProbe {
    config: LatencyConfig,
    sequence: AtomicU16,
    socket_unavailable: AtomicBool,
}

impl LatencyProbe {
    pub fn new(config: LatencyConfig) -> Self {
        Self {
            config,
            sequence: AtomicU16::new(0),
            socket_unavailable: AtomicBool::new(false),
        }
    }

    /// Average round trip to `host`, bounded by the overall timeout
    pub async fn measure(&self, host: &str) -> ProbeResult {
        let overall = Duration::from_secs(self.config.overall_timeout_secs);

        match timeout(overall, self.measure_with_method(host)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(overall)),
        }
    }

    async fn measure_with_method(&self, host: &str) -> ProbeResult {
        match self.config.method {
            LatencyMethod::Command => self.ping_command(host).await,
            LatencyMethod::Socket => {
                let addr = resolve_ipv4(host).await?;
                let socket = IcmpSocket::open().map_err(ProbeError::Icmp)?;
                self.echo_series(&socket, addr).await
            }
            LatencyMethod::Auto => {
                if !self.socket_unavailable.load(Ordering::Relaxed) {
                    match resolve_ipv4(host).await {
                        Ok(addr) => match IcmpSocket::open() {
                            Ok(socket) => return self.echo_series(&socket, addr).await,
                            Err(e) => {
                                info!("ICMP datagram socket unavailable ({}), using ping command", e);
                                self.socket_unavailable.store(true, Ordering::Relaxed);
                            }
                        },
                        Err(ProbeError::NoAddress(_)) => {
                            debug!("{} has no IPv4 address, using ping command", host);
                        }
                        Err(e) => return Err(e),
                    }
                }
                self.ping_command(host).await
            }
        }
    }

    async fn echo_series(&self, socket: &IcmpSocket, addr: Ipv4Addr) -> ProbeResult {
        let wait = Duration::from_secs(self.config.attempt_timeout_secs);
        let mut attempts = Vec::with_capacity(self.config.count as usize);

        for _ in 0..self.config.count {
            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
            let reply = socket.echo(addr, sequence, wait).await.map_err(ProbeError::Icmp)?;
            if reply.is_none() {
                debug!("echo {} to {} timed out", sequence, addr);
            }
            attempts.push(reply);
        }

        mean_round_trip(&attempts)
    }

    async fn ping_command(&self, host: &str) -> ProbeResult {
        let count = self.config.count.to_string();
        // macOS ping takes -W in milliseconds, iputils in seconds
        let wait = if cfg!(target_os = "macos") {
            (self.config.attempt_timeout_secs * 1000).to_string()
        } else {
            self.config.attempt_timeout_secs.to_string()
        };

        let output = Command::new("ping")
            .args(["-c", &count, "-W", &wait, host])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeError::Command(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Some(avg_ms) = parse_ping_average(&stdout) {
            return Ok(Duration::from_secs_f64(avg_ms / 1000.0));
        }

        if output.status.success() {
            Err(ProbeError::Parse)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ProbeError::Command(format!("{}: {}", output.status, stderr.trim())))
        }
    }
}

/// Mean round trip over the attempts that got a reply; lost attempts are
/// left out of the mean
fn mean_round_trip(attempts: &[Option<Duration>]) -> ProbeResult {
    let replies: Vec<Duration> = attempts.iter().flatten().copied().collect();
    if replies.is_empty() {
        return Err(ProbeError::NoReply);
    }
    let total: Duration = replies.iter().sum();
    Ok(total / replies.len() as u32)
}

/// Extract the `avg` statistic (milliseconds) from `ping` output.
///
/// Handles the iputils (`rtt min/avg/max/mdev = …`), BSD/macOS and busybox
/// (`round-trip min/avg/max… = …`) summary lines.
pub fn parse_ping_average(output: &str) -> Option<f64> {
    output
        .lines()
        .find(|line| line.contains("avg"))
        .and_then(|line| line.split('=').nth(1))
        .and_then(|stats| stats.trim().split('/').nth(1))
        .and_then(|avg| avg.trim().parse::<f64>().ok())
        .filter(|avg| avg.is_finite() && *avg >= 0.0)
}

async fn resolve_ipv4(host: &str) -> Result<Ipv4Addr, ProbeError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) => Ok(v4),
            IpAddr::V6(_) => Err(ProbeError::NoAddress(host.to_string())),
        };
    }

    let addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|source| ProbeError::Resolve { host: host.to_string(), source })?;

    addrs
        .filter_map(|addr| match addr.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| ProbeError::NoAddress(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::gauge_value;

    const IPUTILS_OUTPUT: &str = "\
PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.
64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=11.2 ms
64 bytes from 8.8.8.8: icmp_seq=2 ttl=117 time=10.9 ms
64 bytes from 8.8.8.8: icmp_seq=3 ttl=117 time=11.5 ms

--- 8.8.8.8 ping statistics ---
3 packets transmitted, 3 received, 0% packet loss, time 2003ms
rtt min/avg/max/mdev = 10.912/11.203/11.514/0.245 ms
";

    const MACOS_OUTPUT: &str = "\
PING 1.1.1.1 (1.1.1.1): 56 data bytes
64 bytes from 1.1.1.1: icmp_seq=0 ttl=57 time=8.410 ms

--- 1.1.1.1 ping statistics ---
3 packets transmitted, 3 packets received, 0.0% packet loss
round-trip min/avg/max/stddev = 8.100/8.532/9.001/0.370 ms
";

    const BUSYBOX_OUTPUT: &str = "\
--- github.com ping statistics ---
3 packets transmitted, 3 packets received, 0% packet loss
round-trip min/avg/max = 20.1/21.4/22.9 ms
";

    const ALL_LOST_OUTPUT: &str = "\
PING 10.255.255.1 (10.255.255.1) 56(84) bytes of data.

--- 10.255.255.1 ping statistics ---
3 packets transmitted, 0 received, 100% packet loss, time 2047ms
";

    fn config(method: LatencyMethod) -> LatencyConfig {
        LatencyConfig { method, ..LatencyConfig::default() }
    }

    #[test]
    fn test_parse_ping_average() {
        assert_eq!(parse_ping_average(IPUTILS_OUTPUT), Some(11.203));
        assert_eq!(parse_ping_average(MACOS_OUTPUT), Some(8.532));
        assert_eq!(parse_ping_average(BUSYBOX_OUTPUT), Some(21.4));
    }

    #[test]
    fn test_parse_ping_average_failures() {
        assert_eq!(parse_ping_average(ALL_LOST_OUTPUT), None);
        assert_eq!(parse_ping_average(""), None);
        assert_eq!(parse_ping_average("rtt min/avg/max/mdev = garbage"), None);
        assert_eq!(parse_ping_average("rtt min/avg/max/mdev = 1/-2/3/0 ms"), None);
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_zero() {
        for method in [LatencyMethod::Auto, LatencyMethod::Socket, LatencyMethod::Command] {
            let probe = LatencyProbe::new(config(method));
            let result = probe.measure("does-not-exist.invalid").await;
            assert!(result.is_err(), "{:?} should fail", method);
            assert_eq!(gauge_value(&result), 0.0);
        }
    }

    #[tokio::test]
    async fn test_ipv6_literal_rejected_by_socket_method() {
        let probe = LatencyProbe::new(config(LatencyMethod::Socket));
        let result = probe.measure("::1").await;
        assert!(matches!(result, Err(ProbeError::NoAddress(_))));
    }

    #[test]
    fn test_mean_over_all_replies() {
        let attempts = [
            Some(Duration::from_millis(10)),
            Some(Duration::from_millis(12)),
            Some(Duration::from_millis(14)),
        ];
        let result = mean_round_trip(&attempts);
        assert_eq!(result.as_ref().ok(), Some(&Duration::from_millis(12)));
        assert_eq!(gauge_value(&result), 12.0);
    }

    #[test]
    fn test_lost_attempt_excluded_from_mean() {
        let attempts = [Some(Duration::from_millis(10)), None, Some(Duration::from_millis(20))];
        let result = mean_round_trip(&attempts);
        // 15ms, not 10ms as it would be when counting the lost attempt as zero
        assert_eq!(gauge_value(&result), 15.0);
    }

    #[test]
    fn test_no_replies_is_failure() {
        let result = mean_round_trip(&[None, None, None]);
        assert!(matches!(result, Err(ProbeError::NoReply)));
        assert_eq!(gauge_value(&result), 0.0);

        assert!(matches!(mean_round_trip(&[]), Err(ProbeError::NoReply)));
    }

    #[tokio::test]
    async fn test_overall_timeout_bounds_measurement() {
        let probe = LatencyProbe::new(LatencyConfig {
            method: LatencyMethod::Command,
            count: 3,
            attempt_timeout_secs: 5,
            overall_timeout_secs: 1,
        });

        let start = std::time::Instant::now();
        // TEST-NET-3 address, never answers
        let result = probe.measure("203.0.113.1").await;
        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(gauge_value(&result), 0.0);
    }
}
