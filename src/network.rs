//! Network join.
//!
//! Joining is bounded: the link is polled a fixed number of times at a fixed
//! interval (20 x 1 s by default). If it never comes up the node runs offline:
//! the control surface and streaming stay disabled, local operation continues.

use anyhow::{anyhow, Result};
use std::net::{IpAddr, UdpSocket};
use std::time::Duration;

use crate::state::NetworkInfo;

pub const DEFAULT_JOIN_ATTEMPTS: u32 = 20;
pub const DEFAULT_JOIN_INTERVAL: Duration = Duration::from_secs(1);

/// Station-mode link contract.
pub trait NetworkLink {
    /// Start joining. Called once.
    fn begin(&mut self) -> Result<()>;

    /// Poll whether the link is up.
    fn is_connected(&mut self) -> bool;

    /// Address assigned to this node, once connected.
    fn local_ip(&self) -> Option<IpAddr>;
}

#[derive(Clone, Copy, Debug)]
pub struct JoinPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for JoinPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_JOIN_ATTEMPTS,
            interval: DEFAULT_JOIN_INTERVAL,
        }
    }
}

/// Join the network, giving up after `policy.attempts` polls.
///
/// `sleep` is called between polls; the daemon passes `std::thread::sleep`.
pub fn join_network(
    link: &mut dyn NetworkLink,
    policy: JoinPolicy,
    mut sleep: impl FnMut(Duration),
) -> NetworkInfo {
    if let Err(err) = link.begin() {
        log::warn!("network join could not start: {:#}", err);
        return NetworkInfo::offline();
    }
    for attempt in 1..=policy.attempts {
        if link.is_connected() {
            if let Some(ip) = link.local_ip() {
                log::info!("network joined after {} attempt(s), ip {}", attempt, ip);
                return NetworkInfo {
                    connected: true,
                    ip,
                };
            }
        }
        log::debug!("network join attempt {}/{} pending", attempt, policy.attempts);
        if attempt < policy.attempts {
            sleep(policy.interval);
        }
    }
    log::warn!(
        "network join failed after {} attempts; running offline",
        policy.attempts
    );
    NetworkInfo::offline()
}

/// Host network link: up when the host has a route to `probe_addr`.
///
/// Uses a connected UDP socket to learn the outbound interface address; no
/// packets are sent.
pub struct HostLink {
    probe_addr: String,
    ip: Option<IpAddr>,
}

impl HostLink {
    pub fn new(probe_addr: impl Into<String>) -> Self {
        Self {
            probe_addr: probe_addr.into(),
            ip: None,
        }
    }

    fn probe(&self) -> Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(&self.probe_addr)?;
        let ip = socket.local_addr()?.ip();
        if ip.is_unspecified() {
            return Err(anyhow!("no outbound interface"));
        }
        Ok(ip)
    }
}

impl NetworkLink for HostLink {
    fn begin(&mut self) -> Result<()> {
        log::info!("joining network (probe {})", self.probe_addr);
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        match self.probe() {
            Ok(ip) => {
                self.ip = Some(ip);
                true
            }
            Err(err) => {
                log::debug!("network probe failed: {:#}", err);
                false
            }
        }
    }

    fn local_ip(&self) -> Option<IpAddr> {
        self.ip
    }
}

/// Link that never comes up. Used with `--offline`.
pub struct OfflineLink;

impl NetworkLink for OfflineLink {
    fn begin(&mut self) -> Result<()> {
        Err(anyhow!("network disabled by configuration"))
    }

    fn is_connected(&mut self) -> bool {
        false
    }

    fn local_ip(&self) -> Option<IpAddr> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedLink {
        up_after: Option<u32>,
        polls: u32,
    }

    impl NetworkLink for ScriptedLink {
        fn begin(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&mut self) -> bool {
            self.polls += 1;
            self.up_after.is_some_and(|n| self.polls >= n)
        }

        fn local_ip(&self) -> Option<IpAddr> {
            Some("10.0.0.7".parse().unwrap())
        }
    }

    #[test]
    fn gives_up_after_bounded_attempts() {
        let mut link = ScriptedLink {
            up_after: None,
            polls: 0,
        };
        let mut slept = Vec::new();
        let info = join_network(&mut link, JoinPolicy::default(), |d| slept.push(d));
        assert_eq!(info, NetworkInfo::offline());
        assert_eq!(link.polls, 20);
        assert_eq!(slept.len(), 19);
        assert!(slept.iter().all(|d| *d == Duration::from_secs(1)));
    }

    #[test]
    fn returns_as_soon_as_link_is_up() {
        let mut link = ScriptedLink {
            up_after: Some(3),
            polls: 0,
        };
        let info = join_network(&mut link, JoinPolicy::default(), |_| {});
        assert!(info.connected);
        assert_eq!(info.ip.to_string(), "10.0.0.7");
        assert_eq!(link.polls, 3);
    }

    #[test]
    fn offline_link_never_polls() {
        let mut sleeps = 0;
        let info = join_network(&mut OfflineLink, JoinPolicy::default(), |_| sleeps += 1);
        assert!(!info.connected);
        assert_eq!(sleeps, 0);
    }
}
