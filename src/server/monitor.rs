use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::debug;


/// One client's registered interest in a facility. Multiple subscriptions from the same peer
///  for the same facility are independent entries.
#[derive(Debug, Clone)]
pub struct MonitorSubscription {
    pub peer: SocketAddr,
    pub facility: String,
    pub expires_at: Instant,
}

/// Registry of live monitor subscriptions. Expiry is lazy: an expired entry stays in the list
///  until the next fan-out touches it.
pub struct MonitorRegistry {
    subscriptions: Vec<MonitorSubscription>,
}

impl MonitorRegistry {
    pub fn new() -> MonitorRegistry {
        MonitorRegistry {
            subscriptions: Vec::new(),
        }
    }

    pub fn register(&mut self, peer: SocketAddr, facility: impl Into<String>, duration: Duration) {
        let facility = facility.into();
        debug!(?peer, facility, ?duration, "registering monitor subscription");
        self.subscriptions.push(MonitorSubscription {
            peer,
            facility,
            expires_at: Instant::now() + duration,
        });
    }

    /// Peers to notify about a change to `facility`. Expired subscriptions (for any facility)
    ///  are reaped in place.
    pub fn live_peers_for(&mut self, facility: &str) -> Vec<SocketAddr> {
        let now = Instant::now();
        self.subscriptions.retain(|s| {
            let live = now <= s.expires_at;
            if !live {
                debug!(peer = ?s.peer, facility = s.facility, "reaping expired monitor subscription");
            }
            live
        });
        self.subscriptions
            .iter()
            .filter(|s| s.facility == facility)
            .map(|s| s.peer)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl Default for MonitorRegistry {
    fn default() -> Self {
        MonitorRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddrV4};

    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, port).into()
    }

    #[test]
    fn test_matching_subscriptions_receive_fanout() {
        let mut reg = MonitorRegistry::new();
        reg.register(peer(1000), "RoomA", Duration::from_secs(60));
        reg.register(peer(2000), "RoomB", Duration::from_secs(60));
        reg.register(peer(3000), "RoomA", Duration::from_secs(60));

        assert_eq!(reg.live_peers_for("RoomA"), vec![peer(1000), peer(3000)]);
        assert_eq!(reg.live_peers_for("RoomB"), vec![peer(2000)]);
        assert_eq!(reg.live_peers_for("LT1"), Vec::<SocketAddr>::new());
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_expired_subscriptions_are_reaped() {
        let mut reg = MonitorRegistry::new();
        reg.register(peer(1000), "RoomA", Duration::ZERO);
        reg.register(peer(2000), "RoomA", Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(5));

        // first fan-out after expiry drops the entry, even when fanning out for another facility
        assert_eq!(reg.live_peers_for("RoomB"), Vec::<SocketAddr>::new());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.live_peers_for("RoomA"), vec![peer(2000)]);
    }

    #[test]
    fn test_same_peer_same_facility_is_independent() {
        let mut reg = MonitorRegistry::new();
        reg.register(peer(1000), "RoomA", Duration::from_secs(60));
        reg.register(peer(1000), "RoomA", Duration::from_secs(60));

        assert_eq!(reg.live_peers_for("RoomA").len(), 2);
    }
}
