use std::time::Duration;

use crate::protocol::Semantics;


#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// UDP port to listen on; 0 lets the OS pick one (used by tests).
    pub port: u16,
    pub semantics: Semantics,
    /// Probability in [0,1] of dropping an outbound datagram; 0 disables loss simulation.
    pub loss_rate: f64,
    pub loss_seed: u64,
    /// Facilities preloaded at startup. Bookings only ever refer to these.
    pub facilities: Vec<String>,
}

impl ServerConfig {
    pub fn new(port: u16) -> ServerConfig {
        ServerConfig {
            port,
            semantics: Semantics::AtMostOnce,
            loss_rate: 0.0,
            loss_seed: 42,
            facilities: vec!["RoomA".to_string(), "RoomB".to_string(), "LT1".to_string()],
        }
    }
}


#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_host: String,
    pub server_port: u16,
    /// Tag put on outgoing requests. Informational to the server, which follows its own
    ///  configured mode.
    pub semantics: Semantics,
    pub loss_rate: f64,
    pub loss_seed: u64,
    /// How long to wait for a matching reply before retransmitting.
    pub retry_timeout: Duration,
    /// Consecutive timeouts before an operation fails with NoReply.
    pub max_retries: u32,
}

impl ClientConfig {
    pub fn new(server_host: impl Into<String>, server_port: u16) -> ClientConfig {
        ClientConfig {
            server_host: server_host.into(),
            server_port,
            semantics: Semantics::AtMostOnce,
            loss_rate: 0.0,
            loss_seed: 777,
            retry_timeout: Duration::from_secs(1),
            max_retries: 8,
        }
    }
}
