use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use crate::booking::timeslot::Slot;
use crate::config::ClientConfig;
use crate::protocol::wire::{put_string, string_len, try_get_string, DecodeError};
use crate::protocol::{Message, Opcode, Semantics, MAX_DATAGRAM_SIZE};
use crate::util::fresh_request_id;
use crate::util::loss::LossSimulator;


#[derive(Debug, Error)]
pub enum ClientError {
    /// The request went unanswered for the configured number of attempts. With loss simulation
    ///  on, this does not mean the server never executed it.
    #[error("no reply after {0} attempts")]
    NoReply(u32),
    #[error("malformed reply: {0}")]
    BadReply(#[from] DecodeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Outcome of one request/reply exchange: the flags bit and the single string payload every
///  reply carries.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Reply {
    pub error: bool,
    pub text: String,
}


/// Synchronous request/reply client. One operation at a time: fingerprint the request with a
///  fresh id, transmit (subject to loss simulation), and wait for the matching reply -
///  retransmitting the identical bytes on timeout. Datagrams with a different request id
///  (late replies, monitor updates outside monitor mode) are discarded and the wait continues.
pub struct Client {
    socket: UdpSocket,
    semantics: Semantics,
    loss: LossSimulator,
    retry_timeout: Duration,
    max_retries: u32,
}

impl Client {
    pub async fn connect(config: &ClientConfig) -> anyhow::Result<Client> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket
            .connect((config.server_host.as_str(), config.server_port))
            .await?;
        debug!(server = ?socket.peer_addr()?, semantics = %config.semantics, "client socket ready");

        Ok(Client {
            socket,
            semantics: config.semantics,
            loss: LossSimulator::new(config.loss_rate, config.loss_seed),
            retry_timeout: config.retry_timeout,
            max_retries: config.max_retries,
        })
    }

    pub async fn query(&mut self, facility: &str, days_csv: &str) -> Result<Reply, ClientError> {
        let mut p = BytesMut::with_capacity(string_len(facility) + string_len(days_csv));
        put_string(&mut p, facility);
        put_string(&mut p, days_csv);
        self.request_reply(Opcode::Query, p.freeze()).await
    }

    pub async fn book(&mut self, facility: &str, slot: Slot) -> Result<Reply, ClientError> {
        let mut p = BytesMut::with_capacity(string_len(facility) + 12);
        put_string(&mut p, facility);
        p.put_i32(slot.day as i32);
        p.put_i32(slot.start_min as i32);
        p.put_i32(slot.end_min as i32);
        self.request_reply(Opcode::Book, p.freeze()).await
    }

    pub async fn change(&mut self, id: i64, shift_min: i32) -> Result<Reply, ClientError> {
        let mut p = BytesMut::with_capacity(12);
        p.put_i64(id);
        p.put_i32(shift_min);
        self.request_reply(Opcode::Change, p.freeze()).await
    }

    pub async fn cancel(&mut self, id: i64) -> Result<Reply, ClientError> {
        self.request_reply(Opcode::Cancel, id_payload(id)).await
    }

    pub async fn extend(&mut self, id: i64, start_delta: i32, end_delta: i32) -> Result<Reply, ClientError> {
        let mut p = BytesMut::with_capacity(16);
        p.put_i64(id);
        p.put_i32(start_delta);
        p.put_i32(end_delta);
        self.request_reply(Opcode::Extend, p.freeze()).await
    }

    pub async fn query_booking(&mut self, id: i64) -> Result<Reply, ClientError> {
        self.request_reply(Opcode::QueryBooking, id_payload(id)).await
    }

    /// Registers a monitor subscription and then stays in a receive loop for the subscription's
    ///  duration (plus a one second grace period), invoking `on_update` with the facility name
    ///  and status text of every MONITOR_UPDATE that arrives. Returns the registration reply;
    ///  if registration failed, the receive loop is skipped.
    pub async fn monitor(
        &mut self,
        facility: &str,
        seconds: i32,
        mut on_update: impl FnMut(&str, &str),
    ) -> Result<Reply, ClientError> {
        let mut p = BytesMut::with_capacity(string_len(facility) + 4);
        put_string(&mut p, facility);
        p.put_i32(seconds);
        let reply = self.request_reply(Opcode::MonitorRegister, p.freeze()).await?;
        if reply.error {
            return Ok(reply);
        }

        let deadline = Instant::now() + Duration::from_secs(seconds.max(0) as u64) + Duration::from_secs(1);
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        info!(facility, seconds, "waiting for monitor updates");

        while let Ok(received) = timeout_at(deadline, self.socket.recv(&mut buf)).await {
            let len = received?;
            let update = match Message::decode(&buf[..len]) {
                Ok(m) => m,
                Err(e) => {
                    debug!("ignoring undecodable datagram: {}", e);
                    continue;
                }
            };
            if update.opcode != u8::from(Opcode::MonitorUpdate) {
                debug!(opcode = update.opcode, "ignoring non-update datagram in monitor mode");
                continue;
            }
            let mut payload = update.payload.as_ref();
            let facility_name = try_get_string(&mut payload)?;
            let text = try_get_string(&mut payload)?;
            on_update(&facility_name, &text);
        }

        info!(facility, "monitor interval finished");
        Ok(reply)
    }

    async fn request_reply(&mut self, opcode: Opcode, payload: Bytes) -> Result<Reply, ClientError> {
        let req_id = fresh_request_id();
        let data = Message::new(self.semantics, opcode, req_id, payload).encode().freeze();
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        for attempt in 1..=self.max_retries {
            self.send(&data).await?;

            let deadline = Instant::now() + self.retry_timeout;
            loop {
                let received = match timeout_at(deadline, self.socket.recv(&mut buf)).await {
                    Ok(r) => r?,
                    Err(_elapsed) => {
                        info!(attempt, req_id, "timeout waiting for reply, retransmitting");
                        break;
                    }
                };
                match Message::decode(&buf[..received]) {
                    Ok(reply) if reply.req_id == req_id => {
                        let mut payload = reply.payload.as_ref();
                        let text = try_get_string(&mut payload)?;
                        return Ok(Reply {
                            error: reply.is_error(),
                            text,
                        });
                    }
                    Ok(stray) => {
                        debug!(got = stray.req_id, want = req_id, "discarding stray datagram");
                    }
                    Err(e) => {
                        debug!("ignoring undecodable datagram: {}", e);
                    }
                }
            }
        }

        Err(ClientError::NoReply(self.max_retries))
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), ClientError> {
        if self.loss.should_drop() {
            info!(len = data.len(), "dropping outbound request (loss simulation)");
            return Ok(());
        }
        self.socket.send(data).await?;
        Ok(())
    }
}

fn id_payload(id: i64) -> Bytes {
    let mut p = BytesMut::with_capacity(8);
    p.put_i64(id);
    p.freeze()
}
