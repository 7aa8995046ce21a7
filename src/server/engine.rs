use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut, TryGetError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::booking::store::{Booking, Facility, FacilityStore};
use crate::booking::timeslot::{day_to_idx, idx_to_day, min_to_hm, Slot, TimeError, MINUTES_PER_DAY};
use crate::config::ServerConfig;
use crate::protocol::wire::{put_string, string_len, try_get_string, DecodeError};
use crate::protocol::{Message, Opcode, Semantics, FLAG_ERROR};
use crate::server::monitor::MonitorRegistry;
use crate::util::fresh_request_id;


/// Shifting or moving a booking can fail against the reservation state; the error texts are
///  sent verbatim as the error reply payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("No such facility")]
    NoSuchFacility,
    #[error("No such confirmation ID")]
    NoSuchConfirmationId,
    #[error("No booking found with ID: {0}")]
    NoSuchBooking(i64),
    #[error("Unavailable in requested period")]
    RequestedPeriodUnavailable,
    #[error("Unavailable for new period")]
    NewPeriodUnavailable,
    #[error("Shift would move booking outside week range")]
    OutsideWeekRange,
    #[error("Shift would exceed end of day")]
    ExceedsEndOfDay,
    #[error("New start time would be before 00:00")]
    StartBeforeMidnight,
    #[error("New end time would exceed 24:00")]
    EndAfterMidnight,
    #[error("New start time must be before end time")]
    StartNotBeforeEnd,
    #[error("Unknown op")]
    UnknownOpcode,
}

/// Anything a handler can fail with. State and time errors travel as their own text; payload
///  parse failures are the "this should not happen with a conforming client" case and get the
///  Exception prefix.
#[derive(Debug, Error)]
enum ReplyError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Time(#[from] TimeError),
    #[error("Exception: {0}")]
    Payload(#[from] DecodeError),
}

impl From<TryGetError> for ReplyError {
    fn from(e: TryGetError) -> Self {
        ReplyError::Payload(e.into())
    }
}


/// A datagram the server loop should transmit: monitor updates caused by a mutation, followed
///  by the reply to the originating peer.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: SocketAddr,
    pub bytes: Bytes,
}


/// The reservation state machine: request router, the seven operation handlers, the monitor
///  registry and the at-most-once reply cache. Deliberately free of any socket handling - one
///  inbound datagram goes in, the datagrams to transmit come out - so invocation semantics and
///  booking invariants are testable without the network.
///
/// Handlers run strictly one at a time (the server loop is single-threaded), which is what
///  keeps the grid/booking invariants trivial across requests.
pub struct Engine {
    semantics: Semantics,
    store: FacilityStore,
    monitors: MonitorRegistry,
    /// At-most-once history: exact reply bytes per (peer, request id), kept for the process
    ///  lifetime. Never consulted in ALO mode.
    reply_cache: FxHashMap<(SocketAddr, u64), Bytes>,
    id_rng: StdRng,
}

impl Engine {
    pub fn new(config: &ServerConfig) -> Engine {
        Engine::with_id_rng(config, StdRng::from_entropy())
    }

    /// Like [Engine::new], but with a caller-provided RNG for confirmation ids, so tests get
    ///  deterministic ids.
    pub fn with_id_rng(config: &ServerConfig, id_rng: StdRng) -> Engine {
        Engine {
            semantics: config.semantics,
            store: FacilityStore::new(config.facilities.iter().cloned()),
            monitors: MonitorRegistry::new(),
            reply_cache: FxHashMap::default(),
            id_rng,
        }
    }

    pub fn semantics(&self) -> Semantics {
        self.semantics
    }

    pub fn store(&self) -> &FacilityStore {
        &self.store
    }

    pub fn cached_reply_count(&self) -> usize {
        self.reply_cache.len()
    }

    /// Processes one inbound datagram and returns everything to transmit in order. A malformed
    ///  datagram is discarded with a log line and produces nothing.
    pub fn on_datagram(&mut self, data: &[u8], from: SocketAddr) -> Vec<Outbound> {
        let req = match Message::decode(data) {
            Ok(req) => req,
            Err(e) => {
                warn!(?from, "discarding malformed datagram: {}", e);
                return Vec::new();
            }
        };

        if self.semantics == Semantics::AtMostOnce {
            if let Some(cached) = self.reply_cache.get(&(from, req.req_id)) {
                debug!(req_id = req.req_id, ?from, "duplicate request, resending cached reply");
                return vec![Outbound {
                    to: from,
                    bytes: cached.clone(),
                }];
            }
        }

        let mut out = Vec::new();
        let reply = self.handle(&req, from, &mut out);
        let reply_bytes = reply.encode().freeze();

        if self.semantics == Semantics::AtMostOnce {
            self.reply_cache.insert((from, req.req_id), reply_bytes.clone());
        }

        out.push(Outbound {
            to: from,
            bytes: reply_bytes,
        });
        out
    }

    fn handle(&mut self, req: &Message, from: SocketAddr, out: &mut Vec<Outbound>) -> Message {
        debug!(opcode = req.opcode, req_id = req.req_id, ?from, "handling request");

        let result = match Opcode::try_from(req.opcode) {
            Ok(Opcode::Query) => self.op_query(req),
            Ok(Opcode::Book) => self.op_book(req, out),
            Ok(Opcode::Change) => self.op_change(req, out),
            Ok(Opcode::MonitorRegister) => self.op_monitor_register(req, from, out),
            Ok(Opcode::Cancel) => self.op_cancel(req, out),
            Ok(Opcode::Extend) => self.op_extend(req, out),
            Ok(Opcode::QueryBooking) => self.op_query_booking(req),
            // MONITOR_UPDATE is server->client only; receiving one is as unknown as opcode 99
            Ok(Opcode::MonitorUpdate) | Err(_) => Err(StateError::UnknownOpcode.into()),
        };

        match result {
            Ok(text) => ok_reply(req, &text),
            Err(e) => {
                debug!(req_id = req.req_id, "request rejected: {}", e);
                error_reply(req, &e.to_string())
            }
        }
    }

    fn op_query(&self, req: &Message) -> Result<String, ReplyError> {
        let mut buf = req.payload.as_ref();
        let facility = try_get_string(&mut buf)?;
        let days_csv = try_get_string(&mut buf)?;

        let f = self.store.get(&facility).ok_or(StateError::NoSuchFacility)?;

        let mut text = format!("=== {} Status ===\n", facility);
        for token in days_csv.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            text.push_str(&f.detailed_availability(day_to_idx(token)?));
        }
        Ok(text)
    }

    fn op_book(&mut self, req: &Message, out: &mut Vec<Outbound>) -> Result<String, ReplyError> {
        let mut buf = req.payload.as_ref();
        let facility = try_get_string(&mut buf)?;
        let day = buf.try_get_i32()?;
        let start_min = buf.try_get_i32()?;
        let end_min = buf.try_get_i32()?;

        if !self.store.contains(&facility) {
            return Err(StateError::NoSuchFacility.into());
        }
        let slot = Slot::from_wire(day, start_min, end_min)?;

        let f = self.store.get_mut(&facility).ok_or(StateError::NoSuchFacility)?;
        if !f.is_free(slot) {
            return Err(StateError::RequestedPeriodUnavailable.into());
        }
        let id = self.id_rng.gen_range(0..i64::MAX);
        f.occupy(slot);
        f.add_booking(Booking {
            id,
            facility: facility.clone(),
            slot,
        });
        debug!(id, facility, ?slot, "booked");

        self.fan_out(&facility, out);
        Ok(format!("CONFIRM# {}", id))
    }

    fn op_change(&mut self, req: &Message, out: &mut Vec<Outbound>) -> Result<String, ReplyError> {
        let mut buf = req.payload.as_ref();
        let id = buf.try_get_i64()?;
        let shift_min = buf.try_get_i32()?;

        let facility = self
            .store
            .facility_of_booking(id)
            .ok_or(StateError::NoSuchConfirmationId)?
            .to_owned();
        let f = self.store.get_mut(&facility).ok_or(StateError::NoSuchConfirmationId)?;
        let old_slot = f.booking(id).ok_or(StateError::NoSuchConfirmationId)?.slot;

        // plain carry, no wrap-around: a booking shifted off either end of the week is rejected,
        //  unlike the modulo arithmetic of [Slot::shift_minutes]
        let mut new_start = old_slot.start_min as i32 + shift_min;
        let mut new_end = old_slot.end_min as i32 + shift_min;
        let mut new_day = old_slot.day as i32;
        while new_start < 0 {
            new_start += MINUTES_PER_DAY as i32;
            new_end += MINUTES_PER_DAY as i32;
            new_day -= 1;
        }
        while new_start >= MINUTES_PER_DAY as i32 {
            new_start -= MINUTES_PER_DAY as i32;
            new_end -= MINUTES_PER_DAY as i32;
            new_day += 1;
        }
        if !(0..7).contains(&new_day) {
            return Err(StateError::OutsideWeekRange.into());
        }
        if new_end > MINUTES_PER_DAY as i32 {
            return Err(StateError::ExceedsEndOfDay.into());
        }
        let new_slot = Slot::new(new_day as u8, new_start as u16, new_end as u16)?;

        Self::move_booking(f, id, old_slot, new_slot)?;
        debug!(id, facility, ?old_slot, ?new_slot, "changed booking");

        self.fan_out(&facility, out);
        Ok(format!("CHANGED# {} (shifted {} min)", id, fmt_signed(shift_min)))
    }

    fn op_cancel(&mut self, req: &Message, out: &mut Vec<Outbound>) -> Result<String, ReplyError> {
        let mut buf = req.payload.as_ref();
        let id = buf.try_get_i64()?;

        let Some(facility) = self.store.facility_of_booking(id).map(str::to_owned) else {
            // makes CANCEL observationally idempotent: a repeat (or a guess) is a success
            return Ok("ALREADY_CANCELED_OR_NOT_FOUND".to_string());
        };

        if let Some(f) = self.store.get_mut(&facility) {
            if let Some(booking) = f.remove_booking(id) {
                f.free(booking.slot);
            }
        }
        debug!(id, facility, "canceled booking");

        self.fan_out(&facility, out);
        Ok(format!("CANCELED# {}", id))
    }

    fn op_extend(&mut self, req: &Message, out: &mut Vec<Outbound>) -> Result<String, ReplyError> {
        let mut buf = req.payload.as_ref();
        let id = buf.try_get_i64()?;
        let start_delta = buf.try_get_i32()?;
        let end_delta = buf.try_get_i32()?;

        let facility = self
            .store
            .facility_of_booking(id)
            .ok_or(StateError::NoSuchConfirmationId)?
            .to_owned();
        let f = self.store.get_mut(&facility).ok_or(StateError::NoSuchConfirmationId)?;
        let old_slot = f.booking(id).ok_or(StateError::NoSuchConfirmationId)?.slot;

        let new_start = old_slot.start_min as i32 + start_delta;
        let new_end = old_slot.end_min as i32 + end_delta;
        if new_start < 0 {
            return Err(StateError::StartBeforeMidnight.into());
        }
        if new_end > MINUTES_PER_DAY as i32 {
            return Err(StateError::EndAfterMidnight.into());
        }
        if new_start >= new_end {
            return Err(StateError::StartNotBeforeEnd.into());
        }
        let new_slot = Slot::new(old_slot.day, new_start as u16, new_end as u16)?;

        Self::move_booking(f, id, old_slot, new_slot)?;
        debug!(id, facility, ?old_slot, ?new_slot, "extended booking");

        self.fan_out(&facility, out);
        Ok(format!(
            "EXTENDED# {} (start {} min, end {} min)",
            id,
            fmt_signed(start_delta),
            fmt_signed(end_delta)
        ))
    }

    fn op_monitor_register(
        &mut self,
        req: &Message,
        from: SocketAddr,
        out: &mut Vec<Outbound>,
    ) -> Result<String, ReplyError> {
        let mut buf = req.payload.as_ref();
        let facility = try_get_string(&mut buf)?;
        let seconds = buf.try_get_i32()?;

        if !self.store.contains(&facility) {
            return Err(StateError::NoSuchFacility.into());
        }
        self.monitors
            .register(from, facility.clone(), Duration::from_secs(seconds.max(0) as u64));

        // initial snapshot, so a new subscriber does not have to wait for the next mutation
        self.fan_out(&facility, out);
        Ok(format!("MONITORING# {} for {}s", facility, seconds))
    }

    fn op_query_booking(&self, req: &Message) -> Result<String, ReplyError> {
        let mut buf = req.payload.as_ref();
        let id = buf.try_get_i64()?;

        let booking = self.store.find_booking(id).ok_or(StateError::NoSuchBooking(id))?;
        let slot = booking.slot;

        Ok(format!(
            "=== Booking Details ===\n\
             Confirmation ID: {}\n\
             Facility: {}\n\
             Day: {}\n\
             Time: {} - {}\n\
             Duration: {} minutes",
            booking.id,
            booking.facility,
            idx_to_day(slot.day),
            min_to_hm(slot.start_min),
            min_to_hm(slot.end_min),
            slot.duration_min()
        ))
    }

    /// Tentatively vacates the old slot, checks the new one, and rolls back on conflict. On
    ///  success the grid and the booking record are updated together.
    fn move_booking(f: &mut Facility, id: i64, old_slot: Slot, new_slot: Slot) -> Result<(), ReplyError> {
        f.free(old_slot);
        if !f.is_free(new_slot) {
            f.occupy(old_slot);
            return Err(StateError::NewPeriodUnavailable.into());
        }
        f.occupy(new_slot);
        if let Some(booking) = f.booking_mut(id) {
            booking.slot = new_slot;
        }
        Ok(())
    }

    /// Emits one MONITOR_UPDATE datagram per live subscription on `facility`, reaping expired
    ///  subscriptions along the way. Best-effort: updates carry a fresh request id, are not
    ///  replies, and are never cached or retransmitted.
    fn fan_out(&mut self, facility: &str, out: &mut Vec<Outbound>) {
        let peers = self.monitors.live_peers_for(facility);
        if peers.is_empty() {
            return;
        }
        let Some(f) = self.store.get(facility) else {
            return;
        };

        let text = facility_status_text(f);
        let mut payload = BytesMut::with_capacity(string_len(facility) + string_len(&text));
        put_string(&mut payload, facility);
        put_string(&mut payload, &text);
        let payload = payload.freeze();

        for peer in peers {
            debug!(?peer, facility, "sending monitor update");
            let update = Message::new(self.semantics, Opcode::MonitorUpdate, fresh_request_id(), payload.clone());
            out.push(Outbound {
                to: peer,
                bytes: update.encode().freeze(),
            });
        }
    }
}


/// The full weekly status text that goes to monitor subscribers.
fn facility_status_text(f: &Facility) -> String {
    let mut text = format!("=== {} Status ===\n", f.name());
    for day in 0..7 {
        text.push_str(&f.detailed_availability(day));
    }
    text
}

fn fmt_signed(n: i32) -> String {
    if n >= 0 {
        format!("+{}", n)
    } else {
        n.to_string()
    }
}

fn ok_reply(req: &Message, text: &str) -> Message {
    reply(req, 0, text)
}

fn error_reply(req: &Message, text: &str) -> Message {
    reply(req, FLAG_ERROR, text)
}

/// Replies preserve the request's version, semantics tag, opcode and request id; only the
///  flags and the payload differ.
fn reply(req: &Message, flags: u8, text: &str) -> Message {
    let mut payload = BytesMut::with_capacity(string_len(text));
    put_string(&mut payload, text);
    Message {
        version: req.version,
        semantics: req.semantics,
        opcode: req.opcode,
        flags,
        req_id: req.req_id,
        payload: payload.freeze(),
    }
}
