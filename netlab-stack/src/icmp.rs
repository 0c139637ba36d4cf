use crate::config::{EchoPolicy, InterfaceIdentity};
use crate::error::{Result, StackError};
use crate::ethernet::Transmission;
use crate::handle::{lock, Handle};
use crate::ip::IpLayer;
use crate::stats::{DropCounters, DropReason};
use netlab_packets::{IcmpMessage, IcmpType, IpProtocol};
use std::net::Ipv4Addr;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Debug)]
struct Outstanding {
    sequence: u16,
    destination: Ipv4Addr,
    payload: Vec<u8>,
    sent_at: Instant,
}

#[derive(Debug)]
struct EchoState {
    next_sequence: u16,
    outstanding: Option<Outstanding>,
    /// Single slot: the reply payload, or why there won't be one.
    completion: Option<Result<Vec<u8>>>,
    closed: bool,
}

/// Ping-pong over ICMP echo. Answers every echo request it receives, and lets a caller
/// send one request at a time and wait for its reply.
pub struct IcmpEcho {
    identity: Arc<InterfaceIdentity>,
    policy: EchoPolicy,
    drops: Arc<DropCounters>,
    state: Mutex<EchoState>,
    completed: Condvar,
    ip: Handle<IpLayer>,
}

impl IcmpEcho {
    pub fn new(identity: Arc<InterfaceIdentity>, policy: EchoPolicy, drops: Arc<DropCounters>) -> Self {
        IcmpEcho {
            identity,
            policy,
            drops,
            state: Mutex::new(EchoState {
                next_sequence: 1,
                outstanding: None,
                completion: None,
                closed: false,
            }),
            completed: Condvar::new(),
            ip: Handle::new("ip"),
        }
    }

    pub(crate) fn attach(&self, ip: &Arc<IpLayer>) {
        self.ip.set(ip);
    }

    /// Sends an echo request carrying `payload` to `dst`. Doesn't wait for ARP: a
    /// `Deferred` send still counts as sent, and its reply is read with `read_echo`.
    /// Starting a new request forgets any earlier one.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub fn send_echo(&self, payload: &[u8], dst: Ipv4Addr) -> Result<Transmission> {
        let sequence = {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(StackError::Disconnected);
            }
            let sequence = state.next_sequence;
            state.next_sequence = sequence.wrapping_add(1);
            state.outstanding = Some(Outstanding {
                sequence,
                destination: dst,
                payload: payload.to_vec(),
                sent_at: Instant::now(),
            });
            state.completion = None;
            sequence
        };

        let request = IcmpMessage::echo_request(self.policy.identifier, sequence, payload);
        let sent = self
            .ip
            .get()
            .and_then(|ip| ip.send(request.as_bytes(), IpProtocol::ICMP, self.identity.ip(), dst));
        match &sent {
            Ok(transmission) => debug!(%dst, sequence, deferred = transmission.is_deferred(), "echo request"),
            Err(_) => {
                let mut state = lock(&self.state);
                if state.outstanding.as_ref().map(|o| o.sequence) == Some(sequence) {
                    state.outstanding = None;
                }
            }
        }
        sent
    }

    /// Processes a received ICMP message from `src`. Returns the bytes consumed, 0 if it
    /// was dropped.
    pub fn receive(&self, message: IcmpMessage, src: Ipv4Addr) -> usize {
        if !message.validate_checksum() {
            return self.discard(DropReason::ChecksumMismatch, src, "bad ICMP checksum");
        }
        if message.code() != 0 {
            return self.discard(DropReason::UnsupportedProtocol, src, "non-zero echo code");
        }

        match message.icmp_type() {
            IcmpType::EchoRequest => {
                let reply = IcmpMessage::echo_reply(message.identifier(), message.sequence(), &message.payload());
                let sent = self
                    .ip
                    .get()
                    .and_then(|ip| ip.send(reply.as_bytes(), IpProtocol::ICMP, self.identity.ip(), src));
                match sent {
                    Ok(_) => debug!(%src, sequence = message.sequence(), "echo reply"),
                    Err(e) => warn!(error = %e, %src, "echo reply not sent"),
                }
                message.as_bytes().len()
            }
            IcmpType::EchoReply => self.complete(&message, src),
            IcmpType::Unknown(_) => self.discard(DropReason::UnsupportedProtocol, src, "not an echo"),
        }
    }

    fn complete(&self, message: &IcmpMessage, src: Ipv4Addr) -> usize {
        let mut state = lock(&self.state);
        let matched = match &state.outstanding {
            Some(outstanding) => {
                message.identifier() == self.policy.identifier
                    && message.sequence() == outstanding.sequence
                    && message.payload() == outstanding.payload.as_slice()
            }
            None => false,
        };
        if !matched {
            drop(state);
            return self.discard(DropReason::UnmatchedReply, src, "no matching request");
        }

        if let Some(outstanding) = state.outstanding.take() {
            info!(
                %src,
                sequence = outstanding.sequence,
                rtt_us = outstanding.sent_at.elapsed().as_micros() as u64,
                "echo reply received"
            );
        }
        state.completion = Some(Ok(message.payload().into_owned()));
        self.completed.notify_all();
        message.as_bytes().len()
    }

    /// An echo request of ours was never sent because `next_hop` didn't resolve. Fails
    /// the waiting `read_echo` if it is the outstanding one.
    pub(crate) fn report_unresolved(&self, message: &IcmpMessage, next_hop: Ipv4Addr) {
        if message.icmp_type() != IcmpType::EchoRequest || message.identifier() != self.policy.identifier {
            return;
        }
        let mut state = lock(&self.state);
        let matched = state.outstanding.as_ref().map(|o| o.sequence) == Some(message.sequence());
        if !matched {
            debug!(%next_hop, sequence = message.sequence(), "stale request undeliverable");
            return;
        }
        if let Some(outstanding) = state.outstanding.take() {
            warn!(dst = %outstanding.destination, %next_hop, "echo request undeliverable");
        }
        state.completion = Some(Err(StackError::UnresolvedDestination(next_hop)));
        self.completed.notify_all();
    }

    /// Waits for the reply to the last request and copies its payload into `buf`,
    /// truncated to fit. Returns the bytes copied; an empty reply gives `Ok(0)`.
    ///
    /// Fails with `Timeout` once the configured bound passes, `Disconnected` if the
    /// interface shuts down meanwhile, or `UnresolvedDestination` when ARP gives up.
    /// A timeout too large to represent means waiting without a bound.
    pub fn read_echo(&self, buf: &mut [u8]) -> Result<usize> {
        let deadline = Instant::now().checked_add(self.policy.reply_timeout);
        let mut state = lock(&self.state);
        loop {
            if let Some(completion) = state.completion.take() {
                let payload = completion?;
                let len = payload.len().min(buf.len());
                buf[..len].copy_from_slice(&payload[..len]);
                return Ok(len);
            }
            if state.closed {
                return Err(StackError::Disconnected);
            }
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!(timeout_ms = self.policy.reply_timeout.as_millis() as u64, "no echo reply");
                        return Err(StackError::Timeout);
                    }
                    self.completed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.completed.wait(state).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Fails any `read_echo` in progress and refuses new requests.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        state.outstanding = None;
        self.completed.notify_all();
    }

    pub(crate) fn open(&self) {
        let mut state = lock(&self.state);
        state.closed = false;
        state.completion = None;
    }

    fn discard(&self, reason: DropReason, src: Ipv4Addr, why: &'static str) -> usize {
        self.drops.record(reason);
        debug!(%reason, %src, why, "ICMP message dropped");
        0
    }
}
