use crate::config::ArpPolicy;
use crate::error::{Result, StackError};
use netlab_packets::MacAddr;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArpState {
    /// A request is out, nothing has answered yet.
    Incomplete,
    Resolved,
}

/// A send held back until its next hop resolves. Carries everything needed to finish it:
/// the payload bytes (so their length) and the ethertype to frame them with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOutbound {
    pub payload: Vec<u8>,
    pub ether_type: u16,
}

impl PendingOutbound {
    pub fn new(payload: &[u8], ether_type: u16) -> Self {
        PendingOutbound {
            payload: payload.to_vec(),
            ether_type,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[derive(Debug)]
struct ArpEntry {
    state: ArpState,
    mac: Option<MacAddr>,
    created: Instant,
    updated: Instant,
    requests: u32,
    last_request: Option<Instant>,
    /// Bound, but the queue is still being sent. New sends line up behind it.
    flushing: bool,
    pending: VecDeque<PendingOutbound>,
}

impl ArpEntry {
    fn incomplete(now: Instant) -> Self {
        ArpEntry {
            state: ArpState::Incomplete,
            mac: None,
            created: now,
            updated: now,
            requests: 0,
            last_request: None,
            flushing: false,
            pending: VecDeque::new(),
        }
    }

    fn resolved(mac: MacAddr, now: Instant) -> Self {
        ArpEntry {
            state: ArpState::Resolved,
            mac: Some(mac),
            ..ArpEntry::incomplete(now)
        }
    }

    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        self.state == ArpState::Resolved && now.saturating_duration_since(self.updated) < ttl
    }

    /// Binds `mac`. The entry turns resolved once its queue has been taken.
    fn bind(&mut self, mac: MacAddr, now: Instant) {
        self.mac = Some(mac);
        self.updated = now;
        self.flushing = true;
    }

    fn settle(&mut self, now: Instant) {
        self.state = ArpState::Resolved;
        self.flushing = false;
        self.updated = now;
        self.requests = 0;
        self.last_request = None;
    }
}

/// A point in time view of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpRecord {
    pub ip: Ipv4Addr,
    pub state: ArpState,
    pub mac: Option<MacAddr>,
    pub age: Duration,
    pub requests: u32,
    pub pending: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Lookup {
    Resolved(MacAddr),
    /// The payload is parked until the address resolves.
    Queued { request_due: bool },
}

/// What a sender's claim did to the table.
#[derive(Debug, PartialEq, Eq)]
pub enum Learned {
    Inserted,
    /// Same binding seen again, timestamp bumped.
    Refreshed,
    /// A stale binding was overwritten with a new MAC.
    Replaced { previous: MacAddr },
    /// An incomplete entry got its answer. Its queue is drained with `take_pending`.
    Resolved,
    /// The address is freshly bound to another MAC; nothing was changed.
    Conflict { existing: MacAddr },
}

/// Work the retry timer found due.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TimerActions {
    /// Addresses to send another request for.
    pub retry: Vec<Ipv4Addr>,
    /// Addresses given up on, with the sends that were waiting on them.
    pub expired: Vec<(Ipv4Addr, Vec<PendingOutbound>)>,
    /// Resolved bindings dropped for going stale.
    pub aged: Vec<Ipv4Addr>,
}

/// IP to MAC translations plus the sends waiting on unfinished ones. Pure bookkeeping:
/// the engine decides what goes on the wire, with the table lock released.
#[derive(Debug)]
pub struct ArpTable {
    policy: ArpPolicy,
    entries: HashMap<Ipv4Addr, ArpEntry>,
}

impl ArpTable {
    pub fn new(policy: ArpPolicy) -> Self {
        ArpTable {
            policy,
            entries: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &ArpPolicy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The MAC for `ip`, if resolved and not yet stale.
    pub fn lookup(&self, ip: Ipv4Addr, now: Instant) -> Option<MacAddr> {
        self.entries
            .get(&ip)
            .filter(|entry| entry.is_fresh(now, self.policy.entry_ttl))
            .and_then(|entry| entry.mac)
    }

    /// Looks up `ip`, and on a miss parks a copy of `payload` on its entry, creating the
    /// entry (or demoting a stale binding) as needed. A miss reports whether a request
    /// should go out now: none has been sent for this address within the request interval.
    pub fn resolve(
        &mut self,
        ip: Ipv4Addr,
        payload: &[u8],
        ether_type: u16,
        now: Instant,
    ) -> Result<Lookup> {
        let ttl = self.policy.entry_ttl;
        let entry = self
            .entries
            .entry(ip)
            .or_insert_with(|| ArpEntry::incomplete(now));

        if entry.state == ArpState::Resolved {
            match entry.mac {
                Some(mac) if entry.is_fresh(now, ttl) => return Ok(Lookup::Resolved(mac)),
                _ => *entry = ArpEntry::incomplete(now),
            }
        }

        if entry.pending.len() >= self.policy.max_pending {
            return Err(StackError::PendingQueueFull(ip));
        }
        entry
            .pending
            .push_back(PendingOutbound::new(payload, ether_type));
        if entry.flushing {
            return Ok(Lookup::Queued { request_due: false });
        }

        let due = match entry.last_request {
            None => true,
            Some(sent) => now.saturating_duration_since(sent) >= self.policy.request_interval,
        };
        if due && entry.requests < self.policy.max_requests {
            entry.requests += 1;
            entry.last_request = Some(now);
            return Ok(Lookup::Queued { request_due: true });
        }
        Ok(Lookup::Queued { request_due: false })
    }

    /// Records that `ip` claims to be at `mac`, as any request sender does.
    pub fn learn(&mut self, ip: Ipv4Addr, mac: MacAddr, now: Instant) -> Learned {
        let ttl = self.policy.entry_ttl;
        match self.entries.entry(ip) {
            Entry::Vacant(vacant) => {
                vacant.insert(ArpEntry::resolved(mac, now));
                Learned::Inserted
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                match (entry.state, entry.mac) {
                    (ArpState::Incomplete, Some(existing)) if entry.flushing => {
                        if existing == mac {
                            Learned::Refreshed
                        } else {
                            Learned::Conflict { existing }
                        }
                    }
                    (ArpState::Incomplete, _) => {
                        entry.bind(mac, now);
                        Learned::Resolved
                    }
                    (ArpState::Resolved, Some(existing)) if existing == mac => {
                        entry.updated = now;
                        Learned::Refreshed
                    }
                    (ArpState::Resolved, Some(existing)) if entry.is_fresh(now, ttl) => {
                        Learned::Conflict { existing }
                    }
                    (ArpState::Resolved, previous) => {
                        entry.mac = Some(mac);
                        entry.settle(now);
                        Learned::Replaced {
                            previous: previous.unwrap_or(MacAddr::ZERO),
                        }
                    }
                }
            }
        }
    }

    /// Binds the incomplete entry for `ip`, as a reply does. False if nothing was
    /// waiting on `ip`, which makes the reply unsolicited.
    pub fn complete(&mut self, ip: Ipv4Addr, mac: MacAddr, now: Instant) -> bool {
        match self.entries.get_mut(&ip) {
            Some(entry) if entry.state == ArpState::Incomplete && !entry.flushing => {
                entry.bind(mac, now);
                true
            }
            _ => false,
        }
    }

    /// Oldest send still queued on a bound entry. Once the queue is empty the entry is
    /// resolved and lookups hit it directly, so nothing overtakes what was queued.
    pub fn take_pending(&mut self, ip: Ipv4Addr, now: Instant) -> Option<PendingOutbound> {
        let entry = self.entries.get_mut(&ip).filter(|entry| entry.flushing)?;
        let next = entry.pending.pop_front();
        if next.is_none() {
            entry.settle(now);
        }
        next
    }

    /// Advances the retry timer. Incomplete entries whose last request has gone
    /// unanswered for a full interval are either asked again or, once they have used up
    /// their requests, removed. Resolved bindings past their ttl are removed too.
    pub fn expire(&mut self, now: Instant) -> TimerActions {
        let interval = self.policy.request_interval;
        let max_requests = self.policy.max_requests;
        let ttl = self.policy.entry_ttl;
        let mut actions = TimerActions::default();

        for (ip, entry) in self.entries.iter_mut() {
            if entry.state == ArpState::Resolved {
                if !entry.is_fresh(now, ttl) {
                    actions.aged.push(*ip);
                }
                continue;
            }
            if entry.flushing {
                continue;
            }
            let waited = entry
                .last_request
                .map(|sent| now.saturating_duration_since(sent))
                .unwrap_or_else(|| now.saturating_duration_since(entry.created));
            if waited < interval {
                continue;
            }
            if entry.requests < max_requests {
                entry.requests += 1;
                entry.last_request = Some(now);
                actions.retry.push(*ip);
            } else {
                actions.expired.push((*ip, Vec::new()));
            }
        }

        for (ip, pending) in actions.expired.iter_mut() {
            if let Some(entry) = self.entries.remove(ip) {
                *pending = entry.pending.into_iter().collect();
            }
        }
        for ip in actions.aged.iter() {
            self.entries.remove(ip);
        }
        actions.retry.sort();
        actions.expired.sort_by_key(|(ip, _)| *ip);
        actions.aged.sort();
        actions
    }

    pub fn record(&self, ip: Ipv4Addr, now: Instant) -> Option<ArpRecord> {
        self.entries.get(&ip).map(|entry| ArpRecord {
            ip,
            state: entry.state,
            mac: entry.mac,
            age: now.saturating_duration_since(entry.updated),
            requests: entry.requests,
            pending: entry.pending.len(),
        })
    }

    /// Every entry, ordered by address.
    pub fn records(&self, now: Instant) -> Vec<ArpRecord> {
        let mut ips: Vec<Ipv4Addr> = self.entries.keys().copied().collect();
        ips.sort();
        ips.into_iter()
            .filter_map(|ip| self.record(ip, now))
            .collect()
    }
}
