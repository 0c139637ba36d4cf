use crate::error::{Result, StackError};
use cidr::Ipv4Cidr;
use netlab_packets::MacAddr;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Who this interface is on the wire. Built once at startup and shared read-only by
/// every layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceIdentity {
    mac: MacAddr,
    ip: Ipv4Addr,
    netmask: Ipv4Addr,
    broadcast: Ipv4Addr,
    gateway: Ipv4Addr,
    subnet: Ipv4Cidr,
}

impl InterfaceIdentity {
    pub fn new(
        mac: MacAddr,
        ip: Ipv4Addr,
        netmask: Ipv4Addr,
        broadcast: Ipv4Addr,
        gateway: Ipv4Addr,
    ) -> Result<Self> {
        let mask = u32::from(netmask);
        if mask.count_ones() != mask.leading_ones() {
            return Err(StackError::InvalidNetmask(netmask));
        }
        let network = Ipv4Addr::from(u32::from(ip) & mask);
        let subnet = Ipv4Cidr::new(network, mask.count_ones() as u8).map_err(|_| {
            StackError::InvalidAddress {
                value: network.to_string(),
                reason: "not a network address",
            }
        })?;

        Ok(InterfaceIdentity {
            mac,
            ip,
            netmask,
            broadcast,
            gateway,
            subnet,
        })
    }

    /// Parses the textual forms: MAC as six colon separated hex octets, the rest as
    /// dotted quads.
    pub fn parse(
        mac: &str,
        ip: &str,
        netmask: &str,
        broadcast: &str,
        gateway: &str,
    ) -> Result<Self> {
        let mac = mac.parse::<MacAddr>().map_err(|reason| StackError::InvalidAddress {
            value: mac.to_owned(),
            reason,
        })?;
        InterfaceIdentity::new(
            mac,
            parse_ipv4(ip)?,
            parse_ipv4(netmask)?,
            parse_ipv4(broadcast)?,
            parse_ipv4(gateway)?,
        )
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn netmask(&self) -> Ipv4Addr {
        self.netmask
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        self.broadcast
    }

    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    pub fn subnet(&self) -> &Ipv4Cidr {
        &self.subnet
    }

    /// True if `addr` is directly reachable on the local subnet.
    pub fn is_on_link(&self, addr: Ipv4Addr) -> bool {
        self.subnet.contains(&addr)
    }

    /// True if `addr` should be framed to the Ethernet broadcast address.
    pub fn is_broadcast(&self, addr: Ipv4Addr) -> bool {
        addr == self.broadcast || addr.is_broadcast()
    }

    /// The address whose MAC a datagram for `dest` must be sent to: `dest` itself when
    /// on link, otherwise the default gateway.
    pub fn next_hop(&self, dest: Ipv4Addr) -> Ipv4Addr {
        if self.is_on_link(dest) {
            dest
        } else {
            self.gateway
        }
    }

    /// True if a datagram addressed to `dest` is for this host.
    pub fn accepts(&self, dest: Ipv4Addr) -> bool {
        dest == self.ip || dest == self.broadcast
    }
}

fn parse_ipv4(value: &str) -> Result<Ipv4Addr> {
    value
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| StackError::InvalidAddress {
            value: value.to_owned(),
            reason: "expected four dot separated decimal octets",
        })
}

/// ARP timing and sizing. Tunable, none of these are protocol requirements.
#[derive(Debug, Clone)]
pub struct ArpPolicy {
    /// Minimum spacing between two requests for the same address. Doubles as the retry
    /// interval for unanswered requests.
    pub request_interval: Duration,
    /// Requests sent for one address before it is declared unresolvable.
    pub max_requests: u32,
    /// Age after which a resolved binding is stale: it gets re-resolved, and a
    /// conflicting claim for the address may replace it.
    pub entry_ttl: Duration,
    /// Sends that may wait on a single unresolved address.
    pub max_pending: usize,
}

impl Default for ArpPolicy {
    fn default() -> Self {
        ArpPolicy {
            request_interval: Duration::from_secs(1),
            max_requests: 3,
            entry_ttl: Duration::from_secs(20 * 60),
            max_pending: 16,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EchoPolicy {
    /// Identifier stamped on every echo request from this stack.
    pub identifier: u16,
    /// How long `read_echo` waits for the matching reply.
    pub reply_timeout: Duration,
}

impl Default for EchoPolicy {
    fn default() -> Self {
        EchoPolicy {
            identifier: 0x4e4c,
            reply_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StackConfig {
    pub identity: InterfaceIdentity,
    pub arp: ArpPolicy,
    pub echo: EchoPolicy,
    /// Upper bound on how long the read loop blocks on the wire before it checks ARP
    /// timers and the shutdown flag.
    pub poll_interval: Duration,
}

impl StackConfig {
    pub fn new(identity: InterfaceIdentity) -> Self {
        StackConfig {
            identity,
            arp: ArpPolicy::default(),
            echo: EchoPolicy::default(),
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn arp_policy(mut self, arp: ArpPolicy) -> Self {
        self.arp = arp;
        self
    }

    pub fn echo_policy(mut self, echo: EchoPolicy) -> Self {
        self.echo = echo;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}
