use crate::arp::ArpEngine;
use crate::config::{InterfaceIdentity, StackConfig};
use crate::error::{Result, StackError};
use crate::ethernet::{EthernetLayer, Transmission};
use crate::handle::lock;
use crate::icmp::IcmpEcho;
use crate::ip::IpLayer;
use crate::stats::DropCounters;
use crate::wire::WireTransport;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// One network interface: the four layers wired together over a wire transport.
///
/// The stack owns every layer; layers only refer to their neighbours weakly. It can be
/// driven by its own read loop (`connect`) or by hand (`receive_frame`, `poll_timers_at`).
pub struct Stack {
    config: StackConfig,
    identity: Arc<InterfaceIdentity>,
    drops: Arc<DropCounters>,
    wire: Arc<dyn WireTransport>,
    ethernet: Arc<EthernetLayer>,
    arp: Arc<ArpEngine>,
    ip: Arc<IpLayer>,
    icmp: Arc<IcmpEcho>,
    running: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Stack {
    pub fn new(config: StackConfig, wire: Arc<dyn WireTransport>) -> Self {
        let identity = Arc::new(config.identity.clone());
        let drops = Arc::new(DropCounters::new());

        let ethernet = Arc::new(EthernetLayer::new(identity.clone(), wire.clone(), drops.clone()));
        let arp = Arc::new(ArpEngine::new(identity.clone(), config.arp.clone(), drops.clone()));
        let ip = Arc::new(IpLayer::new(identity.clone(), drops.clone()));
        let icmp = Arc::new(IcmpEcho::new(identity.clone(), config.echo.clone(), drops.clone()));

        ethernet.attach_arp(&arp);
        ethernet.attach_ip(&ip);
        arp.attach(&ethernet);
        ip.attach(&ethernet, &icmp);
        icmp.attach(&ip);

        info!(
            mac = %identity.mac(),
            ip = %identity.ip(),
            netmask = %identity.netmask(),
            gateway = %identity.gateway(),
            "interface up"
        );

        Stack {
            config,
            identity,
            drops,
            wire,
            ethernet,
            arp,
            ip,
            icmp,
            running: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        }
    }

    /// Starts the read loop on its own thread.
    pub fn connect(&self) -> Result<()> {
        let mut reader = lock(&self.reader);
        if let Some(handle) = reader.take() {
            if self.running.load(Ordering::SeqCst) {
                *reader = Some(handle);
                return Err(StackError::AlreadyConnected);
            }
            // The loop stopped on its own when the wire went away.
            if handle.join().is_err() {
                warn!("read loop panicked");
            }
        }
        self.running.store(true, Ordering::SeqCst);
        self.icmp.open();

        let read_loop = ReadLoop {
            wire: self.wire.clone(),
            ethernet: self.ethernet.clone(),
            arp: self.arp.clone(),
            icmp: self.icmp.clone(),
            running: self.running.clone(),
            poll_interval: self.config.poll_interval,
        };
        let handle = thread::Builder::new()
            .name(format!("netlab-rx-{}", self.identity.ip()))
            .spawn(move || read_loop.run())
            .map_err(|e| {
                error!(error = %e, "read loop not started");
                self.running.store(false, Ordering::SeqCst);
                StackError::Disconnected
            })?;
        *reader = Some(handle);
        Ok(())
    }

    /// Stops the read loop and fails any `read_echo` waiting on a reply. Safe to call
    /// more than once.
    pub fn disconnect(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = lock(&self.reader).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("read loop panicked");
            }
            info!(ip = %self.identity.ip(), "interface down");
        }
        self.icmp.close();
    }

    /// True while the read loop runs. A loop that stopped because the wire failed no
    /// longer counts, and `connect` may start a new one.
    pub fn is_connected(&self) -> bool {
        lock(&self.reader).is_some() && self.running.load(Ordering::SeqCst)
    }

    pub fn send_echo(&self, payload: &[u8], dst: Ipv4Addr) -> Result<Transmission> {
        self.icmp.send_echo(payload, dst)
    }

    pub fn read_echo(&self, buf: &mut [u8]) -> Result<usize> {
        self.icmp.read_echo(buf)
    }

    /// Sends one echo request and waits for its reply, returning the echoed payload.
    pub fn ping(&self, payload: &[u8], dst: Ipv4Addr) -> Result<Vec<u8>> {
        self.send_echo(payload, dst)?;
        let mut buf = vec![0; payload.len()];
        let len = self.read_echo(&mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Feeds one frame through the receive path, as the read loop would.
    pub fn receive_frame(&self, frame: Vec<u8>) -> usize {
        self.ethernet.receive(frame)
    }

    pub fn poll_timers(&self) -> usize {
        self.poll_timers_at(Instant::now())
    }

    /// Runs the ARP retry timer as of `now`. Returns the requests sent.
    pub fn poll_timers_at(&self, now: Instant) -> usize {
        self.arp.tick(now)
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn identity(&self) -> &InterfaceIdentity {
        &self.identity
    }

    pub fn drops(&self) -> &DropCounters {
        &self.drops
    }

    pub fn ethernet(&self) -> &EthernetLayer {
        &self.ethernet
    }

    pub fn arp(&self) -> &ArpEngine {
        &self.arp
    }

    pub fn ip(&self) -> &IpLayer {
        &self.ip
    }

    pub fn icmp(&self) -> &IcmpEcho {
        &self.icmp
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct ReadLoop {
    wire: Arc<dyn WireTransport>,
    ethernet: Arc<EthernetLayer>,
    arp: Arc<ArpEngine>,
    icmp: Arc<IcmpEcho>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl ReadLoop {
    fn run(self) {
        info!("read loop started");
        while self.running.load(Ordering::SeqCst) {
            match self.wire.receive(self.poll_interval) {
                Ok(Some(frame)) => {
                    self.ethernet.receive(frame);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "wire gone, read loop stopping");
                    self.running.store(false, Ordering::SeqCst);
                    self.icmp.close();
                    break;
                }
            }
            self.arp.tick(Instant::now());
        }
        info!("read loop stopped");
    }
}
