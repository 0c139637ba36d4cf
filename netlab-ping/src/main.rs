mod subscriber;

use crate::subscriber::{print_line, ConsoleSubscriber};
use clap::{value_t, App, Arg, ArgMatches};
use netlab_packets::MacAddr;
use netlab_stack::{cable, EchoPolicy, InterfaceIdentity, Stack, StackConfig, StackError};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, Level};

fn main() {
    // Collect arguments from user
    let matches = App::new("Netlab ping")
        .version("0.1")
        .author("Netlab Contributors")
        .about("Ping-pong an ICMP echo across a simulated Ethernet segment")
        .arg(Arg::with_name("mac")
             .long("mac")
             .value_name("MAC")
             .help("Our MAC address")
             .default_value("02:00:5e:00:00:02")
             .takes_value(true))
        .arg(Arg::with_name("ip")
             .long("ip")
             .value_name("IP")
             .help("Our IP address")
             .default_value("10.0.0.2")
             .takes_value(true))
        .arg(Arg::with_name("netmask")
             .long("netmask")
             .value_name("MASK")
             .help("Subnet mask")
             .default_value("255.255.255.0")
             .takes_value(true))
        .arg(Arg::with_name("broadcast")
             .long("broadcast")
             .value_name("IP")
             .help("Subnet broadcast address")
             .default_value("10.0.0.255")
             .takes_value(true))
        .arg(Arg::with_name("gateway")
             .long("gateway")
             .value_name("IP")
             .help("Default gateway")
             .default_value("10.0.0.1")
             .takes_value(true))
        .arg(Arg::with_name("peer_mac")
             .long("peer-mac")
             .value_name("MAC")
             .help("MAC address of the responder at the other end of the cable")
             .default_value("02:00:5e:00:00:01")
             .takes_value(true))
        .arg(Arg::with_name("peer_ip")
             .long("peer-ip")
             .value_name("IP")
             .help("IP address of the responder")
             .default_value("10.0.0.1")
             .takes_value(true))
        .arg(Arg::with_name("dest")
             .short("d")
             .long("dest")
             .value_name("IP")
             .help("Address to ping, the responder if not given")
             .takes_value(true))
        .arg(Arg::with_name("payload")
             .short("p")
             .long("payload")
             .value_name("TEXT")
             .help("Echo payload")
             .default_value("NetlabPingPongTest!\n")
             .takes_value(true))
        .arg(Arg::with_name("count")
             .short("c")
             .long("count")
             .value_name("N")
             .help("Echo requests to send")
             .default_value("1")
             .takes_value(true))
        .arg(Arg::with_name("timeout")
             .short("t")
             .long("timeout-ms")
             .value_name("MS")
             .help("How long to wait for each reply")
             .default_value("3000")
             .takes_value(true))
        .arg(Arg::with_name("verbose")
             .short("v")
             .multiple(true)
             .help("More trace output, repeat for more"))
        .get_matches();

    let level = match matches.occurrences_of("verbose") {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing::subscriber::set_global_default(ConsoleSubscriber::new(level))
        .expect("setting tracing default failed");

    match run(&matches) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!(error = %e, "netlab-ping failed");
            std::process::exit(2);
        }
    }
}

/// Returns whether every echo came back intact.
fn run(matches: &ArgMatches) -> Result<bool, failure::Error> {
    let netmask = matches.value_of("netmask").unwrap_or_default();
    let broadcast = matches.value_of("broadcast").unwrap_or_default();
    let gateway = matches.value_of("gateway").unwrap_or_default();

    let local = InterfaceIdentity::parse(
        matches.value_of("mac").unwrap_or_default(),
        matches.value_of("ip").unwrap_or_default(),
        netmask,
        broadcast,
        gateway,
    )?;
    let responder = InterfaceIdentity::parse(
        matches.value_of("peer_mac").unwrap_or_default(),
        matches.value_of("peer_ip").unwrap_or_default(),
        netmask,
        broadcast,
        gateway,
    )?;
    if local.mac() == responder.mac() || local.mac() == MacAddr::BROADCAST {
        return Err(failure::format_err!("{} can't be used as our MAC here", local.mac()));
    }

    let dest = match matches.value_of("dest") {
        Some(dest) => dest.parse::<Ipv4Addr>().map_err(|_| StackError::InvalidAddress {
            value: dest.to_owned(),
            reason: "expected four dot separated decimal octets",
        })?,
        None => responder.ip(),
    };
    let payload = matches.value_of("payload").unwrap_or_default().as_bytes().to_vec();
    let count = value_t!(matches, "count", u32)?;
    let timeout = Duration::from_millis(value_t!(matches, "timeout", u64)?);

    let echo = EchoPolicy {
        reply_timeout: timeout,
        ..EchoPolicy::default()
    };
    let (near, far) = cable();
    let stack = Stack::new(StackConfig::new(local).echo_policy(echo.clone()), Arc::new(near));
    let peer = Stack::new(StackConfig::new(responder).echo_policy(echo), Arc::new(far));
    peer.connect()?;
    stack.connect()?;

    let mut intact = 0;
    for _ in 0..count {
        let start = Instant::now();
        match stack.ping(&payload, dest) {
            Ok(reply) => {
                let rtt = start.elapsed();
                print_line(format_args!("{}", String::from_utf8_lossy(&reply)));
                info!(%dest, len = reply.len(), rtt_us = rtt.as_micros() as u64, "echo");
                if reply == payload {
                    intact += 1;
                }
            }
            Err(e @ StackError::Timeout) | Err(e @ StackError::UnresolvedDestination(_)) => {
                print_line(format_args!("no reply from {}: {}", dest, e));
            }
            Err(e) => return Err(e.into()),
        }
    }

    for (reason, count) in stack.drops().snapshot() {
        debug!(%reason, count, "dropped frames");
    }
    stack.disconnect();
    peer.disconnect();

    print_line(format_args!("{}/{} echoes returned intact", intact, count));
    Ok(intact == count)
}
