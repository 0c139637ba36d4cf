
use netlab_packets::{ArpOp, IpProtocol, MacAddr};
use netlab_stack::{ArpState, DropReason, StackError, Transmission};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use test_helper::*;

#[test]
fn resolving_twice_sends_one_request() {
    let (stack, peer) = manual(fast_config(local_mac(), LOCAL_IP));
    stack.ip().send(&[1], IpProtocol::ICMP, LOCAL_IP, PEER_IP).unwrap();
    stack.ip().send(&[2], IpProtocol::ICMP, LOCAL_IP, PEER_IP).unwrap();

    let requests = arp_packets(&frames(&peer));
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].opcode(), ArpOp::Request);
    assert_eq!(requests[0].sender_hardware_addr(), local_mac());
    assert_eq!(requests[0].sender_protocol_addr(), LOCAL_IP);
    assert_eq!(requests[0].target_hardware_addr(), MacAddr::ZERO);

    let entry = stack.arp().entry(PEER_IP).unwrap();
    assert_eq!(entry.state, ArpState::Incomplete);
    assert_eq!(entry.pending, 2);
    assert_eq!(entry.requests, 1);
}

#[test]
fn request_frame_is_broadcast() {
    let (stack, peer) = manual(fast_config(local_mac(), LOCAL_IP));
    stack.send_echo(PING_PONG, PEER_IP).unwrap();
    let sent = frames(&peer);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].dest_mac(), MacAddr::BROADCAST);
    assert_eq!(sent[0].src_mac(), local_mac());
    assert_eq!(sent[0].len(), 60);
}

#[test]
fn pending_flushed_in_order() {
    let (stack, peer) = manual(fast_config(local_mac(), LOCAL_IP));
    let payloads: Vec<Vec<u8>> = vec![b"P1".to_vec(), b"P2".to_vec(), b"P3".to_vec()];
    for payload in &payloads {
        let sent = stack.ip().send(payload, IpProtocol::ICMP, LOCAL_IP, PEER_IP).unwrap();
        assert!(sent.is_deferred());
    }
    frames(&peer);

    assert_eq!(stack.receive_frame(peer_reply(peer_mac(), PEER_IP)), 14 + 28);
    let flushed = datagrams(&frames(&peer));
    let got: Vec<Vec<u8>> = flushed.iter().map(|packet| packet.payload().into_owned()).collect();
    assert_eq!(got, payloads);

    let entry = stack.arp().entry(PEER_IP).unwrap();
    assert_eq!(entry.state, ArpState::Resolved);
    assert_eq!(entry.mac, Some(peer_mac()));
    assert_eq!(entry.pending, 0);
}

#[test]
fn flushed_frames_go_to_resolved_mac() {
    let (stack, peer) = manual(fast_config(local_mac(), LOCAL_IP));
    stack.ip().send(b"P1", IpProtocol::ICMP, LOCAL_IP, PEER_IP).unwrap();
    frames(&peer);
    stack.receive_frame(peer_reply(peer_mac(), PEER_IP));
    for frame in frames(&peer) {
        assert_eq!(frame.dest_mac(), peer_mac());
        assert_eq!(frame.src_mac(), local_mac());
    }
}

#[test]
fn queue_is_bounded() {
    let (stack, _peer) = manual(fast_config(local_mac(), LOCAL_IP));
    for i in 0..8u8 {
        stack.ip().send(&[i], IpProtocol::ICMP, LOCAL_IP, PEER_IP).unwrap();
    }
    assert_eq!(
        stack.ip().send(&[9], IpProtocol::ICMP, LOCAL_IP, PEER_IP),
        Err(StackError::PendingQueueFull(PEER_IP))
    );
}

#[test]
fn unsolicited_reply_not_trusted() {
    let (stack, peer) = manual(fast_config(local_mac(), LOCAL_IP));
    assert_eq!(stack.receive_frame(peer_reply(peer_mac(), PEER_IP)), 0);
    assert_eq!(stack.arp().lookup(PEER_IP), None);
    assert_eq!(stack.drops().get(DropReason::UnsolicitedReply), 1);
    assert_eq!(peer.queued(), 0);
}

#[test]
fn fresh_binding_not_overwritten() {
    let (stack, peer) = manual(fast_config(local_mac(), LOCAL_IP));
    let spoofer = MacAddr::new([0x02, 0xba, 0xd0, 0x00, 0x00, 0x01]);

    assert!(stack.receive_frame(request_from(peer_mac(), PEER_IP)) > 0);
    assert_eq!(arp_packets(&frames(&peer)).len(), 1);

    assert_eq!(stack.receive_frame(request_from(spoofer, PEER_IP)), 0);
    assert_eq!(stack.arp().lookup(PEER_IP), Some(peer_mac()));
    assert_eq!(stack.drops().get(DropReason::ArpConflict), 1);
    // No reply goes to the spoofer.
    assert_eq!(peer.queued(), 0);

    // Replies without a request of ours can't rebind it either.
    stack.receive_frame(peer_reply(spoofer, PEER_IP));
    assert_eq!(stack.arp().lookup(PEER_IP), Some(peer_mac()));
}

#[test]
fn stale_binding_may_be_replaced() {
    let mut config = fast_config(local_mac(), LOCAL_IP);
    config.arp.entry_ttl = Duration::from_millis(30);
    let (stack, peer) = manual(config);
    let replacement = MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x99]);

    stack.receive_frame(request_from(peer_mac(), PEER_IP));
    std::thread::sleep(Duration::from_millis(60));
    assert!(stack.receive_frame(request_from(replacement, PEER_IP)) > 0);
    assert_eq!(stack.arp().lookup(PEER_IP), Some(replacement));

    let replies = arp_packets(&frames(&peer));
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[1].target_hardware_addr(), replacement);
}

#[test]
fn bogus_sender_dropped() {
    let (stack, peer) = manual(fast_config(local_mac(), LOCAL_IP));
    assert_eq!(stack.receive_frame(request_from(MacAddr::BROADCAST, PEER_IP)), 0);
    assert_eq!(stack.receive_frame(request_from(MacAddr::new([0x01, 0, 0x5e, 0, 0, 1]), PEER_IP)), 0);
    assert_eq!(stack.receive_frame(request_from(peer_mac(), LOCAL_IP)), 0);
    assert!(stack.arp().entries().is_empty());
    assert_eq!(peer.queued(), 0);
}

#[test]
fn off_link_sender_not_learned() {
    let (stack, peer) = manual(fast_config(local_mac(), LOCAL_IP));
    for last in 1..=50u8 {
        let sender = MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x01, last]);
        assert_eq!(stack.receive_frame(request_from(sender, Ipv4Addr::new(192, 168, 7, last))), 0);
    }
    assert!(stack.arp().entries().is_empty());
    assert_eq!(stack.drops().get(DropReason::MalformedArp), 50);
    assert_eq!(peer.queued(), 0);
}

#[test]
fn stale_binding_ages_out_of_table() {
    let mut config = fast_config(local_mac(), LOCAL_IP);
    config.arp.entry_ttl = Duration::from_millis(30);
    let (stack, _peer) = manual(config);
    let start = Instant::now();
    stack.receive_frame(request_from(peer_mac(), PEER_IP));
    assert_eq!(stack.arp().entries().len(), 1);

    stack.poll_timers_at(start + Duration::from_secs(1));
    assert!(stack.arp().entries().is_empty());
}

#[test]
fn retries_then_gives_up() {
    let (stack, peer) = manual(fast_config(local_mac(), LOCAL_IP));
    let sent = stack.send_echo(PING_PONG, PEER_IP).unwrap();
    assert!(sent.is_deferred());
    let start = Instant::now();

    assert_eq!(stack.poll_timers_at(start + Duration::from_millis(20)), 1);
    assert_eq!(stack.poll_timers_at(start + Duration::from_millis(40)), 1);
    assert_eq!(arp_packets(&frames(&peer)).len(), 3);
    assert_eq!(stack.arp().entry(PEER_IP).unwrap().requests, 3);

    assert_eq!(stack.poll_timers_at(start + Duration::from_millis(60)), 0);
    assert_eq!(stack.arp().entry(PEER_IP), None);

    // The outstanding echo fails at once instead of waiting out its timeout.
    let waiting = Instant::now();
    let mut buf = [0u8; 32];
    assert_eq!(stack.read_echo(&mut buf), Err(StackError::UnresolvedDestination(PEER_IP)));
    assert!(waiting.elapsed() < Duration::from_secs(1));
}

#[test]
fn unresolved_destination_over_live_read_loop() {
    let (stack, _peer) = manual(fast_config(local_mac(), LOCAL_IP));
    stack.connect().unwrap();
    let start = Instant::now();
    assert!(stack.send_echo(PING_PONG, PEER_IP).unwrap().is_deferred());

    let mut buf = [0u8; 32];
    assert_eq!(stack.read_echo(&mut buf), Err(StackError::UnresolvedDestination(PEER_IP)));
    assert!(start.elapsed() < stack.config().echo.reply_timeout);
    stack.disconnect();
}

#[test]
fn short_frame_dropped() {
    let (stack, peer) = manual(fast_config(local_mac(), LOCAL_IP));
    assert_eq!(stack.receive_frame(vec![0xff; 13]), 0);
    assert_eq!(stack.receive_frame(Vec::new()), 0);
    assert_eq!(stack.drops().get(DropReason::MalformedFrame), 2);
    assert_eq!(stack.drops().total(), 2);
    assert_eq!(peer.queued(), 0);
}

#[test]
fn padded_arp_frame_accepted() {
    let (stack, _peer) = manual(fast_config(local_mac(), LOCAL_IP));
    let frame = request_from(peer_mac(), PEER_IP);
    assert_eq!(frame.len(), 60);
    assert_eq!(stack.receive_frame(frame), 14 + 28);
    assert!(matches!(
        stack.ip().send(&[0], IpProtocol::ICMP, LOCAL_IP, PEER_IP),
        Ok(Transmission::Sent(_))
    ));
}
