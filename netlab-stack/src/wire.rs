use crate::error::{Result, StackError};
use crossbeam::crossbeam_channel::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// The link a stack transmits frames on and reads frames from. Delivery is unreliable but
/// order preserving per direction; what the stack reads is already filtered by the
/// transport, promiscuous or not.
pub trait WireTransport: Send + Sync {
    /// Puts one whole frame on the wire, returning the bytes written.
    fn transmit(&self, frame: &[u8]) -> Result<usize>;

    /// Waits up to `timeout` for the next frame. `Ok(None)` means nothing arrived in time.
    fn receive(&self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// One end of an in-memory point-to-point Ethernet segment.
#[derive(Debug, Clone)]
pub struct CableEnd {
    outbound: Sender<Vec<u8>>,
    inbound: Receiver<Vec<u8>>,
}

/// A full duplex cable: whatever one end transmits, the other end receives.
pub fn cable() -> (CableEnd, CableEnd) {
    let (a_to_b, b_from_a) = crossbeam_channel::unbounded();
    let (b_to_a, a_from_b) = crossbeam_channel::unbounded();
    (
        CableEnd {
            outbound: a_to_b,
            inbound: a_from_b,
        },
        CableEnd {
            outbound: b_to_a,
            inbound: b_from_a,
        },
    )
}

impl CableEnd {
    /// Frames waiting to be read on this end.
    pub fn queued(&self) -> usize {
        self.inbound.len()
    }

    /// Reads everything already waiting on this end without blocking.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.inbound.try_iter().collect()
    }
}

impl WireTransport for CableEnd {
    fn transmit(&self, frame: &[u8]) -> Result<usize> {
        self.outbound
            .send(frame.to_vec())
            .map_err(|_| StackError::Disconnected)?;
        Ok(frame.len())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self.inbound.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(StackError::Disconnected),
        }
    }
}
