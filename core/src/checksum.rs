//! Streaming checksum accumulator and desync detection.
//!
//! RULE: Two peers that feed byte-identical state in byte-identical
//! order must finish to identical digests. A mismatch is a terminal
//! synchronization fault for the session and is never retried.

use crate::{
    error::{SimError, SimResult},
    types::SimTime,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io;

pub const DIGEST_LEN: usize = 32;

/// A fixed-size state digest exchanged between peers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checksum(pub [u8; DIGEST_LEN]);

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({self})")
    }
}

/// Folds arbitrarily chunked byte streams into one digest per interval.
#[derive(Clone, Default)]
pub struct StreamingChecksum {
    hasher:     Sha256,
    bytes_seen: u64,
}

impl StreamingChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        Digest::reset(&mut self.hasher);
        self.bytes_seen = 0;
    }

    pub fn update(&mut self, bytes: &[u8]) {
        Digest::update(&mut self.hasher, bytes);
        self.bytes_seen += bytes.len() as u64;
    }

    /// Bytes folded in since the last reset.
    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    /// Produce the digest and start the next interval.
    pub fn finish(&mut self) -> Checksum {
        let out = self.hasher.finalize_reset();
        self.bytes_seen = 0;
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&out);
        Checksum(digest)
    }
}

impl io::Write for StreamingChecksum {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compares this peer's digests against the ones the network layer
/// carries from another peer. Either side may arrive first.
#[derive(Debug, Default)]
pub struct DesyncMonitor {
    local:             BTreeMap<SimTime, Checksum>,
    remote:            BTreeMap<SimTime, Checksum>,
    verified_through:  Option<SimTime>,
}

impl DesyncMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_local(&mut self, tick: SimTime, digest: Checksum) -> SimResult<()> {
        self.local.insert(tick, digest);
        self.compare(tick)
    }

    pub fn record_remote(&mut self, tick: SimTime, digest: Checksum) -> SimResult<()> {
        self.remote.insert(tick, digest);
        self.compare(tick)
    }

    /// Highest tick at which both peers were seen to agree.
    pub fn verified_through(&self) -> Option<SimTime> {
        self.verified_through
    }

    /// Ticks recorded on one side only.
    pub fn pending(&self) -> usize {
        self.local.len() + self.remote.len()
    }

    fn compare(&mut self, tick: SimTime) -> SimResult<()> {
        let (Some(local), Some(remote)) = (self.local.get(&tick), self.remote.get(&tick)) else {
            return Ok(());
        };
        if local != remote {
            log::error!("desync at tick {tick}: local {local} remote {remote}");
            return Err(SimError::DeterminismViolation {
                tick,
                local:  *local,
                remote: *remote,
            });
        }
        self.local.remove(&tick);
        self.remote.remove(&tick);
        self.verified_through = Some(self.verified_through.map_or(tick, |t| t.max(tick)));
        log::trace!("checksums agree at tick {tick}");
        Ok(())
    }
}
