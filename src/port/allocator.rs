use super::conflict::is_port_free;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashSet;

type Probe = Box<dyn Fn(u16) -> bool + Send + Sync>;

/// Hands out local ports for one run.
///
/// Each allocation is the lowest port at or above the preferred one that is
/// free on the host and not already handed out by this allocator.
pub struct PortAllocator {
    used: Mutex<HashSet<u16>>,
    probe: Probe,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::with_probe(is_port_free)
    }

    /// Uses `probe` instead of a bind test to decide whether a port is free.
    pub fn with_probe(probe: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
        Self {
            used: Mutex::new(HashSet::new()),
            probe: Box::new(probe),
        }
    }

    pub fn allocate(&self, preferred: u16) -> Result<u16> {
        let mut used = self.used.lock();
        for port in preferred.max(1)..=u16::MAX {
            if used.contains(&port) || !(self.probe)(port) {
                continue;
            }
            used.insert(port);
            if port != preferred {
                tracing::debug!("Port {} unavailable, using {}", preferred, port);
            }
            return Ok(port);
        }
        Err(Error::PortAllocation(format!(
            "no free local port at or above {}",
            preferred
        )))
    }

    #[cfg(test)]
    fn release(&self, port: u16) {
        self.used.lock().remove(&port);
    }

    #[cfg(test)]
    fn allocated(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.used.lock().iter().copied().collect();
        ports.sort_unstable();
        ports
    }
}
