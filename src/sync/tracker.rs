//! Request tracker: in-flight attribute fetch bookkeeping
//!
//! Matches outgoing fetch requests to their asynchronous responses or to
//! a timeout deadline, by request identity. Resolution is at-most-once:
//! an entry leaves the table the moment it is resolved or timed out, so a
//! late response finds nothing to match and is silently ignored.
//!
//! Outcomes are returned from explicit [`RequestTracker::resolve`] and
//! [`RequestTracker::tick`] calls rather than delivered through stored
//! callbacks, keeping the whole core single-threaded and poll-driven.

use crate::attributes::{AttributeKey, AttributeSet};
use crate::transport::RequestId;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One outstanding attribute fetch
#[derive(Debug, Clone)]
struct PendingRequest {
    id: RequestId,
    keys: BTreeSet<AttributeKey>,
    issued_at: Instant,
    timeout: Duration,
}

impl PendingRequest {
    fn deadline(&self) -> Instant {
        self.issued_at + self.timeout
    }
}

/// Table of in-flight fetch requests, oldest first
#[derive(Debug, Default)]
pub struct RequestTracker {
    pending: Vec<PendingRequest>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fetch issued through the transport
    ///
    /// Multiple requests may be in flight; each entry is independent and
    /// keyed by the transport-supplied identity.
    pub fn issue(
        &mut self,
        id: RequestId,
        keys: BTreeSet<AttributeKey>,
        timeout: Duration,
        now: Instant,
    ) {
        debug!(request_id = %id, keys = keys.len(), "Tracking attribute fetch");
        self.pending.push(PendingRequest {
            id,
            keys,
            issued_at: now,
            timeout,
        });
    }

    /// Attribute an inbound payload to a pending request and remove it
    ///
    /// With a request identity, match by identity. Without one (the wire
    /// gave no addressing) the payload goes to the oldest still-pending
    /// request that asked for a key present in the set. Returns the
    /// resolved identity, or `None` when nothing was consumed — which is
    /// how a response arriving after its timeout fired gets ignored.
    pub fn resolve(
        &mut self,
        set: &AttributeSet,
        request_id: Option<RequestId>,
    ) -> Option<RequestId> {
        let index = match request_id {
            Some(id) => self.pending.iter().position(|p| p.id == id),
            None => self
                .pending
                .iter()
                .position(|p| p.keys.iter().any(|k| set.contains(k))),
        };

        match index {
            Some(i) => {
                let entry = self.pending.remove(i);
                debug!(request_id = %entry.id, "Fetch resolved by response");
                Some(entry.id)
            }
            None => {
                if let Some(id) = request_id {
                    debug!(request_id = %id, "Ignoring response for unknown or expired request");
                }
                None
            }
        }
    }

    /// Fire timeouts: remove and report every request past its deadline
    ///
    /// Firing is exactly-once; removal happens with the report, so a
    /// subsequent `resolve` for the same identity returns `None`.
    pub fn tick(&mut self, now: Instant) -> Vec<RequestId> {
        let mut expired = Vec::new();
        self.pending.retain(|p| {
            if p.deadline() <= now {
                warn!(request_id = %p.id, timeout = ?p.timeout, "Attribute fetch timed out");
                expired.push(p.id);
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop all in-flight entries, e.g. on connection loss
    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            debug!(dropped = self.pending.len(), "Dropping in-flight fetches");
            self.pending.clear();
        }
    }
}
