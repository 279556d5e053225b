use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, HashSet};

const FAILURE_HORIZON_SECS: i64 = 600;
const MAX_FAILURES: usize = 5;

/// Failed-authorization bookkeeping. A block, once set, stays until
/// [`Lockout::unblock`] is called.
///
/// Not synchronized; the security manager keeps it behind its own lock.
#[derive(Debug, Default)]
pub struct Lockout {
    failures: HashMap<String, Vec<DateTime<Utc>>>,
    blocked: HashSet<String>,
}

impl Lockout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&mut self, identity: &str, now: DateTime<Utc>) {
        self.failures.entry(identity.to_string()).or_default().push(now);
    }

    /// Prunes failures older than ten minutes; five or more recent failures
    /// turn into a permanent block.
    pub fn is_blocked(&mut self, identity: &str, now: DateTime<Utc>) -> bool {
        let cutoff = now - TimeDelta::seconds(FAILURE_HORIZON_SECS);
        if let Some(failures) = self.failures.get_mut(identity) {
            failures.retain(|t| *t > cutoff);
            if failures.len() >= MAX_FAILURES {
                self.blocked.insert(identity.to_string());
            }
            if failures.is_empty() {
                self.failures.remove(identity);
            }
        }
        self.blocked.contains(identity)
    }

    pub fn block(&mut self, identity: &str) {
        self.blocked.insert(identity.to_string());
    }

    /// Lifts a block and forgets the failure history.
    pub fn unblock(&mut self, identity: &str) -> bool {
        self.failures.remove(identity);
        self.blocked.remove(identity)
    }

    pub fn recent_failures(&self, identity: &str) -> usize {
        self.failures.get(identity).map_or(0, Vec::len)
    }
}
