use std::sync::atomic::{AtomicBool, Ordering};

/// Answers whether this node currently leads the cluster. Only leaders
/// accept client writes and fan them out to followers.
pub trait Leadership: Send + Sync {
    fn is_leader(&self) -> bool;
}

/// Leadership fixed by configuration, switchable at runtime by whatever
/// election mechanism the deployment uses.
#[derive(Debug)]
pub struct StaticLeadership {
    leader: AtomicBool,
}

impl StaticLeadership {
    pub fn new(leader: bool) -> Self {
        Self {
            leader: AtomicBool::new(leader),
        }
    }

    pub fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
    }
}

impl Leadership for StaticLeadership {
    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leadership_can_be_handed_over() {
        let leadership = StaticLeadership::new(true);
        assert!(leadership.is_leader());
        leadership.set_leader(false);
        assert!(!leadership.is_leader());
    }
}
