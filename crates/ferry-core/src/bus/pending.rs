use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{BusError, BusResult};
use crate::event::Event;

/// A delivery evicted by the timeout scan, handed back for disposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedOutDelivery {
    pub delivery_id: Uuid,
    pub event: Event,
    pub delivered_at: DateTime<Utc>,
}

struct Node {
    delivery_id: Uuid,
    event: Event,
    delivered_at: DateTime<Utc>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Deliveries awaiting an ack, oldest first.
///
/// Nodes live in an arena (`slots`) linked through prev/next indices, with a
/// hash index from delivery id to slot. Insert and remove are O(1); the
/// timeout scan walks from the head and stops at the first live entry, so it
/// costs O(k) in the number of expired deliveries.
pub struct PendingAcks {
    ack_timeout: Duration,
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    index: HashMap<Uuid, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl PendingAcks {
    pub fn new(ack_timeout_minutes: u32) -> Self {
        Self {
            ack_timeout: Duration::minutes(i64::from(ack_timeout_minutes)),
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    pub fn add_event(&mut self, delivery_id: Uuid, event: Event) {
        self.add_event_at(delivery_id, event, Utc::now());
    }

    /// Append at the tail. Re-adding a known id replaces the old entry.
    pub fn add_event_at(&mut self, delivery_id: Uuid, event: Event, delivered_at: DateTime<Utc>) {
        self.take(delivery_id);

        let node = Node {
            delivery_id,
            event,
            delivered_at,
            prev: self.tail,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        match self.tail {
            Some(tail) => {
                if let Some(t) = self.slots[tail].as_mut() {
                    t.next = Some(slot);
                }
            }
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.index.insert(delivery_id, slot);
    }

    pub fn remove_event(&mut self, delivery_id: Uuid) -> bool {
        self.take(delivery_id).is_some()
    }

    pub fn get_event(&self, delivery_id: Uuid) -> BusResult<Event> {
        self.index
            .get(&delivery_id)
            .and_then(|&slot| self.slots[slot].as_ref())
            .map(|node| node.event.clone())
            .ok_or_else(|| BusError::EventNotFound(delivery_id.to_string()))
    }

    pub fn contains_event(&self, delivery_id: Uuid) -> bool {
        self.index.contains_key(&delivery_id)
    }

    pub fn count(&self) -> usize {
        self.index.len()
    }

    /// Evict every delivery whose ack window has closed at `now`.
    pub fn get_and_remove_timed_out_events(&mut self, now: DateTime<Utc>) -> Vec<TimedOutDelivery> {
        let mut expired = Vec::new();
        while let Some(head) = self.head {
            let Some(node) = self.slots[head].as_ref() else {
                break;
            };
            if node.delivered_at + self.ack_timeout > now {
                break;
            }
            let delivery_id = node.delivery_id;
            if let Some(node) = self.take(delivery_id) {
                expired.push(TimedOutDelivery {
                    delivery_id,
                    event: node.event,
                    delivered_at: node.delivered_at,
                });
            }
        }
        expired
    }

    fn take(&mut self, delivery_id: Uuid) -> Option<Node> {
        let slot = self.index.remove(&delivery_id)?;
        let node = self.slots[slot].take()?;

        match node.prev {
            Some(prev) => {
                if let Some(p) = self.slots[prev].as_mut() {
                    p.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(n) = self.slots[next].as_mut() {
                    n.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }

        self.free.push(slot);
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::minutes(minute)
    }

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = PendingAcks::new(1);
        let id = Uuid::new_v4();
        store.add_event(id, Event::new("k", "b"));
        assert!(store.contains_event(id));
        assert!(store.remove_event(id));
        assert!(!store.remove_event(id));
        assert!(!store.remove_event(Uuid::new_v4()));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn get_unknown_event_fails() {
        let store = PendingAcks::new(1);
        assert!(matches!(
            store.get_event(Uuid::new_v4()),
            Err(BusError::EventNotFound(_))
        ));
    }

    #[test]
    fn timeout_scan_returns_oldest_first_and_stops_at_first_live_entry() {
        let mut store = PendingAcks::new(5);
        let ids = ids(4);
        for (i, id) in ids.iter().enumerate() {
            store.add_event_at(*id, Event::new(vec![i as u8], vec![]), at(i as i64));
        }

        // at minute 6: entries delivered at 0 and 1 have expired (0+5<=6, 1+5<=6).
        let expired = store.get_and_remove_timed_out_events(at(6));
        let got: Vec<Uuid> = expired.iter().map(|d| d.delivery_id).collect();
        assert_eq!(got, vec![ids[0], ids[1]]);
        assert_eq!(store.count(), 2);
        assert!(store.contains_event(ids[2]));

        assert!(store.get_and_remove_timed_out_events(at(6)).is_empty());
        assert_eq!(store.get_and_remove_timed_out_events(at(100)).len(), 2);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn removing_from_the_middle_keeps_order() {
        let mut store = PendingAcks::new(1);
        let ids = ids(5);
        for (i, id) in ids.iter().enumerate() {
            store.add_event_at(*id, Event::default(), at(i as i64));
        }
        assert!(store.remove_event(ids[2]));
        assert!(store.remove_event(ids[0]));
        assert!(store.remove_event(ids[4]));

        // slots get reused; order must still follow insertion
        let late = Uuid::new_v4();
        store.add_event_at(late, Event::default(), at(10));

        let order: Vec<Uuid> = store
            .get_and_remove_timed_out_events(at(60))
            .into_iter()
            .map(|d| d.delivery_id)
            .collect();
        assert_eq!(order, vec![ids[1], ids[3], late]);
    }

    #[test]
    fn re_adding_an_id_moves_it_to_the_tail() {
        let mut store = PendingAcks::new(1);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.add_event_at(a, Event::new("old", ""), at(0));
        store.add_event_at(b, Event::default(), at(1));
        store.add_event_at(a, Event::new("new", ""), at(2));

        assert_eq!(store.count(), 2);
        assert_eq!(store.get_event(a).unwrap().key, b"new");
        let order: Vec<Uuid> = store
            .get_and_remove_timed_out_events(at(60))
            .into_iter()
            .map(|d| d.delivery_id)
            .collect();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn expiry_is_inclusive_of_the_deadline() {
        let mut store = PendingAcks::new(2);
        let id = Uuid::new_v4();
        store.add_event_at(id, Event::default(), at(0));
        assert!(store.get_and_remove_timed_out_events(at(1)).is_empty());
        let expired = store.get_and_remove_timed_out_events(at(2));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].delivered_at, at(0));
    }
}
