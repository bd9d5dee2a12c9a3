use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Synthetic impairments for one direction of a link.
#[derive(Debug, Clone, Default)]
pub struct LinkConditions {
    pub drop_percent: f32,
    pub min_delay: f32,
    pub max_delay: f32,
    pub jitter: f32,
}

impl LinkConditions {
    pub fn lossy(drop_percent: f32) -> Self {
        Self {
            drop_percent,
            ..Self::default()
        }
    }

    pub fn jittery(min_delay: f32, max_delay: f32, jitter: f32) -> Self {
        Self {
            drop_percent: 0.0,
            min_delay,
            max_delay,
            jitter,
        }
    }
}

#[derive(Debug)]
struct DelayedMessage {
    release_at: f32,
    arrival: u64,
    datagram: Vec<u8>,
}

impl PartialEq for DelayedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.release_at == other.release_at && self.arrival == other.arrival
    }
}

impl Eq for DelayedMessage {}

impl PartialOrd for DelayedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .release_at
            .total_cmp(&self.release_at)
            .then(other.arrival.cmp(&self.arrival))
    }
}

/// Deterministic in-memory channel for exercising loss, latency, and
/// reordering in tests without sockets or wall-clock sleeps. Jittery
/// delays naturally reorder messages.
#[derive(Debug)]
pub struct LinkSimulator {
    conditions: LinkConditions,
    queue: BinaryHeap<DelayedMessage>,
    rng_state: u64,
    next_arrival: u64,
    dropped: u64,
}

impl LinkSimulator {
    pub fn new(conditions: LinkConditions, seed: u64) -> Self {
        Self {
            conditions,
            queue: BinaryHeap::new(),
            rng_state: seed.max(1),
            next_arrival: 0,
            dropped: 0,
        }
    }

    pub fn push(&mut self, datagram: Vec<u8>, now: f32) {
        if self.conditions.drop_percent > 0.0
            && self.next_rand() * 100.0 < self.conditions.drop_percent
        {
            self.dropped += 1;
            return;
        }

        let spread = (self.conditions.max_delay - self.conditions.min_delay).max(0.0);
        let mut delay = self.conditions.min_delay + self.next_rand() * spread;
        if self.conditions.jitter > 0.0 {
            delay += self.next_rand() * self.conditions.jitter;
        }

        let arrival = self.next_arrival;
        self.next_arrival += 1;
        self.queue.push(DelayedMessage {
            release_at: now + delay,
            arrival,
            datagram,
        });
    }

    /// Everything whose delivery time has come, in delivery order.
    pub fn deliver(&mut self, now: f32) -> Vec<Vec<u8>> {
        let mut delivered = Vec::new();
        while let Some(message) = self.queue.peek() {
            if message.release_at > now {
                break;
            }
            if let Some(message) = self.queue.pop() {
                delivered.push(message.datagram);
            }
        }
        delivered
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn next_rand(&mut self) -> f32 {
        // xorshift64*, seeded so failures replay.
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        (x.wrapping_mul(0x2545F4914F6CDD1D) >> 40) as f32 / (1u64 << 24) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_link_delivers_in_order() {
        let mut link = LinkSimulator::new(LinkConditions::default(), 7);
        link.push(vec![1], 0.0);
        link.push(vec![2], 0.0);
        link.push(vec![3], 0.0);

        let delivered = link.deliver(0.0);
        assert_eq!(delivered, vec![vec![1], vec![2], vec![3]]);
        assert_eq!(link.pending(), 0);
    }

    #[test]
    fn delay_holds_messages_until_due() {
        let conditions = LinkConditions::jittery(0.5, 0.5, 0.0);
        let mut link = LinkSimulator::new(conditions, 7);
        link.push(vec![1], 0.0);

        assert!(link.deliver(0.4).is_empty());
        assert_eq!(link.deliver(0.6), vec![vec![1]]);
    }

    #[test]
    fn full_loss_drops_everything() {
        let mut link = LinkSimulator::new(LinkConditions::lossy(100.0), 7);
        for _ in 0..10 {
            link.push(vec![0], 0.0);
        }
        assert_eq!(link.dropped(), 10);
        assert_eq!(link.pending(), 0);
    }

    #[test]
    fn same_seed_replays_identically() {
        let conditions = LinkConditions {
            drop_percent: 30.0,
            min_delay: 0.0,
            max_delay: 0.2,
            jitter: 0.1,
        };
        let mut a = LinkSimulator::new(conditions.clone(), 99);
        let mut b = LinkSimulator::new(conditions, 99);

        for i in 0..20u8 {
            a.push(vec![i], 0.0);
            b.push(vec![i], 0.0);
        }
        assert_eq!(a.dropped(), b.dropped());
        assert_eq!(a.deliver(10.0), b.deliver(10.0));
    }

    #[test]
    fn jitter_reorders_messages() {
        let conditions = LinkConditions::jittery(0.0, 0.5, 0.0);
        let mut link = LinkSimulator::new(conditions, 3);
        for i in 0..16u8 {
            link.push(vec![i], 0.0);
        }

        let delivered = link.deliver(1.0);
        assert_eq!(delivered.len(), 16);
        assert_ne!(
            delivered,
            (0..16u8).map(|i| vec![i]).collect::<Vec<_>>(),
            "seed produced no reordering"
        );
    }
}
