/// Connection admission slots
///
/// A fixed pool of `max_conn` tags in a bounded channel, all present at
/// start. The accept loop takes one per connection and waits when none are
/// left; the tag goes back when its `Slot` drops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Admission {
    tx: mpsc::Sender<u16>,
    rx: mpsc::Receiver<u16>,
    capacity: usize,
    in_use: Arc<AtomicUsize>,
}

/// A checked-out tag. Returned to the pool exactly once, on drop.
#[derive(Debug)]
pub struct Slot {
    tag: u16,
    tx: mpsc::Sender<u16>,
    in_use: Arc<AtomicUsize>,
}

impl Slot {
    pub fn tag(&self) -> u16 {
        self.tag
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
        if self.tx.try_send(self.tag).is_err() {
            tracing::error!("Admission slot {} could not be returned", self.tag);
        }
    }
}

impl Admission {
    /// `max_conn` must be in `1..=65536`; tags are `0..max_conn`.
    pub fn new(max_conn: usize) -> Self {
        let capacity = max_conn.clamp(1, u16::MAX as usize + 1);
        let (tx, rx) = mpsc::channel(capacity);
        for tag in 0..capacity {
            // capacity matches the tag count, never full here
            let _ = tx.try_send(tag as u16);
        }
        Self {
            tx,
            rx,
            capacity,
            in_use: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free tag.
    pub async fn acquire(&mut self) -> Option<Slot> {
        let tag = self.rx.recv().await?;
        self.in_use.fetch_add(1, Ordering::AcqRel);
        Some(Slot {
            tag,
            tx: self.tx.clone(),
            in_use: self.in_use.clone(),
        })
    }

    /// Take a free tag without waiting.
    pub fn try_acquire(&mut self) -> Option<Slot> {
        let tag = self.rx.try_recv().ok()?;
        self.in_use.fetch_add(1, Ordering::AcqRel);
        Some(Slot {
            tag,
            tx: self.tx.clone(),
            in_use: self.in_use.clone(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[tokio::test]
    async fn test_tags_are_distinct_and_bounded() {
        let mut admission = Admission::new(3);
        let a = admission.acquire().await.unwrap();
        let b = admission.acquire().await.unwrap();
        let c = admission.acquire().await.unwrap();
        let tags: HashSet<u16> = [a.tag(), b.tag(), c.tag()].into_iter().collect();
        assert_eq!(tags, HashSet::from([0, 1, 2]));
        assert_eq!(admission.in_use(), 3);
        assert!(admission.try_acquire().is_none());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let mut admission = Admission::new(1);
        let slot = admission.acquire().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), admission.acquire()).await;
        assert!(blocked.is_err());

        let tag = slot.tag();
        drop(slot);
        let again = admission.acquire().await.unwrap();
        assert_eq!(again.tag(), tag);
        assert_eq!(admission.in_use(), 1);
    }

    #[test]
    fn test_capacity_clamped() {
        assert_eq!(Admission::new(0).capacity(), 1);
        assert_eq!(Admission::new(70_000).capacity(), 65_536);
    }
}
