use parking_lot::Mutex;
use processing_common::{DistributorError, Priority, Result};
use std::collections::VecDeque;
use tokio::sync::Semaphore;

struct Lanes<T> {
    high: VecDeque<T>,
    regular: VecDeque<T>,
}

/// Two-lane queue shared by the consumers of a worker family.
///
/// Only the regular lane is bounded: `add_regular_entry` waits while it
/// holds `capacity` entries, `add_high_priority_entry` never waits. `take`
/// drains the high lane before the regular one and is FIFO within a lane.
///
/// Permits mirror the lane contents. `available` holds one permit per queued
/// entry and `regular_slots` one permit per free regular slot. A permit is
/// always consumed right before the matching pop or push with no await in
/// between, so dropping a pending `take` or `add_regular_entry` loses
/// nothing.
pub struct PriorityTaskQueue<T> {
    capacity: usize,
    lanes: Mutex<Lanes<T>>,
    regular_slots: Semaphore,
    available: Semaphore,
}

impl<T> PriorityTaskQueue<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(DistributorError::invalid_argument(
                "queue capacity must be positive",
            ));
        }
        Ok(PriorityTaskQueue {
            capacity,
            lanes: Mutex::new(Lanes {
                high: VecDeque::new(),
                regular: VecDeque::new(),
            }),
            regular_slots: Semaphore::new(capacity),
            available: Semaphore::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue an entry in the high lane. Never waits.
    pub fn add_high_priority_entry(&self, item: T) -> Result<()> {
        if self.available.is_closed() {
            return Err(DistributorError::QueueClosed);
        }
        self.lanes.lock().high.push_back(item);
        self.available.add_permits(1);
        Ok(())
    }

    /// Queue an entry in the regular lane, waiting for a free slot.
    pub async fn add_regular_entry(&self, item: T) -> Result<()> {
        let slot = self
            .regular_slots
            .acquire()
            .await
            .map_err(|_| DistributorError::QueueClosed)?;
        slot.forget();
        self.lanes.lock().regular.push_back(item);
        self.available.add_permits(1);
        Ok(())
    }

    /// Queue an entry in the lane matching `priority`.
    pub async fn add_entry(&self, item: T, priority: Priority) -> Result<()> {
        match priority {
            Priority::High => self.add_high_priority_entry(item),
            Priority::Regular => self.add_regular_entry(item).await,
        }
    }

    /// Remove the next entry, waiting while both lanes are empty.
    pub async fn take(&self) -> Result<T> {
        loop {
            let permit = self
                .available
                .acquire()
                .await
                .map_err(|_| DistributorError::QueueClosed)?;
            permit.forget();
            if let Some(item) = self.pop() {
                return Ok(item);
            }
        }
    }

    /// Remove the next entry if there is one.
    pub fn try_take(&self) -> Option<T> {
        let permit = self.available.try_acquire().ok()?;
        permit.forget();
        self.pop()
    }

    fn pop(&self) -> Option<T> {
        let mut lanes = self.lanes.lock();
        if let Some(item) = lanes.high.pop_front() {
            return Some(item);
        }
        let item = lanes.regular.pop_front()?;
        drop(lanes);
        self.regular_slots.add_permits(1);
        Some(item)
    }

    /// Entries waiting in both lanes.
    pub fn size(&self) -> usize {
        let lanes = self.lanes.lock();
        lanes.high.len() + lanes.regular.len()
    }

    pub fn high_size(&self) -> usize {
        self.lanes.lock().high.len()
    }

    pub fn regular_size(&self) -> usize {
        self.lanes.lock().regular.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Wake every waiter with `QueueClosed`. Queued entries stay in place
    /// but can no longer be taken.
    pub fn close(&self) {
        self.regular_slots.close();
        self.available.close();
    }

    pub fn is_closed(&self) -> bool {
        self.available.is_closed()
    }
}
