//! Reader/writer lock state machines for namespace nodes.
//!
//! These are not locks in the `std::sync` sense: grant decisions are made
//! under the service-wide state mutex, and a request that cannot be granted
//! immediately receives a oneshot receiver to wait on outside that mutex.
//! Whoever releases a lock hands it over (grant-on-release): the state is
//! updated for the next waiter *before* it is signalled, so a woken task
//! holds the lock the moment it resumes.

use std::collections::VecDeque;

use tokio::sync::oneshot;

/// Outcome of an acquire attempt.
pub enum Acquisition {
    /// The lock is held; no waiting required.
    Granted,
    /// Queued; the receiver fires once the lock has been handed over.
    Queued(oneshot::Receiver<()>),
}

struct Waiter {
    exclusive: bool,
    tx: oneshot::Sender<()>,
}

/// Lock state carried by every directory and file node below the root.
///
/// FIFO among waiters, with writer preference: once any request is queued,
/// later shared arrivals queue behind it instead of joining the current
/// holders.
#[derive(Default)]
pub struct NodeLock {
    shared: usize,
    exclusive: bool,
    queue: VecDeque<Waiter>,
}

impl NodeLock {
    pub fn acquire(&mut self, exclusive: bool) -> Acquisition {
        let compatible = if exclusive {
            self.shared == 0 && !self.exclusive
        } else {
            !self.exclusive
        };
        if compatible && self.queue.is_empty() {
            self.grant(exclusive);
            return Acquisition::Granted;
        }

        let (tx, rx) = oneshot::channel();
        self.queue.push_back(Waiter { exclusive, tx });
        Acquisition::Queued(rx)
    }

    /// Releases one hold. Returns `false` when nothing is held, which is a
    /// client programming error.
    pub fn release(&mut self) -> bool {
        if self.exclusive {
            self.exclusive = false;
        } else if self.shared > 0 {
            self.shared -= 1;
        } else {
            return false;
        }

        if self.shared == 0 && !self.exclusive {
            wake_front(&mut self.queue, &mut self.shared, &mut self.exclusive);
        }
        true
    }

    pub fn is_held(&self) -> bool {
        self.exclusive || self.shared > 0
    }

    fn grant(&mut self, exclusive: bool) {
        if exclusive {
            self.exclusive = true;
        } else {
            self.shared += 1;
        }
    }
}

/// Hands the lock to the head of the queue: either a single exclusive
/// waiter, or the longest run of consecutive shared waiters as one batch.
/// Waiters whose receiver is gone are skipped.
fn wake_front(queue: &mut VecDeque<Waiter>, shared: &mut usize, exclusive: &mut bool) {
    while let Some(front) = queue.front() {
        if front.exclusive {
            if *shared > 0 || *exclusive {
                break;
            }
            let waiter = queue.pop_front().expect("front exists");
            if waiter.tx.send(()).is_ok() {
                *exclusive = true;
                break;
            }
        } else {
            if *exclusive {
                break;
            }
            let waiter = queue.pop_front().expect("front exists");
            if waiter.tx.send(()).is_ok() {
                *shared += 1;
            }
        }
    }
}

/// Lock state of the root directory.
///
/// The root keeps the count of active shared holders (`shared`), one ordered
/// queue of pending requests (`queue`), and a side queue (`exclusive_side`)
/// for exclusive requests that arrived while shared holders were active.
/// When the last holder leaves, the side queue is served before the ordered
/// queue.
#[derive(Default)]
pub struct RootLock {
    shared: usize,
    exclusive: bool,
    queue: VecDeque<Waiter>,
    exclusive_side: VecDeque<Waiter>,
}

impl RootLock {
    pub fn acquire(&mut self, exclusive: bool) -> Acquisition {
        let compatible = if exclusive {
            self.shared == 0 && !self.exclusive
        } else {
            !self.exclusive
        };
        if compatible && self.queue.is_empty() && self.exclusive_side.is_empty() {
            if exclusive {
                self.exclusive = true;
            } else {
                self.shared += 1;
            }
            return Acquisition::Granted;
        }

        let (tx, rx) = oneshot::channel();
        let waiter = Waiter { exclusive, tx };
        if exclusive && self.shared > 0 {
            self.exclusive_side.push_back(waiter);
        } else {
            self.queue.push_back(waiter);
        }
        Acquisition::Queued(rx)
    }

    pub fn release(&mut self) -> bool {
        if self.exclusive {
            self.exclusive = false;
        } else if self.shared > 0 {
            self.shared -= 1;
        } else {
            return false;
        }

        if self.shared == 0 && !self.exclusive {
            while let Some(waiter) = self.exclusive_side.pop_front() {
                if waiter.tx.send(()).is_ok() {
                    self.exclusive = true;
                    return true;
                }
            }
            wake_front(&mut self.queue, &mut self.shared, &mut self.exclusive);
        }
        true
    }

    pub fn is_held(&self) -> bool {
        self.exclusive || self.shared > 0
    }
}
