//! Deferred one-shot callbacks
//!
//! The pool is an index arena: it holds the only strong reference to every
//! pending entry. Firing takes the callback out of its slot, invokes it with
//! the pool unborrowed, then frees the slot. Nothing reads the entry after
//! the slot is freed.

use std::cell::RefCell;
use std::fmt;
use std::time::{Duration, Instant};

/// Callback invoked with the environment the pool is driven with
pub type TimerCallback<E> = Box<dyn FnOnce(&mut E)>;

/// Arena handle of a pending entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TimerHandle {
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvokerState {
    Scheduled,
    Fired,
}

struct Invoker<E> {
    deadline: Instant,
    sequence: u64,
    state: InvokerState,
    callback: Option<TimerCallback<E>>,
}

struct Slot<E> {
    generation: u32,
    invoker: Option<Invoker<E>>,
}

/// Pool of pending one-shot callbacks.
///
/// There is no per-entry cancellation. Dropping or clearing the pool drops
/// every pending callback without running it.
pub struct TimerPool<E> {
    slots: Vec<Slot<E>>,
    free: Vec<usize>,
    len: usize,
    next_sequence: u64,
}

impl<E> TimerPool<E> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            next_sequence: 0,
        }
    }

    /// Schedule `callback` to run once, `delay` from now
    pub fn call_after_delay<F>(&mut self, delay: Duration, callback: F)
    where
        F: FnOnce(&mut E) + 'static,
    {
        self.insert(Instant::now() + delay, Box::new(callback));
    }

    /// Number of entries not yet removed, including one that is firing
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Earliest deadline among scheduled entries
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduled().map(|(_, invoker)| invoker.deadline).min()
    }

    /// Drop every pending entry without firing it
    pub fn clear(&mut self) {
        let dropped = self.len;
        for slot in &mut self.slots {
            if slot.invoker.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free = (0..self.slots.len()).rev().collect();
        self.len = 0;
        if dropped > 0 {
            log::debug!("dropped {dropped} pending timer(s)");
        }
    }

    fn insert(&mut self, deadline: Instant, callback: TimerCallback<E>) -> TimerHandle {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let invoker = Invoker {
            deadline,
            sequence,
            state: InvokerState::Scheduled,
            callback: Some(callback),
        };

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index].invoker = Some(invoker);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    invoker: Some(invoker),
                });
                self.slots.len() - 1
            }
        };
        self.len += 1;

        TimerHandle {
            index,
            generation: self.slots[index].generation,
        }
    }

    fn scheduled(&self) -> impl Iterator<Item = (usize, &Invoker<E>)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.invoker
                .as_ref()
                .filter(|invoker| invoker.state == InvokerState::Scheduled)
                .map(|invoker| (index, invoker))
        })
    }

    /// Handles of entries due at `now`, earliest first
    fn due(&self, now: Instant) -> Vec<TimerHandle> {
        let mut due: Vec<(Instant, u64, TimerHandle)> = self
            .scheduled()
            .filter(|(_, invoker)| invoker.deadline <= now)
            .map(|(index, invoker)| {
                let handle = TimerHandle {
                    index,
                    generation: self.slots[index].generation,
                };
                (invoker.deadline, invoker.sequence, handle)
            })
            .collect();
        due.sort_by_key(|(deadline, sequence, _)| (*deadline, *sequence));
        due.into_iter().map(|(_, _, handle)| handle).collect()
    }

    /// Mark an entry fired and take its callback
    fn begin_fire(&mut self, handle: TimerHandle) -> Option<TimerCallback<E>> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        let invoker = slot.invoker.as_mut()?;
        if invoker.state != InvokerState::Scheduled {
            return None;
        }
        invoker.state = InvokerState::Fired;
        invoker.callback.take()
    }

    /// Free the slot of a fired entry
    fn remove(&mut self, handle: TimerHandle) {
        let Some(slot) = self.slots.get_mut(handle.index) else {
            return;
        };
        if slot.generation != handle.generation || slot.invoker.take().is_none() {
            return;
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
    }
}

impl<E> Default for TimerPool<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for TimerPool<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerPool")
            .field("pending", &self.len)
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}

/// Fire every entry of `pool` that is due at `now`, earliest first.
///
/// Entries scheduled by a callback are not fired in the same pass. Returns
/// the number of callbacks run. The pool is never borrowed while a callback
/// runs, so callbacks may schedule more entries or clear the pool.
pub fn fire_due<E>(pool: &RefCell<TimerPool<E>>, env: &mut E, now: Instant) -> usize {
    let due = match pool.try_borrow() {
        Ok(pool) => pool.due(now),
        Err(_) => return 0,
    };

    let mut fired = 0;
    for handle in due {
        let callback = match pool.try_borrow_mut() {
            Ok(mut pool) => pool.begin_fire(handle),
            Err(_) => None,
        };
        let Some(callback) = callback else {
            continue;
        };

        callback(env);
        fired += 1;

        if let Ok(mut pool) = pool.try_borrow_mut() {
            pool.remove(handle);
        }
    }
    fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn counter() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn test_fires_once() {
        let pool = RefCell::new(TimerPool::<()>::new());
        let hits = counter();
        let h = hits.clone();
        pool.borrow_mut()
            .call_after_delay(Duration::ZERO, move |_| h.set(h.get() + 1));

        let later = Instant::now() + Duration::from_millis(1);
        assert_eq!(fire_due(&pool, &mut (), later), 1);
        assert_eq!(fire_due(&pool, &mut (), later), 0);
        assert_eq!(hits.get(), 1);
        assert!(pool.borrow().is_empty());
    }

    #[test]
    fn test_not_due_yet() {
        let pool = RefCell::new(TimerPool::<()>::new());
        pool.borrow_mut()
            .call_after_delay(Duration::from_secs(60), |_| panic!("fired early"));

        assert_eq!(fire_due(&pool, &mut (), Instant::now()), 0);
        assert_eq!(pool.borrow().len(), 1);
        assert!(pool.borrow().next_deadline().is_some());
    }

    #[test]
    fn test_same_delay_entries_both_fire() {
        let pool = RefCell::new(TimerPool::<Vec<&'static str>>::new());
        pool.borrow_mut().call_after_delay(Duration::from_millis(5), |log| log.push("a"));
        pool.borrow_mut().call_after_delay(Duration::from_millis(5), |log| log.push("b"));
        assert_eq!(pool.borrow().len(), 2);

        let mut log = Vec::new();
        let later = Instant::now() + Duration::from_millis(10);
        assert_eq!(fire_due(&pool, &mut log, later), 2);

        log.sort();
        assert_eq!(log, vec!["a", "b"]);
        assert_eq!(pool.borrow().len(), 0);
    }

    #[test]
    fn test_entry_is_still_counted_while_firing() {
        let pool = Rc::new(RefCell::new(TimerPool::<()>::new()));
        let seen = Rc::new(Cell::new(usize::MAX));
        let (p, s) = (pool.clone(), seen.clone());
        pool.borrow_mut().call_after_delay(Duration::ZERO, move |_| {
            s.set(p.borrow().len());
        });

        fire_due(&pool, &mut (), Instant::now() + Duration::from_millis(1));
        assert_eq!(seen.get(), 1);
        assert_eq!(pool.borrow().len(), 0);
    }

    #[test]
    fn test_callback_may_schedule_more() {
        let pool = Rc::new(RefCell::new(TimerPool::<()>::new()));
        let hits = counter();
        let (p, h) = (pool.clone(), hits.clone());
        pool.borrow_mut().call_after_delay(Duration::ZERO, move |_| {
            let h2 = h.clone();
            p.borrow_mut()
                .call_after_delay(Duration::ZERO, move |_| h2.set(h2.get() + 10));
            h.set(h.get() + 1);
        });

        let later = Instant::now() + Duration::from_millis(1);
        assert_eq!(fire_due(&pool, &mut (), later), 1);
        assert_eq!(pool.borrow().len(), 1);
        assert_eq!(fire_due(&pool, &mut (), later), 1);
        assert_eq!(hits.get(), 11);
    }

    #[test]
    fn test_dropping_pool_cancels() {
        let hits = counter();
        {
            let mut pool = TimerPool::<()>::new();
            let h = hits.clone();
            pool.call_after_delay(Duration::ZERO, move |_| h.set(h.get() + 1));
        }
        assert_eq!(hits.get(), 0);
        assert_eq!(Rc::strong_count(&hits), 1);
    }

    #[test]
    fn test_clear_during_fire_drops_the_rest() {
        let pool = Rc::new(RefCell::new(TimerPool::<()>::new()));
        let hits = counter();
        let p = pool.clone();
        pool.borrow_mut()
            .call_after_delay(Duration::ZERO, move |_| p.borrow_mut().clear());
        let h = hits.clone();
        pool.borrow_mut()
            .call_after_delay(Duration::from_millis(1), move |_| h.set(h.get() + 1));

        let later = Instant::now() + Duration::from_millis(5);
        assert_eq!(fire_due(&pool, &mut (), later), 1);
        assert_eq!(hits.get(), 0);
        assert!(pool.borrow().is_empty());
    }

    #[test]
    fn test_slots_are_reused() {
        let pool = RefCell::new(TimerPool::<()>::new());
        for _ in 0..3 {
            pool.borrow_mut().call_after_delay(Duration::ZERO, |_| {});
            fire_due(&pool, &mut (), Instant::now() + Duration::from_millis(1));
        }
        assert_eq!(pool.borrow().slots.len(), 1);
    }
}
