use core::future::poll_fn;
use core::task::Poll;

use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

use atomic_waker::AtomicWaker;

/// A latched flag, which is raised from interrupt context and consumed by the task servicing it.
///
/// Raising the flag more than once, before it was consumed, has the same effect as raising it
/// once.
pub struct InterruptFlag {
    raised: AtomicBool,
    waker: AtomicWaker,
}
impl InterruptFlag {
    pub const fn new() -> Self {
        Self {
            raised: AtomicBool::new(false),
            waker: AtomicWaker::new(),
        }
    }
    /// Raise the flag and wake the waiting task.
    ///
    /// This does nothing but an atomic store and a wake, so it's safe to call from an ISR.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
        self.waker.wake();
    }
    /// Lower the flag and return, whether it was raised.
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }
    /// Asynchronously wait for the flag to be raised and lower it again.
    pub async fn wait(&self) {
        poll_fn(|cx| {
            if self.take() {
                return Poll::Ready(());
            }
            self.waker.register(cx.waker());
            // The flag may have been raised between the check and the registration.
            if self.take() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await
    }
}

/// A counter of pending signals, which can be awaited one at a time.
pub struct SignalQueue {
    waker: AtomicWaker,
    queued_signals: AtomicUsize,
}
impl SignalQueue {
    pub const fn new() -> Self {
        Self {
            waker: AtomicWaker::new(),
            queued_signals: AtomicUsize::new(0),
        }
    }
    /// Increments the queue signals by one.
    pub fn put(&self) {
        self.queued_signals.fetch_add(1, Ordering::Relaxed);
        self.waker.wake();
    }
    /// Reset the amount of signals in the queue back to zero.
    pub fn reset(&self) {
        self.queued_signals.store(0, Ordering::Relaxed);
    }
    /// Consume a signal without waiting.
    pub fn try_take(&self) -> bool {
        self.queued_signals
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |queued_signals| {
                queued_signals.checked_sub(1)
            })
            .is_ok()
    }
    /// Asynchronously wait for the next signal.
    pub async fn next(&self) {
        poll_fn(|cx| {
            if self.try_take() {
                Poll::Ready(())
            } else {
                self.waker.register(cx.waker());
                if self.try_take() {
                    Poll::Ready(())
                } else {
                    Poll::Pending
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_flag_latches() {
        let flag = InterruptFlag::new();
        assert!(!flag.take());
        flag.raise();
        flag.raise();
        assert!(flag.take());
        assert!(!flag.take());
    }
    #[test]
    fn interrupt_flag_wakes_waiter() {
        let flag = InterruptFlag::new();
        flag.raise();
        embassy_futures::block_on(flag.wait());
        assert!(!flag.take());
    }
    #[test]
    fn signal_queue_counts() {
        let queue = SignalQueue::new();
        queue.put();
        queue.put();
        assert!(queue.try_take());
        embassy_futures::block_on(queue.next());
        assert!(!queue.try_take());
        queue.put();
        queue.reset();
        assert!(!queue.try_take());
    }
}
