//! Concurrency tests for the resizable queue
//!
//! These tests verify:
//! - Growing the bound releases blocked producers
//! - Shrinking never drops items and re-blocks producers under the new bound
//! - No item is lost under concurrent producers and consumers

use super::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

const BLOCKED_WINDOW: Duration = Duration::from_millis(150);
const WAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn a producer that reports on `done` once its put returns
fn spawn_put(queue: &Arc<ResizableQueue<u32>>, item: u32) -> mpsc::Receiver<()> {
    let (done_tx, done_rx) = mpsc::channel();
    let queue = Arc::clone(queue);
    thread::spawn(move || {
        queue.put(item);
        let _ = done_tx.send(());
    });
    done_rx
}

mod resize_tests {
    use super::*;

    #[test]
    fn test_grow_unblocks_waiting_producer() {
        let queue = Arc::new(ResizableQueue::new(2));
        queue.put(1);
        queue.put(2);

        let done = spawn_put(&queue, 3);
        assert!(done.recv_timeout(BLOCKED_WINDOW).is_err(), "put should block at capacity");

        queue.resize(3).unwrap();
        assert!(done.recv_timeout(WAKE_TIMEOUT).is_ok(), "grow should release the producer");
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_grow_to_unbounded_unblocks_all_producers() {
        let queue = Arc::new(ResizableQueue::new(1));
        queue.put(0);

        let waiters: Vec<_> = (1..=4).map(|i| spawn_put(&queue, i)).collect();
        thread::sleep(BLOCKED_WINDOW);
        assert_eq!(queue.len(), 1);

        queue.resize(0).unwrap();
        for done in waiters {
            assert!(done.recv_timeout(WAKE_TIMEOUT).is_ok());
        }
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn test_grow_without_room_keeps_producer_blocked() {
        let queue = Arc::new(ResizableQueue::new(2));
        queue.put(1);
        queue.put(2);

        let done = spawn_put(&queue, 99);
        queue.resize(1).unwrap();
        queue.resize(2).unwrap();
        assert!(
            done.recv_timeout(BLOCKED_WINDOW).is_err(),
            "no room at capacity 2 with 2 items"
        );

        queue.take();
        assert!(done.recv_timeout(WAKE_TIMEOUT).is_ok());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_shrink_below_size_keeps_items() {
        let queue = Arc::new(ResizableQueue::new(10));
        for i in 0..6 {
            queue.put(i);
        }

        queue.resize(2).unwrap();
        assert_eq!(queue.len(), 6, "shrink must not evict");
        assert_eq!(queue.remaining_capacity(), 0);
        assert_eq!(queue.offer(100), Err(100));

        // Items come back out in the original order
        let drained: Vec<u32> = (0..6).map(|_| queue.take()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_put_blocks_until_below_new_capacity() {
        let queue = Arc::new(ResizableQueue::new(10));
        for i in 0..5 {
            queue.put(i);
        }
        queue.resize(3).unwrap();

        let done = spawn_put(&queue, 42);

        // 5 -> 4 -> 3 items: still no room under a bound of 3
        queue.take();
        queue.take();
        assert!(done.recv_timeout(BLOCKED_WINDOW).is_err());

        // 3 -> 2 items: room for exactly one
        queue.take();
        assert!(done.recv_timeout(WAKE_TIMEOUT).is_ok());
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_rejected_resize_keeps_blocking_decision() {
        let queue = Arc::new(ResizableQueue::new(1));
        queue.put(1);

        let done = spawn_put(&queue, 2);
        assert!(queue.resize(-1).is_err());
        assert!(done.recv_timeout(BLOCKED_WINDOW).is_err());
        assert_eq!(queue.capacity(), 1);

        queue.take();
        assert!(done.recv_timeout(WAKE_TIMEOUT).is_ok());
    }
}

mod blocking_tests {
    use super::*;

    #[test]
    fn test_take_waits_for_put() {
        let queue: Arc<ResizableQueue<u32>> = Arc::new(ResizableQueue::new(4));
        let (tx, rx) = mpsc::channel();

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let item = queue.take();
                tx.send(item).unwrap();
            })
        };

        assert!(rx.recv_timeout(BLOCKED_WINDOW).is_err());
        queue.put(7);
        assert_eq!(rx.recv_timeout(WAKE_TIMEOUT).unwrap(), 7);
        consumer.join().unwrap();
    }

    #[test]
    fn test_poll_timeout_receives_late_item() {
        let queue: Arc<ResizableQueue<u32>> = Arc::new(ResizableQueue::new(4));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                queue.put(5);
            })
        };

        assert_eq!(queue.poll_timeout(WAKE_TIMEOUT), Some(5));
        producer.join().unwrap();
    }
}

mod stress_tests {
    use super::*;

    #[test]
    fn test_concurrent_producers_consumers_lose_nothing() {
        const PRODUCERS: u32 = 4;
        const PER_PRODUCER: u32 = 500;
        const CAPACITY: usize = 8;

        let queue: Arc<ResizableQueue<u32>> = Arc::new(ResizableQueue::new(CAPACITY));
        let received = Arc::new(AtomicUsize::new(0));
        let checksum = Arc::new(AtomicUsize::new(0));
        let over_bound = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let monitor = {
            let queue = Arc::clone(&queue);
            let over_bound = Arc::clone(&over_bound);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    if queue.len() > CAPACITY {
                        over_bound.store(true, Ordering::Relaxed);
                    }
                    thread::yield_now();
                }
            })
        };

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.put(p * PER_PRODUCER + i);
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let received = Arc::clone(&received);
                let checksum = Arc::clone(&checksum);
                thread::spawn(move || {
                    while let Some(item) = queue.poll_timeout(Duration::from_millis(500)) {
                        received.fetch_add(1, Ordering::Relaxed);
                        checksum.fetch_add(item as usize, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        for consumer in consumers {
            consumer.join().unwrap();
        }
        stop.store(true, Ordering::Relaxed);
        monitor.join().unwrap();

        let total = (PRODUCERS * PER_PRODUCER) as usize;
        assert_eq!(received.load(Ordering::Relaxed), total);
        assert_eq!(checksum.load(Ordering::Relaxed), total * (total - 1) / 2);
        assert!(!over_bound.load(Ordering::Relaxed));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_resizing_during_traffic_loses_nothing() {
        const ITEMS: u32 = 2_000;

        let queue: Arc<ResizableQueue<u32>> = Arc::new(ResizableQueue::new(4));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..ITEMS {
                    queue.put(i);
                }
            })
        };

        let resizer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for round in 0..200i64 {
                    queue.resize(1 + round % 16).unwrap();
                    thread::yield_now();
                }
                // Leave it at a sane bound so the producer can always finish
                queue.resize(16).unwrap();
            })
        };

        let mut seen = Vec::with_capacity(ITEMS as usize);
        while seen.len() < ITEMS as usize {
            match queue.poll_timeout(WAKE_TIMEOUT) {
                Some(item) => seen.push(item),
                None => panic!("queue stalled after {} items", seen.len()),
            }
        }

        producer.join().unwrap();
        resizer.join().unwrap();

        // Single producer and single consumer: strict FIFO
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.len(), ITEMS as usize);
    }
}
