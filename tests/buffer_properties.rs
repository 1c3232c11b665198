//! Property tests for the bounded buffer

use proptest::prelude::*;
use sortsim_rs::pipeline::{BoundedBuffer, BufferId, CancellationToken, Item, WaitError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Op {
    Put,
    Take,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Put), Just(Op::Take)]
}

proptest! {
    /// Any single-threaded sequence of non-blocking puts and takes keeps the
    /// count within capacity and returns items in insertion order.
    #[test]
    fn prop_count_bounded_and_fifo(capacity in 1usize..8, ops in prop::collection::vec(op(), 0..64)) {
        let buffer = BoundedBuffer::new(BufferId(1), capacity, ["t"]);
        let token = CancellationToken::new();
        let mut model = VecDeque::new();
        let mut next = 0u64;

        for op in ops {
            match op {
                Op::Put => {
                    let result = buffer.put_timeout(Item::new(next, "t"), Duration::ZERO, &token);
                    if model.len() < capacity {
                        prop_assert!(result.is_ok());
                        model.push_back(next);
                    } else {
                        let err = result.unwrap_err();
                        prop_assert_eq!(err.reason, WaitError::TimedOut);
                        prop_assert_eq!(err.into_item().id(), next);
                    }
                    next += 1;
                }
                Op::Take => {
                    let taken = buffer.try_take().map(|item| item.id());
                    prop_assert_eq!(taken, model.pop_front());
                }
            }
            prop_assert!(buffer.len() <= capacity);
            prop_assert_eq!(buffer.len(), model.len());
            prop_assert_eq!(buffer.is_full(), model.len() == capacity);
        }
    }

    /// A producer and a consumer on separate threads see the same order.
    #[test]
    fn prop_concurrent_fifo(capacity in 1usize..4, count in 1u64..200) {
        let buffer = Arc::new(BoundedBuffer::new(BufferId(1), capacity, ["t"]));
        let token = CancellationToken::new();

        let producer = {
            let buffer = Arc::clone(&buffer);
            let token = token.clone();
            thread::spawn(move || {
                for id in 0..count {
                    buffer.put(Item::new(id, "t"), &token).unwrap();
                }
            })
        };

        let received: Vec<u64> = (0..count).map(|_| buffer.take(&token).unwrap().id()).collect();
        producer.join().unwrap();

        prop_assert_eq!(received, (0..count).collect::<Vec<_>>());
        prop_assert!(buffer.is_empty());
    }
}

#[test]
fn test_cancel_releases_blocked_taker() {
    let buffer = Arc::new(BoundedBuffer::new(BufferId(1), 1, ["t"]));
    let token = CancellationToken::new();

    let taker = {
        let buffer = Arc::clone(&buffer);
        let token = token.clone();
        thread::spawn(move || buffer.take(&token))
    };

    thread::sleep(Duration::from_millis(30));
    token.cancel();
    assert_eq!(taker.join().unwrap().unwrap_err(), WaitError::Cancelled);
}
