// Ring buffer ordering, windowing and averaging tests

mod common;

use std::num::NonZeroUsize;
use std::time::Duration;

use common::{device, sample};
use monitoring_agent::models::Sample;
use monitoring_agent::ring_buffer::RingBuffer;
use tokio::time::Instant;

fn buffer<T: Clone + Default>(capacity: usize) -> RingBuffer<T> {
    RingBuffer::new(
        NonZeroUsize::new(capacity).unwrap(),
        Duration::from_secs(10),
        0,
    )
}

#[test]
fn last_returns_items_in_insertion_order() {
    let mut rb = buffer::<u32>(5);
    for i in 1..=5 {
        rb.add(i);
        assert!(rb.has_last(i as usize));
        assert_eq!(rb.last(i as usize), (1..=i).collect::<Vec<_>>());
    }
    assert_eq!(rb.last(2), vec![4, 5]);
}

#[test]
fn last_is_bounded_by_items_added() {
    let mut rb = buffer::<u32>(5);
    assert!(rb.is_empty());
    assert!(rb.last(3).is_empty());
    rb.add(7);
    rb.add(8);
    assert_eq!(rb.len(), 2);
    assert_eq!(rb.last(4), vec![7, 8]);
    assert_eq!(rb.last_available(), vec![7, 8]);
}

#[test]
fn has_last_requires_enough_items() {
    let mut rb = buffer::<u32>(5);
    assert!(rb.has_last(0));
    assert!(!rb.has_last(1));
    rb.add(1);
    rb.add(2);
    assert!(rb.has_last(2));
    assert!(!rb.has_last(3));
}

#[test]
fn has_last_never_exceeds_capacity() {
    let mut rb = buffer::<u32>(3);
    for i in 0..10 {
        rb.add(i);
    }
    assert!(rb.has_last(3));
    assert!(!rb.has_last(4));
}

#[test]
fn wrap_around_keeps_most_recent_items() {
    let mut rb = buffer::<u32>(4);
    for i in 0..7 {
        rb.add(i);
    }
    assert_eq!(rb.next_index(), 7);
    assert_eq!(rb.len(), 4);
    assert_eq!(rb.last_available(), vec![3, 4, 5, 6]);
    assert_eq!(rb.last(10), vec![3, 4, 5, 6]);
}

#[test]
fn last_average_of_identical_samples() {
    let mut rb = buffer::<Sample>(90);
    for ts in 0..3 {
        rb.add(Sample::new(
            ts,
            10,
            10,
            vec![device(0, 60, 60), device(0, 15, 15)],
        ));
    }
    let avg = rb.last_average(3).unwrap();
    assert_eq!(avg.cpu_util, 10);
    assert_eq!(avg.mem_used, 10);
    assert_eq!(avg.devices, vec![device(0, 60, 60), device(0, 15, 15)]);
}

#[test]
fn last_average_uses_oldest_timestamp_and_truncates() {
    let mut rb = buffer::<Sample>(90);
    rb.add(sample(100, 1, 10));
    rb.add(sample(110, 2, 10));
    rb.add(sample(120, 2, 11));
    let avg = rb.last_average(3).unwrap();
    assert_eq!(avg.timestamp, 100);
    // 5 / 3 and 31 / 3
    assert_eq!(avg.cpu_util, 1);
    assert_eq!(avg.mem_used, 10);
}

#[test]
fn last_average_only_covers_the_window() {
    let mut rb = buffer::<Sample>(90);
    rb.add(sample(0, 90, 900));
    rb.add(sample(10, 10, 100));
    rb.add(sample(20, 30, 300));
    let avg = rb.last_average(2).unwrap();
    assert_eq!(avg.timestamp, 10);
    assert_eq!(avg.cpu_util, 20);
    assert_eq!(avg.mem_used, 200);
}

#[test]
fn last_average_device_shape_follows_oldest_sample() {
    let mut rb = buffer::<Sample>(90);
    rb.add(sample(0, 10, 10));
    rb.add(Sample::new(10, 10, 10, vec![device(0, 50, 50)]));
    rb.add(Sample::new(20, 10, 10, vec![device(0, 50, 50)]));
    let avg = rb.last_average(3).unwrap();
    assert!(avg.devices.is_empty());
}

#[test]
fn last_average_missing_device_positions_count_as_zero() {
    let mut rb = buffer::<Sample>(90);
    rb.add(Sample::new(0, 0, 0, vec![device(3, 30, 90)]));
    rb.add(sample(10, 0, 0));
    rb.add(Sample::new(20, 0, 0, vec![device(7, 30, 30)]));
    let avg = rb.last_average(3).unwrap();
    // Index comes from the oldest sample; slots are matched by position.
    assert_eq!(avg.devices, vec![device(3, 20, 40)]);
}

#[test]
fn last_average_of_empty_buffer_is_none() {
    let rb = buffer::<Sample>(3);
    assert!(rb.last_average(3).is_none());
}

#[test]
fn is_due_before_first_add() {
    let rb = buffer::<u32>(3);
    assert!(rb.last_update().is_none());
    assert!(rb.is_due_at(Duration::from_secs(30), Instant::now()));
}

#[test]
fn is_due_after_interval_elapses() {
    let mut rb = buffer::<u32>(3);
    let t0 = Instant::now();
    rb.add_at(1, t0);
    let interval = Duration::from_secs(30);
    assert!(!rb.is_due_at(interval, t0));
    assert!(!rb.is_due_at(interval, t0 + Duration::from_secs(29)));
    assert!(rb.is_due_at(interval, t0 + interval));
    assert!(rb.is_due_at(interval, t0 + Duration::from_secs(45)));
}

#[tokio::test(start_paused = true)]
async fn is_due_uses_the_current_time() {
    let mut rb = buffer::<u32>(3);
    let interval = Duration::from_secs(30);
    assert!(rb.is_due(interval));
    rb.add(1);
    assert!(!rb.is_due(interval));
    tokio::time::advance(interval).await;
    assert!(rb.is_due(interval));
}
