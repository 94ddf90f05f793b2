//! Count based windows: sliding, batch, custom policies and processor errors.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use stream_windows::windowing::policies::{self, InsertionPolicy, TriggerPolicy};
use stream_windows::{WindowError, Windows, unpartitioned};

#[test]
fn test_last_n_sliding_window() {
    let window = Windows::last_n_process_on_insert(10, unpartitioned::<i32>()).unwrap();
    let observed = Arc::new(Mutex::new(Vec::new()));

    let sink = observed.clone();
    window.register_partition_processor(move |tuples, _key| {
        sink.lock().push(tuples.to_vec());
        Ok(())
    });

    for i in 0..100 {
        assert!(window.insert(i).unwrap());
    }

    let observed = observed.lock();
    assert_eq!(observed.len(), 100);
    for (i, tuples) in observed.iter().enumerate() {
        let i = i as i32;
        let expected: Vec<i32> = ((i - 9).max(0)..=i).collect();
        assert_eq!(tuples, &expected, "after insert {}", i);
    }
    assert_eq!(window.partition_count(), 1);
}

#[test]
fn test_keyed_last_n_windows_are_independent() {
    let window = Windows::last_n_process_on_insert(10, |t: &i32| t % 10).unwrap();
    let observed: Arc<Mutex<Vec<(i32, Vec<i32>)>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = observed.clone();
    window.register_partition_processor(move |tuples, key| {
        sink.lock().push((*key, tuples.to_vec()));
        Ok(())
    });

    for i in 0..1000 {
        window.insert(i).unwrap();
    }

    let mut expected: HashMap<i32, VecDeque<i32>> = HashMap::new();
    let observed = observed.lock();
    assert_eq!(observed.len(), 1000);
    for (i, (key, tuples)) in observed.iter().enumerate() {
        let i = i as i32;
        assert_eq!(*key, i % 10);

        let history = expected.entry(*key).or_default();
        history.push_back(i);
        if history.len() > 10 {
            history.pop_front();
        }
        assert_eq!(tuples, &history.iter().copied().collect::<Vec<_>>());
    }
    assert_eq!(window.partition_count(), 10);
}

#[test]
fn test_key_filtering_insertion_policy() {
    let rejected: HashSet<i32> = [1, 3].into_iter().collect();
    let insertion: InsertionPolicy<i32, i32, VecDeque<i32>> =
        policies::insertion(move |partition, _tuple| !rejected.contains(partition.key()));

    let window = Windows::window(
        insertion,
        policies::append(),
        policies::evict_oldest_beyond(10),
        policies::process_on_insert(),
        |t: &i32| *t,
        VecDeque::new,
    );

    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    window.register_partition_processor(move |tuples, _key| {
        sink.lock().push(tuples.to_vec());
        Ok(())
    });

    let accepted: Vec<bool> = (0..5).map(|i| window.insert(i).unwrap()).collect();
    assert_eq!(accepted, vec![true, false, true, false, true]);
    assert_eq!(*observed.lock(), vec![vec![0], vec![2], vec![4]]);
}

#[test]
fn test_count_batch_window() {
    let window = Windows::count_batch(113, unpartitioned::<i32>()).unwrap();
    let batches = Arc::new(Mutex::new(Vec::new()));

    let sink = batches.clone();
    window.register_partition_processor(move |tuples, _key| {
        sink.lock().push(tuples.to_vec());
        Ok(())
    });

    for i in 0..1000 {
        window.insert(i).unwrap();
    }

    let batches = batches.lock();
    assert_eq!(batches.len(), 8);
    assert!(batches.iter().all(|batch| batch.len() == 113));

    // Batches are disjoint and keep arrival order across batches.
    let flattened: Vec<i32> = batches.iter().flatten().copied().collect();
    assert_eq!(flattened, (0..904).collect::<Vec<_>>());

    // The incomplete batch waits in the partition.
    let partition = window.partition(&0).unwrap();
    let guard = partition.lock();
    assert_eq!(guard.contents().len(), 96);
    assert_eq!(guard.contents().first(), Some(&904));
}

#[test]
fn test_processors_run_in_registration_order() {
    let window = Windows::last_n_process_on_insert(2, unpartitioned::<u8>()).unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let calls = calls.clone();
        window.register_partition_processor(move |_tuples, _key| {
            calls.lock().push(name);
            Ok(())
        });
    }
    assert_eq!(window.processor_count(), 3);

    window.insert(1).unwrap();
    window.insert(2).unwrap();
    assert_eq!(
        *calls.lock(),
        vec!["first", "second", "third", "first", "second", "third"]
    );
}

#[test]
fn test_processor_error_leaves_sliding_window_consistent() {
    let window = Windows::last_n_process_on_insert(3, unpartitioned::<i32>()).unwrap();
    let later_calls = Arc::new(Mutex::new(0));

    window.register_partition_processor(|tuples, _key| {
        if tuples.last() == Some(&4) {
            return Err("refusing 4".into());
        }
        Ok(())
    });
    let counter = later_calls.clone();
    window.register_partition_processor(move |_tuples, _key| {
        *counter.lock() += 1;
        Ok(())
    });

    for i in 0..4 {
        window.insert(i).unwrap();
    }
    let err = window.insert(4).unwrap_err();
    assert!(matches!(err, WindowError::Processor(_)));
    assert!(err.to_string().contains("refusing 4"));

    // The failing processor stopped the second one for that insert only.
    assert_eq!(*later_calls.lock(), 4);

    let partition = window.partition(&0).unwrap();
    let contents: Vec<i32> = partition.lock().contents().iter().copied().collect();
    assert_eq!(contents, vec![2, 3, 4]);

    window.insert(5).unwrap();
    assert_eq!(*later_calls.lock(), 5);
}

#[test]
fn test_processor_error_leaves_batch_empty() {
    let window = Windows::count_batch(2, unpartitioned::<i32>()).unwrap();
    window.register_partition_processor(|_tuples, _key| Err("downstream unavailable".into()));

    window.insert(1).unwrap();
    assert!(window.insert(2).is_err());

    let partition = window.partition(&0).unwrap();
    assert!(partition.lock().contents().is_empty());
}

#[test]
fn test_custom_trigger_policy() {
    // Process every third tuple without evicting anything.
    let trigger: TriggerPolicy<u32, u32, Vec<u32>> = policies::trigger(|partition| {
        if partition.len() % 3 == 0 {
            partition.process()
        } else {
            Ok(())
        }
    });
    let window = Windows::window(
        policies::always_insert(),
        policies::append(),
        policies::evict_nothing(),
        trigger,
        unpartitioned::<u32>(),
        Vec::new,
    );

    let sizes = Arc::new(Mutex::new(Vec::new()));
    let sink = sizes.clone();
    window.register_partition_processor(move |tuples, _key| {
        sink.lock().push(tuples.len());
        Ok(())
    });

    for i in 0..10 {
        window.insert(i).unwrap();
    }
    assert_eq!(*sizes.lock(), vec![3, 6, 9]);
}

#[test]
fn test_partitions_snapshot() {
    let window = Windows::last_n_process_on_insert(5, |t: &(char, i32)| t.0).unwrap();
    assert!(window.partitions().is_empty());

    for (i, key) in ['a', 'b', 'c', 'a', 'b', 'a'].into_iter().enumerate() {
        window.insert((key, i as i32)).unwrap();
    }

    let partitions = window.partitions();
    assert_eq!(partitions.len(), 3);
    let mut sizes: Vec<(char, usize)> = partitions
        .iter()
        .map(|(key, partition)| (*key, partition.lock().contents().len()))
        .collect();
    sizes.sort();
    assert_eq!(sizes, vec![('a', 3), ('b', 2), ('c', 1)]);

    assert_eq!(window.key_of(&('z', 0)), 'z');
    assert!(window.partition(&'z').is_none());
    assert_eq!(*window.partition(&'c').unwrap().key(), 'c');
}

#[test]
fn test_manual_process_of_partition() {
    let window = Windows::count_batch(100, unpartitioned::<i32>()).unwrap();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    window.register_partition_processor(move |tuples, _key| {
        sink.lock().push(tuples.to_vec());
        Ok(())
    });

    window.insert(1).unwrap();
    window.insert(2).unwrap();
    window.partition(&0).unwrap().process().unwrap();

    assert_eq!(*observed.lock(), vec![vec![1, 2]]);
}

#[test]
fn test_window_clones_share_partitions() {
    let window = Windows::count_batch(10, unpartitioned::<i32>()).unwrap();
    let clone = window.clone();

    window.insert(1).unwrap();
    clone.insert(2).unwrap();

    assert_eq!(clone.partition_count(), 1);
    let partition = window.partition(&0).unwrap();
    assert_eq!(partition.lock().contents().as_slice(), &[1, 2]);
}

#[test]
fn test_windows_without_inserts_never_process() {
    let calls = Arc::new(Mutex::new(0));

    let sliding = Windows::last_n_process_on_insert(10, unpartitioned::<i32>()).unwrap();
    let counter = calls.clone();
    sliding.register_partition_processor(move |_tuples, _key| {
        *counter.lock() += 1;
        Ok(())
    });

    let batch = Windows::count_batch(1, unpartitioned::<i32>()).unwrap();
    let counter = calls.clone();
    batch.register_partition_processor(move |_tuples, _key| {
        *counter.lock() += 1;
        Ok(())
    });

    assert_eq!(*calls.lock(), 0);
    assert_eq!(sliding.partition_count(), 0);
    assert_eq!(batch.partition_count(), 0);
    assert!(sliding.partition(&0).is_none());

    // A rejected tuple does not count as input either.
    let rejecting = Windows::window(
        policies::insertion(|_, _| false),
        policies::append(),
        policies::evict_nothing(),
        policies::process_on_insert(),
        unpartitioned::<i32>(),
        Vec::new,
    );
    let counter = calls.clone();
    rejecting.register_partition_processor(move |_tuples, _key| {
        *counter.lock() += 1;
        Ok(())
    });
    assert!(!rejecting.insert(1).unwrap());
    assert_eq!(*calls.lock(), 0);
}
