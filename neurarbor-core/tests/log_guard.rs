#![allow(clippy::unwrap_used)]
use log::LevelFilter;
use neurarbor_core::{
    CallArgs, LogLevelGuard, Neuron, NeuronList, NodeRow, NodeTable, TreeNeuron, Value,
};
use parking_lot::{const_mutex, Mutex};
use std::sync::mpsc;
use std::thread;

// The log level is process global; tests in this file must not interleave.
static LEVEL: Mutex<()> = const_mutex(());

fn line(id: i64) -> Neuron {
    let nodes = NodeTable::from_rows([
        NodeRow::new(1, -1, 0.0, 0.0, 0.0),
        NodeRow::new(2, 1, 1.0, 0.0, 0.0),
    ])
    .unwrap();
    Neuron::Tree(TreeNeuron::new(nodes).with_id(id))
}

#[test]
fn test_guards_nest_and_restore() {
    let _lock = LEVEL.lock();
    log::set_max_level(LevelFilter::Debug);
    {
        let outer = LogLevelGuard::cap(LevelFilter::Warn);
        assert_eq!(outer.previous(), LevelFilter::Debug);
        assert_eq!(log::max_level(), LevelFilter::Warn);
        {
            let _inner = LogLevelGuard::errors_only();
            assert_eq!(log::max_level(), LevelFilter::Error);
        }
        assert_eq!(log::max_level(), LevelFilter::Warn);

        // A cap never raises the level.
        let _loose = LogLevelGuard::cap(LevelFilter::Trace);
        assert_eq!(log::max_level(), LevelFilter::Warn);
    }
    assert_eq!(log::max_level(), LevelFilter::Debug);
}

#[test]
fn test_level_restored_after_panic() {
    let _lock = LEVEL.lock();
    log::set_max_level(LevelFilter::Info);
    let outcome = std::panic::catch_unwind(|| {
        let _guard = LogLevelGuard::errors_only();
        panic!("boom");
    });
    assert!(outcome.is_err());
    assert_eq!(log::max_level(), LevelFilter::Info);
}

#[test]
fn test_overlapping_guards_across_threads() {
    let _lock = LEVEL.lock();
    log::set_max_level(LevelFilter::Trace);

    let (taken_tx, taken_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let worker = thread::spawn(move || {
        let guard = LogLevelGuard::errors_only();
        taken_tx.send(()).unwrap();
        release_rx.recv().unwrap();
        drop(guard);
    });

    taken_rx.recv().unwrap();
    assert_eq!(log::max_level(), LevelFilter::Error);
    let main_guard = LogLevelGuard::errors_only();

    // The first guard drops while the second is still alive.
    release_tx.send(()).unwrap();
    worker.join().unwrap();
    assert_eq!(log::max_level(), LevelFilter::Error);

    drop(main_guard);
    assert_eq!(log::max_level(), LevelFilter::Trace);
}

#[test]
fn test_dispatch_suppresses_and_restores() {
    let _lock = LEVEL.lock();
    log::set_max_level(LevelFilter::Trace);
    let nl = NeuronList::from_neurons([line(1), line(2)]);

    let seen = nl
        .apply(
            |_, _| Ok(Value::Str(log::max_level().to_string())),
            &CallArgs::new(),
        )
        .unwrap()
        .into_values()
        .unwrap();
    assert_eq!(seen, vec![Value::Str("ERROR".to_string()); 2]);
    assert_eq!(log::max_level(), LevelFilter::Trace);

    let failed = nl.call("reroot", &CallArgs::new().arg(99i64));
    assert!(failed.is_err());
    assert_eq!(log::max_level(), LevelFilter::Trace);
}
