#![allow(missing_docs, unused_results)]

//! Multi-threaded writers against a file-backed pool.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use vitrine_core::{
    DeltaInfo, EntityRef, Formation, FormationMode, Product, ResultMeta, StateData, ViewMode,
    ViewSnapshot,
};
use vitrine_state::{ConnectionConfig, StateStore, new_file, run_migrations};

fn setup(pool_size: u32) -> (tempfile::TempDir, Arc<StateStore>) {
    let dir = tempfile::tempdir().unwrap();
    let config = ConnectionConfig {
        pool_size,
        ..ConnectionConfig::default()
    };
    let pool = new_file(&dir.path().join("state.db"), &config).unwrap();
    run_migrations(&pool.get().unwrap()).unwrap();
    let store = StateStore::with_defaults(pool);
    store.create_state("sess").unwrap();
    (dir, Arc::new(store))
}

fn one_product(id: String) -> StateData {
    StateData {
        products: vec![Product::new(id, "x")],
        services: vec![],
    }
}

#[test]
fn concurrent_writers_get_gap_free_steps() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 10;
    let (_dir, store) = setup(8);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|i| {
                        store
                            .write_data(
                                "sess",
                                one_product(format!("p{t}-{i}")),
                                ResultMeta::count(1),
                                DeltaInfo::search(format!("agent-{t}"), "search_products"),
                            )
                            .unwrap()
                    })
                    .collect::<Vec<i64>>()
            })
        })
        .collect();

    let steps: BTreeSet<i64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let total = (THREADS * PER_THREAD) as i64;
    assert_eq!(steps, (1..=total).collect::<BTreeSet<_>>());
    assert_eq!(store.latest_step("sess").unwrap(), total);
    assert_eq!(store.get_state("sess").unwrap().step, total);
    assert!(store.verify_deltas("sess").unwrap().is_ok());
}

#[test]
fn concurrent_zone_writes_do_not_clobber_each_other() {
    let (_dir, store) = setup(4);

    let data_writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..20 {
                store
                    .write_data(
                        "sess",
                        one_product(format!("p{i}")),
                        ResultMeta::count(1),
                        DeltaInfo::search("data-agent", "search_products"),
                    )
                    .unwrap();
            }
        })
    };
    let template_writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for _ in 0..20 {
                store
                    .write_template(
                        "sess",
                        Formation::new(FormationMode::Carousel),
                        DeltaInfo::layout("ui-agent", "compose_formation"),
                    )
                    .unwrap();
            }
        })
    };
    let navigator = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for step in 0..10 {
                store
                    .push_view(
                        "sess",
                        ViewSnapshot {
                            mode: ViewMode::Grid,
                            focused: None,
                            refs: vec![EntityRef::product("p0")],
                            step,
                            created_at: chrono::Utc::now(),
                        },
                    )
                    .unwrap();
            }
        })
    };
    data_writer.join().unwrap();
    template_writer.join().unwrap();
    navigator.join().unwrap();

    let state = store.get_state("sess").unwrap();
    assert_eq!(state.step, 50);
    assert_eq!(state.current.data, one_product("p19".into()));
    assert_eq!(state.current.template, Some(Formation::new(FormationMode::Carousel)));
    assert_eq!(state.view_stack.len(), 10);
    assert!(store.reconstruct("sess", 50).unwrap().matches(&state));
}

#[test]
fn concurrent_ensure_state_creates_once() {
    let dir = tempfile::tempdir().unwrap();
    let pool = new_file(&dir.path().join("state.db"), &ConnectionConfig::default()).unwrap();
    run_migrations(&pool.get().unwrap()).unwrap();
    let store = Arc::new(StateStore::with_defaults(pool));

    let ids: BTreeSet<String> = (0..6)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || store.ensure_state("fresh").unwrap().id)
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    assert_eq!(ids.len(), 1);
    assert_eq!(store.list_sessions().unwrap(), vec!["fresh"]);
}
