//! Pathfield pool tests.

use lockstep_core::{
    error::SimError,
    map::Direction,
    pathfield::{PathfieldPool, PATHFIELD_POOL_CAPACITY},
};

#[test]
fn fresh_allocation_has_nothing_visited() {
    let mut pool = PathfieldPool::new(64);
    let handle = pool.allocate().unwrap();
    let fields = handle.borrow_mut();
    assert_eq!(fields.len(), 64);
    assert!((0..64).all(|i| !fields.is_visited(i)));
}

#[test]
fn released_container_is_reused_without_stale_marks() {
    let mut pool = PathfieldPool::new(32);
    let first_generation = {
        let handle = pool.allocate().unwrap();
        let mut fields = handle.borrow_mut();
        for i in 0..32 {
            let f = fields.visit(i);
            f.real_cost = i as u32 * 10;
            f.backlink = Some(Direction::West);
        }
        fields.generation()
    };

    let handle = pool.allocate().unwrap();
    assert_eq!(pool.len(), 1, "the released container was reused");
    assert_eq!(handle.generation(), first_generation + 1);
    let fields = handle.borrow_mut();
    assert!((0..32).all(|i| fields.get(i).is_none()));
}

#[test]
fn concurrent_searches_get_distinct_containers() {
    let mut pool = PathfieldPool::new(8);
    let a = pool.allocate().unwrap();
    let b = pool.allocate().unwrap();
    assert_eq!(pool.in_use(), 2);

    a.borrow_mut().visit(1).real_cost = 5;
    assert!(!b.borrow_mut().is_visited(1));

    drop(a);
    assert_eq!(pool.in_use(), 1);
    drop(b);
    assert_eq!(pool.in_use(), 0);
    assert_eq!(pool.len(), 2);
}

#[test]
fn ninth_nested_search_exhausts_the_pool() {
    let mut pool = PathfieldPool::new(4);
    let held: Vec<_> = (0..PATHFIELD_POOL_CAPACITY)
        .map(|_| pool.allocate().unwrap())
        .collect();
    assert_eq!(pool.in_use(), PATHFIELD_POOL_CAPACITY);

    let err = pool.allocate().unwrap_err();
    assert!(matches!(
        err,
        SimError::PathfieldPoolExhausted { capacity } if capacity == PATHFIELD_POOL_CAPACITY
    ));

    drop(held);
    assert!(pool.allocate().is_ok(), "releasing handles frees the pool");
}

#[test]
fn resize_discards_containers_of_the_old_size() {
    let mut pool = PathfieldPool::new(16);
    drop(pool.allocate().unwrap());
    assert_eq!(pool.len(), 1);

    pool.resize(16);
    assert_eq!(pool.len(), 1, "same size keeps containers");

    pool.resize(100);
    assert!(pool.is_empty());
    let handle = pool.allocate().unwrap();
    assert_eq!(handle.borrow_mut().len(), 100);
}
