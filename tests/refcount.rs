//! Randomized retain/release sequences must always balance.

use tether::runtime::{alloc, heap};
use tether::{Engine, Value};

fn random_session(seed: u64) {
    let mut rng = fastrand::Rng::with_seed(seed);
    let engine = Engine::new().unwrap();
    let bag = engine.create_array().unwrap();
    let map = engine.create_object().unwrap();
    let mut pool: Vec<Value> = vec![Value::number(1.0), Value::string("s")];

    for step in 0..400 {
        match rng.u8(0..8) {
            0 => pool.push(engine.create_object().unwrap().into_value()),
            1 => pool.push(engine.create_array().unwrap().into_value()),
            2 if !pool.is_empty() => {
                let v = pool[rng.usize(0..pool.len())].clone();
                pool.push(v);
            }
            3 if !pool.is_empty() => {
                pool.swap_remove(rng.usize(0..pool.len()));
            }
            4 if !pool.is_empty() => {
                let v = &pool[rng.usize(0..pool.len())];
                bag.push(&engine, v).unwrap();
            }
            5 if !pool.is_empty() => {
                let v = &pool[rng.usize(0..pool.len())];
                map.set(&engine, &format!("k{}", step % 5), v).unwrap();
            }
            6 if !pool.is_empty() => {
                let i = rng.usize(0..pool.len());
                let name = format!("g{}", step % 3);
                if rng.bool() {
                    engine.declare_copy(&name, &pool[i]).unwrap();
                } else {
                    let moved = pool[i].take();
                    engine.declare_move(&name, moved).unwrap();
                }
            }
            7 if !bag.is_empty() => {
                let v = bag.get(rng.usize(0..bag.len())).unwrap();
                pool.push(v);
            }
            _ => {}
        }
    }
    assert_eq!(engine.run("1").unwrap(), "1");
}

#[test]
fn random_sequences_balance() {
    for seed in 0..16 {
        let heap_before = heap::stats();
        let alloc_before = alloc::stats();
        random_session(seed);
        let delta = heap::stats().since(&heap_before);
        assert!(delta.is_balanced(), "seed {seed}: {delta:?}");
        assert_eq!(delta.live(), 0);
        assert_eq!(alloc::stats().since(&alloc_before).live(), 0, "seed {seed}");
    }
}
