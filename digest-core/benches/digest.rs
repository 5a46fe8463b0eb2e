//! Digest Benchmarks
//!
//! - `settled_100`: digest over 100 clean watchers (one full pass, then the
//!   short-circuit).
//! - `one_change_100`: the first of 100 watchers changed before each digest.
//! - `deep_array_100`: a deep watch over a 100-element array mutated in place.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use digest_core::{Array, ManualTimer, Scope, Value};

fn scope_with_watchers(count: usize) -> (Scope, Array) {
    let scope = Scope::new(Arc::new(ManualTimer::new()));
    let array = Array::from_vec((0..count).map(Value::from).collect());
    scope.set("array", array.clone());

    for i in 0..count {
        scope.watch_only(move |s| {
            Ok(s.get("array").as_array().map(|a| a.get(i)).unwrap_or_default())
        });
    }
    (scope, array)
}

fn bench_digest(c: &mut Criterion) {
    let (scope, _array) = scope_with_watchers(100);
    scope.digest().unwrap();
    c.bench_function("settled_100", |b| {
        b.iter(|| black_box(&scope).digest().unwrap())
    });

    let (scope, array) = scope_with_watchers(100);
    scope.digest().unwrap();
    let mut n = 0.0;
    c.bench_function("one_change_100", |b| {
        b.iter(|| {
            n += 1.0;
            array.set(0, n);
            black_box(&scope).digest().unwrap()
        })
    });

    let scope = Scope::new(Arc::new(ManualTimer::new()));
    let list = Array::from_vec((0..100).map(Value::from).collect());
    scope.set("list", list.clone());
    scope.watch(|s| Ok(s.get("list")), |_, _, _| Ok(()), true);
    scope.digest().unwrap();
    let mut m = 0.0;
    c.bench_function("deep_array_100", |b| {
        b.iter(|| {
            m += 1.0;
            list.set(50, m);
            black_box(&scope).digest().unwrap()
        })
    });
}

criterion_group!(benches, bench_digest);
criterion_main!(benches);
