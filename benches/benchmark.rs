use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chrono::NaiveDate;
use lifespan::chronology::{add_elapsed, elapsed_between};
use lifespan::search::ResultSet;

pub fn criterion_benchmark(c: &mut Criterion) {
    // calendar arithmetic over a long lifetime
    let born = NaiveDate::from_ymd_opt(1950, 6, 15).unwrap();
    let died = NaiveDate::from_ymd_opt(2012, 6, 1).unwrap();
    c.bench_function("elapsed between", |b| {
        b.iter(|| elapsed_between(black_box(born), black_box(died)))
    });
    let elapsed = elapsed_between(born, died);
    c.bench_function("add elapsed", |b| {
        b.iter(|| add_elapsed(black_box(born), black_box(elapsed)))
    });

    // identical sets so repeated intersections stay stable
    let mut r1 = ResultSet::new();
    let mut r2 = ResultSet::new();
    println!("{:?}", r1);
    c.bench_function("intersect 0", |b| b.iter(|| r1.intersect_with(&r2)));
    r1.insert(42);
    r2.insert(42);
    println!("{:?}", r1);
    c.bench_function("intersect 1", |b| b.iter(|| r1.intersect_with(&r2)));
    for n in 1..1000 {
        r1.insert(n);
        r2.insert(n);
    }
    println!("{:?}", r1);
    c.bench_function("intersect 1k", |b| b.iter(|| r1.intersect_with(&r2)));
    for n in 100000..200000 {
        r1.insert(n);
        r2.insert(n);
    }
    println!("{:?}", r1);
    c.bench_function("intersect 100k", |b| b.iter(|| r1.intersect_with(&r2)));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
