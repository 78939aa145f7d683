//! Benchmarks for the fair per-customer scheduler.
//!
//! Run with: cargo bench --bench scheduler

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use smsgwd::domain::Job;
use smsgwd::scheduler::FairScheduler;
use uuid::Uuid;

fn create_test_job(customer_id: i64, seq: u32) -> Job {
    Job {
        id: Uuid::new_v4(),
        customer_id,
        phone: format!("+1202555{seq:04}"),
        message: format!("Benchmark message {seq}"),
        priority: 0,
        created_at: Utc::now(),
        attempts: 0,
    }
}

fn bench_enqueue_single_customer(c: &mut Criterion) {
    let scheduler = FairScheduler::new();

    c.bench_function("scheduler/enqueue_single_customer", |b| {
        b.iter(|| {
            scheduler.enqueue(1, black_box(create_test_job(1, 0)));
        })
    });
}

fn bench_enqueue_spread(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler/enqueue_spread");

    for customers in [10i64, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*customers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(customers),
            customers,
            |b, &customers| {
                let scheduler = FairScheduler::new();
                b.iter(|| {
                    for customer in 0..customers {
                        scheduler.enqueue(customer, create_test_job(customer, 0));
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_select_dequeue_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler/select_dequeue_cycle");

    for customers in [10i64, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(customers),
            customers,
            |b, &customers| {
                let scheduler = FairScheduler::new();
                b.iter(|| {
                    for customer in 0..customers {
                        scheduler.enqueue(customer, create_test_job(customer, 0));
                    }
                    while let Some(customer) = scheduler.select_next() {
                        black_box(scheduler.dequeue(customer));
                        scheduler.unlock(customer);
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_select_with_contended_locks(c: &mut Criterion) {
    let scheduler = FairScheduler::new();

    // Half the customers are locked, forcing the scan to skip them.
    for customer in 0..100 {
        scheduler.enqueue(customer, create_test_job(customer, 0));
        scheduler.enqueue(customer, create_test_job(customer, 1));
    }
    for customer in (0..100).step_by(2) {
        scheduler.enqueue(customer, create_test_job(customer, 2));
        let selected = scheduler.select_next();
        black_box(selected);
    }

    c.bench_function("scheduler/select_with_contended_locks", |b| {
        b.iter(|| {
            if let Some(customer) = scheduler.select_next() {
                scheduler.unlock(customer);
            }
        })
    });
}

criterion_group!(
    benches,
    bench_enqueue_single_customer,
    bench_enqueue_spread,
    bench_select_dequeue_cycle,
    bench_select_with_contended_locks,
);
criterion_main!(benches);
