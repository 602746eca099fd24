//! Pool and deque benchmarks.

use std::alloc::Layout;
use std::collections::VecDeque;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rstl::{Deque, MallocAlloc, PoolAlloc, Vector};

fn bench_alloc_free_cycle(c: &mut Criterion) {
  let sizes: &[usize] = &[8, 32, 64, 128, 256, 4096];
  let mut group = c.benchmark_group("alloc_free_cycle");

  let pool = PoolAlloc::new();
  let malloc = MallocAlloc::new();
  for &size in sizes {
    let layout = Layout::from_size_align(size, 8).expect("valid layout");
    group.bench_with_input(BenchmarkId::new("pool", size), &layout, |b, &layout| {
      b.iter(|| {
        let block = pool.allocate(layout).expect("pool allocation");
        unsafe { pool.deallocate(criterion::black_box(block), layout) };
      });
    });
    group.bench_with_input(BenchmarkId::new("malloc", size), &layout, |b, &layout| {
      b.iter(|| {
        let block = malloc.allocate(layout).expect("malloc allocation");
        unsafe { malloc.deallocate(criterion::black_box(block), layout) };
      });
    });
  }
  group.finish();
}

fn bench_alloc_burst(c: &mut Criterion) {
  let mut group = c.benchmark_group("alloc_burst");
  let layout = Layout::new::<[u64; 4]>();

  group.bench_function("pool_1000x32B", |b| {
    let pool = PoolAlloc::new();
    let mut blocks = Vec::with_capacity(1000);
    b.iter(|| {
      for _ in 0..1000 {
        blocks.push(pool.allocate(layout).expect("pool allocation"));
      }
      for block in blocks.drain(..) {
        unsafe { pool.deallocate(block, layout) };
      }
    });
  });

  group.bench_function("system_1000x32B", |b| {
    b.iter(|| {
      let allocs: Vec<Box<[u64; 4]>> = (0..1000).map(|_| Box::new([0u64; 4])).collect();
      criterion::black_box(allocs);
    });
  });

  group.finish();
}

fn bench_deque_ends(c: &mut Criterion) {
  let mut group = c.benchmark_group("deque_ends");

  for &count in &[64usize, 4096] {
    group.bench_with_input(BenchmarkId::new("deque", count), &count, |b, &count| {
      b.iter(|| {
        let mut deque = Deque::new();
        for i in 0..count {
          deque.push_back(i);
          deque.push_front(i);
        }
        while let Some(value) = deque.pop_front() {
          criterion::black_box(value);
        }
      });
    });
    group.bench_with_input(BenchmarkId::new("vec_deque", count), &count, |b, &count| {
      b.iter(|| {
        let mut deque = VecDeque::new();
        for i in 0..count {
          deque.push_back(i);
          deque.push_front(i);
        }
        while let Some(value) = deque.pop_front() {
          criterion::black_box(value);
        }
      });
    });
  }

  group.finish();
}

fn bench_middle_insert(c: &mut Criterion) {
  let mut group = c.benchmark_group("middle_insert");

  group.bench_function("deque", |b| {
    b.iter(|| {
      let mut deque: Deque<u32> = (0..1024).collect();
      for i in 0..64 {
        deque.insert(deque.len() / 2, i);
      }
      criterion::black_box(deque.len());
    });
  });

  group.bench_function("vector", |b| {
    b.iter(|| {
      let mut vector: Vector<u32> = (0..1024).collect();
      for i in 0..64 {
        vector.insert(vector.len() / 2, i);
      }
      criterion::black_box(vector.len());
    });
  });

  group.finish();
}

criterion_group!(benches, bench_alloc_free_cycle, bench_alloc_burst, bench_deque_ends, bench_middle_insert);
criterion_main!(benches);
