//! # rstl - Pooled Containers
//!
//! This crate provides a **two-tier allocator** for small blocks and a set of
//! sequence containers written against it, centred on a **segmented deque**.
//!
//! ## Overview
//!
//! Small requests are served from per-size free lists carved out of large
//! chunks; everything else goes straight to the system allocator:
//!
//! ```text
//!   Allocation Tiers:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │  allocate(layout)                                                    │
//!   │        │                                                             │
//!   │        ├── size > 128 or over-aligned ──────────▶ Tier 1 (malloc)    │
//!   │        │                                             │               │
//!   │        ▼                                             ▼               │
//!   │   Tier 2 free lists (8, 16, ..., 128 bytes)     system malloc        │
//!   │   ┌────┐ ┌────┐ ┌────┐       ┌────┐             + OOM handler        │
//!   │   │ 8  │ │ 16 │ │ 24 │  ...  │128 │               retry loop         │
//!   │   └─┬──┘ └─┬──┘ └─┬──┘       └─┬──┘                                  │
//!   │     ▼      ▼      ▼            ▼                                     │
//!   │    ...    ...    ...          ...   ◀── refilled in batches of 20    │
//!   │                                         from the pool region         │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rstl
//!   ├── align      - align_to! rounding and size-class indexing
//!   ├── config     - PoolConfig: size classes, refill batch, growth
//!   ├── error      - AllocError, ConfigError, InsertError
//!   ├── malloc     - Tier 1: MallocAlloc over a SystemAlloc
//!   ├── pool       - Tier 2: PoolAlloc free lists
//!   ├── allocator  - RawAlloc trait, DefaultAlloc per-thread pool
//!   ├── deque      - Deque, Cursor and iterators
//!   ├── vector     - Vector
//!   ├── list       - List
//!   └── adaptors   - Stack, Queue and the sequence traits they need
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rstl::{Deque, PoolAlloc, Queue, deque};
//!
//! fn main() {
//!     // On this thread's default pool.
//!     let mut numbers = deque![3, 4, 5];
//!     numbers.push_front(2);
//!     numbers.insert(0, 1);
//!     assert_eq!(numbers, [1, 2, 3, 4, 5]);
//!
//!     // On an explicit pool, shared by reference.
//!     let pool = PoolAlloc::new();
//!     let mut words: Deque<&str, &PoolAlloc> = Deque::new_in(&pool);
//!     words.push_back("hello");
//!     println!("{:?}", pool.stats());
//!
//!     let mut queue: Queue<u32> = Queue::new();
//!     queue.push(7);
//!     assert_eq!(queue.pop(), Some(7));
//! }
//! ```
//!
//! ## How It Works
//!
//! A free block's first word links it to the next free block of its class;
//! a refill slices a batch of same-size blocks off the pool region:
//!
//! ```text
//!   Refill of the 24-byte class:
//!
//!   pool region (from a malloc'd chunk)
//!   ┌──────┬──────┬──────┬──────┬─────────────────────────────┐
//!   │ blk0 │ blk1 │ blk2 │ ...  │   untouched until needed    │
//!   └──────┴──┬───┴──┬───┴──┬───┴─────────────────────────────┘
//!      ▲      │  ▲   │  ▲   │   ▲                             ▲
//!      │      └──┘   └──┘   └───┘                             │
//!      │    free list links                              pool_end
//!      └── returned to the caller
//! ```
//!
//! When the region runs dry its leftovers are donated to the matching
//! class and a new chunk of `2 * wanted + acquired / 16` bytes is requested,
//! so growth is geometric in what the pool already holds.
//!
//! ## Features
//!
//! - **Constant-time ends**: `Deque` pushes and pops never move elements
//! - **Random access**: element indices and checked `Cursor` arithmetic
//! - **Strong rollback**: failed or panicking inserts leave containers as they were
//! - **Fallible API**: every growing operation has a `try_*` form returning `AllocError`
//!
//! ## Limitations
//!
//! - **Single-threaded pools**: `PoolAlloc` is neither `Send` nor `Sync`;
//!   `DefaultAlloc` gives each thread its own pool
//! - **No coalescing**: freed small blocks only return to their size class
//! - **Unix-only**: Tier 1 requires `libc` (`posix_memalign`)
//!
//! ## Safety
//!
//! The allocator types hand out raw memory; their `deallocate` and
//! `reallocate` are `unsafe` and trust the caller's layout. The containers
//! wrap them behind a safe API.
//!
//! ## Logging
//!
//! Pool growth, map reallocation and out-of-memory handling are reported
//! through `tracing`; no subscriber is installed by the crate.

pub mod align;
mod block;
pub mod config;
pub mod error;
pub mod malloc;
pub mod pool;

pub mod allocator;

pub mod adaptors;
pub mod deque;
pub mod list;
pub mod vector;

#[cfg(test)]
mod testing;

pub use adaptors::{BackSequence, FrontSequence, Queue, Stack};
pub use allocator::{DefaultAlloc, RawAlloc, default_pool_stats, set_oom_handler};
pub use config::PoolConfig;
pub use deque::{Cursor, Deque};
pub use error::{AllocError, ConfigError, InsertError};
pub use list::List;
pub use malloc::{Libc, MallocAlloc, OomHandler, SystemAlloc};
pub use pool::{PoolAlloc, PoolStats};
pub use vector::Vector;
