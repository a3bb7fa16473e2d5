//! A lock-free, single-producer/single-consumer byte queue.
//!
//! The queue hands out reservations into a fixed-capacity ring, lets the
//! producer fill them, and lets the consumer drain committed messages in
//! FIFO order — all through a single `AtomicPtr` CAS per operation, with no
//! locks and no memory-reclamation scheme. See [`Queue`] for the API and
//! [`Descriptor`] for the ownership discipline that makes that possible.
//!
//! ```
//! use byteq::{Config, Descriptor, Queue};
//!
//! let q = Queue::new(Config::default());
//!
//! let reserved = Descriptor::new();
//! q.reserve(5, &reserved).unwrap();
//!
//! let stored = Descriptor::new();
//! q.store(b"hello", &reserved, &stored).unwrap();
//!
//! let mut buf = [0u8; 5];
//! let fetched = Descriptor::new();
//! let n = q.fetch(&mut buf, &fetched).unwrap();
//! assert_eq!(&buf[..n], b"hello");
//! ```

mod backoff;
mod config;
mod descriptor;
mod error;
mod invariants;
mod metrics;
mod queue;
mod range;

pub use backoff::Backoff;
pub use config::{Config, DEBUG_CONFIG, PRODUCTION_CONFIG};
pub use descriptor::{Descriptor, RangeDescriptor, MAX_MESSAGES};
pub use error::QueueError;
pub use metrics::MetricsSnapshot;
pub use queue::Queue;
pub use range::Range;
