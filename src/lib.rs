// src/lib.rs
pub mod config;
pub mod core;
pub mod monitoring;
pub mod producers;
pub mod recorder;
pub mod testing;

pub use config::Config;
pub use core::{CaptureError, Clock, EncodeError, StorageError, SystemClock};
pub use recorder::{BucketKey, Granularity, Recorder, StorageLayout};
