pub mod error;
pub mod lock;
pub mod logging;
pub mod timestamp;

pub use error::{CaptureError, ConfigError, EncodeError, StorageError, StorageResult};
pub use lock::lock_mutex;
pub use logging::{ComponentLogger, LogContext};
pub use timestamp::{Clock, SystemClock};
