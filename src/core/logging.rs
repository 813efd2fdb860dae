// src/core/logging.rs
use std::sync::atomic::{AtomicU64, Ordering};

// Global sequence number for correlating lines across threads
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub instance_id: String,
    pub bucket: Option<String>,
    pub sequence: u64,
}

impl LogContext {
    pub fn new(component: &str, instance_id: &str) -> Self {
        Self {
            component: component.to_string(),
            instance_id: instance_id.to_string(),
            bucket: None,
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn with_bucket(mut self, bucket: &str) -> Self {
        self.bucket = Some(bucket.to_string());
        self
    }

    pub fn format(&self, level: &str, message: &str) -> String {
        let bucket_info = match &self.bucket {
            Some(bucket) => format!(" bucket={}", bucket),
            None => String::new(),
        };

        format!(
            "[{}][seq={:06}][{}:{}{}] {}",
            level, self.sequence, self.component, self.instance_id, bucket_info, message
        )
    }
}

pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn debug(&self, message: &str) {
        let ctx = self.log_context();
        log::debug!("{}", ctx.format("DEBUG", message));
    }

    fn info(&self, message: &str) {
        let ctx = self.log_context();
        log::info!("{}", ctx.format("INFO", message));
    }

    fn warn(&self, message: &str) {
        let ctx = self.log_context();
        log::warn!("{}", ctx.format("WARN", message));
    }

    fn error(&self, message: &str) {
        let ctx = self.log_context();
        log::error!("{}", ctx.format("ERROR", message));
    }

    fn bucket_info(&self, bucket: &str, message: &str) {
        let ctx = self.log_context().with_bucket(bucket);
        log::info!("{}", ctx.format("INFO", message));
    }

    fn bucket_error(&self, bucket: &str, message: &str) {
        let ctx = self.log_context().with_bucket(bucket);
        log::error!("{}", ctx.format("ERROR", message));
    }
}
