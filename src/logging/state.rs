use once_cell::sync::OnceCell;
use std::sync::Once;
use tracing_appender::non_blocking::WorkerGuard;

// The non-blocking worker guard must outlive every log call
pub static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
pub static INIT_ONCE: Once = Once::new();
pub static INIT_ERROR: OnceCell<String> = OnceCell::new();
