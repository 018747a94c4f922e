// User-facing notifications raised by bulk import

use tracing::{error, info};

pub const IMPORT_SUCCESS_MESSAGE: &str = "Data import complete";
pub const IMPORT_FAILURE_MESSAGE: &str = "Failed to store imported data";

/// Receiver for success/failure messages meant for the end user
pub trait Notifier {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Notifier that only writes to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        info!(notification = message, "notify: success");
    }

    fn error(&self, message: &str) {
        error!(notification = message, "notify: error");
    }
}
