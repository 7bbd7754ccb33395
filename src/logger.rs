//! Progress reporting for sync runs
//!
//! The engine never prints directly. It reports through a [`Logger`], which the
//! binary backs with `tracing` and tests replace with a recorder.

use tracing::{error, info};

/// Message sink with the three levels a sync run reports at
pub trait Logger: Send + Sync {
    fn info(&self, msg: &str);
    fn success(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Forwards progress messages to the global `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, msg: &str) {
        info!("{}", msg);
    }

    fn success(&self, msg: &str) {
        info!(outcome = "success", "{}", msg);
    }

    fn error(&self, msg: &str) {
        error!("{}", msg);
    }
}
