//! Diagnostics reporter that writes to the tracing log.

use super::backend::{Diagnostics, RegistryStats};

#[derive(Debug, Default)]
pub struct TracingDiagnostics {
    started: bool,
}

impl TracingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Diagnostics for TracingDiagnostics {
    fn init(&mut self) {
        self.started = true;
        crate::debug_event!("diag", "initialized");
    }

    fn report(&self, stats: &RegistryStats) {
        if !self.started {
            return;
        }
        crate::log_event!(
            "diag",
            "registry",
            "{} active, {} missing",
            stats.active,
            stats.missing
        );
    }
}
