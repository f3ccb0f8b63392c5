use std::sync::Arc;

use crate::audit::{AuditSink, TracingAuditSink};
use crate::clock::{Clock, SystemClock};
use crate::ids::{IdGenerator, UuidGenerator};

/// Ambient collaborators shared by the core services.
#[derive(Clone)]
pub struct CoreRuntime {
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub audit: Arc<dyn AuditSink>,
}

impl CoreRuntime {
    pub fn new(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { clock, ids, audit }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }
}

impl Default for CoreRuntime {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(UuidGenerator), Arc::new(TracingAuditSink))
    }
}
