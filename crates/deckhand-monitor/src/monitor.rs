//! Monitor handle: configures a backend once and opens per-subject sessions.

use std::sync::Arc;

use crate::backoff::ReconnectPolicy;
use crate::errors::MonitorError;
use crate::remote::RemoteBackend;
use crate::session::{MonitorOptions, MonitorSession};
use crate::subject::Subject;
use crate::transport::MonitorBackend;

/// Shared entry point for opening monitor sessions.
///
/// A `Monitor` is cheap to clone; all clones share the same backend.
#[derive(Clone)]
pub struct Monitor {
    backend: Arc<dyn MonitorBackend>,
    options: MonitorOptions,
}

impl Monitor {
    /// Returns a builder for assembling a monitor.
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::default()
    }

    /// Builds a monitor against the remote panel backend configured through
    /// environment variables.
    pub fn from_env() -> Result<Self, MonitorError> {
        let backend = RemoteBackend::from_env()?;
        Ok(Self {
            backend: Arc::new(backend),
            options: MonitorOptions::default(),
        })
    }

    /// Opens a session for one subject with the monitor's default options.
    ///
    /// The session is created stopped; call [`MonitorSession::start`] to
    /// begin streaming.
    pub fn session(&self, subject: Subject) -> MonitorSession {
        MonitorSession::new(subject, self.backend.clone(), self.options.clone())
    }

    /// Opens a session with per-session option overrides.
    ///
    /// Overrides are held to the same rules as [`MonitorBuilder::build`].
    pub fn session_with_options(
        &self,
        subject: Subject,
        options: MonitorOptions,
    ) -> Result<MonitorSession, MonitorError> {
        options.validate()?;
        Ok(MonitorSession::new(subject, self.backend.clone(), options))
    }
}

/// Builder for [`Monitor`].
#[derive(Default)]
pub struct MonitorBuilder {
    backend: Option<Arc<dyn MonitorBackend>>,
    options: MonitorOptions,
}

impl MonitorBuilder {
    /// Sets the backend sessions will talk to.
    pub fn backend(mut self, backend: Arc<dyn MonitorBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the default session options.
    pub fn options(mut self, options: MonitorOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the default reconnect policy.
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.options.reconnect = policy;
        self
    }

    /// Sets the default rolling line cap.
    pub fn max_lines(mut self, cap: usize) -> Self {
        self.options.max_lines = Some(cap);
        self
    }

    /// Validates the configuration and builds the monitor.
    pub fn build(self) -> Result<Monitor, MonitorError> {
        let Some(backend) = self.backend else {
            return Err(MonitorError::Config(
                "a backend is required; set one with backend() or use Monitor::from_env()"
                    .to_string(),
            ));
        };
        self.options.validate()?;
        Ok(Monitor {
            backend,
            options: self.options,
        })
    }
}
