use std::fmt;

/// Which of an application's streams to follow.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Container stdout/stderr.
    Logs,
    /// Runtime resource metrics.
    Metrics,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logs => f.write_str("logs"),
            Self::Metrics => f.write_str("metrics"),
        }
    }
}

/// What a monitor session watches: one deployment run, or one application
/// container's runtime stream.
///
/// Immutable for the lifetime of a session; watching something else means
/// creating a new session.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subject {
    /// A single deployment run.
    Deployment { id: String },
    /// A running application container plus the stream to follow.
    Application { id: String, stream: StreamKind },
}

impl Subject {
    /// Creates a deployment subject.
    pub fn deployment(id: impl Into<String>) -> Self {
        Self::Deployment { id: id.into() }
    }

    /// Creates an application log-stream subject.
    pub fn application_logs(id: impl Into<String>) -> Self {
        Self::Application {
            id: id.into(),
            stream: StreamKind::Logs,
        }
    }

    /// Creates an application metrics-stream subject.
    pub fn application_metrics(id: impl Into<String>) -> Self {
        Self::Application {
            id: id.into(),
            stream: StreamKind::Metrics,
        }
    }

    /// Returns the watched entity's id.
    pub fn id(&self) -> &str {
        match self {
            Self::Deployment { id } | Self::Application { id, .. } => id,
        }
    }

    /// URL fragment shared by the history and stream endpoints for this
    /// subject.
    pub fn channel_path(&self) -> String {
        match self {
            Self::Deployment { id } => format!("deployments/{id}"),
            Self::Application { id, stream } => format!("applications/{id}/{stream}"),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment { id } => write!(f, "deployment/{id}"),
            Self::Application { id, stream } => write!(f, "application/{id}/{stream}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_paths_cover_both_endpoints() {
        assert_eq!(
            Subject::deployment("dep-1").channel_path(),
            "deployments/dep-1"
        );
        assert_eq!(
            Subject::application_logs("app-2").channel_path(),
            "applications/app-2/logs"
        );
        assert_eq!(
            Subject::application_metrics("app-2").channel_path(),
            "applications/app-2/metrics"
        );
    }

    #[test]
    fn display_names_the_watched_entity() {
        assert_eq!(Subject::deployment("d").to_string(), "deployment/d");
        assert_eq!(
            Subject::application_logs("a").to_string(),
            "application/a/logs"
        );
    }
}
