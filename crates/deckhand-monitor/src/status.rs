/// Lifecycle states reported for a deployment or container run.
///
/// States advance forward only: `pending -> cloning -> building ->
/// deploying -> success`, with `failed` reachable from every non-terminal
/// state. `success` and `failed` are terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployState {
    Pending,
    Cloning,
    Building,
    Deploying,
    Success,
    Failed,
}

impl DeployState {
    /// Whether this state ends the lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    fn phase_rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Cloning => 1,
            Self::Building => 2,
            Self::Deploying => 3,
            Self::Success | Self::Failed => 4,
        }
    }

    /// Whether this state may follow `prev`.
    ///
    /// Forward skips are allowed (a fast run may never report `cloning`),
    /// repeats of the same state carry progress updates, and nothing follows
    /// a terminal state.
    pub fn can_follow(self, prev: DeployState) -> bool {
        if prev.is_terminal() {
            return false;
        }
        if self == Self::Failed {
            return true;
        }
        self.phase_rank() >= prev.phase_rank()
    }
}

/// Most recent lifecycle snapshot for a watched subject.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: DeployState,
    /// Free-form stage label ("Installing dependencies", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Percent complete, clamped to 0..=100 at the wire boundary.
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
}

impl StatusSnapshot {
    /// Clamps an arbitrary wire progress value into the 0..=100 range.
    pub fn clamp_progress(raw: f64) -> u8 {
        if raw.is_nan() {
            return 0;
        }
        raw.clamp(0.0, 100.0).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_success_and_failed_are_terminal() {
        assert!(DeployState::Success.is_terminal());
        assert!(DeployState::Failed.is_terminal());
        assert!(!DeployState::Building.is_terminal());
        assert!(!DeployState::Pending.is_terminal());
    }

    #[test]
    fn lifecycle_moves_forward_and_allows_skips() {
        assert!(DeployState::Cloning.can_follow(DeployState::Pending));
        assert!(DeployState::Deploying.can_follow(DeployState::Pending));
        assert!(DeployState::Success.can_follow(DeployState::Building));
    }

    #[test]
    fn repeated_states_are_progress_updates() {
        assert!(DeployState::Building.can_follow(DeployState::Building));
    }

    #[test]
    fn regressions_are_rejected() {
        assert!(!DeployState::Building.can_follow(DeployState::Deploying));
        assert!(!DeployState::Pending.can_follow(DeployState::Cloning));
    }

    #[test]
    fn failure_is_reachable_from_any_non_terminal_state() {
        assert!(DeployState::Failed.can_follow(DeployState::Pending));
        assert!(DeployState::Failed.can_follow(DeployState::Deploying));
    }

    #[test]
    fn nothing_follows_a_terminal_state() {
        assert!(!DeployState::Building.can_follow(DeployState::Success));
        assert!(!DeployState::Success.can_follow(DeployState::Success));
        assert!(!DeployState::Failed.can_follow(DeployState::Failed));
        assert!(!DeployState::Failed.can_follow(DeployState::Success));
    }

    #[test]
    fn progress_clamps_to_percent_range() {
        assert_eq!(StatusSnapshot::clamp_progress(-5.0), 0);
        assert_eq!(StatusSnapshot::clamp_progress(0.0), 0);
        assert_eq!(StatusSnapshot::clamp_progress(42.4), 42);
        assert_eq!(StatusSnapshot::clamp_progress(150.0), 100);
        assert_eq!(StatusSnapshot::clamp_progress(f64::NAN), 0);
    }

    #[test]
    fn states_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(DeployState::Building).expect("serialize"),
            serde_json::json!("building")
        );
        let parsed: DeployState =
            serde_json::from_value(serde_json::json!("success")).expect("deserialize");
        assert_eq!(parsed, DeployState::Success);
    }

    #[test]
    fn snapshot_uses_camel_case_field_names() {
        let snapshot = StatusSnapshot {
            status: DeployState::Failed,
            stage: None,
            progress: 60,
            error_message: Some("build broke".into()),
            duration_seconds: Some(12),
        };
        let value = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(
            value.get("errorMessage").and_then(|v| v.as_str()),
            Some("build broke")
        );
        assert_eq!(
            value.get("durationSeconds").and_then(|v| v.as_u64()),
            Some(12)
        );
    }
}
