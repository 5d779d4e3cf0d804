/// Lifecycle state of a single device key inside the registry.
///
/// State transitions:
/// ```text
/// absent → active(1) ↔ active(n) → active(1) → absent
/// ```
///
/// `absent` always sits between the teardown of one capture resource and the
/// creation of the next one for the same key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceState {
    #[default]
    Absent,
    Active { subscribers: usize },
}

impl DeviceState {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// Number of live subscriptions; zero when absent.
    pub fn subscribers(&self) -> usize {
        match self {
            Self::Absent => 0,
            Self::Active { subscribers } => *subscribers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_has_no_subscribers() {
        let state = DeviceState::default();
        assert!(state.is_absent());
        assert!(!state.is_active());
        assert_eq!(state.subscribers(), 0);
    }

    #[test]
    fn active_reports_count() {
        let state = DeviceState::Active { subscribers: 3 };
        assert!(state.is_active());
        assert_eq!(state.subscribers(), 3);
    }
}
