use chrono::{DateTime, Utc};
use rlplay_engine::{Algorithm, ResultStore, SessionStatus, SimulationSession};
use rlplay_stats::descriptive::DescriptiveStats;
use serde::Serialize;

/// JSON summary printed by headless runs.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RunSummary {
    pub finished_at: DateTime<Utc>,
    pub session_id: Option<String>,
    pub algorithm: Option<Algorithm>,
    pub status: Option<SessionStatus>,
    pub planned_episodes: Option<u32>,
    pub episodes: usize,
    pub rewards: Option<DescriptiveStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    pub fn new(session: Option<&SimulationSession>, store: &ResultStore) -> Self {
        Self {
            finished_at: Utc::now(),
            session_id: session.map(|s| s.id().to_string()),
            algorithm: session.map(SimulationSession::algorithm),
            status: session.map(SimulationSession::status),
            planned_episodes: session.map(SimulationSession::total_episodes_planned),
            episodes: store.len(),
            rewards: DescriptiveStats::new(store.iter().map(|r| r.reward)),
            error: session.and_then(|s| s.error()).map(ToString::to_string),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status.is_some_and(|s| s.is_error())
    }
}

#[cfg(test)]
mod tests {
    use rlplay_engine::{AgentState, SessionError, SessionId, StepRecord};

    use super::*;

    #[test]
    fn test_summary_of_failed_session() {
        let mut store = ResultStore::new();
        for (i, reward) in [1.0, 3.0, 2.0].into_iter().enumerate() {
            let index = u32::try_from(i).unwrap();
            store
                .append(StepRecord::new(index, reward, AgentState::Arm(0), 0))
                .unwrap();
        }
        let mut session = SimulationSession::new(SessionId::new("s"), Algorithm::Sarsa, 10);
        session.mark_running();
        session.fail(SessionError::Remote("boom".to_owned()));

        let summary = RunSummary::new(Some(&session), &store);
        assert!(summary.is_failure());
        assert_eq!(summary.episodes, 3);
        assert_eq!(summary.rewards.as_ref().map(|r| r.median), Some(2.0));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["algorithm"], "sarsa");
        assert_eq!(json["status"], "error");
        assert!(json["error"].as_str().unwrap().contains("boom"));
    }
}
