use serde::Deserialize;
use serde_json::Value;

use crate::core::{
    AgentState, ArmStats, GridPos, StepRecord, TrajectoryStep, ValueSnapshot, argmax,
    record::count_from_number,
};

/// Control signal carried by a `status` frame.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::IsVariant)]
pub enum Control {
    /// Acknowledgment only.
    Started,
    Completed,
    /// The producer reported a failure.
    Error(String),
}

/// One classified stream frame.
#[derive(Debug, Clone, PartialEq, derive_more::IsVariant)]
pub enum Frame {
    Control(Control),
    Data(StepRecord),
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum FrameError {
    #[display("frame is not valid JSON: {_0}")]
    Json(serde_json::Error),
    #[display("frame is not a JSON object")]
    NotAnObject,
    #[display("data frame does not match a step record: {_0}")]
    #[from(ignore)]
    Record(serde_json::Error),
    #[display("action count {_0} is not a non-negative integer")]
    #[from(ignore)]
    Count(#[error(not(source))] f64),
}

const UNKNOWN_ERROR: &str = "unknown error";

impl Frame {
    /// Classifies a frame payload.
    ///
    /// Frames with `status` set to `started`, `completed` or `error` are
    /// control frames. A bare `{"error": ...}` object is treated as an error
    /// control frame too. Everything else must be a step record, either in
    /// the producer's field names (`episode`, `total_reward`, `arm_selected`,
    /// `q_table`, ...) or in [`StepRecord`]'s own.
    pub fn parse(payload: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(payload)?;
        let Value::Object(object) = &value else {
            return Err(FrameError::NotAnObject);
        };
        let error_message = || {
            object
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_ERROR)
                .to_owned()
        };
        match object.get("status").and_then(Value::as_str) {
            Some("started") => return Ok(Self::Control(Control::Started)),
            Some("completed") => return Ok(Self::Control(Control::Completed)),
            Some("error") => return Ok(Self::Control(Control::Error(error_message()))),
            _ => {}
        }
        if object.contains_key("error") && !object.contains_key("episode") {
            return Ok(Self::Control(Control::Error(error_message())));
        }
        let frame = DataFrame::deserialize(value).map_err(FrameError::Record)?;
        Ok(Self::Data(frame.into_record()?))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QValues {
    Table(ValueSnapshot),
    Arms(Vec<f64>),
}

/// Wire shape of a data frame, accepting both naming schemes.
#[derive(Debug, Deserialize)]
struct DataFrame {
    #[serde(alias = "episode_index")]
    episode: u32,
    #[serde(alias = "total_reward")]
    reward: f64,
    agent_state: Option<AgentState>,
    arm_selected: Option<usize>,
    action: Option<usize>,
    #[serde(alias = "q_table", alias = "value_snapshot")]
    q_values: Option<QValues>,
    is_optimal: Option<bool>,
    /// Floats on the wire (`2.0`), checked when converted.
    action_counts: Option<Vec<f64>>,
    optimal_arm: Option<usize>,
    true_rewards: Option<Vec<f64>>,
    arm_stats: Option<ArmStats>,
    steps: Option<u32>,
    trajectory: Option<Vec<TrajectoryStep>>,
}

impl DataFrame {
    fn into_record(self) -> Result<StepRecord, FrameError> {
        let last_step = self.trajectory.as_ref().and_then(|t| t.last());
        let agent_state = self
            .agent_state
            .or_else(|| self.arm_selected.map(AgentState::Arm))
            .or_else(|| last_step.map(|s| AgentState::Cell(s.next_state)))
            .unwrap_or(AgentState::Cell(GridPos::new(0, 0)));
        let action = self
            .action
            .or(self.arm_selected)
            .or_else(|| last_step.map(|s| s.action))
            .unwrap_or(0);

        let mut record = StepRecord::new(self.episode, self.reward, agent_state, action);
        record.is_optimal = self.is_optimal;
        record.steps = self.steps;
        record.trajectory = self.trajectory;
        record.arm_stats = self.arm_stats;
        match self.q_values {
            Some(QValues::Table(table)) => record.value_snapshot = Some(table),
            Some(QValues::Arms(estimates)) if record.arm_stats.is_none() => {
                let optimal_arm = self
                    .optimal_arm
                    .or_else(|| self.true_rewards.as_deref().and_then(argmax))
                    .unwrap_or(0);
                let counts = match self.action_counts {
                    Some(counts) => counts
                        .into_iter()
                        .map(|c| count_from_number(c).ok_or(FrameError::Count(c)))
                        .collect::<Result<_, _>>()?,
                    None => vec![0; estimates.len()],
                };
                record.arm_stats = Some(ArmStats {
                    counts,
                    estimates,
                    optimal_arm,
                    optimal_rate: None,
                });
            }
            Some(QValues::Arms(_)) | None => {}
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_frames() {
        assert_eq!(
            Frame::parse(r#"{"status": "started", "session_id": "abc"}"#).unwrap(),
            Frame::Control(Control::Started)
        );
        assert_eq!(
            Frame::parse(r#"{"status": "completed"}"#).unwrap(),
            Frame::Control(Control::Completed)
        );
        assert_eq!(
            Frame::parse(r#"{"status": "error", "error": "oom"}"#).unwrap(),
            Frame::Control(Control::Error("oom".to_owned()))
        );
        assert_eq!(
            Frame::parse(r#"{"error": "boom"}"#).unwrap(),
            Frame::Control(Control::Error("boom".to_owned()))
        );
    }

    #[test]
    fn test_grid_frame() {
        let payload = r#"{
            "episode": 3, "total_reward": 8.7, "steps": 2,
            "trajectory": [
                {"state": [0, 0], "action": 1, "reward": -0.1, "next_state": [0, 1], "done": false},
                {"state": [0, 1], "action": 2, "reward": 10.0, "next_state": [1, 1], "done": true}
            ],
            "q_table": {"(0, 0)": [0.0, 0.5, 0.0, 0.0]}
        }"#;
        let Frame::Data(record) = Frame::parse(payload).unwrap() else {
            panic!("expected data frame");
        };
        assert_eq!(record.episode_index, 3);
        assert_eq!(record.agent_state, AgentState::Cell(GridPos::new(1, 1)));
        assert_eq!(record.action, 2);
        assert_eq!(record.steps, Some(2));
        let snapshot = record.value_snapshot.unwrap();
        assert_eq!(snapshot.best_action(GridPos::new(0, 0)), Some(1));
    }

    #[test]
    fn test_td_lambda_uses_q_values_map() {
        let payload = r#"{"episode": 0, "total_reward": 1.0, "trajectory": [],
            "q_values": {"(2, 3)": [1.0, 0.0, 0.0, 0.0]}, "avg_eligibility": 0.2}"#;
        let Frame::Data(record) = Frame::parse(payload).unwrap() else {
            panic!("expected data frame");
        };
        assert!(record.value_snapshot.is_some());
        assert!(record.arm_stats.is_none());
    }

    #[test]
    fn test_bandit_frame() {
        let payload = r#"{"episode": 7, "arm_selected": 2, "reward": 0.8,
            "q_values": [0.1, 0.2, 0.7], "action_counts": [2, 2, 4],
            "true_rewards": [0.0, 0.3, 0.9], "optimal_arm": 2, "is_optimal": true}"#;
        let Frame::Data(record) = Frame::parse(payload).unwrap() else {
            panic!("expected data frame");
        };
        assert_eq!(record.agent_state, AgentState::Arm(2));
        assert_eq!(record.action, 2);
        assert_eq!(record.is_optimal, Some(true));
        let stats = record.arm_stats.unwrap();
        assert_eq!(stats.counts, vec![2, 2, 4]);
        assert_eq!(stats.optimal_arm, 2);
        assert!(record.value_snapshot.is_none());
    }

    #[test]
    fn test_bandit_frame_with_float_counts() {
        let payload = r#"{"episode": 7, "arm_selected": 2, "reward": 0.8,
            "q_values": [0.1, 0.2, 0.7], "action_counts": [2.0, 2.0, 4.0],
            "true_rewards": [0.0, 0.3, 0.9], "optimal_arm": 2, "is_optimal": true}"#;
        let Frame::Data(record) = Frame::parse(payload).unwrap() else {
            panic!("expected data frame");
        };
        assert_eq!(record.arm_stats.unwrap().counts, vec![2, 2, 4]);

        let fractional = payload.replace("[2.0, 2.0, 4.0]", "[2.5, 2.0, 4.0]");
        assert!(matches!(
            Frame::parse(&fractional),
            Err(FrameError::Count(c)) if (c - 2.5).abs() < f64::EPSILON
        ));
    }

    #[test]
    fn test_own_serialization_is_accepted() {
        let record = StepRecord::new(4, -1.0, AgentState::Cell(GridPos::new(2, 2)), 3);
        let payload = serde_json::to_string(&record).unwrap();
        assert_eq!(Frame::parse(&payload).unwrap(), Frame::Data(record));
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(Frame::parse("not json"), Err(FrameError::Json(_))));
        assert!(matches!(Frame::parse("[1, 2]"), Err(FrameError::NotAnObject)));
        assert!(matches!(
            Frame::parse(r#"{"reward": 1.0}"#),
            Err(FrameError::Record(_))
        ));
    }
}
