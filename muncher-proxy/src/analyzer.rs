//! Replay analysis seam.
//!
//! Turning a replay into statistics is done by an external library; the
//! gateway only needs something that takes the replay JSON and returns the
//! JSON to send back. [`PassthroughAnalyzer`] validates the shape and returns
//! the replay unchanged.

use serde_json::Value;

/// The replay could not be analyzed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct AnalysisError(pub String);

/// Produces caller-facing statistics from a replay
pub trait ReplayAnalyzer: Send + Sync {
    fn analyze(&self, replay: &Value) -> Result<Value, AnalysisError>;

    /// Parse a raw replay body, then analyze it
    fn analyze_str(&self, body: &str) -> Result<Value, AnalysisError> {
        let replay: Value =
            serde_json::from_str(body).map_err(|e| AnalysisError(format!("invalid JSON: {e}")))?;
        self.analyze(&replay)
    }
}

/// Returns the replay as-is once it looks like one
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughAnalyzer;

impl ReplayAnalyzer for PassthroughAnalyzer {
    fn analyze(&self, replay: &Value) -> Result<Value, AnalysisError> {
        match replay {
            Value::Object(map) if !map.is_empty() => Ok(replay.clone()),
            Value::Object(_) => Err(AnalysisError("replay is empty".to_string())),
            _ => Err(AnalysisError("replay is not a JSON object".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_passthrough_accepts_objects() {
        let replay = json!({ "replay": { "leaderboard": [] }, "gamemode": "league" });
        assert_eq!(PassthroughAnalyzer.analyze(&replay).unwrap(), replay);
    }

    #[test]
    fn test_passthrough_rejects_non_objects() {
        assert!(PassthroughAnalyzer.analyze(&json!([1, 2, 3])).is_err());
        assert!(PassthroughAnalyzer.analyze(&json!({})).is_err());
    }

    #[test]
    fn test_analyze_str() {
        assert!(PassthroughAnalyzer.analyze_str(r#"{"gamemode":"league"}"#).is_ok());

        let err = PassthroughAnalyzer.analyze_str("not json").unwrap_err();
        assert!(err.0.starts_with("invalid JSON"));
    }
}
