use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};
use crate::model::test_case::TestCaseId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisorAction {
    Remove,
    Keep,
    Merge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: AdvisorAction,
    #[serde(default)]
    pub justification: String,
}

impl Recommendation {
    pub fn new(action: AdvisorAction, justification: &str) -> Self {
        Self {
            action,
            justification: justification.to_string(),
        }
    }
}

pub type Recommendations = BTreeMap<TestCaseId, Recommendation>;

/// Read `{ "<id>": {"action": "...", "justification": "..."} }`.
pub fn load_recommendations(path: &Path) -> Result<Recommendations> {
    let text = fs::read_to_string(path).map_err(|e| OptimizerError::io(path, e))?;
    parse_recommendations(&text, &path.display().to_string())
}

pub fn parse_recommendations(text: &str, context: &str) -> Result<Recommendations> {
    let raw: HashMap<String, Recommendation> =
        serde_json::from_str(text).map_err(|e| OptimizerError::JsonParse {
            context: context.to_string(),
            source: e,
        })?;

    let mut out = Recommendations::new();
    for (key, rec) in raw {
        let id: TestCaseId = key.trim().parse().map_err(|_| {
            OptimizerError::InvalidInput(format!(
                "recommendation key '{}' in {} is not a test case id",
                key, context
            ))
        })?;
        out.insert(id, rec);
    }

    tracing::info!(count = out.len(), source = context, "loaded advisor recommendations");
    Ok(out)
}
