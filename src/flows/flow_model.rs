use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::test_case::TestCaseId;

/// Coarse functional category of a test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    Authentication,
    Navigation,
    Crud,
    Form,
    Search,
    Verification,
    General,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowType::Authentication => "authentication",
            FlowType::Navigation => "navigation",
            FlowType::Crud => "crud",
            FlowType::Form => "form",
            FlowType::Search => "search",
            FlowType::Verification => "verification",
            FlowType::General => "general",
        }
    }

    pub fn category(&self) -> FlowCategory {
        match self {
            FlowType::Authentication => FlowCategory::Authentication,
            FlowType::Navigation => FlowCategory::Navigation,
            FlowType::Crud | FlowType::Form => FlowCategory::DataEntry,
            FlowType::Search => FlowCategory::SearchFilter,
            FlowType::Verification | FlowType::General => FlowCategory::General,
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flows whose coverage may never regress.
pub const CRITICAL_FLOWS: [FlowType; 3] = [
    FlowType::Authentication,
    FlowType::Navigation,
    FlowType::Crud,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowCategory {
    Authentication,
    Navigation,
    DataEntry,
    SearchFilter,
    General,
}

impl fmt::Display for FlowCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FlowCategory::Authentication => "authentication",
            FlowCategory::Navigation => "navigation",
            FlowCategory::DataEntry => "data_entry",
            FlowCategory::SearchFilter => "search_filter",
            FlowCategory::General => "general",
        };
        f.write_str(label)
    }
}

/// Consecutive navigations within one test case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PageTransition {
    pub from: String,
    pub to: String,
    pub step_position: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CriticalPath {
    pub flow_type: FlowType,
    pub frequency: usize,
    pub average_priority: f64,
    pub criticality_score: f64,
    pub test_case_ids: Vec<TestCaseId>,
}
