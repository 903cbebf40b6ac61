use std::path::Path;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::analysis::duplicate::{DuplicateConfig, DuplicateDetector};
use crate::analysis::role::{RoleClassifier, RoleIndicators};
use crate::analysis::similarity::{SimilarityAnalyzer, SimilarityConfig};
use crate::analysis::website::{WebsiteAliases, WebsiteGrouper};
use crate::execution::priority::PriorityCalculator;
use crate::execution::scheduler::{ExecutionConfig, ExecutionScheduler};
use crate::flows::classifier::FlowClassifier;
use crate::flows::coverage::CoverageAnalyzer;
use crate::flows::flow_analyzer::{FlowAnalyzer, FlowKeywords};
use crate::optimization::engine::{EngineConfig, OptimizationEngine};
use crate::optimization::merger::TestCaseMerger;
use crate::optimization::validator::{CoverageValidator, ValidationConfig};
use crate::oracle::oracle_model::OracleConfig;
use crate::trace::logger::TraceLogger;

pub const DEFAULT_CONFIG_FILE: &str = "suite-optimizer.yaml";

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "suite-optimizer",
    version,
    about = "Shrink recorded UI test suites without losing coverage"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Ollama API endpoint
    #[arg(long, global = true)]
    pub ollama_endpoint: Option<String>,

    /// Ollama model name
    #[arg(long, global = true)]
    pub ollama_model: Option<String>,

    /// Path to config file (default: suite-optimizer.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Similarity summary, duplicate groups and flow coverage of a suite
    Analyze {
        /// Directory of test case metadata files (NN.json)
        #[arg(long)]
        test_cases: String,

        /// Directory of step files (NN.json)
        #[arg(long)]
        steps: String,

        /// Minimum similarity for a pair to be listed
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Run the full optimization pipeline
    Optimize {
        #[arg(long)]
        test_cases: String,

        #[arg(long)]
        steps: String,

        /// Output directory for results and the optimized suite
        #[arg(short, long, default_value = "optimization_output")]
        output: String,

        /// Semantic oracle: mock, ollama or none
        #[arg(long)]
        oracle: Option<String>,

        /// Advisor recommendations JSON file
        #[arg(long)]
        recommendations: Option<String>,

        /// Consolidate same-role, same-website groups sharing a prefix
        #[arg(long)]
        multi_merge: bool,
    },

    /// Build an execution plan for a suite
    Schedule {
        #[arg(long)]
        test_cases: String,

        #[arg(long)]
        steps: String,

        /// Write the plan as JSON instead of printing it
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Compare an optimized suite against its original
    Validate {
        #[arg(long)]
        original_cases: String,

        #[arg(long)]
        original_steps: String,

        #[arg(long)]
        optimized_cases: String,

        #[arg(long)]
        optimized_steps: String,
    },
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

/// Optional YAML config file: `suite-optimizer.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub duplicates: DuplicateConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub trace: TraceConfig,
    #[serde(default)]
    pub classifiers: ClassifierConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceConfig {
    /// JSONL decision trace; disabled when unset
    pub path: Option<String>,
}

/// Keyword tables behind flow, role and website classification. Scenario
/// keywords live under `validation.scenarios`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub flows: FlowKeywords,
    #[serde(default)]
    pub roles: RoleIndicators,
    #[serde(default)]
    pub websites: WebsiteAliases,
}

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> AppConfig {
    let config_path = path.unwrap_or(DEFAULT_CONFIG_FILE);
    match std::fs::read_to_string(config_path) {
        Ok(content) => serde_yaml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = config_path, error = %e, "malformed config, using defaults");
            AppConfig::default()
        }),
        Err(_) => AppConfig::default(),
    }
}

// ============================================================================
// Config Builders (wire config sections into components)
// ============================================================================

impl AppConfig {
    pub fn flow_analyzer(&self) -> FlowAnalyzer {
        FlowAnalyzer::new(self.classifiers.flows.clone())
    }

    pub fn coverage_analyzer(&self) -> CoverageAnalyzer {
        CoverageAnalyzer::new(self.flow_analyzer())
    }

    pub fn similarity_analyzer(&self) -> SimilarityAnalyzer {
        SimilarityAnalyzer::new(self.similarity.clone())
    }

    pub fn detector(&self) -> DuplicateDetector {
        DuplicateDetector::new(self.duplicates.clone()).with_oracle_config(self.oracle.clone())
    }

    pub fn merger(&self) -> TestCaseMerger {
        TestCaseMerger {
            flows: self.flow_analyzer(),
            roles: RoleClassifier::new(self.classifiers.roles.clone()),
            websites: WebsiteGrouper::new(self.classifiers.websites.clone()),
            ..TestCaseMerger::default()
        }
    }

    pub fn trace_logger(&self) -> TraceLogger {
        match self.trace.path.as_deref() {
            Some(path) => TraceLogger::new(Path::new(path)),
            None => TraceLogger::disabled(),
        }
    }

    /// Engine with every configured table, optionally overriding multi-merge.
    pub fn engine(&self, multi_merge: bool) -> OptimizationEngine {
        let mut config = self.engine.clone();
        config.multi_merge = config.multi_merge || multi_merge;

        OptimizationEngine::new(config)
            .with_similarity(self.similarity_analyzer())
            .with_detector(self.detector())
            .with_merger(self.merger())
            .with_coverage(self.coverage_analyzer())
            .with_trace(self.trace_logger())
    }

    pub fn validator(&self) -> CoverageValidator {
        CoverageValidator::new(self.validation.clone()).with_coverage(self.coverage_analyzer())
    }

    pub fn scheduler(&self) -> ExecutionScheduler {
        ExecutionScheduler::new(self.execution.clone())
            .with_priorities(PriorityCalculator::new(self.coverage_analyzer()))
            .with_classifier(FlowClassifier::new(self.flow_analyzer()))
    }
}
