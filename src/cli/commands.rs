use std::path::Path;

use serde::Serialize;

use crate::analysis::matrix::SimilarityMatrix;
use crate::cli::config::AppConfig;
use crate::error::OptimizerError;
use crate::model::loader::{load_suite, write_suite};
use crate::model::test_case::TestSuite;
use crate::model::validate::validate_suite;
use crate::oracle::advisor::load_recommendations;
use crate::oracle::gateway::OracleGateway;
use crate::oracle::mock::MockOracle;
use crate::oracle::ollama::OllamaOracle;
use crate::report::console::{
    format_analysis, format_execution_plan, format_optimization_report, format_validation_summary,
};
use crate::report::report_model::OptimizationReport;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

// ============================================================================
// analyze subcommand
// ============================================================================

pub fn cmd_analyze(
    config: &AppConfig,
    test_cases: &str,
    steps: &str,
    threshold: Option<f64>,
    verbose: u8,
) -> CliResult<()> {
    let suite = load(test_cases, steps, verbose)?;

    let similarity = config.similarity_analyzer();
    let matrix = SimilarityMatrix::build(&similarity, &suite);
    let duplicates = config.detector().detect(&suite, &matrix, None);
    let flows = config.coverage_analyzer().flow_coverage(&suite);

    print!("{}", format_analysis(&matrix.summary(), &duplicates, &flows));

    if let Some(threshold) = threshold {
        let pairs = similarity.find_similar(&suite, threshold);
        println!("\n=== Pairs at or above {:.2}: {} ===", threshold, pairs.len());
        for pair in &pairs {
            println!("  {} ~ {}  {:.3}", pair.first, pair.second, pair.similarity);
        }
    }

    Ok(())
}

// ============================================================================
// optimize subcommand
// ============================================================================

/// Full pipeline. Returns whether comprehensive validation passed.
pub fn cmd_optimize(
    config: &AppConfig,
    test_cases: &str,
    steps: &str,
    output: &str,
    oracle: Option<&str>,
    recommendations: Option<&str>,
    multi_merge: bool,
    verbose: u8,
    ollama_endpoint: Option<&str>,
    ollama_model: Option<&str>,
) -> CliResult<bool> {
    let suite = load(test_cases, steps, verbose)?;

    let recs = match recommendations {
        Some(path) => Some(load_recommendations(Path::new(path))?),
        None => None,
    };

    let oracle_name = oracle.unwrap_or(if config.oracle.enabled { "ollama" } else { "none" });
    let mut gateway = build_gateway(config, oracle_name, ollama_endpoint, ollama_model)?;

    if verbose > 0 {
        eprintln!(
            "Optimizing {} test cases (oracle: {}, multi-merge: {})...",
            suite.len(),
            oracle_name,
            multi_merge || config.engine.multi_merge
        );
    }

    let engine = config.engine(multi_merge);
    let result = engine.optimize(&suite, recs.as_ref(), gateway.as_mut())?;
    let optimized = result.optimized_suite(&suite);

    let validation = config
        .validator()
        .validate_with_lineage(&suite, &optimized, &result.lineage());
    let plan = config.scheduler().schedule(&optimized);
    let report = OptimizationReport::from_result(&result);

    let out_dir = Path::new(output);
    std::fs::create_dir_all(out_dir).map_err(|e| OptimizerError::io(out_dir, e))?;

    #[derive(Serialize)]
    struct ResultFile<'a> {
        summary: &'a OptimizationReport,
        result: &'a crate::optimization::result::OptimizationResult,
    }
    write_json(
        &out_dir.join("optimization_result.json"),
        &ResultFile {
            summary: &report,
            result: &result,
        },
    )?;
    write_json(&out_dir.join("validation.json"), &validation)?;
    write_json(&out_dir.join("execution_plan.json"), &plan)?;

    let optimized_dir = out_dir.join("optimized");
    let written = write_suite(
        &optimized,
        &optimized_dir.join("test_cases"),
        &optimized_dir.join("steps"),
    )?;
    if verbose > 0 {
        eprintln!("  Wrote {} files under {}", written.len(), optimized_dir.display());
    }

    print!("{}", format_optimization_report(&report, &result));
    println!();
    print!("{}", format_validation_summary(&validation));

    if let Some(gateway) = &gateway {
        let stats = gateway.stats();
        tracing::info!(
            oracle = gateway.oracle_name(),
            requests = stats.requests,
            cache_hits = stats.cache_hits,
            failures = stats.failures,
            "oracle usage"
        );
    }

    println!("\nResults written to {}/", out_dir.display());
    Ok(validation.overall_valid)
}

// ============================================================================
// schedule subcommand
// ============================================================================

pub fn cmd_schedule(
    config: &AppConfig,
    test_cases: &str,
    steps: &str,
    output: Option<&str>,
    verbose: u8,
) -> CliResult<()> {
    let suite = load(test_cases, steps, verbose)?;
    let plan = config.scheduler().schedule(&suite);

    match output {
        Some(path) => {
            write_json(Path::new(path), &plan)?;
            println!(
                "Execution plan for {} test cases written to {}",
                plan.summary.total_test_cases, path
            );
        }
        None => print!("{}", format_execution_plan(&plan, &suite)),
    }
    Ok(())
}

// ============================================================================
// validate subcommand
// ============================================================================

/// Comprehensive validation between two suites. Returns whether it passed.
pub fn cmd_validate(
    config: &AppConfig,
    original_cases: &str,
    original_steps: &str,
    optimized_cases: &str,
    optimized_steps: &str,
    verbose: u8,
) -> CliResult<bool> {
    let original = load(original_cases, original_steps, verbose)?;
    let optimized = load(optimized_cases, optimized_steps, verbose)?;

    let validator = config.validator();
    let result = validator.validate(&original, &optimized);
    println!("{}", validator.report_text(&result));
    Ok(result.overall_valid)
}

// ============================================================================
// Helpers
// ============================================================================

/// Load a suite and surface structural problems without failing on them.
fn load(test_cases: &str, steps: &str, verbose: u8) -> CliResult<TestSuite> {
    let suite = load_suite(Path::new(test_cases), Path::new(steps))?;
    if suite.is_empty() {
        return Err(OptimizerError::InvalidInput(format!("no test cases found in {}", test_cases)).into());
    }

    let check = validate_suite(&suite);
    for issue in &check.errors {
        eprintln!("  [ERROR] {}: {}", issue.test_case_id, issue.message);
    }
    if verbose > 0 {
        for issue in &check.warnings {
            eprintln!("  [WARN] {}: {}", issue.test_case_id, issue.message);
        }
    }
    Ok(suite)
}

/// Build the oracle gateway for the named backend.
fn build_gateway(
    config: &AppConfig,
    name: &str,
    ollama_endpoint: Option<&str>,
    ollama_model: Option<&str>,
) -> CliResult<Option<OracleGateway>> {
    let gateway = match name {
        "none" => return Ok(None),
        "mock" => OracleGateway::from_config(Box::new(MockOracle::new()), &config.oracle, &config.similarity),
        "ollama" => {
            let endpoint = ollama_endpoint.unwrap_or(&config.oracle.endpoint);
            let model = ollama_model.unwrap_or(&config.oracle.model);
            OracleGateway::from_config(
                Box::new(OllamaOracle::new(endpoint, model)),
                &config.oracle,
                &config.similarity,
            )
        }
        other => {
            return Err(OptimizerError::Oracle(format!(
                "unknown oracle '{}' (expected mock, ollama or none)",
                other
            ))
            .into());
        }
    };
    Ok(Some(gateway))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> CliResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|source| OptimizerError::JsonSerialize {
        context: path.display().to_string(),
        source,
    })?;
    std::fs::write(path, json).map_err(|e| OptimizerError::io(path, e))?;
    Ok(())
}
