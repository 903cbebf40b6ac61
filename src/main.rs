use clap::Parser;
use suite_optimizer::cli::commands::{cmd_analyze, cmd_optimize, cmd_schedule, cmd_validate};
use suite_optimizer::cli::config::{Cli, Commands, load_config};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref());

    // Ollama settings: CLI > config > defaults
    let ollama_endpoint = cli.ollama_endpoint.as_deref();
    let ollama_model = cli.ollama_model.as_deref();

    match cli.command {
        Commands::Analyze {
            test_cases,
            steps,
            threshold,
        } => {
            cmd_analyze(&config, &test_cases, &steps, threshold, cli.verbose)?;
        }
        Commands::Optimize {
            test_cases,
            steps,
            output,
            oracle,
            recommendations,
            multi_merge,
        } => {
            let valid = cmd_optimize(
                &config,
                &test_cases,
                &steps,
                &output,
                oracle.as_deref(),
                recommendations.as_deref(),
                multi_merge,
                cli.verbose,
                ollama_endpoint,
                ollama_model,
            )?;
            if !valid {
                std::process::exit(1);
            }
        }
        Commands::Schedule {
            test_cases,
            steps,
            output,
        } => {
            cmd_schedule(&config, &test_cases, &steps, output.as_deref(), cli.verbose)?;
        }
        Commands::Validate {
            original_cases,
            original_steps,
            optimized_cases,
            optimized_steps,
        } => {
            let valid = cmd_validate(
                &config,
                &original_cases,
                &original_steps,
                &optimized_cases,
                &optimized_steps,
                cli.verbose,
            )?;
            if !valid {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// `-v` count picks the default level; `RUST_LOG` wins when set.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
