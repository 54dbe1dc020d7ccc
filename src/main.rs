use anyhow::Context;
use clap::Parser;
use pixelhorizon::{BatchProcessor, BatchResult, Cli, Pipeline, Services};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .format_timestamp(None)
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = cli.pipeline_config();
    let services = Services::production(&config, cli.api_key.clone(), &cli.tools_dir);
    let pipeline = Pipeline::new(config, services).context("Invalid options")?;

    let processor = BatchProcessor::new(pipeline, cli.threads)?
        .with_progress(!cli.no_progress && !cli.quiet);

    let result = processor.run(&cli.batch_request())?;
    print_summary(&result);

    if cli.fail_on_error && result.has_failures() {
        return Ok(ExitCode::from(2));
    }

    Ok(ExitCode::SUCCESS)
}

fn print_summary(result: &BatchResult) {
    for processed in &result.succeeded {
        println!("{} -> {}", processed.source.display(), processed.output.display());
    }

    for failure in &result.failed {
        println!("FAILED {}: {}", failure.source.display(), failure.error);
    }

    println!(
        "{} succeeded, {} failed",
        result.succeeded.len(),
        result.failed.len()
    );
}
