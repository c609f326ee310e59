use anyhow::Context;
use clap::Parser;
use std::process;
use tagcsv::{
    Cli, ConversionResult, ErrorKind, OutputFormatter, OutputMode, TagCsv, TagCsvError,
    UserFriendlyError,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();
    init_logging(cli.verbosity_level());
    tracing::debug!("{}", tagcsv::build_info());

    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    let tagcsv = match TagCsv::from_cli(&cli) {
        Ok(tagcsv) => tagcsv,
        Err(e) => {
            print_startup_error(&e);
            return exit_code_for_error(&e);
        }
    };

    let request = match cli.build_request(tagcsv.config()) {
        Ok(request) => request,
        Err(e) => {
            tagcsv.handle_error(&e);
            return exit_code_for_error(&e);
        }
    };

    if cli.dry_run {
        return handle_dry_run(&cli, &tagcsv, &request);
    }

    match tagcsv.convert(cli.source_format, request).await {
        Ok(result) => exit_code_for_result(&result),
        Err(e) => {
            tagcsv.handle_error(&e);
            exit_code_for_error(&e)
        }
    }
}

/// stderr-only logging; RUST_LOG wins over -v.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "tagcsv=warn",
        1 => "tagcsv=info",
        2 => "tagcsv=debug",
        _ => "tagcsv=trace",
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn exit_code_for_result(result: &ConversionResult) -> i32 {
    if result.cancelled {
        return 130;
    }
    if result.success {
        return if result.is_partial() { 2 } else { 0 };
    }
    match result.failure {
        Some(ErrorKind::InputValidation) => 3,
        Some(ErrorKind::Merge) => 4,
        Some(ErrorKind::Cancelled) => 130,
        _ => 1,
    }
}

fn exit_code_for_error(error: &TagCsvError) -> i32 {
    match error {
        TagCsvError::Cancelled => 130,
        TagCsvError::Config { .. } => 5,
        _ => match error.kind() {
            ErrorKind::InputValidation => 3,
            ErrorKind::Merge => 4,
            _ => 1,
        },
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| "tagcsv.toml".into());

    let written = TagCsv::generate_sample_config(&config_path)
        .with_context(|| format!("writing {}", config_path.display()));

    match written {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path.display());
            println!("\nTo use this configuration:");
            println!(
                "  tagcsv <directory> --start <time> --end <time> --config {}",
                config_path.display()
            );
            println!("\nEdit the file to point at your extractor tools.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {:#}", e);
            if let Some(suggestion) = e.downcast_ref::<TagCsvError>().and_then(|t| t.suggestion()) {
                eprintln!("Suggestion: {}", suggestion);
            }
            5
        }
    }
}

fn handle_dry_run(cli: &Cli, tagcsv: &TagCsv, request: &tagcsv::ConversionRequest) -> i32 {
    let formatter = tagcsv.output_formatter();

    formatter.print_header("DRY RUN - no extractor will be started");

    let jobs = match tagcsv.plan(cli.source_format, request) {
        Ok(jobs) => jobs,
        Err(e) => {
            tagcsv.handle_error(&e);
            return exit_code_for_error(&e);
        }
    };

    let config = tagcsv.config();
    println!("  Source format:   {}", cli.source_format.name());
    println!("  Source dir:      {}", request.source_dir.display());
    println!("  Output dir:      {}", request.output_dir.display());
    println!("  Window:          {} .. {}", request.window.start, request.window.end);
    println!("  Workers:         {}", config.effective_workers());
    if !request.tags.is_empty() {
        println!("  Tags:            {}", request.tags.join(", "));
    }

    formatter.print_separator();
    for job in &jobs {
        println!("  {}", job.command());
        println!("    -> {}", job.output().display());
    }
    formatter.print_separator();

    formatter.success(&format!("{} extraction jobs planned", jobs.len()));
    0
}

fn print_startup_error(error: &TagCsvError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_for_results() {
        let ok = ConversionResult {
            success: true,
            processed_count: 2,
            ..ConversionResult::default()
        };
        assert_eq!(exit_code_for_result(&ok), 0);

        let partial = ConversionResult {
            failed_count: 1,
            ..ok.clone()
        };
        assert_eq!(exit_code_for_result(&partial), 2);

        let rejected = ConversionResult {
            failure: Some(ErrorKind::InputValidation),
            ..ConversionResult::default()
        };
        assert_eq!(exit_code_for_result(&rejected), 3);

        let merge = ConversionResult {
            failure: Some(ErrorKind::Merge),
            ..ConversionResult::default()
        };
        assert_eq!(exit_code_for_result(&merge), 4);

        let cancelled = ConversionResult {
            cancelled: true,
            ..ConversionResult::default()
        };
        assert_eq!(exit_code_for_result(&cancelled), 130);
    }

    #[test]
    fn test_exit_codes_for_errors() {
        assert_eq!(exit_code_for_error(&TagCsvError::Cancelled), 130);
        assert_eq!(exit_code_for_error(&TagCsvError::validation("bad")), 3);
        assert_eq!(
            exit_code_for_error(&TagCsvError::Config {
                message: "bad".to_string()
            }),
            5
        );
        assert_eq!(exit_code_for_error(&TagCsvError::merge("empty")), 4);
    }
}
