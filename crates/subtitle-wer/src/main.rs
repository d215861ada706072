use std::error::Error;
use std::process::ExitCode;
use std::time::Duration;

use subtitle_wer::backend::display_available_backends;
use subtitle_wer::cli::{CliArgs, CliSources, Command, parse_cli};
use subtitle_wer::pipeline::{cancel_on_ctrl_c, run_extraction};
use subtitle_wer::report::render_summary;
use subtitle_wer::settings::resolve_settings;
use subtitle_wer::wer::run_wer;
use subtitle_wer::{CancelHandle, PipelineError};
use subtitle_wer_ocr::TesseractOptions;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() -> ExitCode {
    let (cli, sources) = parse_cli();
    init_logging(&cli);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(dispatch(cli, sources));

    // timed-out recognition calls may still occupy blocking threads
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: CliArgs, sources: CliSources) -> Result<(), PipelineError> {
    match cli.command {
        Command::Extract(args) => {
            let settings = resolve_settings(&args, &sources)?;
            if let Some(path) = &settings.config_path {
                debug!(path = %path.display(), "loaded configuration");
            }
            let cancel = CancelHandle::new();
            cancel_on_ctrl_c(cancel.clone());
            let summary = run_extraction(settings, cancel).await?;
            print!("{}", render_summary(&summary));
        }
        Command::Wer(args) => {
            let report = run_wer(&args)?;
            if args.json {
                println!("{report}");
            } else {
                print!("{report}");
            }
        }
        Command::Backends => {
            print!("{}", display_available_backends(&TesseractOptions::default()));
        }
    }
    Ok(())
}

fn init_logging(cli: &CliArgs) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn report_error(err: &PipelineError) {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    eprintln!("error: {message}");
}
