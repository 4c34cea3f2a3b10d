//! remote-shell binary entry point.

use std::io::Write;
use std::process::ExitCode;

use remote_shell::cli;
use remote_shell::config::Config;
use remote_shell::{logging, Gateway, SessionId, SshConnector, TransportConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

/// Exit code for usage and configuration errors.
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run with --help for usage.");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }

    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    logging::init_with_filter(Some(config.log_filter())).ok();
    debug!("remote-shell v{}", env!("CARGO_PKG_VERSION"));

    let target = match config.to_transport_config() {
        Ok(target) => target,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let result = match args.exec {
        Some(ref command) => exec(&config, &target, command).await,
        None => interactive(&config, &target).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run one command and mirror its exit status.
async fn exec(config: &Config, target: &TransportConfig, command: &str) -> Result<ExitCode, String> {
    let out = remote_shell::run_once(
        &SshConnector::new(),
        target,
        command,
        config.to_run_options(),
    )
    .await
    .map_err(|e| e.to_string())?;

    emit(&out.output);

    let status = out.exit_status.unwrap_or(0).min(u8::MAX as u32) as u8;
    Ok(ExitCode::from(status))
}

/// Read commands from stdin and print each output until `exit`, `quit` or EOF.
async fn interactive(config: &Config, target: &TransportConfig) -> Result<ExitCode, String> {
    let gateway = Gateway::new()
        .drain_config(config.to_drain_config())
        .run_options(config.to_run_options());

    let (id, banner) = gateway.open(target).await?;
    info!("session {} open on {}", id, target.address());
    emit(&banner);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let outcome = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(format!("failed to read stdin: {}", e)),
        };

        let command = line.trim_end();
        if matches!(command.trim(), "exit" | "quit") {
            break Ok(());
        }

        let sent = gateway.send(&id, command).await;
        emit_errors(&gateway, &id).await;
        match sent {
            Ok(output) => emit(&output),
            Err(e) => break Err(e),
        }
    };

    emit_errors(&gateway, &id).await;
    gateway.close_all().await;

    outcome.map(|()| ExitCode::SUCCESS)
}

async fn emit_errors(gateway: &Gateway, id: &SessionId) {
    if let Ok(errors) = gateway.errors(id).await {
        if !errors.is_empty() {
            eprint!("{}", errors);
        }
    }
}

fn emit(text: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}
