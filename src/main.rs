// Vault Extract - read Ansible vault-encrypted values from YAML files
//
// This is the main entry point for the application. Only the rendered result
// goes to stdout; logs and diagnostics go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vault_extract::config::{expand_tilde, Config};
use vault_extract::provider::AnsibleProvider;
use vault_extract::{ExtractError, Extractor, RenderFormat};

/// Extract and decrypt Ansible vault-encrypted values from YAML files
#[derive(Parser, Debug)]
#[command(name = "vault-extract")]
#[command(version)]
#[command(about = "Extract and decrypt Ansible vault-encrypted values from YAML files", long_about = None)]
#[command(after_help = r#"Examples:
  vault-extract --yaml-file secrets.yml --vault-password-file vault_password.txt
  vault-extract --yaml-file secrets.yml --vault-password-file vault_password.txt --debug
  vault-extract --yaml-file secrets.yml --vault-password-file vault_password.txt --env
  source <(vault-extract --yaml-file secrets.yml --vault-password-file vault_password.txt --env)

When both --debug and --env are given, --debug wins."#)]
struct Cli {
    /// Path to the YAML file with vault-encrypted values
    #[arg(long, value_name = "PATH")]
    yaml_file: String,

    /// Path to the vault password file
    #[arg(long, value_name = "PATH")]
    vault_password_file: String,

    /// Show the raw ansible debug output
    #[arg(long, default_value = "false")]
    debug: bool,

    /// Output as exported environment variables with uppercase keys
    #[arg(long, default_value = "false")]
    env: bool,

    /// Path to a configuration file (default: <config dir>/vault-extract/config.yaml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Seconds to wait for ansible before giving up (0 waits forever)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Log pipeline steps to stderr
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "vault_extract=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();
}

/// Kill the tool and clean up on Ctrl+C instead of dying mid-run.
fn interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    if let Err(e) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)) {
        tracing::warn!("failed to set SIGINT handler: {}", e);
    }
    flag
}

fn run(cli: &Cli) -> Result<String> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }

    let source: PathBuf = expand_tilde(&cli.yaml_file)?;
    let credential: PathBuf = expand_tilde(&cli.vault_password_file)?;
    let format = RenderFormat::from_flags(cli.debug, cli.env);

    let provider = AnsibleProvider::new(&config.tool, &config.host, &config.payload_key)
        .with_timeout(config.timeout())
        .with_interrupt_flag(interrupt_flag());

    let extractor = Extractor::from_config(provider, &config)?;
    let output = extractor.run(&source, &credential, format)?;
    Ok(output)
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<ExtractError>()
        .map(ExtractError::exit_code)
        .unwrap_or(1)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(output) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout.write_all(output.as_bytes()).and_then(|_| stdout.flush()) {
                eprintln!("Error: failed to write output: {}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(exit_code(&e));
        }
    }
}
