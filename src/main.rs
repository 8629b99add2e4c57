use std::{panic, process::ExitCode};

use anyhow::{Context, Error};
use clap::Parser;
use log::{error, info, LevelFilter};

use osutils::host::{DryRunHost, Host, LocalHost};
use volsetup::{
    cli::{Cli, Commands},
    ApplyOutcome, BackgroundLog, MultiLogger,
};
use volsetup_api::{
    config::VolsetupConfig,
    error::{
        ExecutionEnvironmentMisconfigurationError, InternalError, ReportError, VolsetupError,
        VolsetupResultExt,
    },
};

fn load_config(args: &Cli) -> Result<VolsetupConfig, VolsetupError> {
    let mut config = VolsetupConfig::load(args.config.as_deref())?;
    args.command.override_config(&mut config);
    Ok(config)
}

fn run_volsetup(config: VolsetupConfig, args: &Cli) -> Result<(), VolsetupError> {
    // Log version ASAP
    info!("Volsetup version: {}", volsetup::VOLSETUP_VERSION);

    // Catch commands that don't touch the host
    match &args.command {
        Commands::Validate { .. } => {
            let layout = volsetup::read_layout(&LocalHost, &config.layout_path)?;
            println!(
                "{}",
                serde_yaml::to_string(&layout).structured(InternalError::Serialize)?
            );
            info!("Volume layout '{}' is valid", config.layout_path.display());
            return Ok(());
        }

        Commands::ShowConfig => {
            print!(
                "{}",
                serde_yaml::to_string(&config).structured(InternalError::Serialize)?
            );
            return Ok(());
        }

        Commands::Apply { .. } => (),
    }

    let res = panic::catch_unwind(move || {
        let Commands::Apply { dry_run, .. } = args.command else {
            return Err(VolsetupError::internal("Invalid command"));
        };

        if !dry_run && !nix::unistd::Uid::effective().is_root() {
            return Err(VolsetupError::new(
                ExecutionEnvironmentMisconfigurationError::MissingRequiredPermissions,
            ));
        }

        let mut host: Box<dyn Host> = if dry_run {
            Box::new(DryRunHost::default())
        } else {
            Box::new(LocalHost)
        };

        match volsetup::apply(host.as_mut(), &config)
            .message(format!("Failed to execute '{}' command", args.command))?
        {
            ApplyOutcome::Applied => info!("Volume layout applied"),
            ApplyOutcome::NothingToDo => info!("No pending volume layout"),
        }
        Ok(())
    });

    match res {
        Err(e) => Err(VolsetupError::new(InternalError::Panic(format!("{e:?}")))),
        Ok(r) => r,
    }
}

fn setup_logging(args: &Cli, config: &VolsetupConfig) -> Result<(), Error> {
    let keep_audit = matches!(args.command, Commands::Apply { .. });

    // Set up the multilogger
    let mut multilogger = MultiLogger::new()
        // Add regular env_logger to output to stderr
        .with_logger(Box::new(
            env_logger::builder()
                .format_timestamp(None)
                .filter_level(args.verbosity)
                .build(),
        ))
        .with_max_level(if keep_audit {
            args.verbosity.max(LevelFilter::Debug)
        } else {
            args.verbosity
        });

    // Keep an audit trail of every run that may change the host
    if keep_audit {
        match BackgroundLog::open(&config.log_path, LevelFilter::Debug) {
            Ok(audit) => multilogger = multilogger.with_logger(Box::new(audit)),
            Err(e) => eprintln!(
                "Failed to open audit log '{}': {e}",
                config.log_path.display()
            ),
        }
    }

    multilogger.init().context("Logger already registered")
}

fn main() -> ExitCode {
    // Parse args
    let args = Cli::parse();

    // The log path comes from the configuration, so load it first
    let config = load_config(&args);
    let logging = match &config {
        Ok(config) => setup_logging(&args, config),
        Err(_) => setup_logging(&args, &VolsetupConfig::default()),
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {e:?}");
        return ExitCode::from(1);
    }

    // Invoke volsetup
    match config.and_then(|config| run_volsetup(config, &args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Volsetup failed: {e:?}");
            ExitCode::from(2)
        }
    }
}
