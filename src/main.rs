use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::CommandFactory;
use tracing::error;

use rslayer::cli::{self, Commands};
use rslayer::executor::RealCommandExecutor;

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = rslayer::init_logging(args.command.log_level()) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    let result = match &args.command {
        Commands::Apply(opts) => {
            let executor = Arc::new(RealCommandExecutor {
                dry_run: opts.dry_run,
            });
            rslayer::run_apply(opts, executor).map(|_| ())
        }
        Commands::Validate(opts) => rslayer::run_validate(opts),
        Commands::Completions(opts) => {
            let mut cmd = cli::Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(opts.shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let class = rslayer::error_class(&e);
            error!(class = %class, "{:#}", e);
            ExitCode::from(class.exit_code())
        }
    }
}
