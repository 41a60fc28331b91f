//! Purpose: Execute parsed CLI subcommands.
//! Exports: `dispatch_command`.
//! Role: Routes each `Command` to its handler; owns the tokio runtime for `serve`.
//! Invariants: Errors are returned to `main`, which maps them to exit codes.
use super::*;

pub(super) fn dispatch_command(command: Command, color_mode: ColorMode) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            emit_completion(shell);
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output(color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Serve { subcommand, run } => {
            let config = serve_config_from_run_args(run)?;
            match subcommand {
                Some(ServeSubcommand::Check { json }) => {
                    emit_serve_check_report(&config, color_mode, json);
                    Ok(RunOutcome::ok())
                }
                None => {
                    let runtime = tokio::runtime::Builder::new_multi_thread()
                        .enable_all()
                        .build()
                        .map_err(|err| {
                            Error::new(ErrorKind::Internal)
                                .with_message("failed to start runtime")
                                .with_source(err)
                        })?;
                    runtime.block_on(serve::serve(config))?;
                    Ok(RunOutcome::ok())
                }
            }
        }
    }
}
