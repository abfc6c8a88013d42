use harpwire_session::{CancellationToken, ReplayRegistry, SessionConfig, SessionEvent};
use tracing::debug;

use crate::cmd::printer::FramePrinter;
use crate::cmd::{install_ctrlc_handler, ReplayArgs};
use crate::exit::{io_error, session_error, CliResult};
use crate::output::OutputFormat;

pub fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", &err))?;

    let cancel = CancellationToken::new();
    install_ctrlc_handler(cancel.clone())?;
    runtime.block_on(replay(args, format, cancel))
}

async fn replay(args: ReplayArgs, format: OutputFormat, cancel: CancellationToken) -> CliResult<i32> {
    let registry = ReplayRegistry::new(SessionConfig {
        ignore_errors: args.ignore_errors,
        pace: !args.no_pace,
        ..SessionConfig::default()
    });
    let mut printer = FramePrinter::new(format, args.address, args.count, cancel.clone());
    let mut subscription = registry.attach(&args.file);

    let outcome = loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break Ok(()),
            event = subscription.recv() => event,
        };
        match event {
            Some(SessionEvent::Fault(error)) => break Err(session_error("replay failed", &error)),
            Some(event) => event.forward_to(&mut printer),
            None => break Ok(()),
        }
    };

    debug!(printed = printer.printed(), "replay stopped");
    drop(subscription);
    registry.shutdown().await;

    outcome?;
    printer.finish()
}
