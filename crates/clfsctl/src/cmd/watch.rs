use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clfsctl_client::{ClientError, Message};

use crate::cmd::{Target, WatchArgs};
use crate::exit::{client_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_message, OutputFormat};

/// How often the interrupt flag is checked while the daemon is quiet.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: WatchArgs, target: &Target, format: OutputFormat) -> CliResult<i32> {
    if args.count == Some(0) {
        return Err(CliError::new(USAGE, "--count must be at least 1"));
    }
    let mut client = target.connect(format)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    // Everything is printed below; handlers only log.
    client.dispatcher_mut().set_fallback(|_: &Message| {});

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let result = client.run_until(Some(POLL_INTERVAL), |message| {
            print_message(message, format);
            printed = printed.saturating_add(1);
            args.count.is_some_and(|count| printed >= count)
        });

        match result {
            Ok(_) => return Ok(SUCCESS),
            Err(ClientError::Timeout(_)) => continue,
            Err(err) => return Err(client_error("receive failed", err)),
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
