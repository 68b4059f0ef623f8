use clfsctl_client::{Handler, Message, Outcome, PongHandler, COMMAND_PONG};

use crate::cmd::{parse_duration, PingArgs, Target};
use crate::exit::{client_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_lag, OutputFormat};

pub fn run(args: PingArgs, target: &Target, format: OutputFormat) -> CliResult<i32> {
    if args.count == 0 {
        return Err(CliError::new(USAGE, "--count must be at least 1"));
    }
    let timeout = parse_duration(&args.timeout)?;
    let interval = parse_duration(&args.interval)?;

    let mut client = target.connect(format)?;

    // Lag is printed from the pong handler, so pongs that answer an earlier
    // ping are reported too.
    let mut pong = PongHandler::new(client.clock());
    client
        .dispatcher_mut()
        .register(COMMAND_PONG, move |message: &Message| {
            let outcome = pong.handle(message);
            if let (Outcome::Lag(lag), Some(id)) = (&outcome, message.id()) {
                print_lag(id, *lag, format);
            }
            outcome
        });

    for round in 0..args.count {
        if round > 0 {
            std::thread::sleep(interval);
        }
        let id = client
            .ping()
            .map_err(|err| client_error("ping failed", err))?;
        match client.wait_for_with_timeout(id, timeout) {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(CliError::new(
                    FAILURE,
                    format!("daemon closed the connection before answering ping {id}"),
                ))
            }
            Err(err) => return Err(client_error(&format!("waiting for pong {id}"), err)),
        }
    }

    Ok(SUCCESS)
}
