use clfsctl_client::{FsckReplyHandler, FsckStatus, Handler, Message, COMMAND_FSCK_REPLY};

use crate::cmd::{parse_duration, FsckArgs, Target};
use crate::exit::{client_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_fsck, print_fsck_started, OutputFormat};

pub fn run(args: FsckArgs, target: &Target, format: OutputFormat) -> CliResult<i32> {
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;

    let mut client = target.connect(format)?;
    client
        .dispatcher_mut()
        .register(COMMAND_FSCK_REPLY, move |message: &Message| {
            let outcome = FsckReplyHandler.handle(message);
            if let Message::FsckReply(reply) = message {
                print_fsck(reply, format);
            }
            outcome
        });

    let id = client
        .fsck()
        .map_err(|err| client_error("fsck request failed", err))?;
    print_fsck_started(id, format);

    if !args.follow {
        return Ok(SUCCESS);
    }

    match client.follow_fsck(id, timeout) {
        Ok(Some(report)) if report.status == FsckStatus::Panic => Ok(FAILURE),
        Ok(Some(_)) => Ok(SUCCESS),
        Ok(None) => Err(CliError::new(
            FAILURE,
            format!("daemon closed the connection before fsck {id} finished"),
        )),
        Err(err) => Err(client_error(&format!("following fsck {id}"), err)),
    }
}
