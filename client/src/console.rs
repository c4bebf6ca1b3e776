use clap::Parser;
#[cfg(test)]
use clap::CommandFactory;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc::UnboundedSender,
};
use trip_diary_lib::{coordinate::Coordinate, trip::TransportMode};

use crate::{controller::TripEvent, dispatcher::AppMessage};

/// One line typed at the prompt.
#[derive(Parser, Debug, PartialEq)]
#[command(multicall = true)]
pub enum ConsoleCommand {
    /// Allow the app to use your location
    Consent,
    /// Withdraw location consent
    Revoke,
    /// Start recording a trip from where you are
    Start,
    /// Stop recording and choose where the trip ended
    End,
    /// Move the destination to another point
    Pick {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
    },
    /// Accept the destination once its address is shown
    Confirm,
    /// Save the trip, e.g. `save bus 2`
    Save {
        mode: TransportMode,
        /// People who travelled with you
        #[arg(default_value_t = 0)]
        companions: u32,
    },
    /// Go back to recording
    Cancel,
    /// Show the current trip state and any warning
    Status,
    /// List saved trips, newest first
    History,
    /// Leave the diary
    #[command(alias = "exit")]
    Quit,
}

impl ConsoleCommand {
    pub fn parse_line(line: &str) -> Result<Self, clap::Error> {
        Self::try_parse_from(line.split_whitespace())
    }

    pub fn into_message(self) -> AppMessage {
        match self {
            ConsoleCommand::Consent => TripEvent::GrantConsent.into(),
            ConsoleCommand::Revoke => TripEvent::RevokeConsent.into(),
            ConsoleCommand::Start => TripEvent::StartTrip.into(),
            ConsoleCommand::End => TripEvent::EndTripRequested.into(),
            ConsoleCommand::Pick { lat, lon } => TripEvent::UserPick(Coordinate::new(lat, lon)).into(),
            ConsoleCommand::Confirm => TripEvent::ConfirmDestination.into(),
            ConsoleCommand::Save { mode, companions } => TripEvent::SubmitDetails { mode, companions }.into(),
            ConsoleCommand::Cancel => TripEvent::Cancel.into(),
            ConsoleCommand::Status => AppMessage::ShowStatus,
            ConsoleCommand::History => AppMessage::ShowHistory,
            ConsoleCommand::Quit => AppMessage::Shutdown,
        }
    }
}

/// Forwards typed commands to the dispatcher until `quit` or end of input.
pub async fn read_commands(input: impl AsyncBufRead + Unpin, tx: UnboundedSender<AppMessage>) -> std::io::Result<()> {
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match ConsoleCommand::parse_line(&line) {
            Ok(command) => command,
            Err(err) => {
                println!("{}", err.render());
                continue;
            }
        };

        let quit = command == ConsoleCommand::Quit;
        if tx.send(command.into_message()).is_err() || quit {
            return Ok(());
        }
    }

    tracing::debug!("Console input closed");
    let _ = tx.send(AppMessage::Shutdown);
    Ok(())
}

#[test]
fn parses_commands() {
    assert_eq!(ConsoleCommand::parse_line("start").unwrap(), ConsoleCommand::Start);
    assert_eq!(
        ConsoleCommand::parse_line("pick -33.86 151.2").unwrap(),
        ConsoleCommand::Pick { lat: -33.86, lon: 151.2 }
    );
    assert_eq!(
        ConsoleCommand::parse_line("save auto-rickshaw 2").unwrap(),
        ConsoleCommand::Save {
            mode: TransportMode::Auto,
            companions: 2
        }
    );
    assert_eq!(
        ConsoleCommand::parse_line("save walk").unwrap().into_message(),
        AppMessage::Trip(TripEvent::SubmitDetails {
            mode: TransportMode::Walk,
            companions: 0
        })
    );
    assert_eq!(ConsoleCommand::parse_line("exit").unwrap(), ConsoleCommand::Quit);

    assert!(ConsoleCommand::parse_line("save hovercraft").is_err());
    assert!(ConsoleCommand::parse_line("pick 1").is_err());
    assert!(ConsoleCommand::parse_line("fly").is_err());
}

#[test]
fn help_describes_every_command() {
    let mut command = ConsoleCommand::command();
    let help = command.render_help().to_string();

    assert!(help.contains("Show the current trip state and any warning"));
    assert!(help.contains("List saved trips, newest first"));
    for sub in command.get_subcommands().filter(|sub| sub.get_name() != "help") {
        assert!(sub.get_about().is_some(), "`{}` has no description", sub.get_name());
    }
}

#[tokio::test]
async fn forwards_lines_until_quit() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let input: &[u8] = b"consent\n\nnonsense\nstart\nquit\nstatus\n";

    read_commands(input, tx).await.unwrap();

    assert_eq!(rx.recv().await, Some(AppMessage::Trip(TripEvent::GrantConsent)));
    assert_eq!(rx.recv().await, Some(AppMessage::Trip(TripEvent::StartTrip)));
    assert_eq!(rx.recv().await, Some(AppMessage::Shutdown));
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn end_of_input_shuts_down() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let input: &[u8] = b"history";

    read_commands(input, tx).await.unwrap();

    assert_eq!(rx.recv().await, Some(AppMessage::ShowHistory));
    assert_eq!(rx.recv().await, Some(AppMessage::Shutdown));
}
