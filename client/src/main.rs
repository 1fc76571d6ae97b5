use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;

use tandem_client::{ChatState, ClientConfig, CredentialStore, SessionSupervisor};
use tandem_shared::{Identity, Message};

const TICK: Duration = Duration::from_millis(100);

const HELP: &str = "Commands: /to <user>, /who, /history, /help, /quit. Anything else is sent to the selected user.";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tandem_client=info".parse()?),
        )
        .init();

    let config = ClientConfig::from_env()?;
    let credentials = match &config.users {
        Some(raw) => CredentialStore::parse(raw)?,
        None => CredentialStore::default(),
    };

    let mut args = std::env::args().skip(1);
    let (username, password) = match (args.next(), args.next()) {
        (Some(username), Some(password)) => (username, password),
        _ => bail!("usage: tandem-client <username> <password>"),
    };
    let identity = credentials
        .verify(&username, &password)
        .context("Login failed")?;
    info!("Logged in as {}", identity);

    let mut supervisor = SessionSupervisor::new(config, identity.clone());
    let mut chat = ChatState::new(identity.clone(), supervisor.outgoing().clone());
    let lines = spawn_stdin_reader();

    println!("Logged in as {}. Contacts: {}", identity, join(&credentials.contacts_for(&identity)));
    println!("{}", HELP);

    loop {
        let was_connected = supervisor.is_connected();
        if supervisor.ensure_running().is_some() && !was_connected {
            println!("* connected");
        } else if was_connected && !supervisor.is_connected() {
            println!("* connection lost, retrying");
        }

        for event in supervisor.drain_incoming() {
            if let Some(update) = chat.apply(event) {
                if let Some(partner) = update.key().partner_of(&identity) {
                    if chat.selected_partner() == Some(partner) {
                        chat.changed_messages(&update).iter().for_each(print_message);
                    } else {
                        println!("* new activity with {}", partner);
                    }
                }
            }
        }

        let line = match lines.recv_timeout(TICK) {
            Ok(line) => line,
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        };
        let line = line.trim();

        match line.split_once(' ').map_or((line, ""), |(cmd, rest)| (cmd, rest.trim())) {
            ("", _) => {}
            ("/quit", _) => break,
            ("/help", _) => println!("{}", HELP),
            ("/who", _) => println!("Contacts: {}", join(&credentials.contacts_for(&identity))),
            ("/to", name) => match Identity::new(name) {
                Ok(partner) if credentials.contains(&partner) => match chat.select_partner(partner) {
                    Ok(()) => println!("* talking to {}", name.to_lowercase()),
                    Err(e) => println!("! {}", e),
                },
                _ => println!("! unknown user {:?}", name),
            },
            ("/history", _) => match chat.selected_partner().cloned() {
                Some(partner) => chat.conversation_with(&partner).iter().for_each(print_message),
                None => println!("! no conversation selected"),
            },
            _ => {
                if let Err(e) = chat.compose(line) {
                    println!("! {}", e);
                }
            }
        }
        let _ = io::stdout().flush();
    }

    supervisor.shutdown();
    info!("Logged out");
    Ok(())
}

fn spawn_stdin_reader() -> flume::Receiver<String> {
    let (tx, rx) = flume::unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_message(message: &Message) {
    println!("[{:.0}] {}: {}", message.sent_at, message.sender, message.body);
}

fn join(identities: &[Identity]) -> String {
    identities.iter().map(Identity::as_str).collect::<Vec<_>>().join(", ")
}
