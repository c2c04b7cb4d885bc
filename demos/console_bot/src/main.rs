//! Console Bot Example
//!
//! Every line typed on stdin is treated as a chat message from the user given
//! with `--user`. Replies go to stdout.
//!
//! ```text
//! !ping            → pong
//! !echo hello      → hello
//! !roll 20         → rolls a d20 on the command executor
//! !help            → lists commands
//! !shutdown        → stops the bot (admin only)
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package console-bot -- --user admin
//! ```

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use herald::prelude::*;
use herald::runtime::CancellationToken;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(version, about = "Chat with a Herald bot on the console")]
struct Args {
    /// Configuration file (TOML or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Name the messages are sent as
    #[arg(short, long, default_value = "guest")]
    user: String,

    /// Name allowed to run admin commands
    #[arg(long, default_value = "admin")]
    admin: String,
}

/// A line typed on the console.
#[derive(Debug)]
struct ConsoleMessage {
    author: String,
    line: usize,
}

impl ConsoleMessage {
    fn reply(&self, text: impl AsRef<str>) {
        println!("[#{} → {}] {}", self.line, self.author, text.as_ref());
    }
}

// ============================================================================
// Commands
// ============================================================================

fn ping() -> BoxedCommand<ConsoleMessage> {
    command(["ping"])
        .description("Checks that the bot is alive")
        .handler(|ctx: InvocationContext<ConsoleMessage>| async move {
            ctx.message().reply("pong");
            Ok(())
        })
}

fn echo() -> BoxedCommand<ConsoleMessage> {
    command(["echo", "say"])
        .description("Repeats the parameters back")
        .usage("echo <text>")
        .handler(|ctx: InvocationContext<ConsoleMessage>| async move {
            match ctx.parameter_string() {
                Some(text) if !text.is_empty() => ctx.message().reply(text),
                _ => ctx.message().reply("usage: echo <text>"),
            }
            Ok(())
        })
}

fn roll() -> BoxedCommand<ConsoleMessage> {
    command(["roll", "dice"])
        .description("Rolls a die with the given number of sides")
        .usage("roll [sides]")
        .asynchronous(true)
        .handler(roll_die)
}

async fn roll_die(ctx: InvocationContext<ConsoleMessage>) -> CommandResult {
    let sides: u64 = match ctx.parameter_string().map(str::trim) {
        None | Some("") => 6,
        Some(raw) => raw.parse()?,
    };
    if sides == 0 {
        return Err("a die needs at least one side".into());
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    let value = RandomState::new().hash_one(ctx.text()) % sides + 1;
    ctx.message().reply(format!("rolled {value} (d{sides})"));
    Ok(())
}

fn shutdown(token: CancellationToken) -> BoxedCommand<ConsoleMessage> {
    command(["shutdown", "quit"])
        .description("Stops the bot")
        .restricted_to("admin")
        .handler(move |ctx: InvocationContext<ConsoleMessage>| {
            let token = token.clone();
            async move {
                ctx.message().reply("shutting down");
                token.cancel();
                Ok(())
            }
        })
}

fn help(listing: String) -> BoxedCommand<ConsoleMessage> {
    command(["help", "commands"])
        .description("Lists the available commands")
        .handler(move |ctx: InvocationContext<ConsoleMessage>| {
            let listing = listing.clone();
            async move {
                ctx.message().reply(listing);
                Ok(())
            }
        })
}

fn listing(prefix: &str, commands: &[BoxedCommand<ConsoleMessage>]) -> String {
    let mut out = String::from("commands:");
    for command in commands {
        let usage = command.usage().unwrap_or_else(|| command.name());
        let description = command.description().unwrap_or("");
        out.push_str(&format!("\n  {prefix}{usage:<16} {description}"));
    }
    out
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = HeraldRuntime::<ConsoleMessage>::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    let runtime = builder.build()?;
    let prefix = runtime.config().dispatch.prefix.clone();

    // Restrictions
    let admin = args.admin.clone();
    runtime.register_restriction(
        "admin",
        SubjectRestriction::new(
            MatchCriterion::by_name(admin, false)?,
            |ctx: &InvocationContext<ConsoleMessage>| {
                vec![Subject::new(ctx.message().author.clone(), ctx.message().author.clone())]
            },
        ),
    );

    // Commands
    let mut commands = vec![ping(), echo(), roll(), shutdown(runtime.shutdown_token())];
    let help_text = listing(&prefix, &commands);
    commands.push(help(help_text));
    runtime.register_commands(commands);

    // Notifications
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<DispatchEvent<ConsoleMessage>>();
    runtime.register_sink(events_tx);
    let hint = format!("{prefix}help");
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let ctx = event.context();
            match &event {
                DispatchEvent::CommandNotFound(_) => ctx.message().reply(format!(
                    "unknown command {:?}, try {hint}",
                    ctx.alias().unwrap_or(ctx.text())
                )),
                DispatchEvent::CommandNotAllowed(_) => ctx.message().reply(format!(
                    "you are not allowed to use {}",
                    ctx.alias().unwrap_or("that command")
                )),
            }
        }
    });

    // Console reader. A plain thread, so a pending read never holds up
    // runtime shutdown.
    let (inbound_tx, inbound_rx) = mpsc::channel(32);
    let user = args.user.clone();
    std::thread::spawn(move || {
        for (index, line) in std::io::stdin().lines().enumerate() {
            let Ok(line) = line else { break };
            let message = ConsoleMessage {
                author: user.clone(),
                line: index + 1,
            };
            if inbound_tx.blocking_send(Inbound::new(message, line)).is_err() {
                break;
            }
        }
        debug!("Console closed");
    });

    info!(user = %args.user, admin = %args.admin, %prefix, "Console bot ready");
    runtime.run(inbound_rx).await?;
    Ok(())
}
