mod events;
mod simulate;

use clap::{Parser, Subcommand};
use std::time::Instant;
use tome_protocol::{Secret, SessionConfig, Version};

#[derive(Parser)]
#[command(name = "tome", about = "Tome star overlay tools")]
struct Cli {
    /// Max message size in bytes.
    #[arg(long, default_value = "1048576")]
    max_message_size: usize,

    /// Application id (overrides TOME_APP_ID and the version default).
    #[arg(long)]
    app_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a fresh random secret.
    Secret,

    /// Print the filtered room id and password of a secret.
    Split {
        /// Secret in `ID?PW` form.
        secret: String,
    },

    /// Run a hub and N spokes in-process and ping across the star.
    Simulate {
        /// Number of spokes.
        #[arg(long, default_value = "3")]
        spokes: usize,
        /// Room secret. Random when omitted.
        #[arg(long)]
        secret: Option<String>,
        /// Pings from the first spoke to each other spoke.
        #[arg(long, default_value = "5")]
        pings: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let start = Instant::now();

    match cli.command {
        Command::Secret => {
            println!("{}", Secret::random());
        }

        Command::Split { secret } => {
            let (id, pw) = Secret::from(secret).rend(true);
            println!("id: {id}");
            println!("pw: {pw}");
        }

        Command::Simulate {
            spokes,
            secret,
            pings,
        } => {
            let mut session = SessionConfig::new().max_message_size(cli.max_message_size);
            if let Some(app_id) = cli.app_id {
                session = session.app_id(app_id);
            }

            eprintln!("{}", Version::current());
            eprintln!("app id: {}", session.app_id);
            eprintln!();

            simulate::run(
                simulate::SimulateConfig {
                    spokes,
                    secret,
                    pings,
                    session,
                },
                start,
            )
            .await?;

            eprintln!();
            eprintln!("Done in {:.2}s", start.elapsed().as_secs_f64());
        }
    }

    Ok(())
}
