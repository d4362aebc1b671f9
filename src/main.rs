use anyhow::Result;
use clap::{Parser, Subcommand};
use termhub::{Config, Session, SessionEvent};
use tokio::io::{AsyncBufReadExt, BufReader};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// CLI
#[derive(Parser)]
#[command(name = "termhub")]
#[command(version = VERSION)]
#[command(about = "Shared terminal session daemon with inferred command boundaries")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a local observer loop: stdin lines become tracked commands,
    /// broadcast output chunks go to stdout
    Start,
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => run_session().await?,
        Commands::Config => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run_session() -> Result<()> {
    let config = Config::load()?;
    let session = Session::new(config);
    let mut observer = session.attach()?;

    log::info!("Session started as observer {}", observer.session_id());
    println!("{}", serde_json::to_string(&observer.greeting())?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = observer.recv() => match event {
                Ok(SessionEvent::Output(chunk)) => {
                    use std::io::Write;
                    print!("{chunk}");
                    let _ = std::io::stdout().flush();
                }
                Ok(SessionEvent::CommandCompleted { command, output_length, .. }) => {
                    log::info!("Completed {command:?} ({output_length} bytes)");
                }
                Ok(SessionEvent::ProcessExited { exit_code }) => {
                    log::info!("Shell exited with code {exit_code:?}");
                    break;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("Observer lagged, {missed} events dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            line = lines.next_line() => match line? {
                Some(line) if !line.trim().is_empty() => {
                    session.execute_command(line.trim())?;
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    session.destroy();
    Ok(())
}
