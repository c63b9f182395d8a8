use anyhow::{Context, Result};
use boxsession::shared::logging;
use boxsession::{Command, DaemonConfig, SaveOptions, Session, SessionError, SessionOptions};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "boxsession")]
#[command(about = "Run commands in a throwaway container session", long_about = None)]
struct Cli {
    /// Container daemon address (unix://, tcp:// or a socket path)
    #[arg(long, global = true, env = "DOCKER_HOST")]
    host: Option<String>,

    /// Also write logs to this directory
    #[arg(long, global = true, env = "BOXSESSION_LOG_DIR")]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SessionArgs {
    /// Image to start the session container from
    #[arg(short, long)]
    image: String,

    /// Container name (daemon-assigned when omitted)
    #[arg(long)]
    name: Option<String>,

    /// Commit the container after the commands succeed and print the image id
    #[arg(long)]
    save: bool,

    /// Repository for the committed image
    #[arg(long, requires = "save")]
    repo: Option<String>,

    /// Tag for the committed image
    #[arg(long, requires = "save")]
    tag: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one command in a new session
    Run {
        #[command(flatten)]
        session: SessionArgs,

        /// Attach this process's stdin to the command
        #[arg(short = 'I', long)]
        interactive: bool,

        /// Command and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run each line of a script file with /bin/sh -c in one session
    ExecScript {
        #[command(flatten)]
        session: SessionArgs,

        /// Script file, one command per line
        file: PathBuf,
    },
}

impl SessionArgs {
    fn options(&self) -> SessionOptions {
        let options = SessionOptions::new(&self.image);
        match &self.name {
            Some(name) => options.name(name),
            None => options,
        }
    }

    fn save_options(&self) -> SaveOptions {
        SaveOptions {
            repo: self.repo.clone(),
            tag: self.tag.clone(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let logging_guard = logging::init_logging(cli.log_dir.as_deref(), "boxsession")?;

    let config = DaemonConfig::from_host_var(cli.host.clone());

    let exit_code = match cli.command {
        Commands::Run {
            session,
            interactive,
            command,
        } => run_command(&config, &session, interactive, command).await?,
        Commands::ExecScript { session, file } => exec_script(&config, &session, &file).await?,
    };

    drop(logging_guard);
    std::process::exit(exit_code);
}

/// Maps a command failure to the process exit code, passing other errors up.
fn exit_code_of(result: boxsession::Result<()>) -> Result<i32> {
    match result {
        Ok(()) => Ok(0),
        Err(SessionError::ExitStatus { code }) => Ok(i32::try_from(code).unwrap_or(1)),
        Err(e) => Err(e.into()),
    }
}

async fn open_session(config: &DaemonConfig, args: &SessionArgs) -> Result<Session> {
    Session::connect(config, args.options())
        .await
        .with_context(|| format!("Failed to start session from {}", args.image))
}

/// Saves on success if asked, then always closes the session.
async fn finish_session(
    mut session: Session,
    args: &SessionArgs,
    mut outcome: Result<i32>,
) -> Result<i32> {
    if args.save && matches!(outcome, Ok(0)) {
        match session.save_with(&args.save_options()).await {
            Ok(image) => println!("{image}"),
            Err(e) => outcome = Err(anyhow::Error::new(e).context("Failed to save session")),
        }
    }

    session.close().await.context("Failed to close session")?;
    outcome
}

async fn run_command(
    config: &DaemonConfig,
    args: &SessionArgs,
    interactive: bool,
    argv: Vec<String>,
) -> Result<i32> {
    let session = open_session(config, args).await?;

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();

    let mut command = Command::new(&argv[0])
        .args(&argv[1..])
        .stdout(&mut stdout)
        .stderr(&mut stderr);
    if interactive {
        command = command.stdin(&mut stdin);
    }

    let outcome = exit_code_of(session.run(command).await);
    finish_session(session, args, outcome).await
}

async fn exec_script(config: &DaemonConfig, args: &SessionArgs, file: &Path) -> Result<i32> {
    let script = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let session = open_session(config, args).await?;
    let outcome = run_script(&session, &script).await;
    finish_session(session, args, outcome).await
}

/// Stops at the first line that fails.
async fn run_script(session: &Session, script: &str) -> Result<i32> {
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();

    for line in script.lines().map(str::trim).filter(|l| !l.is_empty()) {
        tracing::info!("$ {}", line);
        let command = Command::new("/bin/sh")
            .args(["-c", line])
            .stdout(&mut stdout)
            .stderr(&mut stderr);

        let code = exit_code_of(session.run(command).await)?;
        if code != 0 {
            tracing::warn!("Command exited with {}: {}", code, line);
            return Ok(code);
        }
    }
    Ok(0)
}
