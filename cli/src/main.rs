//! Classroom relay console.
//!
//! Drives the client stores against a live relay for manual smoke tests and
//! demos: tail the event stream, run a student session, or hold the teacher
//! seat — all from a terminal.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use client::{EventBus, LocalHub, SessionStore, Storage, TeacherStore, WsTransport};
use events::{ActivityKey, Event, Role};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not logged in; run `student login` first")]
    NotLoggedIn,
    #[error(transparent)]
    TeacherLogin(#[from] client::TeacherLoginError),
}

#[derive(Parser, Debug)]
#[command(name = "classrelay", about = "Classroom relay console")]
struct Cli {
    /// Relay websocket endpoint.
    #[arg(long, env = "RELAY_URL", default_value = "ws://127.0.0.1:3001/ws")]
    url: String,

    /// Directory for session/lock storage.
    #[arg(long, env = "RELAY_DATA_DIR", default_value = ".classrelay")]
    data_dir: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tail every event on the bus as JSON lines.
    Watch,
    Student(StudentCommand),
    Teacher(TeacherCommand),
}

#[derive(Args, Debug)]
struct StudentCommand {
    #[command(subcommand)]
    command: StudentSubcommand,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    Recorder,
    Operator,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Recorder => Role::Recorder,
            RoleArg::Operator => Role::Operator,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ActivityArg {
    A1,
    A2,
    A3,
}

impl From<ActivityArg> for ActivityKey {
    fn from(activity: ActivityArg) -> Self {
        match activity {
            ActivityArg::A1 => ActivityKey::A1,
            ActivityArg::A2 => ActivityKey::A2,
            ActivityArg::A3 => ActivityKey::A3,
        }
    }
}

#[derive(Subcommand, Debug)]
enum StudentSubcommand {
    /// Claim a group and persist the session.
    Login {
        group: u32,
        #[arg(long, value_enum, default_value_t = RoleArg::Recorder)]
        role: RoleArg,
    },
    /// Release the group and drop its records.
    Logout,
    /// Record a star score for the active group and announce it.
    Stars {
        #[arg(value_enum)]
        activity: ActivityArg,
        stars: u32,
    },
}

#[derive(Args, Debug)]
struct TeacherCommand {
    #[command(subcommand)]
    command: TeacherSubcommand,
}

#[derive(Subcommand, Debug)]
enum TeacherSubcommand {
    /// Acquire the teacher seat.
    Login {
        #[arg(long)]
        password: String,
    },
    /// Release the seat and clear retained broadcasts.
    Logout,
    /// Probe liveness; every client re-announces itself.
    Ping,
    /// Wipe the relay's retained broadcasts.
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let storage = Storage::open(&cli.data_dir)?;
    let bus = EventBus::new(LocalHub::new(), Arc::new(WsTransport::new(&cli.url)));

    match cli.command {
        Command::Watch => watch(&bus).await?,
        Command::Student(student) => run_student(student, storage, bus).await?,
        Command::Teacher(teacher) => run_teacher(teacher, storage, bus).await?,
    }

    Ok(())
}

async fn watch(bus: &EventBus) -> Result<(), CliError> {
    let _subscription = bus.subscribe(|event| {
        if let Ok(line) = events::encode(event) {
            println!("{line}");
        }
    });
    eprintln!("watching; ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    Ok(())
}

async fn run_student(student: StudentCommand, storage: Storage, bus: EventBus) -> Result<(), CliError> {
    let store = SessionStore::open(storage, bus).await;

    match student.command {
        StudentSubcommand::Login { group, role } => {
            let acquisition = store.login(group, role.into()).await;
            if let Some(previous) = acquisition.previous_owner {
                eprintln!("warning: displaced an existing claim on group {group} (locker {previous})");
            }
            println!("logged in to group {group}");
        }
        StudentSubcommand::Logout => {
            if !store.is_logged_in() {
                return Err(CliError::NotLoggedIn);
            }
            store.logout().await;
            println!("logged out");
        }
        StudentSubcommand::Stars { activity, stars } => {
            if !store.is_logged_in() {
                return Err(CliError::NotLoggedIn);
            }
            let activity: ActivityKey = activity.into();
            store.record_stars(activity, stars, None).await;
            println!("recorded {stars} stars for {activity}");
        }
    }

    flush().await;
    Ok(())
}

async fn run_teacher(teacher: TeacherCommand, storage: Storage, bus: EventBus) -> Result<(), CliError> {
    match teacher.command {
        TeacherSubcommand::Login { password } => {
            let store = TeacherStore::open(storage, bus);
            store.login(&password)?;
            println!("teacher seat acquired");
        }
        TeacherSubcommand::Logout => {
            let store = TeacherStore::open(storage, bus.clone());
            store.logout().await;
            println!("teacher seat released");
        }
        TeacherSubcommand::Ping => {
            bus.emit(Event::TeacherPing).await;
            println!("ping sent");
        }
        TeacherSubcommand::Clear => {
            bus.emit(Event::ClearBroadcasts).await;
            println!("clear requested");
        }
    }

    flush().await;
    Ok(())
}

/// Give the websocket pumps a moment to drain before the process exits.
async fn flush() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}
