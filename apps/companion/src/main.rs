use std::{
    future::Future,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    is_supported_upload,
    prompts::{suggested_prompt, SUGGESTED_PROMPTS},
    AiGateway, AudioClip, FileUpload, HttpGateway, Resolution, SequentialIds, Session,
    SignupPolicy, ThreadController, ThreadError, ThreadEvent,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::broadcast::error::RecvError,
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod render;

use commands::{parse_command, ChatCommand, HELP};
use render::ThreadView;

const DEFAULT_AUDIO_MIME: &str = "audio/webm";

#[derive(Parser, Debug)]
#[command(about = "ALU Student Companion chat client")]
struct Args {
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(long)]
    gateway_url: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long)]
    log_filter: Option<String>,
    /// Sign up non-interactively; requires --email as well.
    #[arg(long, requires = "email")]
    name: Option<String>,
    #[arg(long, requires = "name")]
    email: Option<String>,
}

type InputLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (mut settings, mut warnings) = config::load_settings(&args.config);
    settings.apply_overrides(
        config::Overrides {
            gateway_url: args.gateway_url,
            request_timeout_secs: args.timeout_secs,
            log_filter: args.log_filter,
        },
        &mut warnings,
    );

    let filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    for warning in warnings {
        warn!("config: {warning}");
    }

    let gateway: Arc<dyn AiGateway> = Arc::new(
        HttpGateway::new(&settings.gateway_url)
            .with_context(|| format!("cannot use gateway url '{}'", settings.gateway_url))?,
    );
    info!(gateway_url = %settings.gateway_url, "companion: starting");
    spawn_health_probe(Arc::clone(&gateway), settings.request_timeout());

    let thread = Arc::new(ThreadController::new_with_dependencies(
        gateway,
        Arc::new(SequentialIds::default()),
        settings.thread_options(),
    ));
    let policy = settings.signup_policy();
    let mut session = Session::default();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    println!("Welcome to ALU Student Companion");
    if let (Some(name), Some(email)) = (args.name.as_deref(), args.email.as_deref()) {
        match session.sign_up(name, email, &policy) {
            Ok(identity) => println!("Welcome, {}!", identity.display_name),
            Err(err) => println!("! {err}"),
        }
    }
    if session.current_identity().is_none() && !sign_up(&mut input, &mut session, &policy).await? {
        return Ok(());
    }

    let printer = spawn_event_printer(Arc::clone(&thread));
    println!("Type /help for commands.");

    while let Some(line) = input.next_line().await? {
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                println!("! {err}");
                continue;
            }
        };
        let identity = session.current_identity().cloned();

        match command {
            ChatCommand::Empty => {}
            ChatCommand::Send(text) => spawn_operation(&thread, move |thread| async move {
                thread.submit_text(&text, identity.as_ref()).await
            }),
            ChatCommand::Edit { id, text } => spawn_operation(&thread, move |thread| async move {
                thread.edit_and_regenerate(id, &text, identity.as_ref()).await
            }),
            ChatCommand::File(path) => match load_upload(&path).await {
                Ok(Some(file)) => spawn_operation(&thread, move |thread| async move {
                    thread.submit_file(&file, identity.as_ref()).await
                }),
                Ok(None) => println!("! Invalid file type: Please upload an image or PDF file"),
                Err(err) => println!("! {err:#}"),
            },
            ChatCommand::Audio(path) => match load_audio(&path).await {
                Ok(audio) => spawn_operation(&thread, move |thread| async move {
                    thread.submit_audio(&audio, identity.as_ref()).await
                }),
                Err(err) => println!("! {err:#}"),
            },
            ChatCommand::Prompts => {
                println!("Suggested prompts:");
                for (index, prompt) in SUGGESTED_PROMPTS.iter().enumerate() {
                    println!("  {}. {} - {}", index + 1, prompt.title, prompt.description);
                }
            }
            ChatCommand::Prompt(position) => match suggested_prompt(position) {
                Some(prompt) => {
                    let text = prompt.compose();
                    spawn_operation(&thread, move |thread| async move {
                        thread.submit_text(&text, identity.as_ref()).await
                    });
                }
                None => println!("! no suggested prompt #{position}, see /prompts"),
            },
            ChatCommand::Clear => {
                thread.reset();
                println!("Chat cleared successfully");
            }
            ChatCommand::SignUp => {
                if !sign_up(&mut input, &mut session, &policy).await? {
                    break;
                }
            }
            ChatCommand::SignOut => {
                session.sign_out();
                println!("Signed out. Use /signup to continue chatting.");
            }
            ChatCommand::WhoAmI => match identity {
                Some(identity) => {
                    println!("{} <{}>", identity.display_name, identity.email_address)
                }
                None => println!("Not signed in."),
            },
            ChatCommand::Help => println!("{HELP}"),
            ChatCommand::Quit => break,
        }
    }

    printer.abort();
    Ok(())
}

/// Runs a thread operation in the background so the prompt stays usable.
/// Failures reach the user as notices through the event printer.
fn spawn_operation<F, Fut>(thread: &Arc<ThreadController>, operation: F)
where
    F: FnOnce(Arc<ThreadController>) -> Fut,
    Fut: Future<Output = Result<Resolution, ThreadError>> + Send + 'static,
{
    let pending = operation(Arc::clone(thread));
    tokio::spawn(async move {
        match pending.await {
            Ok(resolution) => debug!(?resolution, "companion: operation settled"),
            Err(err) => debug!(error = %err, "companion: operation failed"),
        }
    });
}

fn spawn_event_printer(thread: Arc<ThreadController>) -> JoinHandle<()> {
    let mut events = thread.subscribe_events();
    let mut view = ThreadView::default();
    print_lines(view.update(&thread.snapshot()));

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ThreadEvent::Updated(snapshot)) => print_lines(view.update(&snapshot)),
                Ok(ThreadEvent::Notice(notice)) => eprintln!("! {}", notice.text),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "companion: event printer fell behind, redrawing");
                    print_lines(view.update(&thread.snapshot()));
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

fn spawn_health_probe(gateway: Arc<dyn AiGateway>, limit: Duration) {
    tokio::spawn(async move {
        let healthy = tokio::time::timeout(limit, gateway.health())
            .await
            .unwrap_or(false);
        if healthy {
            info!("companion: AI service is healthy");
        } else {
            eprintln!("! Unable to connect to AI service. Some features may be limited.");
        }
    });
}

async fn sign_up(input: &mut InputLines, session: &mut Session, policy: &SignupPolicy) -> Result<bool> {
    loop {
        let Some(name) = prompt(input, "Full name: ").await? else {
            return Ok(false);
        };
        let label = format!("Email (@{}): ", policy.required_email_domain);
        let Some(email) = prompt(input, &label).await? else {
            return Ok(false);
        };
        match session.sign_up(&name, &email, policy) {
            Ok(identity) => {
                println!("Welcome, {}!", identity.display_name);
                return Ok(true);
            }
            Err(err) => println!("! {err}"),
        }
    }
}

async fn prompt(input: &mut InputLines, label: &str) -> Result<Option<String>> {
    print!("{label}");
    std::io::stdout().flush().context("failed to flush stdout")?;
    Ok(input.next_line().await?)
}

/// Reads a file for analysis. `Ok(None)` means the type is not accepted.
async fn load_upload(path: &Path) -> Result<Option<FileUpload>> {
    let Some(mime_type) = mime_guess::from_path(path)
        .first_raw()
        .filter(|mime| is_supported_upload(mime))
    else {
        return Ok(None);
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Some(FileUpload {
        filename: file_name(path),
        mime_type: Some(mime_type.to_string()),
        bytes,
    }))
}

async fn load_audio(path: &Path) -> Result<AudioClip> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mime_type = mime_guess::from_path(path)
        .first_raw()
        .filter(|mime| mime.starts_with("audio/"))
        .unwrap_or(DEFAULT_AUDIO_MIME);
    Ok(AudioClip {
        mime_type: mime_type.to_string(),
        bytes,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
