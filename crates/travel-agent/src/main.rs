//! The travel planner in the terminal.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::path::PathBuf;
use std::pin::pin;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;
use travel_agent::core::email::EmailDelivery;
use travel_agent::core::graph::Node;
use travel_agent::core::{AgentEvent, TranscriptSource, TurnOutcome};
use travel_agent::{
    ProviderKind, Session, SessionBuilder, SessionError, Settings, llm,
};
use travel_agent_model::ModelMessage;

enum SessionEvent {
    Transcript(TranscriptSource),
    Agent(AgentEvent),
}

const BAR_CHAR: &str = "▎";

/// Plan trips with an AI agent that searches flights and hotels.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Model backend, `gemini` or `ollama`. Overrides `LLM_PROVIDER`.
    #[arg(long)]
    provider: Option<ProviderKind>,
    /// Model name for the selected backend.
    #[arg(long)]
    model: Option<String>,
    /// Continue an existing thread.
    #[arg(long)]
    thread_id: Option<String>,
    /// Keep threads as files in this directory.
    #[arg(long)]
    state_dir: Option<PathBuf>,
    /// Print the Gemini models available to the API key and exit.
    #[arg(long)]
    list_models: bool,
    /// Print the agent graph as a Mermaid flowchart and exit.
    #[arg(long)]
    print_graph: bool,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(provider) = self.provider {
            settings.provider = provider;
        }
        if let Some(model) = &self.model {
            match settings.provider {
                ProviderKind::Gemini => settings.model = Some(model.clone()),
                ProviderKind::Ollama => {
                    settings.ollama_model = Some(model.clone())
                }
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    args.apply(&mut settings);
    debug!("settings: {settings:?}");

    if args.list_models {
        return list_models(&settings).await;
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let mut builder = SessionBuilder::with_settings(settings)
        .on_transcript({
            let event_tx = event_tx.clone();
            move |source, _| {
                event_tx.send(SessionEvent::Transcript(source)).ok();
            }
        })
        .on_event({
            let event_tx = event_tx.clone();
            move |event| {
                event_tx.send(SessionEvent::Agent(event)).ok();
            }
        });
    if let Some(state_dir) = &args.state_dir {
        builder = builder.with_state_dir(state_dir);
    }
    if let Some(thread_id) = &args.thread_id {
        builder = builder.with_thread_id(thread_id);
    }
    let mut session = match builder.build() {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if args.print_graph {
        println!("{}", session.graph_mermaid());
        return ExitCode::SUCCESS;
    }

    println!(
        "{} {}",
        "✈️  Travel planner using".bright_white(),
        session.active_model_name().bright_cyan()
    );
    println!(
        "{}",
        format!(
            "Thread {}. Commands: /email, /new, /history, /quit",
            session.thread_id()
        )
        .dimmed()
    );

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                let thread_id = session.new_thread();
                println!("{}", format!("Started thread {thread_id}").dimmed());
            }
            "/history" => print_history(&session).await,
            "/email" => {
                let result = run_turn(
                    session.send_email(),
                    &mut event_rx,
                    &progress_style,
                )
                .await;
                match result {
                    Ok(_) => {}
                    Err(SessionError::Agent(
                        travel_agent::core::Error::NothingToResume(_),
                    )) => {
                        println!("{}", "There is nothing to email yet.".dimmed());
                    }
                    Err(err) => print_error(&err),
                }
            }
            message => {
                let result = run_turn(
                    session.send_message(message),
                    &mut event_rx,
                    &progress_style,
                )
                .await;
                match result {
                    Ok(outcome) => print_reply(&outcome),
                    Err(err) => print_error(&err),
                }
            }
        }
    }

    ExitCode::SUCCESS
}

/// Drives a turn to completion, showing a spinner and the agent events in
/// the meantime.
async fn run_turn<F>(
    turn: F,
    event_rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    progress_style: &ProgressStyle,
) -> Result<TurnOutcome, SessionError>
where
    F: Future<Output = Result<TurnOutcome, SessionError>>,
{
    let mut turn = pin!(turn);
    let mut progress_bar: Option<ProgressBar> = None;
    let mut message = "🤔 Thinking...";

    loop {
        // Create a new progress bar if it has been finished.
        progress_bar
            .get_or_insert_with(|| {
                let progress_bar = ProgressBar::new_spinner();
                progress_bar.set_style(progress_style.clone());
                progress_bar.set_message(message);
                progress_bar
            })
            .inc(1);

        let sleep = sleep(Duration::from_millis(100));
        select! {
            result = &mut turn => {
                if let Some(progress_bar) = progress_bar.take() {
                    progress_bar.finish_and_clear();
                }
                while let Ok(event) = event_rx.try_recv() {
                    print_event(event);
                }
                return result;
            }
            Some(event) = event_rx.recv() => {
                if let SessionEvent::Transcript(source) = event {
                    let next = match source {
                        TranscriptSource::Assistant => "✍️  Writing...",
                        TranscriptSource::Email => "📧 Writing the email...",
                    };
                    if next != message {
                        message = next;
                        if let Some(progress_bar) = &progress_bar {
                            progress_bar.set_message(message);
                        }
                    }
                    continue;
                }
                // Finish the progress bar before printing anything else.
                if let Some(progress_bar) = progress_bar.take() {
                    progress_bar.finish_and_clear();
                }
                print_event(event);
            }
            _ = sleep => {}
        }
    }
}

fn print_event(event: SessionEvent) {
    let SessionEvent::Agent(event) = event else {
        return;
    };
    match event {
        AgentEvent::ToolCall { name } => {
            println!("{}🔧 {}", BAR_CHAR.bright_yellow(), name.dimmed());
        }
        AgentEvent::ToolsUnsupported => {
            println!(
                "{}⚠️  {}",
                BAR_CHAR.bright_yellow(),
                "This model can't call tools, answering without them."
            );
        }
        AgentEvent::EmailDelivered(EmailDelivery::Sent { status }) => {
            println!(
                "{}📧 Email sent (HTTP {status}).",
                BAR_CHAR.bright_green()
            );
        }
        AgentEvent::EmailDelivered(EmailDelivery::Failed(reason)) => {
            println!(
                "{}📧 {} {reason}",
                BAR_CHAR.bright_red(),
                "Email could not be sent:".bright_red()
            );
        }
        AgentEvent::Interrupted(_) => {}
    }
}

fn print_reply(outcome: &TurnOutcome) {
    if let Some(reply) = &outcome.reply {
        println!("{}🤖 {}", BAR_CHAR.bright_cyan(), reply.bright_white());
    }
    if outcome.pending == Some(Node::EmailSender) {
        println!("{}", "Type /email to get this plan by email.".dimmed());
    }
}

fn print_error(err: &SessionError) {
    eprintln!("{} {err}", "error:".bright_red().bold());
}

async fn print_history(session: &Session) {
    let history = match session.history().await {
        Ok(history) => history,
        Err(err) => return print_error(&err),
    };
    if history.is_empty() {
        println!("{}", "The thread is empty.".dimmed());
    }
    for message in &history {
        match message {
            ModelMessage::System(_) => {}
            ModelMessage::User(text) => println!("> {text}"),
            ModelMessage::Assistant(msg) => {
                for call in &msg.tool_calls {
                    println!("{}🔧 {}", BAR_CHAR.bright_yellow(), call.name.dimmed());
                }
                if !msg.content.is_empty() {
                    println!(
                        "{}🤖 {}",
                        BAR_CHAR.bright_cyan(),
                        msg.content.bright_white()
                    );
                }
            }
            ModelMessage::Tool(result) => {
                let summary =
                    format!("{} returned {} bytes", result.name, result.content.len());
                println!("{}   {}", BAR_CHAR.bright_yellow(), summary.dimmed());
            }
        }
    }
}

async fn list_models(settings: &Settings) -> ExitCode {
    if settings.provider != ProviderKind::Gemini {
        eprintln!("--list-models is only available for Gemini");
        return ExitCode::FAILURE;
    }
    let provider = match llm::gemini_provider(settings) {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    match provider.list_models().await {
        Ok(models) => {
            for model in models {
                let name = model.name.strip_prefix("models/").unwrap_or(&model.name);
                let can_generate = model
                    .supported_generation_methods
                    .iter()
                    .any(|m| m == "generateContent");
                if can_generate {
                    println!("{name}");
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("listing models failed: {err}");
            eprintln!("{}", err.message());
            ExitCode::FAILURE
        }
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
