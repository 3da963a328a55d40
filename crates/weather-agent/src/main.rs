//! A one-shot CLI for asking weather questions.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::process::ExitCode;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;
use weather_agent::{SessionBuilder, WeatherReport};
use weather_agent_core::TranscriptSource;
use weather_agent_core::tool::Approval as ToolApproval;
use weather_agent_openai_model::{OpenAIConfigBuilder, OpenAIProvider};

const DEFAULT_QUERY: &str = "What is the weather of thar?";

const BAR_CHAR: &str = "▎";

enum SessionEvent {
    Idle,
    Transcript(String, TranscriptSource),
    FinalOutput(String),
    Error(String),
    EmailRequest(ToolApproval),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Ok(api_key) = env::var("OPENAI_API_KEY") else {
        eprintln!("OPENAI_API_KEY environment variable is not set");
        return ExitCode::FAILURE;
    };

    let mut config_builder = OpenAIConfigBuilder::with_api_key(api_key);
    if let Ok(base_url) = env::var("OPENAI_BASE_URL") {
        config_builder = config_builder.with_base_url(base_url);
    }
    if let Ok(model) = env::var("OPENAI_MODEL") {
        config_builder = config_builder.with_model(model);
    }
    let model_provider = OpenAIProvider::new(config_builder.build());

    let query = {
        let args: Vec<String> = env::args().skip(1).collect();
        if args.is_empty() {
            DEFAULT_QUERY.to_owned()
        } else {
            args.join(" ")
        }
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let session = SessionBuilder::with_model_provider(model_provider)
        .with_system_prompt(include_str!("./system_prompt.md"))
        .on_idle({
            let event_tx = event_tx.clone();
            move || {
                event_tx.send(SessionEvent::Idle).ok();
            }
        })
        .on_transcript({
            let event_tx = event_tx.clone();
            move |transcript, source| {
                event_tx
                    .send(SessionEvent::Transcript(
                        transcript.to_owned(),
                        source,
                    ))
                    .ok();
            }
        })
        .on_final_output({
            let event_tx = event_tx.clone();
            move |output| {
                event_tx
                    .send(SessionEvent::FinalOutput(output.to_owned()))
                    .ok();
            }
        })
        .on_error({
            let event_tx = event_tx.clone();
            move |err| {
                event_tx.send(SessionEvent::Error(err.to_owned())).ok();
            }
        })
        .on_email_request({
            let event_tx = event_tx.clone();
            move |approval| {
                event_tx.send(SessionEvent::EmailRequest(approval)).ok();
            }
        })
        .build();

    session.send_message(&query);

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    let mut final_output = None;
    let mut failed = false;
    let mut progress_bar = None;

    loop {
        // Create a new progress bar if it has been finished.
        progress_bar
            .get_or_insert_with(|| {
                let progress_bar = ProgressBar::new_spinner();
                progress_bar.set_style(progress_style.clone());
                progress_bar.set_message("🤔 Thinking...");
                progress_bar
            })
            .inc(1);

        let sleep = sleep(Duration::from_millis(100));
        let event = select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                event
            },
            _ = sleep => {
                continue;
            }
        };

        // Finish the progress bar before printing anything else.
        if let Some(progress_bar) = &progress_bar {
            progress_bar.finish_and_clear();
        }
        progress_bar = None;

        match event {
            SessionEvent::EmailRequest(approval) => {
                let bar = BAR_CHAR.bright_yellow();
                println!("\n{bar}⚠️  Agent wants to send an email:");
                for line in approval.what().lines() {
                    println!("{bar}{}", line.bright_white().bold());
                }
                print!("Proceed? [Y/n]: ");
                std::io::stdout().flush().unwrap();

                let Some(line) = read_line().await else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() || line.eq_ignore_ascii_case("y") {
                    approval.approve();
                } else {
                    approval.reject(None);
                }

                println!();
            }
            SessionEvent::Transcript(transcript, source) => {
                if source == TranscriptSource::Assistant {
                    println!(
                        "{}🤖 {}",
                        BAR_CHAR.bright_cyan(),
                        transcript.bright_white()
                    );
                }
            }
            SessionEvent::FinalOutput(output) => {
                final_output = Some(output);
            }
            SessionEvent::Error(err) => {
                eprintln!("{}", format!("error: {err}").bright_red());
                failed = true;
            }
            SessionEvent::Idle => {
                break;
            }
        }
    }

    if failed {
        return ExitCode::FAILURE;
    }
    let Some(output) = final_output else {
        eprintln!("the agent produced no output");
        return ExitCode::FAILURE;
    };
    match WeatherReport::from_final_output(&output) {
        Some(report) => {
            println!("{}", report.degree_c);
        }
        None => {
            // The model ignored the output schema, show what we got.
            println!("{}", output.trim());
        }
    }
    ExitCode::SUCCESS
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
