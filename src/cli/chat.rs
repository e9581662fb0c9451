use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use uuid::Uuid;

use crate::chat::service::StreamSubmission;
use crate::core::{AppConfig, AppContext};
use crate::notify::{Subscription, UiEvent};

/// Prints the deltas for `request_id` that are already queued.
fn print_deltas(events: &mut Subscription, request_id: &str) {
    while let Some(event) = events.try_recv() {
        if let UiEvent::StreamData {
            request_id: id,
            content,
        } = event
            && id == request_id
        {
            print!("{}", content);
        }
    }
    let _ = std::io::stdout().flush();
}

pub async fn run(config: AppConfig) -> Result<()> {
    // No avatar surface attaches to a terminal session
    let config = AppConfig {
        avatar_enabled: false,
        ..config
    };
    let context = Arc::new(AppContext::open(config)?);
    let mut events = context.notifier.subscribe();
    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                let request_id = Uuid::new_v4().to_string();
                let submission = StreamSubmission {
                    user_message: line.to_string(),
                    request_id: request_id.clone(),
                };
                let chat = Arc::clone(&context.chat);
                let mut turn =
                    tokio::spawn(async move { chat.submit(&submission, None).await });

                let result = loop {
                    tokio::select! {
                        result = &mut turn => break result?,
                        Some(event) = events.recv() => match event {
                            UiEvent::StreamData { request_id: id, content } if id == request_id => {
                                print!("{}", content);
                                let _ = std::io::stdout().flush();
                            }
                            _ => {}
                        },
                    }
                };
                print_deltas(&mut events, &request_id);
                println!();

                if let Some(error) = result.error {
                    println!("Error: {}", error);
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
