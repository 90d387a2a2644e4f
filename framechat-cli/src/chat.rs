//! Interactive chat console.

use colored::Colorize;
use framechat_client::Client;
use framechat_protocol::MAX_BODY_LEN;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config as LineConfig, Editor};
use std::io::Write;

/// Runs the chat session until the user quits or the session dies.
///
/// Returns `Ok` on a locally initiated clean exit; a session that was
/// ended by the connection (read error, write error, peer close) returns
/// the terminal reason for the caller to map.
pub async fn run(client: &Client, username: &str) -> Result<(), Box<dyn std::error::Error>> {
    let conn = client.connection();

    let reader = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.read_loop().await })
    };
    let writer = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.write_loop().await })
    };

    // Incoming bodies go to stdout as-is, one line per frame.
    let mut message_rx = client.subscribe_messages();
    let printer = tokio::spawn(async move {
        loop {
            match message_rx.recv().await {
                Ok(body) => {
                    let mut stdout = std::io::stdout().lock();
                    let _ = stdout.write_all(&body);
                    let _ = stdout.write_all(b"\n");
                    let _ = stdout.flush();
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    eprintln!("{}: dropped {} messages", "Warning".yellow(), n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let line_config = LineConfig::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(line_config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".framechat_history"))
        .unwrap_or_else(|_| ".framechat_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type a message and press enter; /quit or Ctrl-D to leave.\n");

    let tag = format!("{}>", username);
    let prompt = format!("{} ", tag.as_str().cyan());

    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                if line == "/quit" {
                    break;
                }
                if line.len() > MAX_BODY_LEN {
                    println!(
                        "{}: message is {} bytes, limit is {}; not sent",
                        "Error".red(),
                        line.len(),
                        MAX_BODY_LEN
                    );
                    continue;
                }
                if let Err(e) = client.send(line.as_bytes().to_vec()) {
                    println!("{}: {}", "Session ended".red(), e);
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    client.close();

    // The write loop finishes once it has drained the queue; the close
    // also wakes the read loop out of its pending read, so both join.
    let write_result = writer.await.unwrap_or(Ok(()));
    let read_result = reader.await.unwrap_or(Ok(()));
    printer.abort();

    read_result.and(write_result)?;
    Ok(())
}
