use anyhow::Result;
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use tally_core::{ClientMessage, ClientState, Command, RenamePayload, ServerMessage, StateRequest};

#[derive(Parser, Debug)]
#[command(name = "tally-server")]
#[command(about = "Counter sync server and debug client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Run as server (default behavior if no command specified)
    #[arg(long)]
    pub server: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to a running server as a debug client
    Debug {
        /// Server URL (e.g., ws://localhost:8080)
        #[arg(short, long, default_value = "ws://localhost:8080")]
        url: String,

        #[command(subcommand)]
        command: DebugCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum DebugCommands {
    /// Fetch and print the state snapshot for a fresh connection
    Get,
    /// Apply counter operations in order, printing each pushed update
    Drive {
        /// Operations: add:NAME, inc:I, dec:I, reset:I, rename:I:NAME, remove:I
        #[arg(required = true)]
        ops: Vec<String>,
    },
}

pub async fn run_debug_client(url: String, command: DebugCommands) -> Result<()> {
    let ws_url = format!("{}/ws", url);
    debug!("Connecting to {}", ws_url);

    let (ws_stream, _) = match timeout(Duration::from_secs(5), connect_async(&ws_url)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            return Err(anyhow::anyhow!("Connection failed: {}", e));
        }
        Err(_) => {
            return Err(anyhow::anyhow!(
                "Connection timeout - is the server running?"
            ));
        }
    };
    let (mut write, mut read) = ws_stream.split();

    match command {
        DebugCommands::Get => {
            let request = serde_json::to_string(&ClientMessage::Request(StateRequest::GetState))?;
            write.send(Message::Text(request.into())).await?;

            let state = wait_for_reply(&mut read, |msg| match msg {
                ServerMessage::State(state) => Some(state),
                _ => None,
            })
            .await?;
            print_state(&state);
        }
        DebugCommands::Drive { ops } => {
            for op in &ops {
                let command = parse_op(op)?;
                println!("> {}", op);

                let text = serde_json::to_string(&ClientMessage::Command(command))?;
                write.send(Message::Text(text.into())).await?;

                let state = wait_for_reply(&mut read, |msg| match msg {
                    ServerMessage::StateUpdated(state) => Some(state),
                    _ => None,
                })
                .await?;
                print_state(&state);
            }
        }
    }

    write.send(Message::Close(None)).await?;
    Ok(())
}

async fn wait_for_reply<S, F>(read: &mut S, mut select: F) -> Result<ClientState>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    F: FnMut(ServerMessage) -> Option<ClientState>,
{
    let reply = timeout(Duration::from_secs(10), async {
        while let Some(msg) = read.next().await {
            if let Message::Text(text) = msg? {
                let server_msg: ServerMessage = serde_json::from_str(&text)?;
                if let Some(state) = select(server_msg) {
                    return Ok::<_, anyhow::Error>(state);
                }
            }
        }
        Err(anyhow::anyhow!("Connection closed unexpectedly"))
    })
    .await;

    match reply {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "Timeout waiting for server reply after 10 seconds"
        )),
    }
}

fn parse_op(op: &str) -> Result<Command> {
    let mut parts = op.splitn(3, ':');
    let kind = parts.next().unwrap_or_default();

    let command = match kind {
        "add" => {
            let name = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("add requires a name: add:NAME"))?;
            Command::AddCounter(name.to_string())
        }
        "inc" => Command::IncrementCounter(parse_index(&mut parts, "inc")?),
        "dec" => Command::DecrementCounter(parse_index(&mut parts, "dec")?),
        "reset" => Command::ResetCounter(parse_index(&mut parts, "reset")?),
        "remove" => Command::RemoveCounter(parse_index(&mut parts, "remove")?),
        "rename" => {
            let index = parse_index(&mut parts, "rename")?;
            let new_name = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("rename requires a name: rename:I:NAME"))?;
            Command::RenameCounter(RenamePayload {
                index,
                new_name: new_name.to_string(),
            })
        }
        other => return Err(anyhow::anyhow!("unknown operation: {}", other)),
    };
    Ok(command)
}

fn parse_index<'a>(parts: &mut impl Iterator<Item = &'a str>, kind: &str) -> Result<i64> {
    let raw = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("{} requires an index: {}:I", kind, kind))?;
    raw.parse()
        .map_err(|_| anyhow::anyhow!("invalid index for {}: {}", kind, raw))
}

fn print_state(state: &ClientState) {
    if state.counters.is_empty() {
        println!("  (no counters)");
    }
    for (index, counter) in state.counters.iter().enumerate() {
        println!("  [{}] {} = {}", index, counter.name, counter.value);
    }
    if let Some(error) = &state.error {
        println!("  error: {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_operation() {
        assert_eq!(
            parse_op("add:requests").unwrap(),
            Command::AddCounter("requests".to_string())
        );
        assert_eq!(parse_op("inc:0").unwrap(), Command::IncrementCounter(0));
        assert_eq!(parse_op("dec:2").unwrap(), Command::DecrementCounter(2));
        assert_eq!(parse_op("reset:1").unwrap(), Command::ResetCounter(1));
        assert_eq!(parse_op("remove:0").unwrap(), Command::RemoveCounter(0));
        assert_eq!(
            parse_op("rename:0:hits").unwrap(),
            Command::RenameCounter(RenamePayload {
                index: 0,
                new_name: "hits".to_string()
            })
        );
    }

    #[test]
    fn rejects_malformed_operations() {
        assert!(parse_op("add").is_err());
        assert!(parse_op("inc:x").is_err());
        assert!(parse_op("rename:0").is_err());
        assert!(parse_op("explode:1").is_err());
    }

    #[test]
    fn rename_names_may_contain_colons() {
        assert_eq!(
            parse_op("rename:0:a:b").unwrap(),
            Command::RenameCounter(RenamePayload {
                index: 0,
                new_name: "a:b".to_string()
            })
        );
    }
}
