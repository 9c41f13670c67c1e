use std::process::Stdio;
use std::time::Duration;

use chatproto::event::{ClientEvent, ServerEvent};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Client {
    sink: SplitSink<Ws, Message>,
    stream: SplitStream<Ws>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dedicated port.
    let bind = "127.0.0.1:48041";
    let ws_url = format!("ws://{bind}/ws");

    let mut server = Command::new("target/debug/doubt_server")
        .env("BIND", bind)
        .env("DOUBT_MODE", "classic")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    tokio::time::sleep(Duration::from_millis(300)).await;
    wait_tcp(bind, Duration::from_secs(10)).await?;

    let res = run_scenario(&ws_url).await;

    let _ = server.kill().await;

    res
}

async fn wait_tcp(bind: &str, timeout: Duration) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if TcpStream::connect(bind).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    anyhow::bail!("timeout waiting for tcp {bind}");
}

async fn open(ws_url: &str) -> anyhow::Result<Client> {
    let (ws, _) = tokio_tungstenite::connect_async(ws_url).await?;
    let (sink, stream) = ws.split();
    Ok(Client { sink, stream })
}

/// Next server event, or `None` once the server closed the socket.
async fn next_event(c: &mut Client, wait: Duration) -> anyhow::Result<Option<ServerEvent>> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            anyhow::bail!("timed out waiting for a server event");
        }
        let m = match tokio::time::timeout(remaining, c.stream.next()).await {
            Ok(v) => v,
            Err(_) => continue,
        };
        let Some(m) = m else {
            return Ok(None);
        };
        match m? {
            Message::Text(s) => return Ok(Some(serde_json::from_str(&s)?)),
            Message::Close(_) => return Ok(None),
            _ => continue,
        }
    }
}

async fn expect_connected(c: &mut Client) -> anyhow::Result<String> {
    match next_event(c, Duration::from_secs(5)).await? {
        Some(ServerEvent::Connected { name, .. }) => Ok(name.as_str().to_string()),
        other => anyhow::bail!("expected connected, got {other:?}"),
    }
}

/// Skip presence traffic until a chat line shows up.
async fn expect_chat(c: &mut Client) -> anyhow::Result<(String, String)> {
    loop {
        match next_event(c, Duration::from_secs(5)).await? {
            Some(ServerEvent::Chat { name, message, .. }) => {
                return Ok((name.as_str().to_string(), message));
            }
            Some(_) => continue,
            None => anyhow::bail!("socket closed while waiting for chat"),
        }
    }
}

async fn run_scenario(ws_url: &str) -> anyhow::Result<()> {
    let mut seated = Vec::new();
    let mut names = Vec::new();
    for _ in 0..5 {
        let mut c = open(ws_url).await?;
        names.push(expect_connected(&mut c).await?);
        seated.push(c);
    }
    anyhow::ensure!(
        names == ["Turing", "Neumann", "Gauss", "Euler", "Pascal"],
        "unexpected seating order {names:?}"
    );

    // Sixth client: exactly one error, then the server closes.
    let mut extra = open(ws_url).await?;
    match next_event(&mut extra, Duration::from_secs(5)).await? {
        Some(ServerEvent::Error { message }) => println!("full room rejected: {message}"),
        other => anyhow::bail!("expected error, got {other:?}"),
    }
    anyhow::ensure!(
        next_event(&mut extra, Duration::from_secs(5)).await?.is_none(),
        "rejected client was not closed"
    );

    // Neumann leaves and the next newcomer gets Neumann back.
    let mut neumann = seated.remove(1);
    neumann.sink.send(Message::Close(None)).await?;
    drop(neumann);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut back = open(ws_url).await?;
    let name = expect_connected(&mut back).await?;
    anyhow::ensure!(name == "Neumann", "expected Neumann to be reissued, got {name}");

    let say = serde_json::to_string(&ClientEvent::ChatMessage {
        message: "hello from Turing".to_string(),
        timestamp: Some(1.0),
    })?;
    seated[0].sink.send(Message::Text(say)).await?;
    let (from, text) = expect_chat(&mut back).await?;
    anyhow::ensure!(from == "Turing" && text == "hello from Turing", "bad relay {from}: {text}");

    println!("doubt_server ws e2e ok");
    Ok(())
}
