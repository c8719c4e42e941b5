//! Ping-pong over fifteen concurrent streams sharing one WebSocket.
//!
//! Run the server:
//!   cargo run --example pingpong -- server
//!
//! In another terminal:
//!   cargo run --example pingpong -- client

use wsmux::tunnel::{Client, Server, Stream};

const ADDRESS: &str = "127.0.0.1:8080";
const STREAMS: usize = 15;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    match std::env::args().nth(1).as_deref() {
        Some("server") => run_server().await,
        Some("client") => run_client().await,
        _ => {
            eprintln!("usage: pingpong <server|client>");
            std::process::exit(64);
        }
    }
}

async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new();
    server.handle("/", pong);
    eprintln!("Listening on ws://{ADDRESS}/");
    server.listen_and_serve(ADDRESS).await?;
    Ok(())
}

async fn pong(stream: Stream) {
    let Some(data) = stream.read().await else {
        eprintln!("Stream {} closed before a ping arrived", stream.id());
        return;
    };
    eprintln!(
        "Server received: {}, stream {}",
        String::from_utf8_lossy(&data),
        stream.id()
    );
    if let Err(e) = stream.write(b"Pong").await {
        eprintln!("Error writing to client: {e}");
    }
}

async fn run_client() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::new(format!("ws://{ADDRESS}/"));
    let supervisor = client.start_forever().await?;

    let mut tasks = Vec::with_capacity(STREAMS);
    for _ in 0..STREAMS {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let stream = match client.dial_stream().await {
                Ok(stream) => stream,
                Err(e) => {
                    eprintln!("Error creating stream: {e}");
                    return;
                }
            };
            if let Err(e) = stream.write(b"Ping").await {
                eprintln!("Error writing to server: {e}");
            } else if let Some(data) = stream.read().await {
                eprintln!(
                    "Client received: {}, stream {}",
                    String::from_utf8_lossy(&data),
                    stream.id()
                );
            }
            stream.close().await;
        }));
    }
    for task in tasks {
        task.await?;
    }

    supervisor.shutdown().await;
    Ok(())
}
