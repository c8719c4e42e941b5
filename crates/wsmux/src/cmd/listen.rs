use tokio::net::TcpListener;
use tokio::sync::mpsc;
use wsmux_tunnel::{Server, Stream};

use crate::cmd::serve::shutdown_on_ctrl_c;
use crate::cmd::ListenArgs;
use crate::exit::{io_error, tunnel_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat, Received};

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = TcpListener::bind(&args.bind)
        .await
        .map_err(|err| io_error(&format!("bind {} failed", args.bind), err))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut server = Server::new();
    server.handle(args.path.clone(), move |stream: Stream| {
        let tx = tx.clone();
        async move {
            while let Some(message) = stream.read().await {
                if tx.send((stream.id(), message)).is_err() {
                    break;
                }
            }
        }
    });

    let shutdown = shutdown_on_ctrl_c();
    let serving = tokio::spawn(server.serve_with_shutdown(listener, shutdown.clone()));

    let mut printed = 0usize;
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = rx.recv() => received,
        };
        let Some((stream_id, payload)) = received else {
            break;
        };

        let message = Received {
            stream_id,
            path: &args.path,
            payload: &payload,
        };
        print_message(&message, format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    shutdown.cancel();
    match serving.await {
        Ok(result) => result.map_err(|err| tunnel_error("serve failed", err))?,
        Err(err) => tracing::warn!(error = %err, "server task failed"),
    }
    Ok(SUCCESS)
}
