use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wsmux_tunnel::{Server, Stream, TunnelConfig};

use crate::cmd::ServeArgs;
use crate::exit::{io_error, transport_error, tunnel_error, CliResult, SUCCESS};
use crate::output::{stream_mode, OutputFormat};

pub async fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let config = TunnelConfig::default().with_queue_capacity(args.queue_capacity);
    let mut server = Server::with_config(config);

    let paths = if args.paths.is_empty() {
        vec!["/".to_string()]
    } else {
        args.paths.clone()
    };
    for path in paths {
        server.handle(path, echo);
    }

    let listener = TcpListener::bind(&args.bind)
        .await
        .map_err(|err| io_error(&format!("bind {} failed", args.bind), err))?;
    let shutdown = shutdown_on_ctrl_c();

    let served = match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => {
            let acceptor = wsmux_transport::tls::acceptor(cert, key)
                .map_err(|err| transport_error("tls setup failed", err))?;
            server
                .serve_tls_with_shutdown(listener, acceptor, shutdown)
                .await
        }
        _ => server.serve_with_shutdown(listener, shutdown).await,
    };
    served.map_err(|err| tunnel_error("serve failed", err))?;

    Ok(SUCCESS)
}

async fn echo(stream: Stream) {
    while let Some(message) = stream.read().await {
        tracing::info!(
            stream_id = stream.id(),
            mode = stream_mode(stream.id()),
            size = message.len(),
            "echoing message"
        );
        if let Err(err) = stream.write(&message).await {
            tracing::warn!(stream_id = stream.id(), error = %err, "echo failed");
            break;
        }
    }
}

pub(crate) fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(err) => tracing::warn!(error = %err, "signal handler setup failed"),
        }
        token.cancel();
    });
    shutdown
}
