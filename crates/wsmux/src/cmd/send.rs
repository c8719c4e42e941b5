use std::fs;
use std::time::Duration;

use bytes::Bytes;
use wsmux_transport::path_of;
use wsmux_tunnel::{Client, Stream};

use crate::cmd::SendArgs;
use crate::exit::{tunnel_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_message, OutputFormat, Received};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    if args.streams == 0 {
        return Err(CliError::new(USAGE, "--streams must be at least 1"));
    }
    let payload = resolve_payload(&args)?;

    let client = Client::new(args.url.clone());
    client
        .start()
        .await
        .map_err(|err| tunnel_error("connect failed", err))?;

    let result = exchange(&client, &args, &payload, wait_timeout, format).await;
    client.stop().await;
    result
}

async fn exchange(
    client: &Client,
    args: &SendArgs,
    payload: &[u8],
    wait_timeout: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    let mut streams = Vec::with_capacity(args.streams);
    for _ in 0..args.streams {
        let stream = client
            .dial_stream()
            .await
            .map_err(|err| tunnel_error("open stream failed", err))?;
        stream
            .write(payload)
            .await
            .map_err(|err| tunnel_error("send failed", err))?;
        tracing::debug!(stream_id = stream.id(), size = payload.len(), "sent payload");
        streams.push(stream);
    }

    if args.wait {
        let path = path_of(&args.url);
        for stream in &streams {
            let reply = wait_for_reply(stream, wait_timeout).await?;
            let message = Received {
                stream_id: stream.id(),
                path,
                payload: &reply,
            };
            print_message(&message, format);
        }
    }

    for stream in &streams {
        stream.close().await;
    }
    Ok(SUCCESS)
}

async fn wait_for_reply(stream: &Stream, wait_timeout: Duration) -> CliResult<Bytes> {
    match tokio::time::timeout(wait_timeout, stream.read()).await {
        Ok(Some(reply)) => Ok(reply),
        Ok(None) => Err(CliError::new(
            FAILURE,
            format!("stream {} closed before a reply arrived", stream.id()),
        )),
        Err(_) => Err(CliError::new(
            TIMEOUT,
            format!(
                "no reply on stream {} within {}ms",
                stream.id(),
                wait_timeout.as_millis()
            ),
        )),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn args() -> SendArgs {
        SendArgs {
            url: "ws://127.0.0.1:8080/".to_string(),
            json: None,
            data: None,
            file: None,
            streams: 1,
            wait: false,
            wait_timeout: "5s".to_string(),
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_bad_input() {
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("soon").unwrap_err().code, USAGE);
    }

    #[test]
    fn payload_from_data() {
        let mut args = args();
        args.data = Some("hello".to_string());
        assert_eq!(resolve_payload(&args).unwrap(), b"hello");
    }

    #[test]
    fn payload_json_is_validated() {
        let mut args = args();
        args.json = Some("{\"x\":".to_string());
        assert_eq!(resolve_payload(&args).unwrap_err().code, USAGE);

        args.json = Some("{\"x\":1}".to_string());
        assert_eq!(resolve_payload(&args).unwrap(), b"{\"x\":1}");
    }

    #[test]
    fn payload_defaults_to_empty() {
        assert!(resolve_payload(&args()).unwrap().is_empty());
    }

    #[test]
    fn missing_payload_file_is_error() {
        let mut args = args();
        args.file = Some(PathBuf::from("/nonexistent/wsmux-payload.bin"));
        assert!(resolve_payload(&args).is_err());
    }
}
