use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use microlink_session::{LinkConfig, LinkListener, PacketType, SessionError};

use crate::cmd::{parse_duration, EmulateArgs};
use crate::exit::{session_error, CliError, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};

/// How often the receive loop wakes up to check for Ctrl-C.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(200);

enum RecvErrorDisposition {
    Idle,
    Reconnect,
    Fatal(CliError),
}

pub fn run(args: EmulateArgs, format: OutputFormat) -> CliResult<i32> {
    let config = LinkConfig {
        handshake_timeout: parse_duration(&args.handshake_timeout)?,
        recv_timeout: Some(STOP_CHECK_INTERVAL),
        ..LinkConfig::default()
    };
    let listener =
        LinkListener::bind(&args.path).map_err(|err| session_error("bind failed", err))?;
    tracing::info!(path = %listener.path().display(), "emulated target listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut received = 0usize;

    while running.load(Ordering::SeqCst) {
        let mut link = match listener.accept(config.clone()) {
            Ok(link) => link,
            Err(SessionError::Timeout(timeout)) => {
                tracing::warn!(?timeout, "host connected but never completed a handshake");
                continue;
            }
            Err(err) => return Err(session_error("accept failed", err)),
        };

        while running.load(Ordering::SeqCst) {
            let packet = match link.recv() {
                Ok(packet) => packet,
                Err(err) => match classify_recv_error(err) {
                    RecvErrorDisposition::Idle => continue,
                    RecvErrorDisposition::Reconnect => break,
                    RecvErrorDisposition::Fatal(cli_err) => return Err(cli_err),
                },
            };

            print_packet(&packet, format);

            if packet.packet_type == PacketType::NormalTraffic {
                tracing::info!(size = packet.payload.len(), "echoing packet");
                link.send(PacketType::NormalTraffic, &packet.payload)
                    .map_err(|err| session_error("echo send failed", err))?;
            }

            received = received.saturating_add(1);
            if let Some(count) = args.count {
                if received >= count {
                    return Ok(SUCCESS);
                }
            }
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

fn classify_recv_error(err: SessionError) -> RecvErrorDisposition {
    match err {
        SessionError::Timeout(_) => RecvErrorDisposition::Idle,
        SessionError::Disconnected(reason) => {
            tracing::info!(%reason, "host disconnected");
            RecvErrorDisposition::Reconnect
        }
        other => RecvErrorDisposition::Fatal(session_error("receive failed", other)),
    }
}
