//! Demo binary: runs a full duplex session against an in-process render
//! server stand-in that echoes the camera feed back as the rendered stream.

use clap::{Arg, Command, value_parser};
use log::{info, warn};
use render_preview::codec::{RawFrameDecoder, RawFrameEncoder};
use render_preview::device::TestPatternAdapter;
use render_preview::session::{self, ControlMessage};
use render_preview::transport::{LoopbackTransport, Transport, transport_encoder_sink};
use render_preview::utils::SignalOfStop;
use render_preview::{ClientConfig, RenderClient};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Render-server stand-in: answers the handshake, then bounces every capture
/// packet back on the preview channel until the client detaches.
fn run_render_server(transport: LoopbackTransport, config: ClientConfig) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        if let Err(e) =
            session::establish(&transport, &config.control_channel, config.handshake_timeout)
        {
            warn!("render server handshake failed: {e}");
            return;
        }
        loop {
            if let Some(payload) = transport.receive(&config.control_channel, Duration::ZERO) {
                if matches!(
                    serde_json::from_slice(&payload),
                    Ok(ControlMessage::Detach(_))
                ) {
                    info!("client detached, render server exiting");
                    break;
                }
            }
            match transport.receive(&config.capture_channel, Duration::from_millis(50)) {
                Some(packet) => {
                    if transport.send(&config.preview_channel, packet).is_err() {
                        break;
                    }
                }
                None if !transport.healthy() => break,
                None => {}
            }
        }
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let matches = Command::new("render-preview")
        .about("Duplex render-preview session over an in-memory loopback link")
        .arg(
            Arg::new("seconds")
                .long("seconds")
                .value_parser(value_parser!(u64))
                .default_value("10")
                .help("How long to run before detaching"),
        )
        .arg(
            Arg::new("channels")
                .long("channels")
                .value_parser(value_parser!(u8))
                .default_value("3")
                .help("Preview channel layout: 3 (RGB) or 4 (RGBA)"),
        )
        .get_matches();

    let seconds = *matches.get_one::<u64>("seconds").unwrap();
    let mut config = ClientConfig::default();
    config.preview_channels = *matches.get_one::<u8>("channels").unwrap();
    config.device.resolution = (640, 360);

    let (client_end, server_end) = LoopbackTransport::pair();
    let server = run_render_server(server_end, config.clone());

    let transport: Arc<dyn Transport> = Arc::new(client_end);
    let encoder = RawFrameEncoder::new(transport_encoder_sink(
        Arc::clone(&transport),
        config.capture_channel.clone(),
    ));
    let mut client = RenderClient::connect(
        transport,
        Box::new(TestPatternAdapter::new(1)),
        Box::new(encoder),
        Box::new(RawFrameDecoder::new()),
        config,
    )?;

    let sos = SignalOfStop::new();
    ctrlc::set_handler({
        let sos = sos.clone();
        move || sos.cancel()
    })?;

    info!(
        "session up: camera {}, preview {}",
        client.capture_enabled(),
        client.preview_enabled()
    );

    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        if sos.wait_timeout(Duration::from_secs(1)) {
            info!("interrupted, detaching");
            break;
        }
        info!(
            "render stream {}x{}: {}",
            client.frame_width(),
            client.frame_height(),
            client.telemetry()
        );
    }

    client.shutdown();
    server.join().ok();
    Ok(())
}
