//! BioHarness Telemetry (bht) Application
//!
//! 回放设备捕获文件，输出校正后的记录与心跳事件（每行一个JSON）；
//! 或生成仿真捕获文件。
//!
//! # 用法
//!
//! ```bash
//! bht simulate capture.txt --seconds 120 --clock-offset 2.5
//! bht replay capture.txt --config pipeline.json --rr-windows
//! ```

mod capture;

use std::path::{Path, PathBuf};

use bht_codec::FrameGenerator;
use bht_core::{
    HxMMessage, PhysiologicalEvent, PipelineConfig, SignalPacket, SummaryMessage, TelemetryError,
};
use bht_stream::{
    BioHarnessPipeline, FrameOutcome, HeartbeatDetector, HostClock, ManualClock, RrWindow,
    RrWindowSnapshot, SummaryStatusMonitor, SystemClock,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "bht")]
#[command(author, version, about = "BioHarness telemetry replay and simulation", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a capture file through the processing pipeline
    Replay {
        /// Capture file: `<host_seconds> <message_id hex> <payload hex>` per line
        capture: PathBuf,

        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print every signal sample with its own timestamp instead of whole packets
        #[arg(long)]
        expand_samples: bool,

        /// Print full RR windows
        #[arg(long)]
        rr_windows: bool,
    },

    /// Write a simulated capture file
    Simulate {
        /// Output capture file
        output: PathBuf,

        /// Capture length in seconds
        #[arg(long, default_value = "60")]
        seconds: f64,

        /// Random seed
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Device timestamp of the first packet (defaults to now)
        #[arg(long)]
        start: Option<f64>,

        /// Host clock offset relative to the device clock, in seconds
        #[arg(long, default_value = "2.0")]
        clock_offset: f64,

        /// Maximum transport latency, in seconds
        #[arg(long, default_value = "0.05")]
        latency: f64,

        /// Packet loss probability
        #[arg(long, default_value = "0.0")]
        loss: f64,
    },
}

#[tokio::main]
async fn main() -> Result<(), TelemetryError> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // 日志写到stderr，stdout只输出记录
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| TelemetryError::Other(e.to_string()))?;

    match cli.command {
        Commands::Replay {
            capture,
            config,
            expand_samples,
            rr_windows,
        } => replay(&capture, config.as_deref(), expand_samples, rr_windows).await,
        Commands::Simulate {
            output,
            seconds,
            seed,
            start,
            clock_offset,
            latency,
            loss,
        } => {
            let start = start.unwrap_or_else(|| SystemClock.now().floor());
            let generator = FrameGenerator::with_seed(seed)
                .clock_offset(clock_offset)
                .max_latency(latency)
                .loss_probability(loss);
            simulate(&output, generator, start, seconds).await
        }
    }
}

async fn load_config(path: Option<&Path>) -> Result<PipelineConfig, TelemetryError> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| TelemetryError::Io(format!("{}: {e}", path.display())))?;
    PipelineConfig::from_json_str(&text)
}

/// 输出一行 `{"kind": ..., "record": ...}`
fn print_record<T: Serialize>(kind: &str, record: &T) -> Result<(), TelemetryError> {
    let record = serde_json::to_value(record)
        .map_err(|e| TelemetryError::Subscriber(format!("cannot serialize {kind}: {e}")))?;
    println!("{}", serde_json::json!({ "kind": kind, "record": record }));
    Ok(())
}

fn wire_output(
    pipeline: &mut BioHarnessPipeline<ManualClock>,
    config: &PipelineConfig,
    expand_samples: bool,
    rr_windows: bool,
) -> SummaryStatusMonitor {
    let handler = pipeline.handler_mut();

    handler.add_signal_subscriber(Box::new(
        move |packet: &SignalPacket, starts_new_stream: bool| -> Result<(), TelemetryError> {
            if !expand_samples {
                return print_record("signal", packet);
            }
            if starts_new_stream {
                info!(signal = %packet.signal_type(), "stream (re)started");
            }
            for sample in packet.timed_samples() {
                print_record("sample", &sample)?;
            }
            Ok(())
        },
    ));

    let mut detector = HeartbeatDetector::new();
    detector.add_event_subscriber(Box::new(
        |event: &PhysiologicalEvent| -> Result<(), TelemetryError> { print_record("event", event) },
    ));
    handler.add_signal_subscriber(Box::new(detector));

    if rr_windows {
        handler.add_signal_subscriber(Box::new(RrWindow::new(
            &config.rr_window,
            Box::new(|window: &RrWindowSnapshot| -> Result<(), TelemetryError> {
                print_record(
                    "rr_window",
                    &serde_json::json!({ "timestamp": window.timestamp, "values": window.values }),
                )
            }),
        )));
    }

    let monitor = SummaryStatusMonitor::new();
    handler.add_summary_subscriber(Box::new(monitor.clone()));
    handler.add_summary_subscriber(Box::new(
        |summary: &SummaryMessage| -> Result<(), TelemetryError> {
            print_record("summary", summary)
        },
    ));
    handler.add_hxm_subscriber(Box::new(
        |hxm: &HxMMessage| -> Result<(), TelemetryError> { print_record("hxm", hxm) },
    ));

    monitor
}

async fn replay(
    path: &Path,
    config: Option<&Path>,
    expand_samples: bool,
    rr_windows: bool,
) -> Result<(), TelemetryError> {
    let config = load_config(config).await?;
    let clock = ManualClock::default();
    let mut pipeline = BioHarnessPipeline::new(&config, clock.clone())?;
    let monitor = wire_output(&mut pipeline, &config, expand_samples, rr_windows);

    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| TelemetryError::Io(format!("{}: {e}", path.display())))?;
    let mut lines = BufReader::new(file).lines();

    let (mut line_number, mut dispatched, mut ignored, mut dropped, mut skipped) =
        (0u64, 0u64, 0u64, 0u64, 0u64);
    let mut subscriber_errors = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let captured = match capture::parse_line(&line) {
            Ok(Some(captured)) => captured,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = line_number, error = %e, "skipping malformed capture line");
                skipped += 1;
                continue;
            }
        };

        clock.set(captured.host_time);
        match pipeline.handle_frame(&captured.frame) {
            Ok(FrameOutcome::Dispatched(_)) => dispatched += 1,
            Ok(FrameOutcome::Ignored) => ignored += 1,
            Err(e) if e.is_frame_local() => {
                warn!(line = line_number, error = %e, "dropping frame");
                dropped += 1;
            }
            Err(e) if is_subscriber_failure(&e) => {
                warn!(line = line_number, error = %e, "subscriber failed, continuing");
                subscriber_errors += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        dispatched,
        ignored,
        dropped,
        skipped,
        subscriber_errors,
        flagged_summaries = monitor.flagged(),
        "replay finished"
    );
    Ok(())
}

/// 订阅者失败只影响当前帧的输出，回放继续
fn is_subscriber_failure(error: &TelemetryError) -> bool {
    matches!(error, TelemetryError::Subscriber(_))
}

async fn simulate(
    output: &Path,
    mut generator: FrameGenerator,
    start: f64,
    seconds: f64,
) -> Result<(), TelemetryError> {
    let frames = generator.capture(start, seconds)?;

    let mut text = format!("# bht simulate start={start} seconds={seconds}\n");
    for frame in &frames {
        text.push_str(&capture::format_line(frame));
        text.push('\n');
    }

    tokio::fs::write(output, text)
        .await
        .map_err(|e| TelemetryError::Io(format!("{}: {e}", output.display())))?;

    info!(frames = frames.len(), path = %output.display(), "wrote simulated capture");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bht_codec::frame_builder::rr_frame;

    #[test]
    fn test_subscriber_failure_does_not_stop_replay() {
        let clock = ManualClock::default();
        let mut pipeline =
            BioHarnessPipeline::new(&PipelineConfig::default(), clock.clone()).unwrap();
        pipeline.handler_mut().add_signal_subscriber(Box::new(
            |_: &SignalPacket, _: bool| -> Result<(), TelemetryError> {
                Err(TelemetryError::Other("stdout closed".to_string()))
            },
        ));

        clock.set(100.0);
        let frame = rr_frame(0, 100.0, &[800, -800]).unwrap();
        let err = pipeline.handle_frame(&frame).unwrap_err();
        assert!(!err.is_frame_local());
        assert!(is_subscriber_failure(&err));

        assert!(!is_subscriber_failure(&TelemetryError::Io("gone".to_string())));
    }
}
