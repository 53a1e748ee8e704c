//! Drives a read-only filtering stage with a synthetic mixed workload.
//!
//! Wires the stage between an in-memory client connection and a counting
//! async downstream, submits requests, shuts everything down, and logs what
//! was forwarded and what was rejected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use rand::Rng;
use rofilter_core::{
    CommittedVersionSource, ErrorCode, LastProcessedZxid, OpCode, ReplyChannel, ReplyFrame,
    Request, RequestProcessor, Zxid,
};
use rofilter_server::network::{ConnectionConfig, ConnectionRegistry, OutboundFrame};
use rofilter_server::telemetry::{init_tracing, LogFormat};
use rofilter_server::{AsyncStage, ProcessorConfig, ReadOnlyRequestProcessor, StageRunnable};

#[derive(Debug, Parser)]
#[command(name = "stage-harness", about = "Exercise the read-only filtering stage")]
struct HarnessArgs {
    /// Server id used in the stage thread name.
    #[arg(long, env = "ROFILTER_SERVER_ID", default_value_t = 1)]
    server_id: u64,
    /// Number of requests to submit.
    #[arg(long, default_value_t = 10_000)]
    requests: u32,
    /// Fraction of requests that try to change state, between 0 and 1.
    #[arg(long, default_value_t = 0.2)]
    mutating_ratio: f64,
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    log_format: LogFormat,
    /// How long to wait for the stage to exit after shutdown, in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    exit_timeout_ms: u64,
}

/// Downstream that only counts what reaches it.
struct CountingDownstream {
    executed: Arc<AtomicU64>,
}

#[async_trait]
impl StageRunnable for CountingDownstream {
    async fn run(&mut self, request: Request) {
        tracing::trace!(cxid = request.cxid, op = %request.op, "executing read");
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    async fn shutdown(&mut self) {
        tracing::info!(
            executed = self.executed.load(Ordering::Relaxed),
            "downstream shut down"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = HarnessArgs::parse();
    init_tracing(args.log_format, "info")?;
    anyhow::ensure!(
        (0.0..=1.0).contains(&args.mutating_ratio),
        "--mutating-ratio must be between 0 and 1, got {}",
        args.mutating_ratio
    );

    let reads: Vec<OpCode> = OpCode::ALL.into_iter().filter(|op| !op.is_mutating()).collect();
    let writes: Vec<OpCode> = OpCode::ALL.into_iter().filter(|op| op.is_mutating()).collect();

    let zxid = Arc::new(LastProcessedZxid::new(Zxid(1_i64 << 32)));
    let executed = Arc::new(AtomicU64::new(0));
    let downstream = Arc::new(AsyncStage::start(CountingDownstream {
        executed: Arc::clone(&executed),
    }));

    let stage = ReadOnlyRequestProcessor::new(
        &ProcessorConfig {
            server_id: args.server_id,
            ..ProcessorConfig::default()
        },
        Arc::clone(&zxid) as Arc<dyn CommittedVersionSource>,
        Arc::clone(&downstream) as Arc<dyn RequestProcessor>,
    );
    stage.start().context("failed to start read-only stage")?;

    let registry = ConnectionRegistry::new();
    let capacity = usize::try_from(args.requests)?.max(1);
    let (cnxn, mut outbound) = registry.register(
        0x1000,
        &ConnectionConfig {
            outbound_channel_capacity: capacity,
        },
    );
    let cnxn_id = cnxn.id;
    let cnxn: Arc<dyn ReplyChannel> = cnxn;

    let mut expected_rejections = 0_u64;
    {
        let mut rng = rand::rng();
        for cxid in 0..args.requests {
            let mutating = rng.random_bool(args.mutating_ratio);
            let pool = if mutating { &writes } else { &reads };
            let op = pool[rng.random_range(0..pool.len())];
            if mutating {
                expected_rejections += 1;
            }
            stage.submit(Request::new(
                0x1000,
                i32::try_from(cxid)?,
                op,
                Vec::new(),
                Arc::clone(&cnxn),
            ));
            zxid.advance(Zxid((1_i64 << 32) + i64::from(cxid)));
        }
    }
    let expected_forwards = u64::from(args.requests) - expected_rejections;

    let mut rejected = 0_u64;
    let deadline = tokio::time::Instant::now() + Duration::from_millis(args.exit_timeout_ms);
    while (rejected < expected_rejections || executed.load(Ordering::Relaxed) < expected_forwards)
        && tokio::time::Instant::now() < deadline
    {
        while let Ok(OutboundFrame(bytes)) = outbound.try_recv() {
            let frame = ReplyFrame::decode(&bytes)?;
            anyhow::ensure!(frame.header.err == ErrorCode::NotReadOnly);
            rejected += 1;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    stage.shutdown();
    let exited = stage
        .wait_for_exit(Duration::from_millis(args.exit_timeout_ms))
        .await;
    anyhow::ensure!(exited, "stage did not exit within {}ms", args.exit_timeout_ms);
    downstream.stopped().await;
    stage.join()?;
    registry.remove(cnxn_id);

    tracing::info!(
        submitted = args.requests,
        forwarded = executed.load(Ordering::Relaxed),
        rejected,
        expected_rejections,
        open_connections = registry.count(),
        "harness complete"
    );
    Ok(())
}
