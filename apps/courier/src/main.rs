//! Chunkferry courier entry point.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chunkferry_uploader::{UploadEvent, UploadOutcome, Uploader, WsConnection};

#[derive(Parser, Debug)]
#[command(
    name = "chunkferry-courier",
    version,
    about = "Upload a file to a chunkferry depot, resumably"
)]
struct Args {
    /// File to upload.
    file: PathBuf,

    /// Depot WebSocket URL.
    #[arg(long, default_value = "ws://127.0.0.1:9440")]
    server: String,

    /// Chunk size in bytes (0 = default 4 MiB).
    #[arg(long, default_value_t = 0)]
    chunk_size: u64,

    /// Suppress progress output.
    #[arg(long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let conn = WsConnection::connect(&args.server).await?;

    let mut uploader = Uploader::new();
    let events = uploader.take_events();
    let quiet = args.quiet;
    let printer = events.map(|mut rx| {
        tokio::spawn(async move {
            // Hash progress arrives densely; only report coarse steps.
            let mut last_reported = -10.0_f64;
            while let Some(event) = rx.recv().await {
                if quiet {
                    continue;
                }
                match event {
                    UploadEvent::Hashing { percent } => {
                        if percent - last_reported >= 10.0 || percent >= 100.0 {
                            println!("hashing… {percent:.0}%");
                            last_reported = percent;
                        }
                    }
                    UploadEvent::Hashed { hash } => println!("content hash: {hash}"),
                    UploadEvent::Verified {
                        already_complete,
                        stored,
                    } => {
                        if already_complete {
                            println!("depot already has this file");
                        } else if stored > 0 {
                            println!("resuming: depot holds {stored} chunk(s)");
                        }
                    }
                    UploadEvent::ChunkSent { index, status } => {
                        println!("chunk {index}: {status:?}");
                    }
                    UploadEvent::Merged => println!("merged"),
                    UploadEvent::Completed => {}
                    UploadEvent::Failed { error } => eprintln!("failed: {error}"),
                }
            }
        })
    });

    let result = uploader.upload(&conn, &args.file, args.chunk_size).await;
    conn.close().await;
    drop(uploader);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    match result? {
        UploadOutcome::AlreadyUploaded { hash } => {
            println!("nothing to do: {hash} already uploaded");
        }
        UploadOutcome::Uploaded {
            hash,
            chunks_sent,
            bytes_sent,
        } => {
            println!("uploaded {chunks_sent} chunk(s), {bytes_sent} byte(s) as {hash}");
        }
    }
    Ok(())
}
