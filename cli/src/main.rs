use std::io::BufReader;

use blobbuf::{
    BlobError, BufferedStorage, EngineOptions, EngineRegistry, StorageConfig, StorageManager,
    WriteOutcome,
};
use cli::sqlitefs::create_sqlitefs;
use cli::stdin_source::{read_records, Record};
use tracing::{error, info, warn};

const USAGE: &str = "usage: cli <protocol> [key=value ...] < records.jsonl";

fn parse_options(args: &[String]) -> Result<EngineOptions, String> {
    args.iter()
        .map(|arg| {
            arg.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| format!("expected key=value, got '{arg}'"))
        })
        .collect()
}

fn load_config() -> Result<StorageConfig, BlobError> {
    match std::env::var("BLOBBUF_CONFIG") {
        Ok(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| BlobError::config(format!("{path}: {e}")))?;
            StorageConfig::from_json_str(&text)
        }
        Err(_) => Ok(StorageConfig::default()),
    }
}

async fn ingest<S: BufferedStorage>(storage: &S, records: Vec<Record>) -> Result<usize, BlobError> {
    let mut written = 0;
    for record in records {
        let context = record.context().to_string();
        match storage.enqueue(&context, &record.path, record.data).await? {
            WriteOutcome::Written => written += 1,
            WriteOutcome::Flushed(report) => {
                info!(count = report.written(), "Limit reached, buffers flushed");
                written += report.written();
            }
            WriteOutcome::Buffered(_) => {}
        }
    }
    Ok(written + storage.flush_all().await?.written())
}

async fn run(protocol: &str, options: &EngineOptions) -> Result<usize, BlobError> {
    let config = load_config()?;
    let mut registry = EngineRegistry::with_defaults();
    registry.register_async("sqlite", create_sqlitefs);

    let manager = StorageManager::from_registry(&registry, protocol, options, config)?;
    info!(protocol, known = ?manager.registered_types(), "Engine created");
    manager.launch_session().await?;

    let records = read_records(BufReader::new(std::io::stdin().lock())).map_err(BlobError::config)?;
    info!(count = records.len(), "Records read");

    ingest(&manager, records).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((protocol, rest)) = args.split_first() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    let options = match parse_options(rest) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            std::process::exit(2);
        }
    };

    match run(protocol, &options).await {
        Ok(written) => info!(written, "Program completed"),
        Err(BlobError::PartialFlush {
            written,
            failed_path,
            source,
            remainder,
        }) => {
            warn!(written, unwritten = remainder.len(), "Flush stopped early");
            error!(path = %failed_path, error = %source, "Write failed");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "Program failed");
            std::process::exit(1);
        }
    }
}
