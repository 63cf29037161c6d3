//! Wires the Spot/Fiat/Bridge REST providers, the rate cache, the
//! background scheduler and the query-answering core behind a minimal
//! HTTP/1.1 listener for a desktop launcher (spec §6).
//!
//! Grounded on the `tangle-network-blueprint` pricing service's
//! `clap::Parser` + `tracing-subscriber::EnvFilter` binary shape, since the
//! teacher workspace ships no binary crate of its own to imitate directly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use xchange_core::{no_results_found, Answer, AnswerModule, CancelToken, CurrencyModule, CurrencyTables};
use xchange_data::provider::BridgeProvider;
use xchange_data::{PersistenceWriter, RateCache, RestBridgeProvider, RestFiatProvider, RestSpotProvider, Scheduler};
use xchange_instrument::{Currency, CurrencyTable};

const REQUEST_DEADLINE: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REQUEST_LINE: usize = 8 * 1024;

/// Command-line / environment configuration for the launcher binary. Every
/// upstream provider URL is already overridable via its own env var inside
/// `xchange-data::provider` (spec §6 "Environment"); the flags here cover
/// the operational knobs that only make sense at the binary boundary.
#[derive(Debug, Parser)]
#[command(name = "xchange-launcher", about = "Local exchange-rate answer engine for a desktop launcher", version)]
struct Config {
    /// Address the HTTP listener binds to.
    #[arg(long, env = "XCHANGE_BIND_ADDR", default_value = "127.0.0.1:8080")]
    bind_addr: SocketAddr,

    /// Path to the JSON rate-cache snapshot file (spec §4.5).
    #[arg(long, env = "XCHANGE_SNAPSHOT_PATH", default_value = "xchange_snapshot.json")]
    snapshot_path: String,

    /// The single BRIDGE_FIAT currency this deployment is configured for.
    #[arg(long, env = "XCHANGE_BRIDGE_FIAT", default_value = "RUB")]
    bridge_fiat: String,

    /// The single BRIDGE_CRYPTO currency this deployment is configured for.
    #[arg(long, env = "XCHANGE_BRIDGE_CRYPTO", default_value = "TON")]
    bridge_crypto: String,

    /// Comma-separated Spot order-book symbols the scheduler keeps warm.
    #[arg(long, env = "XCHANGE_SPOT_SYMBOLS", default_value = "TONUSDT,BTCUSDT,ETHUSDT", value_delimiter = ',')]
    spot_symbols: Vec<String>,

    /// Comma-separated Fiat currencies the scheduler fetches a USD cross-rate for.
    #[arg(long, env = "XCHANGE_FIAT_TARGETS", default_value = "EUR,GBP,TRY", value_delimiter = ',')]
    fiat_targets: Vec<String>,
}

#[derive(Debug, Serialize)]
struct JsonRpcAction {
    method: String,
    parameters: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AnswerItem {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "SubTitle")]
    subtitle: String,
    #[serde(rename = "IcoPath", skip_serializing_if = "Option::is_none")]
    ico_path: Option<String>,
    #[serde(rename = "Score")]
    score: u32,
    #[serde(rename = "JsonRPCAction")]
    json_rpc_action: JsonRpcAction,
}

impl AnswerItem {
    fn from_answer(answer: Answer) -> Self {
        Self {
            title: answer.title,
            subtitle: answer.subtitle,
            ico_path: None,
            score: answer.score,
            json_rpc_action: JsonRpcAction {
                method: "Flow.Launcher.CopyToClipboard".into(),
                parameters: vec![answer.clipboard_payload],
            },
        }
    }

    fn no_results(query: &str) -> Self {
        let answer = no_results_found(query);
        Self {
            title: answer.title,
            subtitle: answer.subtitle,
            ico_path: None,
            score: answer.score,
            json_rpc_action: JsonRpcAction {
                method: "Flow.Launcher.ChangeQuery".into(),
                parameters: vec![query.to_string()],
            },
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .json()
        .init();

    let bridge_fiat = Currency::new(&config.bridge_fiat);
    let bridge_crypto = Currency::new(&config.bridge_crypto);
    let fiat_targets: Vec<Currency> = config.fiat_targets.iter().map(Currency::new).collect();

    let cache = Arc::new(RateCache::new(CurrencyTable::new(bridge_fiat.clone(), bridge_crypto.clone())));
    let persistence = Arc::new(PersistenceWriter::new(config.snapshot_path.clone()));

    if let Some(snapshot) = persistence.load().await {
        tracing::info!(spot_books = snapshot.spot_books.len(), fiat_rates = snapshot.fiat_rates.len(), "loaded snapshot");
        if let Some(updated) = snapshot.bybit_last_update {
            cache.hydrate_spot(snapshot.spot_books, updated);
        }
        if let Some(updated) = snapshot.mastercard_last_update {
            cache.hydrate_fiat(snapshot.fiat_rates, updated);
        }
    } else {
        tracing::info!("starting with an empty cache, no usable snapshot found");
    }

    let spot = Arc::new(RestSpotProvider::new());
    let fiat = Arc::new(RestFiatProvider::new());
    let bridge: Arc<dyn BridgeProvider> = Arc::new(RestBridgeProvider::new());

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&cache),
        Arc::clone(&persistence),
        spot,
        fiat,
        Arc::clone(&bridge),
        config.spot_symbols.clone(),
        fiat_targets,
    ));
    let _scheduler_handles = scheduler.spawn();

    let module = Arc::new(CurrencyModule {
        router: xchange_core::Router::new(cache, bridge),
        tables: CurrencyTables::new(),
    });

    tracing::info!(addr = %config.bind_addr, "starting HTTP listener");
    let listener = match TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, "failed to bind listener");
            return;
        }
    };

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(error = %err, "failed to accept connection");
                continue;
            }
        };
        let module = Arc::clone(&module);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, module).await {
                tracing::debug!(%peer, error = %err, "connection closed with error");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, module: Arc<CurrencyModule>) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();

    let read = timeout(READ_TIMEOUT, reader.read_line(&mut request_line)).await;
    let Ok(Ok(n)) = read else {
        return Ok(());
    };
    if n == 0 || n > MAX_REQUEST_LINE {
        return Ok(());
    }

    // Drain and discard headers; this surface has no use for them.
    loop {
        let mut header_line = String::new();
        match timeout(READ_TIMEOUT, reader.read_line(&mut header_line)).await {
            Ok(Ok(n)) if n > 2 => continue,
            _ => break,
        }
    }

    let (status, body) = route_request(&request_line, &module).await;
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n{body}",
        len = body.len()
    );

    let stream = reader.into_inner();
    let mut stream = stream;
    timeout(WRITE_TIMEOUT, stream.write_all(response.as_bytes())).await??;
    timeout(WRITE_TIMEOUT, stream.flush()).await??;
    Ok(())
}

async fn route_request(request_line: &str, module: &CurrencyModule) -> (&'static str, String) {
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return ("400 Bad Request", "[]".to_string());
    };
    if method != "GET" {
        return ("405 Method Not Allowed", "[]".to_string());
    }

    let (path, query_string) = match target.split_once('?') {
        Some((path, rest)) => (path, Some(rest)),
        None => (target, None),
    };
    if path != "/" {
        return ("404 Not Found", "[]".to_string());
    }

    let query = query_string.and_then(|qs| find_param(qs, "q")).unwrap_or_default();
    let items = answer_items(module, &query).await;
    let body = serde_json::to_string(&items).unwrap_or_else(|_| "[]".to_string());
    ("200 OK", body)
}

async fn answer_items(module: &CurrencyModule, query: &str) -> Vec<AnswerItem> {
    if query.trim().is_empty() {
        return Vec::new();
    }

    let ctx = CancelToken::with_timeout(REQUEST_DEADLINE);
    // Illustrative fan-out (spec §4.14): the currency module is the only one
    // implemented here; a calculator or other answer-module would be merged
    // into `answers` the same way before ranking.
    let answers = module.process_query(&ctx, query).await;

    if answers.is_empty() {
        vec![AnswerItem::no_results(query)]
    } else {
        answers.into_iter().map(AnswerItem::from_answer).collect()
    }
}

fn find_param(query_string: &str, key: &str) -> Option<String> {
    query_string.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k == key {
            Some(percent_decode(v))
        } else {
            None
        }
    })
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
