use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use xchange_instrument::Currency;

use crate::book::SpotBook;
use crate::cache::RateCache;

/// Only snapshots tagged with this version are ever loaded (spec §4.5, §6
/// "Version mismatch ... discards the file").
pub const SNAPSHOT_VERSION: &str = "1.0";
const MAX_SNAPSHOT_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const MIN_SAVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot (de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: String,
    last_updated: DateTime<Utc>,
    bybit_last_update: Option<DateTime<Utc>>,
    mastercard_last_update: Option<DateTime<Utc>>,
    bybit_rates: HashMap<String, SpotBook>,
    mastercard_rates: HashMap<String, Decimal>,
}

fn mastercard_key(target: &Currency) -> String {
    format!("USD_{}", target.as_str())
}

fn parse_mastercard_key(key: &str) -> Option<Currency> {
    key.strip_prefix("USD_").map(Currency::new)
}

pub struct LoadedSnapshot {
    pub spot_books: HashMap<String, SpotBook>,
    pub fiat_rates: HashMap<Currency, Decimal>,
    pub bybit_last_update: Option<DateTime<Utc>>,
    pub mastercard_last_update: Option<DateTime<Utc>>,
}

/// Loads and saves the rate-cache snapshot described in spec §4.5/§6.
///
/// Grounded on `jackbot_data::redis_store`'s load/save API shape (an
/// explicit `load`/`save` pair guarded by a minimum-interval gate), backed
/// here by `tokio::fs` and a temp-file-plus-rename write instead of `redis`
/// (see the dropped-dependency note in the grounding ledger).
pub struct PersistenceWriter {
    path: PathBuf,
    last_save: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for PersistenceWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceWriter")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl PersistenceWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_save: Mutex::new(None),
        }
    }

    /// Load a snapshot from disk, rejecting a version mismatch or an entry
    /// older than 24 h (spec §4.5 "reject if version mismatch or `savedAt`
    /// older than 24 h"). A missing or corrupted file is logged and treated
    /// as "no snapshot" rather than surfaced as an error (spec §8 "Persistence
    /// file corrupted: initial load logs and proceeds with empty caches").
    pub async fn load(&self) -> Option<LoadedSnapshot> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to read snapshot file");
                return None;
            }
        };

        let file: SnapshotFile = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "snapshot file is corrupted, ignoring");
                return None;
            }
        };

        if file.version != SNAPSHOT_VERSION {
            tracing::warn!(
                found = %file.version,
                expected = SNAPSHOT_VERSION,
                "snapshot version mismatch, discarding"
            );
            return None;
        }

        let age = match (Utc::now() - file.last_updated).to_std() {
            Ok(age) => age,
            Err(_) => Duration::ZERO,
        };
        if age > MAX_SNAPSHOT_AGE {
            tracing::info!(age_secs = age.as_secs(), "snapshot too old, discarding");
            return None;
        }

        let fiat_rates = file
            .mastercard_rates
            .into_iter()
            .filter_map(|(key, rate)| parse_mastercard_key(&key).map(|currency| (currency, rate)))
            .collect();

        Some(LoadedSnapshot {
            spot_books: file.bybit_rates,
            fiat_rates,
            bybit_last_update: file.bybit_last_update,
            mastercard_last_update: file.mastercard_last_update,
        })
    }

    /// Save iff at least [`MIN_SAVE_INTERVAL`] has elapsed since the last
    /// successful save (spec §4.5 "a minimum inter-save interval (~30 s) is
    /// enforced"). Returns `Ok(false)` when the save was skipped.
    pub async fn maybe_save(&self, cache: &RateCache) -> Result<bool, PersistenceError> {
        {
            let mut last_save = self.last_save.lock().await;
            let due = last_save.is_none_or(|t| t.elapsed() >= MIN_SAVE_INTERVAL);
            if !due {
                return Ok(false);
            }
            *last_save = Some(Instant::now());
        }
        self.save(cache).await?;
        Ok(true)
    }

    /// Serialize the cache's current rate maps and write them atomically:
    /// write to a sibling temp file, then rename over the target path (spec
    /// §4.5 "write to a sibling temp file, close, atomically rename over the
    /// target path").
    pub async fn save(&self, cache: &RateCache) -> Result<(), PersistenceError> {
        let (spot_books, fiat_rates) = cache.snapshot_for_persistence();
        let mastercard_rates = fiat_rates
            .iter()
            .map(|(currency, rate)| (mastercard_key(currency), *rate))
            .collect();

        let file = SnapshotFile {
            version: SNAPSHOT_VERSION.to_string(),
            last_updated: Utc::now(),
            bybit_last_update: cache.provider_last_update(xchange_instrument::ProviderId::Spot),
            mastercard_last_update: cache.provider_last_update(xchange_instrument::ProviderId::Fiat),
            bybit_rates: spot_books,
            mastercard_rates,
        };

        let body = serde_json::to_vec_pretty(&file)?;
        let tmp_path = temp_path(&self.path);
        tokio::fs::write(&tmp_path, &body).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Level;
    use rust_decimal_macros::dec;
    use xchange_instrument::CurrencyTable;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("xchange-persistence-test-{name}-{}.json", std::process::id()))
    }

    fn cache_with_data() -> RateCache {
        let cache = RateCache::new(CurrencyTable::new(Currency::new("RUB"), Currency::new("TON")));
        let book = SpotBook::from_raw(
            "TONUSDT",
            vec![Level::new(dec!(4.9), dec!(10))],
            vec![Level::new(dec!(5.0), dec!(10))],
            Utc::now(),
            None,
        )
        .unwrap();
        cache.publish_spot_batch(vec![book]);
        let mut rates = HashMap::new();
        rates.insert(Currency::new("EUR"), dec!(0.9));
        cache.publish_fiat_batch(rates);
        cache
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let path = temp_file("roundtrip");
        let writer = PersistenceWriter::new(&path);
        let cache = cache_with_data();
        writer.save(&cache).await.unwrap();

        let loaded = writer.load().await.unwrap();
        assert!(loaded.spot_books.contains_key("TONUSDT"));
        assert_eq!(loaded.fiat_rates.get(&Currency::new("EUR")), Some(&dec!(0.9)));
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let path = temp_file("missing");
        let writer = PersistenceWriter::new(&path);
        assert!(writer.load().await.is_none());
    }

    #[tokio::test]
    async fn corrupted_file_loads_as_none() {
        let path = temp_file("corrupted");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let writer = PersistenceWriter::new(&path);
        assert!(writer.load().await.is_none());
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn stale_snapshot_is_discarded() {
        let path = temp_file("stale");
        let file = SnapshotFile {
            version: SNAPSHOT_VERSION.to_string(),
            last_updated: Utc::now() - chrono::Duration::hours(25),
            bybit_last_update: None,
            mastercard_last_update: None,
            bybit_rates: HashMap::new(),
            mastercard_rates: HashMap::new(),
        };
        tokio::fs::write(&path, serde_json::to_vec(&file).unwrap()).await.unwrap();
        let writer = PersistenceWriter::new(&path);
        assert!(writer.load().await.is_none());
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn second_save_within_interval_is_skipped() {
        let path = temp_file("interval");
        let writer = PersistenceWriter::new(&path);
        let cache = cache_with_data();
        assert!(writer.maybe_save(&cache).await.unwrap());
        assert!(!writer.maybe_save(&cache).await.unwrap());
        tokio::fs::remove_file(&path).await.ok();
    }
}
