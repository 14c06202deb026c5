//! # Fact Log
//!
//! Durable, tamper-evident persistence for recorded facts. Each
//! [`FactRecord`] carries its sequence number, the digest of the previous
//! record and its own digest over the canonical JSON of
//! `(sequence, fact, prev_digest)`. Replaying a log verifies the chain, so a
//! deleted, reordered or edited record is detected at startup.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use vos_core::{sha256_digest, CanonicalBytes, ContentDigest};

use crate::error::{FactError, FactResult};
use crate::fact::Fact;

/// Destination for recorded facts. Called under the store's write lock, in
/// sequence order.
pub trait FactSink: Send + Sync {
    fn append(&self, sequence: u64, fact: &Fact) -> FactResult<()>;
}

/// One persisted fact with its hash-chain link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    pub sequence: u64,
    pub fact: Fact,
    pub prev_digest: Option<ContentDigest>,
    pub digest: ContentDigest,
}

#[derive(Serialize)]
struct RecordBody<'a> {
    sequence: u64,
    fact: &'a Fact,
    prev_digest: Option<&'a ContentDigest>,
}

fn body_digest(
    sequence: u64,
    fact: &Fact,
    prev_digest: Option<&ContentDigest>,
) -> FactResult<ContentDigest> {
    let body = RecordBody {
        sequence,
        fact,
        prev_digest,
    };
    Ok(sha256_digest(&CanonicalBytes::new(&body)?))
}

impl FactRecord {
    /// Build the record that follows `prev_digest` in the chain.
    pub fn seal(sequence: u64, fact: Fact, prev_digest: Option<ContentDigest>) -> FactResult<Self> {
        let digest = body_digest(sequence, &fact, prev_digest.as_ref())?;
        Ok(Self {
            sequence,
            fact,
            prev_digest,
            digest,
        })
    }

    fn verify_digest(&self) -> FactResult<()> {
        let expected = body_digest(self.sequence, &self.fact, self.prev_digest.as_ref())?;
        if expected != self.digest {
            return Err(FactError::ChainBroken {
                sequence: self.sequence,
                reason: "record digest does not match its contents".to_string(),
            });
        }
        Ok(())
    }
}

/// Verify sequence continuity, chain links and digests of a record list.
pub fn verify_chain(records: &[FactRecord]) -> FactResult<()> {
    let mut prev: Option<&FactRecord> = None;
    for record in records {
        record.verify_digest()?;
        match prev {
            None => {
                if record.prev_digest.is_some() {
                    return Err(FactError::ChainBroken {
                        sequence: record.sequence,
                        reason: "first record links to a predecessor".to_string(),
                    });
                }
            }
            Some(p) => {
                if record.sequence != p.sequence + 1 {
                    return Err(FactError::ChainBroken {
                        sequence: record.sequence,
                        reason: format!("expected sequence {}", p.sequence + 1),
                    });
                }
                if record.prev_digest.as_ref() != Some(&p.digest) {
                    return Err(FactError::ChainBroken {
                        sequence: record.sequence,
                        reason: "previous digest does not match".to_string(),
                    });
                }
            }
        }
        prev = Some(record);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// MemoryFactLog
// ---------------------------------------------------------------------------

/// In-process hash-chained log.
#[derive(Debug, Default)]
pub struct MemoryFactLog {
    records: Mutex<Vec<FactRecord>>,
}

impl MemoryFactLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FactRecord> {
        self.records.lock().clone()
    }

    pub fn head(&self) -> Option<ContentDigest> {
        self.records.lock().last().map(|r| r.digest)
    }
}

impl FactSink for MemoryFactLog {
    fn append(&self, sequence: u64, fact: &Fact) -> FactResult<()> {
        let mut records = self.records.lock();
        let prev = records.last().map(|r| r.digest);
        records.push(FactRecord::seal(sequence, fact.clone(), prev)?);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonlFactLog
// ---------------------------------------------------------------------------

struct JsonlState {
    file: File,
    head: Option<ContentDigest>,
}

/// Append-only JSON-lines fact log on disk.
pub struct JsonlFactLog {
    path: PathBuf,
    state: Mutex<JsonlState>,
}

impl std::fmt::Debug for JsonlFactLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlFactLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl JsonlFactLog {
    /// Open (creating if absent) a log for appending. Existing records are
    /// verified and returned so the caller can restore the store from them.
    pub fn open(path: &Path) -> FactResult<(Self, Vec<FactRecord>)> {
        let existing = if path.exists() {
            Self::read(path)?
        } else {
            Vec::new()
        };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let head = existing.last().map(|r| r.digest);
        tracing::info!(path = %path.display(), records = existing.len(), "fact log opened");
        Ok((
            Self {
                path: path.to_path_buf(),
                state: Mutex::new(JsonlState { file, head }),
            },
            existing,
        ))
    }

    /// Read and verify every record in a log file.
    pub fn read(path: &Path) -> FactResult<Vec<FactRecord>> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FactError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                FactError::Io(e)
            }
        })?;
        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: FactRecord =
                serde_json::from_str(&line).map_err(|source| FactError::MalformedRecord {
                    line: index + 1,
                    source,
                })?;
            records.push(record);
        }
        verify_chain(&records)?;
        Ok(records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FactSink for JsonlFactLog {
    fn append(&self, sequence: u64, fact: &Fact) -> FactResult<()> {
        let mut state = self.state.lock();
        let record = FactRecord::seal(sequence, fact.clone(), state.head)?;
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        state.file.write_all(&line)?;
        state.file.flush()?;
        state.head = Some(record.digest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vos_core::{Decimal, FactValue, MetricName, ProductId};

    fn fact(n: i64) -> Fact {
        Fact::new(
            ProductId::new("acme").unwrap(),
            MetricName::new("spend").unwrap(),
            FactValue::Currency(Decimal::from_int(n)),
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        )
    }

    #[test]
    fn memory_log_builds_a_valid_chain() {
        let log = MemoryFactLog::new();
        for i in 0..3 {
            log.append(i, &fact(i as i64)).unwrap();
        }
        let records = log.records();
        verify_chain(&records).unwrap();
        assert_eq!(records[1].prev_digest, Some(records[0].digest));
        assert_eq!(log.head(), Some(records[2].digest));
    }

    #[test]
    fn tampered_value_breaks_chain() {
        let log = MemoryFactLog::new();
        for i in 0..3 {
            log.append(i, &fact(i as i64)).unwrap();
        }
        let mut records = log.records();
        records[1].fact.value = FactValue::Currency(Decimal::from_int(999));
        let err = verify_chain(&records).unwrap_err();
        assert!(matches!(err, FactError::ChainBroken { sequence: 1, .. }));
    }

    #[test]
    fn removed_record_breaks_chain() {
        let log = MemoryFactLog::new();
        for i in 0..3 {
            log.append(i, &fact(i as i64)).unwrap();
        }
        let mut records = log.records();
        records.remove(1);
        assert!(verify_chain(&records).is_err());
    }

    #[test]
    fn jsonl_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.jsonl");

        let (log, existing) = JsonlFactLog::open(&path).unwrap();
        assert!(existing.is_empty());
        log.append(0, &fact(1)).unwrap();
        log.append(1, &fact(2)).unwrap();
        drop(log);

        let (log, existing) = JsonlFactLog::open(&path).unwrap();
        assert_eq!(existing.len(), 2);
        log.append(2, &fact(3)).unwrap();
        drop(log);

        let records = JsonlFactLog::read(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].prev_digest, Some(records[1].digest));
    }

    #[test]
    fn jsonl_log_rejects_edited_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.jsonl");
        let (log, _) = JsonlFactLog::open(&path).unwrap();
        log.append(0, &fact(100)).unwrap();
        drop(log);

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replace("\"100\"", "\"1\"")).unwrap();
        assert!(matches!(
            JsonlFactLog::read(&path),
            Err(FactError::ChainBroken { .. })
        ));
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();
        assert!(matches!(
            JsonlFactLog::read(&path),
            Err(FactError::MalformedRecord { line: 1, .. })
        ));
    }
}
