use crate::error::{EthynylError, Result};
use crate::reaction::types::ReactionRecord;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

/// Sink for completed reactions.
///
/// `record_reaction` is called by the coordinator once per radical, in
/// sequence order. `flush` is called exactly once, after every leftover
/// worker has been drained.
pub trait ReactionLog: Send + Sync {
    fn record_reaction(&self, record: &ReactionRecord) -> Result<()>;
    fn flush(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JournalFormat {
    #[default]
    Text,
    Json,
}

struct JournalState {
    records: Vec<ReactionRecord>,
    dropped: u64,
    flushed: bool,
    sink: Box<dyn Write + Send>,
}

/// Bounded, append-only reaction log dumped to a sink on flush.
pub struct ReactionJournal {
    max_lines: usize,
    format: JournalFormat,
    state: Mutex<JournalState>,
}

impl ReactionJournal {
    pub fn new(sink: Box<dyn Write + Send>, max_lines: usize, format: JournalFormat) -> Result<Self> {
        if max_lines == 0 {
            return Err(EthynylError::Configuration(
                "reaction journal needs room for at least one line".to_string(),
            ));
        }
        Ok(Self {
            max_lines,
            format,
            state: Mutex::new(JournalState {
                records: Vec::new(),
                dropped: 0,
                flushed: false,
                sink,
            }),
        })
    }

    pub fn stdout(max_lines: usize, format: JournalFormat) -> Result<Self> {
        Self::new(Box::new(std::io::stdout()), max_lines, format)
    }

    pub fn to_file<P: AsRef<Path>>(path: P, max_lines: usize, format: JournalFormat) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            EthynylError::ResourceExhaustion(format!(
                "cannot open reaction journal {}: {e}",
                path.display()
            ))
        })?;
        Self::new(Box::new(BufWriter::new(file)), max_lines, format)
    }

    /// Keeps records in memory and throws the rendered dump away.
    pub fn discard(max_lines: usize) -> Result<Self> {
        Self::new(Box::new(std::io::sink()), max_lines, JournalFormat::Text)
    }

    pub fn records(&self) -> Result<Vec<ReactionRecord>> {
        Ok(self.lock()?.records.clone())
    }

    /// Records that arrived after the journal was full.
    pub fn dropped(&self) -> Result<u64> {
        Ok(self.lock()?.dropped)
    }

    pub fn is_flushed(&self) -> Result<bool> {
        Ok(self.lock()?.flushed)
    }

    fn lock(&self) -> Result<MutexGuard<'_, JournalState>> {
        self.state
            .lock()
            .map_err(|_| EthynylError::invariant("reaction journal lock poisoned"))
    }

    fn render(&self, state: &mut JournalState) -> Result<()> {
        let JournalState {
            records, dropped, sink, ..
        } = state;

        match self.format {
            JournalFormat::Text => {
                writeln!(sink, "{}", "=".repeat(60))?;
                writeln!(
                    sink,
                    "Ethynyl radical log - {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
                )?;
                writeln!(sink, "{}", "=".repeat(60))?;
                for record in records.iter() {
                    writeln!(sink, "{record}")?;
                }
                if *dropped > 0 {
                    writeln!(sink, "... {dropped} more radicals not shown")?;
                }
            }
            JournalFormat::Json => {
                for record in records.iter() {
                    let line = serde_json::to_string(record).map_err(std::io::Error::other)?;
                    writeln!(sink, "{line}")?;
                }
            }
        }
        sink.flush()?;
        Ok(())
    }
}

impl ReactionLog for ReactionJournal {
    fn record_reaction(&self, record: &ReactionRecord) -> Result<()> {
        let mut state = self.lock()?;
        if state.flushed {
            return Err(EthynylError::invariant(format!(
                "radical {} recorded after the journal was flushed",
                record.sequence
            )));
        }
        if state.records.len() >= self.max_lines {
            state.dropped += 1;
            return Ok(());
        }
        state.records.push(record.clone());
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.flushed {
            return Err(EthynylError::invariant("reaction journal flushed twice"));
        }
        state.flushed = true;
        if state.dropped > 0 {
            warn!(
                capacity = self.max_lines,
                dropped = state.dropped,
                "Reaction journal full, later radicals omitted from the dump"
            );
        }
        self.render(&mut state)?;
        info!(lines = state.records.len(), format = ?self.format, "Reaction journal flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn record(sequence: u64) -> ReactionRecord {
        ReactionRecord {
            sequence,
            first_carbon: 1,
            second_carbon: 2,
            hydrogen: sequence as u32,
            trigger: format!("h{sequence:03}"),
        }
    }

    #[test]
    fn test_text_dump() {
        let buffer = SharedBuffer::default();
        let journal = ReactionJournal::new(Box::new(buffer.clone()), 10, JournalFormat::Text).unwrap();

        journal.record_reaction(&record(1)).unwrap();
        journal.record_reaction(&record(2)).unwrap();
        assert!(buffer.contents().is_empty());

        journal.flush().unwrap();
        let output = buffer.contents();
        assert!(output.contains("Ethynyl radical log"));
        assert!(output.contains("0001: c001 c002 h001 (trigger h001)"));
        assert!(output.contains("0002: c001 c002 h002 (trigger h002)"));
    }

    #[test]
    fn test_json_dump() {
        let buffer = SharedBuffer::default();
        let journal = ReactionJournal::new(Box::new(buffer.clone()), 10, JournalFormat::Json).unwrap();

        journal.record_reaction(&record(1)).unwrap();
        journal.flush().unwrap();

        let output = buffer.contents();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: ReactionRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, record(1));
    }

    #[test]
    fn test_capacity_limit() {
        let buffer = SharedBuffer::default();
        let journal = ReactionJournal::new(Box::new(buffer.clone()), 2, JournalFormat::Text).unwrap();

        for sequence in 1..=5 {
            journal.record_reaction(&record(sequence)).unwrap();
        }
        assert_eq!(journal.records().unwrap().len(), 2);
        assert_eq!(journal.dropped().unwrap(), 3);

        journal.flush().unwrap();
        assert!(buffer.contents().contains("3 more radicals not shown"));
    }

    #[test]
    fn test_flush_only_once() {
        let journal = ReactionJournal::discard(4).unwrap();
        journal.flush().unwrap();
        assert!(journal.is_flushed().unwrap());

        assert!(journal.flush().unwrap_err().is_invariant_violation());
        assert!(journal.record_reaction(&record(1)).is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = ReactionJournal::discard(0).err().unwrap();
        assert!(matches!(err, EthynylError::Configuration(_)));
    }
}
