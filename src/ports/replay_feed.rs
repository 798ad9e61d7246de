use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::pairtrade::{Bar, Leg, LegSymbols};

// One line of a bar dump: {"symbol": "...", "close": 123.4, "ts": 1704067200000}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRecord {
    pub symbol: String,
    pub close: f64,
    pub ts: i64,
}

impl BarRecord {
    pub fn to_bar(&self, symbols: LegSymbols<'_>) -> Option<Bar> {
        let leg = if self.symbol == symbols.a {
            Leg::A
        } else if self.symbol == symbols.b {
            Leg::B
        } else {
            return None;
        };
        Some(Bar {
            leg,
            close: self.close,
            ts: self.ts,
        })
    }
}

/// Bars read from a JSONL dump, replayed in file order.
#[derive(Debug)]
pub struct BarReplay {
    bars: Vec<Bar>,
    cursor: usize,
    skipped: usize,
}

impl BarReplay {
    pub fn from_path<P: AsRef<Path>>(path: P, symbols: LegSymbols<'_>) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .with_context(|| format!("failed to open replay file {}", path_ref.display()))?;
        Self::from_reader(BufReader::new(file), symbols)
            .with_context(|| format!("failed to load replay file {}", path_ref.display()))
    }

    pub fn from_reader<R: BufRead>(reader: R, symbols: LegSymbols<'_>) -> Result<Self> {
        let mut bars = Vec::new();
        let mut skipped = 0;
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.context("failed to read replay line")?;
            if line.trim().is_empty() {
                continue;
            }
            let record: BarRecord = serde_json::from_str(&line).with_context(|| {
                format!("failed to parse replay entry {} '{}'", line_no + 1, line)
            })?;
            match record.to_bar(symbols) {
                Some(bar) => bars.push(bar),
                None => skipped += 1,
            }
        }
        if bars.is_empty() {
            return Err(anyhow!(
                "replay data has no bars for {} or {}",
                symbols.a,
                symbols.b
            ));
        }
        if skipped > 0 {
            log::debug!("[REPLAY] skipped {} bars for other symbols", skipped);
        }
        Ok(Self {
            bars,
            cursor: 0,
            skipped,
        })
    }

    pub fn from_bars(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            cursor: 0,
            skipped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Lines whose symbol matched neither leg.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn remaining(&self) -> usize {
        self.bars.len().saturating_sub(self.cursor)
    }

    pub fn current_timestamp_secs(&self) -> Option<i64> {
        self.bars.get(self.cursor).map(|b| b.ts / 1000) // stored as ms
    }
}

impl Iterator for BarReplay {
    type Item = Bar;

    fn next(&mut self) -> Option<Bar> {
        let bar = self.bars.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(bar)
    }
}

pub fn write_bars_jsonl<W: Write>(
    mut writer: W,
    bars: &[Bar],
    symbols: LegSymbols<'_>,
) -> Result<()> {
    for bar in bars {
        let symbol = match bar.leg {
            Leg::A => symbols.a,
            Leg::B => symbols.b,
        };
        let record = BarRecord {
            symbol: symbol.to_string(),
            close: bar.close,
            ts: bar.ts,
        };
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SYMBOLS: LegSymbols<'static> = LegSymbols {
        a: "BTCUSDT-PERP",
        b: "ETHUSDT-PERP",
    };

    #[test]
    fn maps_symbols_to_legs_and_skips_others() {
        let raw = r#"{"symbol":"BTCUSDT-PERP","close":40000.5,"ts":1000}
{"symbol":"SOLUSDT-PERP","close":90.0,"ts":1000}

{"symbol":"ETHUSDT-PERP","close":2500.25,"ts":1000}
"#;
        let mut replay = BarReplay::from_reader(Cursor::new(raw), SYMBOLS).unwrap();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay.skipped(), 1);
        assert_eq!(replay.current_timestamp_secs(), Some(1));
        assert_eq!(
            replay.next(),
            Some(Bar {
                leg: Leg::A,
                close: 40000.5,
                ts: 1000
            })
        );
        assert_eq!(replay.next().map(|b| b.leg), Some(Leg::B));
        assert_eq!(replay.remaining(), 0);
        assert_eq!(replay.next(), None);
    }

    #[test]
    fn malformed_line_is_an_error() {
        let raw = "{\"symbol\":\"BTCUSDT-PERP\",\"close\":\"abc\",\"ts\":1}\n";
        assert!(BarReplay::from_reader(Cursor::new(raw), SYMBOLS).is_err());
    }

    #[test]
    fn file_without_matching_bars_is_an_error() {
        let raw = "{\"symbol\":\"XRP\",\"close\":1.0,\"ts\":1}\n";
        assert!(BarReplay::from_reader(Cursor::new(raw), SYMBOLS).is_err());
    }

    #[test]
    fn written_file_replays_in_order() {
        let bars = vec![
            Bar {
                leg: Leg::A,
                close: 100.0,
                ts: 0,
            },
            Bar {
                leg: Leg::B,
                close: 50.0,
                ts: 0,
            },
            Bar {
                leg: Leg::A,
                close: 101.0,
                ts: 60_000,
            },
        ];
        let file = tempfile::NamedTempFile::new().unwrap();
        write_bars_jsonl(File::create(file.path()).unwrap(), &bars, SYMBOLS).unwrap();
        let replay = BarReplay::from_path(file.path(), SYMBOLS).unwrap();
        assert_eq!(replay.collect::<Vec<_>>(), bars);
    }
}
