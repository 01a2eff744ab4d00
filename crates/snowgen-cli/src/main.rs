#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use std::io::{self, Write};

use anyhow::Context;
use clap::Parser;
use config::{Cli, CliConfig, Command};
use serde::{Serialize, Serializer, ser::SerializeSeq};
use snowgen::{Decomposed, IdGenerator, Layout, SystemClock};
use telemetry::init_telemetry;

#[derive(Serialize)]
struct IdRecord {
    id: i64,
    #[serde(flatten)]
    parts: Decomposed,
}

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    init_telemetry()?;

    let config = CliConfig::try_from(cli.config)?;
    tracing::debug!(?config, "resolved configuration");

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    match cli.command {
        Command::Generate { count, json } => generate(&config, count, json, &mut out)?,
        Command::Decompose { ids, json } => decompose(&config.layout, &ids, json, &mut out)?,
        Command::Layout { json } => {
            if json {
                serde_json::to_writer_pretty(&mut out, &config.layout)?;
                writeln!(out)?;
            } else {
                writeln!(out, "{}", config.layout)?;
            }
        }
    }

    out.flush()?;
    Ok(())
}

fn generate(
    config: &CliConfig,
    count: usize,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let generator = IdGenerator::new(
        config.node_id,
        config.process_id,
        config.layout,
        SystemClock,
    )?;

    let next_id = |n: usize| {
        generator
            .generate()
            .with_context(|| format!("failed to generate id {} of {count}", n + 1))
    };

    // Records are written as they are produced; `count` is never buffered.
    if json {
        let mut serializer = serde_json::Serializer::pretty(&mut *out);
        let mut records = serializer.serialize_seq(None)?;
        for n in 0..count {
            let id = next_id(n)?;
            records.serialize_element(&IdRecord {
                id,
                parts: generator.decompose(id),
            })?;
        }
        records.end()?;
        writeln!(out)?;
    } else {
        for n in 0..count {
            writeln!(out, "{}", next_id(n)?)?;
        }
    }

    tracing::info!(
        count,
        node_id = config.node_id,
        process_id = config.process_id,
        "generated ids"
    );
    Ok(())
}

fn decompose(
    layout: &Layout,
    ids: &[i64],
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let records: Vec<IdRecord> = ids
        .iter()
        .map(|&id| IdRecord {
            id,
            parts: layout.decompose(id),
        })
        .collect();

    if json {
        serde_json::to_writer_pretty(&mut *out, &records)?;
        writeln!(out)?;
    } else {
        for record in &records {
            writeln!(out, "{}: {}", record.id, record.parts)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(f: impl FnOnce(&mut Vec<u8>) -> anyhow::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn config() -> CliConfig {
        CliConfig {
            node_id: 3,
            process_id: 17,
            layout: Layout::default(),
        }
    }

    #[test]
    fn generate_prints_one_increasing_id_per_line() {
        let text = render(|out| generate(&config(), 5, false, out));
        let ids: Vec<i64> = text.lines().map(|l| l.parse().unwrap()).collect();
        assert_eq!(ids.len(), 5);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn generate_json_includes_fields() {
        let text = render(|out| generate(&config(), 2, true, out));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let records = value.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["node_id"], 3);
        assert_eq!(records[0]["process_id"], 17);
        assert!(records[1]["id"].as_i64().unwrap() > records[0]["id"].as_i64().unwrap());
    }

    /// Accepts `limit` bytes, then fails every write.
    struct CappedWriter {
        written: usize,
        limit: usize,
    }

    impl Write for CappedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written >= self.limit {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "writer full"));
            }
            let n = buf.len().min(self.limit - self.written);
            self.written += n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn generate_streams_huge_counts() {
        for json in [false, true] {
            let mut out = CappedWriter {
                written: 0,
                limit: 16 * 1024,
            };
            let err = generate(&config(), usize::MAX, json, &mut out).unwrap_err();
            assert!(format!("{err:#}").contains("writer full"), "{err:#}");
            assert_eq!(out.written, 16 * 1024);
        }
    }

    #[test]
    fn generate_json_with_zero_count_is_empty_array() {
        let text = render(|out| generate(&config(), 0, true, out));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, serde_json::json!([]));
    }

    #[test]
    fn decompose_prints_fields() {
        let layout = Layout::default();
        let id = layout.compose(snowgen::DEFAULT_EPOCH + 5, 1, 2, 3);
        let text = render(|out| decompose(&layout, &[id], false, out));
        assert_eq!(
            text.trim(),
            format!(
                "{id}: timestamp={} node=1 process=2 sequence=3",
                snowgen::DEFAULT_EPOCH + 5
            )
        );
    }
}
