//! Self-describing line-oriented record output.

use std::fmt;
use std::io::{self, BufWriter, Stdout, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Sink;
use crate::domain::Record;
use crate::error::{Result, StreamPrintError};

/// Serialization used for each emitted record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// One YAML document per record, each starting with `---`
    Yaml,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = StreamPrintError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "jsonl" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            other => Err(StreamPrintError::InvalidFormat(other.to_string())),
        }
    }
}

/// Callback receiving sink failures.
pub type ErrorReporter = Box<dyn FnMut(&StreamPrintError) + Send>;

fn log_error(err: &StreamPrintError) {
    tracing::warn!(error = %err, "error writing record for output print");
}

/// Renders each record as a flat field map, writes it, and flushes.
pub struct EncodingSink<W: Write> {
    out: BufWriter<W>,
    format: OutputFormat,
    on_error: ErrorReporter,
    emitted: u64,
    failures: u64,
}

impl EncodingSink<Stdout> {
    /// Sink writing to standard output.
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write> EncodingSink<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            out: BufWriter::new(writer),
            format,
            on_error: Box::new(log_error),
            emitted: 0,
            failures: 0,
        }
    }

    /// Replace the default logging error reporter.
    pub fn with_error_reporter(mut self, reporter: impl FnMut(&StreamPrintError) + Send + 'static) -> Self {
        self.on_error = Box::new(reporter);
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Records fully written and flushed.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Encode or flush failures reported so far.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.out
            .into_inner()
            .map_err(|e| StreamPrintError::Io(e.into_error()))
    }

    fn encode(&mut self, record: &Record) -> Result<()> {
        let fields = record.to_raw_map();
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, &fields)?;
                self.out.write_all(b"\n")?;
            }
            OutputFormat::Yaml => {
                self.out.write_all(b"---\n")?;
                serde_yaml::to_writer(&mut self.out, &fields)?;
            }
        }
        Ok(())
    }

    fn report(&mut self, err: StreamPrintError) {
        self.failures += 1;
        (self.on_error)(&err);
    }
}

impl<W: Write + Send> Sink for EncodingSink<W> {
    fn emit(&mut self, record: &Record) {
        let encoded = self.encode(record);
        // Flush even after a failed encode so nothing rendered stays buffered.
        let flushed = self.out.flush();

        match (encoded, flushed) {
            (Ok(()), Ok(())) => self.emitted += 1,
            (encoded, flushed) => {
                if let Err(e) = encoded {
                    self.report(e);
                }
                if let Err(e) = flushed {
                    self.report(StreamPrintError::Io(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Field, Value};
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    fn record() -> Record {
        let mut nested = BTreeMap::new();
        nested.insert("k".to_string(), Value::Int(1));
        Record::new(vec![
            Field::new("id", 7i64),
            Field::new("name", "alice"),
            Field::new("missing", Value::Null),
            Field::new("meta", Value::Object(nested)),
        ])
        .unwrap()
    }

    /// Writer that accepts nothing.
    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    /// Writer that records how many times it was flushed.
    #[derive(Clone, Default)]
    struct FlushCounter {
        bytes: Arc<Mutex<Vec<u8>>>,
        flushes: Arc<Mutex<usize>>,
    }

    impl Write for FlushCounter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.bytes.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            *self.flushes.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn test_json_lines_output() {
        let mut sink = EncodingSink::new(Vec::new(), OutputFormat::Json);
        sink.emit(&record());
        sink.emit(&record());
        assert_eq!(sink.emitted(), 2);

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!({"id": 7, "name": "alice", "missing": null, "meta": {"k": 1}})
        );
    }

    #[test]
    fn test_yaml_documents_output() {
        let mut sink = EncodingSink::new(Vec::new(), OutputFormat::Yaml);
        sink.emit(&record());
        sink.emit(&record());

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert!(out.starts_with("---\n"));
        assert_eq!(out.matches("---\n").count(), 2);
        assert!(out.contains("name: alice"));
    }

    #[test]
    fn test_flushes_after_every_record() {
        let writer = FlushCounter::default();
        let mut sink = EncodingSink::new(writer.clone(), OutputFormat::Json);
        sink.emit(&record());
        assert_eq!(*writer.flushes.lock().unwrap(), 1);
        assert!(!writer.bytes.lock().unwrap().is_empty());
        sink.emit(&record());
        assert_eq!(*writer.flushes.lock().unwrap(), 2);
    }

    #[test]
    fn test_write_failure_reported_not_raised() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink_reported = Arc::clone(&reported);
        let mut sink = EncodingSink::new(BrokenWriter, OutputFormat::Json)
            .with_error_reporter(move |e| sink_reported.lock().unwrap().push(e.to_string()));

        sink.emit(&record());

        assert_eq!(sink.emitted(), 0);
        assert!(sink.failures() >= 1);
        let reported = reported.lock().unwrap();
        assert!(!reported.is_empty());
        assert!(reported.iter().any(|m| m.contains("pipe closed")));
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("YAML".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert_eq!("yml".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert!(matches!(
            "csv".parse::<OutputFormat>(),
            Err(StreamPrintError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Json.to_string(), "json");
        assert_eq!(OutputFormat::Yaml.to_string(), "yaml");
        assert_eq!(OutputFormat::default(), OutputFormat::Json);
    }
}
