//! Per-tick telemetry sinks
//!
//! The CSV layout keeps the first five columns of the historical tracking
//! logs (`timestamp_iso`, `target_found`, `error_x_px`, `angle_x_deg`,
//! `contour_area_px`) so existing plotting scripts keep working.

use crate::error::ServoError;
use chrono::{DateTime, Local};
use pantrack_core::{TelemetryConfig, TelemetryFormat, TelemetrySnapshot};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const CSV_HEADER: &str = "timestamp_iso,target_found,error_x_px,angle_x_deg,contour_area_px,\
target_x_px,target_y_px,raw_angle,smoothed_angle,command_sent";

pub trait TelemetrySink {
    fn record(&mut self, snapshot: &TelemetrySnapshot) -> Result<(), ServoError>;

    fn flush(&mut self) -> Result<(), ServoError> {
        Ok(())
    }
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Box<S> {
    fn record(&mut self, snapshot: &TelemetrySnapshot) -> Result<(), ServoError> {
        (**self).record(snapshot)
    }

    fn flush(&mut self) -> Result<(), ServoError> {
        (**self).flush()
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&mut self, _snapshot: &TelemetrySnapshot) -> Result<(), ServoError> {
        Ok(())
    }
}

/// Keeps snapshots in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub snapshots: Vec<TelemetrySnapshot>,
}

impl TelemetrySink for MemorySink {
    fn record(&mut self, snapshot: &TelemetrySnapshot) -> Result<(), ServoError> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }
}

pub struct CsvSink<W: Write> {
    writer: W,
    rows: u64,
}

impl CsvSink<BufWriter<File>> {
    /// Create `tracking_log_<local timestamp>.csv` under `dir`.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, ServoError> {
        let path = log_path(dir.as_ref(), "csv", Local::now())?;
        info!("Writing CSV telemetry to {}", path.display());
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(mut writer: W) -> Result<Self, ServoError> {
        writeln!(writer, "{}", CSV_HEADER)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(mut self) -> Result<W, ServoError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> TelemetrySink for CsvSink<W> {
    fn record(&mut self, s: &TelemetrySnapshot) -> Result<(), ServoError> {
        let command = s.command_sent.map(|c| c.to_string()).unwrap_or_default();
        writeln!(
            self.writer,
            "{},{},{},{:.4},{},{},{},{:.4},{:.4},{}",
            s.timestamp.to_rfc3339(),
            s.target_found() as u8,
            s.error_x_px,
            s.angle_x_deg,
            s.contour_area_px,
            s.detection.x,
            s.detection.y,
            s.raw_angle,
            s.smoothed_angle,
            command
        )?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ServoError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// One JSON object per line, the full snapshot.
pub struct JsonlSink<W: Write> {
    writer: W,
}

impl JsonlSink<BufWriter<File>> {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, ServoError> {
        let path = log_path(dir.as_ref(), "jsonl", Local::now())?;
        info!("Writing JSONL telemetry to {}", path.display());
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(mut self) -> Result<W, ServoError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> TelemetrySink for JsonlSink<W> {
    fn record(&mut self, snapshot: &TelemetrySnapshot) -> Result<(), ServoError> {
        serde_json::to_writer(&mut self.writer, snapshot)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ServoError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Build the sink the configuration asks for.
pub fn open_sink(config: &TelemetryConfig) -> Result<Box<dyn TelemetrySink>, ServoError> {
    Ok(match config.format {
        TelemetryFormat::Csv => Box::new(CsvSink::create(&config.directory)?),
        TelemetryFormat::Jsonl => Box::new(JsonlSink::create(&config.directory)?),
        TelemetryFormat::Off => Box::new(NullSink),
    })
}

fn log_path(dir: &Path, extension: &str, at: DateTime<Local>) -> Result<PathBuf, ServoError> {
    fs::create_dir_all(dir)?;
    Ok(dir.join(format!(
        "tracking_log_{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        extension
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pantrack_core::{DetectionResult, ThresholdConfig};

    fn snapshot(found: bool, command: Option<i32>) -> TelemetrySnapshot {
        let detection = if found {
            DetectionResult::at(700, 360, 1500.0)
        } else {
            DetectionResult::not_found()
        };
        TelemetrySnapshot {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            frame_width: 1280,
            frame_height: 720,
            detection,
            center_x: 640,
            center_y: 360,
            error_x_px: if found { 60 } else { 0 },
            angle_x_deg: if found { 2.8125 } else { 0.0 },
            contour_area_px: detection.area,
            threshold: ThresholdConfig::default(),
            raw_angle: 88.59375,
            smoothed_angle: 89.5078125,
            command_sent: command,
        }
    }

    #[test]
    fn test_csv_rows() {
        let mut sink = CsvSink::new(Vec::new()).unwrap();
        sink.record(&snapshot(true, Some(90))).unwrap();
        sink.record(&snapshot(false, None)).unwrap();
        assert_eq!(sink.rows(), 2);

        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "2024-03-01T12:00:00+00:00,1,60,2.8125,1500,700,360,88.5938,89.5078,90"
        );
        assert!(lines[2].starts_with("2024-03-01T12:00:00+00:00,0,0,0.0000,0,"));
        assert!(lines[2].ends_with(','));
    }

    #[test]
    fn test_jsonl_round_trip() {
        let mut sink = JsonlSink::new(Vec::new());
        let original = snapshot(true, Some(90));
        sink.record(&original).unwrap();
        sink.record(&snapshot(false, None)).unwrap();

        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let first: TelemetrySnapshot = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first, original);
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_log_path_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(dir.path(), "csv", at).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "tracking_log_20240301_090507.csv"
        );
    }

    #[test]
    fn test_open_sink_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = TelemetryConfig {
            format: TelemetryFormat::Csv,
            directory: dir.path().join("logs"),
        };
        let mut sink = open_sink(&config).unwrap();
        sink.record(&snapshot(true, None)).unwrap();
        sink.flush().unwrap();

        let files: Vec<_> = fs::read_dir(dir.path().join("logs")).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_off_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = TelemetryConfig {
            format: TelemetryFormat::Off,
            directory: dir.path().join("logs"),
        };
        open_sink(&config).unwrap();
        assert!(!dir.path().join("logs").exists());
    }
}
