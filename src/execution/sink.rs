//! Output sinks - where command output lines go
//!
//! Stages may run concurrently, so every sink that touches a shared writer
//! serializes writes behind a mutex. A line is always written whole.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

/// Receives output lines from running commands
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Write one line of output from `stage`
    async fn write_line(&self, stage: &str, line: &str);
}

/// Discards all output
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl OutputSink for NullSink {
    async fn write_line(&self, _stage: &str, _line: &str) {}
}

/// Writes `[stage] line` to a shared writer (stdout or a log file)
pub struct WriterSink {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl WriterSink {
    pub fn new(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Sink printing to stdout
    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }

    /// Sink appending to a log file
    pub fn file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(Box::new(tokio::fs::File::from_std(file))))
    }
}

#[async_trait]
impl OutputSink for WriterSink {
    async fn write_line(&self, stage: &str, line: &str) {
        let text = format!("[{}] {}\n", stage, line);
        let mut writer = self.writer.lock().await;
        let result = match writer.write_all(text.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Failed to write output of {}: {}", stage, e);
        }
    }
}

/// Forwards every line to several sinks in turn
pub struct TeeSink {
    sinks: Vec<Arc<dyn OutputSink>>,
}

impl TeeSink {
    pub fn new(sinks: Vec<Arc<dyn OutputSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl OutputSink for TeeSink {
    async fn write_line(&self, stage: &str, line: &str) {
        for sink in &self.sinks {
            sink.write_line(stage, line).await;
        }
    }
}

/// Output of one stage: forwards lines to the sink and keeps the last few
pub struct OutputCapture {
    stage: String,
    sink: Arc<dyn OutputSink>,
    tail: Mutex<VecDeque<String>>,
    limit: usize,
}

impl OutputCapture {
    pub fn new(stage: impl Into<String>, sink: Arc<dyn OutputSink>, limit: usize) -> Self {
        Self {
            stage: stage.into(),
            sink,
            tail: Mutex::new(VecDeque::with_capacity(limit)),
            limit,
        }
    }

    /// Record one output line
    pub async fn push(&self, line: String) {
        self.sink.write_line(&self.stage, &line).await;

        if self.limit == 0 {
            return;
        }
        let mut tail = self.tail.lock().await;
        if tail.len() == self.limit {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    /// The last lines recorded, oldest first
    pub async fn tail(&self) -> Vec<String> {
        self.tail.lock().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recording {
        lines: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OutputSink for Recording {
        async fn write_line(&self, stage: &str, line: &str) {
            self.lines.lock().await.push(format!("{}|{}", stage, line));
        }
    }

    #[tokio::test]
    async fn test_capture_keeps_bounded_tail() {
        let capture = OutputCapture::new("#1 Build", Arc::new(NullSink), 2);
        for line in ["one", "two", "three"] {
            capture.push(line.to_string()).await;
        }

        assert_eq!(capture.tail().await, vec!["two".to_string(), "three".to_string()]);
    }

    #[tokio::test]
    async fn test_capture_with_zero_limit_keeps_nothing() {
        let capture = OutputCapture::new("#1 Build", Arc::new(NullSink), 0);
        capture.push("line".to_string()).await;
        assert!(capture.tail().await.is_empty());
    }

    #[tokio::test]
    async fn test_tee_forwards_to_every_sink() {
        let a = Arc::new(Recording { lines: Mutex::new(Vec::new()) });
        let b = Arc::new(Recording { lines: Mutex::new(Vec::new()) });
        let sinks: Vec<Arc<dyn OutputSink>> = vec![a.clone(), b.clone()];
        let tee = TeeSink::new(sinks);

        tee.write_line("#1 Build", "hello").await;

        assert_eq!(*a.lines.lock().await, vec!["#1 Build|hello".to_string()]);
        assert_eq!(*b.lines.lock().await, vec!["#1 Build|hello".to_string()]);
    }

    #[tokio::test]
    async fn test_writer_sink_yields_while_reader_drains() {
        use tokio::io::AsyncReadExt;

        // The pipe holds far less than one line, so the write must wait for the reader
        let (writer, mut reader) = tokio::io::duplex(8);
        let sink = WriterSink::new(Box::new(writer));
        let line = "x".repeat(256);
        let expected = format!("[#1 Build] {}\n", line);

        let read = async {
            let mut buf = vec![0u8; expected.len()];
            reader.read_exact(&mut buf).await.unwrap();
            String::from_utf8(buf).unwrap()
        };
        let (_, text) = tokio::join!(sink.write_line("#1 Build", &line), read);

        assert_eq!(text, expected);
    }

    #[tokio::test]
    async fn test_file_sink_writes_whole_lines_from_concurrent_stages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let sink = Arc::new(WriterSink::file(&path).unwrap());

        let mut tasks = Vec::new();
        for stage in 0..4 {
            let sink = sink.clone();
            tasks.push(tokio::spawn(async move {
                for n in 0..25 {
                    sink.write_line(&format!("#{}", stage), &format!("line {}", n)).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 100);
        assert!(lines.iter().all(|l| l.starts_with("[#") && l.contains("] line ")));
    }
}
