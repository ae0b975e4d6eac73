// src/logging/writer.rs

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::oneshot;
use tokio::task;
use tokio::time::{self, Duration};
use tracing::{debug, warn};
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::MakeWriter;

use crate::logging::auction_log::AuctionLog;

/// 后台写入任务的参数
#[derive(Debug, Clone, Copy)]
pub struct WriterSettings {
    /// mpsc 通道容量
    pub buffer_size: usize,
    /// 攒够多少条就写盘
    pub batch_size: usize,
    /// 定时刷盘间隔
    pub flush_interval: Duration,
    /// 超过这个时长的日志文件会被清理
    pub retention: Duration,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            batch_size: 100,
            flush_interval: Duration::from_millis(1000),
            retention: Duration::from_secs(72 * 3600),
        }
    }
}

enum Command {
    Record(String),
    Flush(oneshot::Sender<()>),
}

/// **auction 日志写入器**
/// 请求路径只往通道里投递一行 JSON，批量写盘在后台任务中完成。
pub struct AuctionLogWriter {
    sender: Sender<Command>,
}

impl AuctionLogWriter {
    /// 必须在 tokio runtime 内调用
    pub fn new(log_dir: &str, file_name: &str, settings: WriterSettings) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(settings.buffer_size.max(1));
        let appender = Arc::new(rolling::hourly(log_dir, file_name));
        tokio::spawn(Self::background_writer(appender, receiver, settings));

        let log_dir = log_dir.to_string();
        tokio::spawn(async move {
            let sweep_interval = Duration::from_secs(3600);
            loop {
                cleanup_old_logs(&log_dir, settings.retention).await;
                time::sleep(sweep_interval).await;
            }
        });

        Arc::new(Self { sender })
    }

    /// 不等待：通道已满时丢弃这条记录，返回是否投递成功
    pub fn log(&self, record: &AuctionLog) -> bool {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, request_id = %record.request_id, "failed to serialize auction log");
                return false;
            }
        };
        match self.sender.try_send(Command::Record(line)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(request_id = %record.request_id, "auction log channel full, record dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(request_id = %record.request_id, "auction log writer is gone, record dropped");
                false
            }
        }
    }

    /// 把已投递的记录全部写盘后返回
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Flush(ack)).await.is_err() {
            return;
        }
        let _ = done.await;
    }

    async fn background_writer(
        appender: Arc<RollingFileAppender>,
        mut receiver: Receiver<Command>,
        settings: WriterSettings,
    ) {
        let mut buffer: Vec<String> = Vec::with_capacity(settings.batch_size);
        let mut interval = time::interval(settings.flush_interval);
        loop {
            tokio::select! {
                command = receiver.recv() => match command {
                    Some(Command::Record(line)) => {
                        buffer.push(line);
                        if buffer.len() >= settings.batch_size {
                            write_to_disk(&appender, &mut buffer).await;
                        }
                    }
                    Some(Command::Flush(ack)) => {
                        write_to_disk(&appender, &mut buffer).await;
                        let _ = ack.send(());
                    }
                    None => {
                        write_to_disk(&appender, &mut buffer).await;
                        break;
                    }
                },
                _ = interval.tick() => {
                    write_to_disk(&appender, &mut buffer).await;
                }
            }
        }
    }
}

async fn write_to_disk(appender: &Arc<RollingFileAppender>, buffer: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    let content = buffer.join("\n") + "\n";
    let lines = buffer.len();
    buffer.clear();

    let appender = Arc::clone(appender);
    let written = task::spawn_blocking(move || {
        let mut writer = appender.make_writer();
        writer.write_all(content.as_bytes())
    })
    .await;
    match written {
        Ok(Ok(())) => debug!(lines, "auction log flushed"),
        Ok(Err(e)) => warn!(error = %e, lines, "failed to write auction log"),
        Err(e) => warn!(error = %e, lines, "auction log write task failed"),
    }
}

async fn cleanup_old_logs(log_dir: &str, retention: Duration) {
    let now = SystemTime::now();
    let mut dir = match tokio::fs::read_dir(log_dir).await {
        Ok(dir) => dir,
        Err(e) => {
            warn!(error = %e, log_dir, "failed to read log directory");
            return;
        }
    };
    while let Ok(Some(entry)) = dir.next_entry().await {
        let path = entry.path();
        let expired = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => now.duration_since(modified).unwrap_or_default() > retention,
            Err(_) => false,
        };
        if expired && is_log_file(&path) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "deleted old log file"),
                Err(e) => warn!(error = %e, path = %path.display(), "failed to delete old log file"),
            }
        }
    }
}

fn is_log_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.contains(".json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("rust-hb-log-{}", uuid::Uuid::new_v4()))
    }

    fn read_all(dir: &Path) -> String {
        let mut content = String::new();
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            content.push_str(&std::fs::read_to_string(path).unwrap());
        }
        content
    }

    #[tokio::test]
    async fn flush_writes_every_queued_record() {
        let dir = temp_dir();
        let settings = WriterSettings {
            batch_size: 100,
            flush_interval: Duration::from_secs(3600),
            ..WriterSettings::default()
        };
        let writer = AuctionLogWriter::new(dir.to_str().unwrap(), "auction_log.json", settings);
        for id in ["a1", "a2", "a3"] {
            assert!(writer.log(&AuctionLog::new(id)));
        }
        writer.flush().await;

        let content = read_all(&dir);
        let ids: Vec<String> = content
            .lines()
            .map(|l| serde_json::from_str::<AuctionLog>(l).unwrap().request_id)
            .collect();
        assert_eq!(ids, vec!["a1", "a2", "a3"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn full_batches_are_written_without_flush() {
        let dir = temp_dir();
        let settings = WriterSettings {
            batch_size: 2,
            flush_interval: Duration::from_secs(3600),
            ..WriterSettings::default()
        };
        let writer = AuctionLogWriter::new(dir.to_str().unwrap(), "auction_log.json", settings);
        writer.log(&AuctionLog::new("a1"));
        writer.log(&AuctionLog::new("a2"));
        // flush 在批量写入之后排队，返回时前两条一定已落盘
        writer.flush().await;
        assert_eq!(read_all(&dir).lines().count(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_waiting() {
        let dir = temp_dir();
        let settings = WriterSettings {
            buffer_size: 1,
            flush_interval: Duration::from_secs(3600),
            ..WriterSettings::default()
        };
        let writer = AuctionLogWriter::new(dir.to_str().unwrap(), "auction_log.json", settings);
        // 单线程 runtime：没有 await，后台任务还没机会消费
        assert!(writer.log(&AuctionLog::new("kept")));
        assert!(!writer.log(&AuctionLog::new("dropped")));
        writer.flush().await;

        let content = read_all(&dir);
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("kept"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
