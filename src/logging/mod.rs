//! 应用层日志初始化.
//!
//! 库 crate 只通过 `log` 门面输出, 由这里安装 `tracing` 订阅者:
//! 彩色控制台输出加按日期命名的文件输出, `log` 记录经 `tracing-log` 桥接进入.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 文件输出级别, `EnvFilter` 语法
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_console_level")]
    pub console_level: String,
    pub directory: String,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            console_level: default_console_level(),
            directory: "logs".into(),
            file_prefix: default_file_prefix(),
            console: true,
        }
    }
}

fn default_level() -> String {
    "debug".into()
}

fn default_console_level() -> String {
    "info".into()
}

fn default_file_prefix() -> String {
    "yinliu".into()
}

fn default_true() -> bool {
    true
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 安装全局日志订阅者, 每个进程只能成功调用一次
pub fn init(config: LoggingConfig) -> Result<()> {
    if LOG_GUARD.get().is_some() {
        anyhow::bail!("日志系统已初始化");
    }
    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("创建日志目录失败, path={}", config.directory))?;

    let file_appender = DailyFileWriter::new(Path::new(&config.directory), &config.file_prefix)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("文件日志级别非法: {}", config.level))?;
    let file_layer = fmt::Layer::default()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(LineFormatter { colored: false })
        .with_filter(file_filter);

    let console_layer = if config.console {
        let console_filter = EnvFilter::try_new(&config.console_level)
            .with_context(|| format!("控制台日志级别非法: {}", config.console_level))?;
        Some(
            fmt::Layer::default()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .event_format(LineFormatter { colored: true })
                .with_filter(console_filter),
        )
    } else {
        None
    };

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("安装全局日志订阅者失败")?;

    LOG_GUARD
        .set(guard)
        .map_err(|_| anyhow::anyhow!("日志系统已初始化"))?;
    Ok(())
}

/// 按本地日期命名的日志文件, 跨天时切换到新文件
struct DailyFileWriter {
    directory: PathBuf,
    prefix: String,
    date: NaiveDate,
    file: File,
}

impl DailyFileWriter {
    fn new(directory: &Path, prefix: &str) -> Result<Self> {
        let date = Local::now().date_naive();
        let file = open_append_file(&build_current_log_path(directory, prefix, date))?;
        Ok(Self {
            directory: directory.to_path_buf(),
            prefix: prefix.to_string(),
            date,
            file,
        })
    }

    fn roll_if_needed(&mut self) -> std::io::Result<()> {
        let today = Local::now().date_naive();
        if today == self.date {
            return Ok(());
        }
        let path = build_current_log_path(&self.directory, &self.prefix, today);
        self.file = open_append_file(&path).map_err(std::io::Error::other)?;
        self.date = today;
        Ok(())
    }
}

impl Write for DailyFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.roll_if_needed()?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

fn open_append_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("打开日志文件失败, path={}", path.display()))
}

/// 某一天的日志文件路径: `<directory>/<prefix>.<YYYY-MM-DD>.log`
pub fn build_current_log_path(directory: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    directory.join(format!("{}.{}.log", prefix, date.format("%Y-%m-%d")))
}

/// 单行事件格式: `[时间] 级别 target > 字段`
///
/// 控制台只显示月日并给级别着色, 文件写完整日期.
struct LineFormatter {
    colored: bool,
}

impl LineFormatter {
    fn level_color(level: tracing::Level) -> &'static str {
        match level {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            _ => "\x1b[34m",
        }
    }
}

impl<S, N> FormatEvent<S, N> for LineFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        let level = *meta.level();
        if self.colored {
            write!(
                writer,
                "[{}] {}{:5}\x1b[0m ",
                now.format("%m-%d %H:%M:%S%.3f"),
                Self::level_color(level),
                level.as_str()
            )?;
        } else {
            write!(
                writer,
                "[{}] {:5} ",
                now.format("%Y-%m-%d %H:%M:%S%.3f"),
                level.as_str()
            )?;
        }
        write!(writer, "{} > ", meta.target())?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
