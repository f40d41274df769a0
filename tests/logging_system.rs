//! 日志系统集成测试.
//!
//! 全局订阅者每个进程只能安装一次, 涉及 `init` 的检查集中在同一个测试里.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use yinliu::logging::{LoggingConfig, build_current_log_path, init};

#[test]
fn test_logging_config_从_json_解析() {
    let config: LoggingConfig =
        serde_json::from_str(r#"{"directory": "/tmp/yinliu-logs"}"#).expect("解析失败");
    assert_eq!(config.directory, "/tmp/yinliu-logs");
    assert_eq!(config.level, "debug");
    assert_eq!(config.console_level, "info");
    assert_eq!(config.file_prefix, "yinliu");
    assert!(config.console);

    let config: LoggingConfig = serde_json::from_str(
        r#"{"directory": "logs", "level": "yinliu_codec=trace", "file_prefix": "decode", "console": false}"#,
    )
    .expect("解析失败");
    assert_eq!(config.level, "yinliu_codec=trace");
    assert_eq!(config.file_prefix, "decode");
    assert!(!config.console);

    assert!(serde_json::from_str::<LoggingConfig>(r#"{"level": "info"}"#).is_err());
}

fn wait_for_content(path: &Path, needle: &str) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match fs::read_to_string(path) {
            Ok(text) if text.contains(needle) => return true,
            _ => std::thread::sleep(Duration::from_millis(20)),
        }
    }
    false
}

#[test]
fn test_logging_init_写入日期文件() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let log_dir = dir.path().join("logs");
    let config = LoggingConfig {
        level: "debug".into(),
        console_level: "warn".into(),
        directory: log_dir.to_string_lossy().into_owned(),
        file_prefix: "pipeline".into(),
        console: false,
    };
    init(config.clone()).expect("日志系统初始化失败");
    assert!(log_dir.is_dir(), "日志目录应被创建");

    // 库 crate 经 log 门面输出, 同样写入文件
    log::debug!("日志桥接检查: decoder-ready");
    tracing::info!("tracing 直接输出: page-ok");

    let today = chrono::Local::now().date_naive();
    let path = build_current_log_path(&log_dir, "pipeline", today);
    assert!(wait_for_content(&path, "decoder-ready"), "log 记录未写入文件");
    assert!(wait_for_content(&path, "page-ok"), "tracing 事件未写入文件");

    let err = init(config).unwrap_err();
    assert!(err.to_string().contains("已初始化"), "实际错误: {err}");
}
