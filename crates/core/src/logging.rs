//! Logging filter composition and file sink planning.
//!
//! The app crate turns the plans produced here into a tracing subscriber:
//! console output on stderr plus a daily-rolling file under
//! `<data_dir>/logs`, falling back to console-only when the log directory
//! cannot be created.

use std::fs;
use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};

pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_NOISE_FILTER: &str = "ort=error";
pub const DEFAULT_LOG_RETENTION_FILES: usize = 14;
pub const DEFAULT_LOG_DIR_NAME: &str = "logs";
pub const DEFAULT_LOG_FILE_PREFIX: &str = "clearmark";
pub const DEFAULT_LOG_FILE_SUFFIX: &str = "log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingInitOptions {
    pub data_dir: Option<PathBuf>,
    pub verbose: u8,
    pub cli_log_filter: Option<String>,
    pub rust_log_env: Option<String>,
    pub default_log_filter: String,
    pub noise_filter: String,
    pub include_noise_filter_when_implicit: bool,
    pub retention_files: usize,
}

impl Default for LoggingInitOptions {
    fn default() -> Self {
        Self {
            data_dir: None,
            verbose: 0,
            cli_log_filter: None,
            rust_log_env: None,
            default_log_filter: DEFAULT_LOG_FILTER.to_string(),
            noise_filter: DEFAULT_NOISE_FILTER.to_string(),
            include_noise_filter_when_implicit: true,
            retention_files: DEFAULT_LOG_RETENTION_FILES,
        }
    }
}

#[derive(Debug)]
pub struct LoggingInitPlan {
    pub filter: String,
    pub file_sink: FileSinkPlan,
}

#[derive(Debug)]
pub enum FileSinkPlan {
    Ready(ReadyFileSinkPlan),
    Fallback(FallbackFileSinkPlan),
}

#[derive(Debug)]
pub struct ReadyFileSinkPlan {
    pub log_dir: PathBuf,
    pub retention_files: usize,
    pub appender: RollingFileAppender,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackFileSinkPlan {
    pub attempted_log_dir: Option<PathBuf>,
    pub retention_files: usize,
    pub reason: String,
}

impl FileSinkPlan {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Self::Ready(_) => None,
            Self::Fallback(plan) => Some(plan.reason.as_str()),
        }
    }
}

pub fn compose_logging_init_plan(options: &LoggingInitOptions) -> LoggingInitPlan {
    LoggingInitPlan {
        filter: compose_log_filter(options),
        file_sink: build_file_sink_plan(options),
    }
}

/// Filter precedence: `--log-filter` > `-v`/`-vv` > `RUST_LOG` > default.
/// The noise filter is prepended only when the selection was implicit, so an
/// explicit filter always sees exactly what it asked for.
pub fn compose_log_filter(options: &LoggingInitOptions) -> String {
    let user_filter = select_user_filter(options);
    let should_include_noise = options.include_noise_filter_when_implicit
        && options.cli_log_filter.is_none()
        && options.verbose == 0;

    merge_noise_filter(
        options.noise_filter.as_str(),
        user_filter.as_str(),
        should_include_noise,
    )
}

fn select_user_filter(options: &LoggingInitOptions) -> String {
    if let Some(filter) = options.cli_log_filter.as_deref() {
        filter.to_string()
    } else if options.verbose >= 2 {
        "trace".to_string()
    } else if options.verbose == 1 {
        "debug".to_string()
    } else if let Some(filter) = options.rust_log_env.as_deref() {
        filter.to_string()
    } else {
        options.default_log_filter.clone()
    }
}

fn merge_noise_filter(noise_filter: &str, user_filter: &str, include_noise_filter: bool) -> String {
    if include_noise_filter && !noise_filter.trim().is_empty() {
        format!("{noise_filter},{user_filter}")
    } else {
        user_filter.to_string()
    }
}

pub fn build_file_sink_plan(options: &LoggingInitOptions) -> FileSinkPlan {
    let retention_files = normalize_retention_files(options.retention_files);

    let Some(data_dir) = options.data_dir.as_deref() else {
        return FileSinkPlan::Fallback(FallbackFileSinkPlan {
            attempted_log_dir: None,
            retention_files,
            reason: "file sink disabled: data_dir is not configured".to_string(),
        });
    };

    let log_dir = data_dir.join(DEFAULT_LOG_DIR_NAME);
    if let Err(error) = fs::create_dir_all(&log_dir) {
        return FileSinkPlan::Fallback(FallbackFileSinkPlan {
            attempted_log_dir: Some(log_dir),
            retention_files,
            reason: format!("failed to create log directory: {error}"),
        });
    }

    let appender_builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(DEFAULT_LOG_FILE_PREFIX)
        .filename_suffix(DEFAULT_LOG_FILE_SUFFIX)
        .max_log_files(retention_files);

    match appender_builder.build(&log_dir) {
        Ok(appender) => FileSinkPlan::Ready(ReadyFileSinkPlan {
            log_dir,
            retention_files,
            appender,
        }),
        Err(error) => FileSinkPlan::Fallback(FallbackFileSinkPlan {
            attempted_log_dir: Some(log_dir),
            retention_files,
            reason: format!("failed to initialize rolling file sink: {error}"),
        }),
    }
}

fn normalize_retention_files(retention_files: usize) -> usize {
    if retention_files == 0 {
        DEFAULT_LOG_RETENTION_FILES
    } else {
        retention_files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn cli_log_filter_overrides_everything() {
        let options = LoggingInitOptions {
            verbose: 2,
            cli_log_filter: Some("clearmark_core=trace".to_string()),
            rust_log_env: Some("error".to_string()),
            ..Default::default()
        };
        assert_eq!(compose_log_filter(&options), "clearmark_core=trace");
    }

    #[test]
    fn verbose_maps_to_debug_and_trace() {
        let one = LoggingInitOptions {
            verbose: 1,
            rust_log_env: Some("warn".to_string()),
            ..Default::default()
        };
        let two = LoggingInitOptions {
            verbose: 2,
            ..Default::default()
        };
        assert_eq!(compose_log_filter(&one), "debug");
        assert_eq!(compose_log_filter(&two), "trace");
    }

    #[test]
    fn rust_log_env_used_when_no_cli_or_verbose() {
        let options = LoggingInitOptions {
            rust_log_env: Some("warn,clearmark_core=debug".to_string()),
            ..Default::default()
        };
        assert_eq!(
            compose_log_filter(&options),
            format!("{DEFAULT_NOISE_FILTER},warn,clearmark_core=debug")
        );
    }

    #[test]
    fn noise_filter_included_only_for_implicit_selection() {
        let implicit = LoggingInitOptions::default();
        assert_eq!(
            compose_log_filter(&implicit),
            format!("{DEFAULT_NOISE_FILTER},{DEFAULT_LOG_FILTER}")
        );

        let explicit = LoggingInitOptions {
            cli_log_filter: Some("trace".to_string()),
            ..Default::default()
        };
        assert_eq!(compose_log_filter(&explicit), "trace");
    }

    #[test]
    fn file_sink_uses_default_log_dir_under_data_dir() {
        let data_dir = tempdir().expect("tempdir");
        let options = LoggingInitOptions {
            data_dir: Some(data_dir.path().to_path_buf()),
            ..Default::default()
        };

        let plan = build_file_sink_plan(&options);
        match plan {
            FileSinkPlan::Ready(ready) => {
                assert_eq!(ready.log_dir, data_dir.path().join(DEFAULT_LOG_DIR_NAME));
                assert_eq!(ready.retention_files, DEFAULT_LOG_RETENTION_FILES);
                assert!(ready.log_dir.exists());
            }
            FileSinkPlan::Fallback(fallback) => {
                panic!("expected ready file sink, got fallback: {}", fallback.reason)
            }
        }
    }

    #[test]
    fn file_sink_falls_back_without_data_dir() {
        let plan = build_file_sink_plan(&LoggingInitOptions::default());
        assert!(!plan.is_ready());
        assert!(plan
            .fallback_reason()
            .expect("fallback reason")
            .contains("data_dir is not configured"));
    }

    #[test]
    fn file_sink_falls_back_when_log_dir_cannot_be_created() {
        let data_dir_file = NamedTempFile::new().expect("named temp file");
        let options = LoggingInitOptions {
            data_dir: Some(data_dir_file.path().to_path_buf()),
            ..Default::default()
        };

        let plan = build_file_sink_plan(&options);
        match plan {
            FileSinkPlan::Ready(_) => panic!("expected fallback file sink"),
            FileSinkPlan::Fallback(fallback) => {
                assert!(fallback.reason.contains("failed to create log directory"));
                assert_eq!(fallback.retention_files, DEFAULT_LOG_RETENTION_FILES);
            }
        }
    }

    #[test]
    fn zero_retention_normalizes_to_default() {
        let options = LoggingInitOptions {
            retention_files: 0,
            ..Default::default()
        };
        let plan = build_file_sink_plan(&options);
        match plan {
            FileSinkPlan::Fallback(fallback) => {
                assert_eq!(fallback.retention_files, DEFAULT_LOG_RETENTION_FILES)
            }
            FileSinkPlan::Ready(_) => panic!("no data_dir; expected fallback"),
        }
    }
}
