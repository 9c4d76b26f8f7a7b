#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use crate::backend::AudioFormat;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
pub const DEFAULT_MAX_RESULTS: usize = 20;
pub const DEFAULT_YT_DLP_PATH: &str = "yt-dlp";
pub const DEFAULT_AUDIO_CODEC: &str = "mp3";
pub const DEFAULT_AUDIO_BITRATE: u32 = 192;

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub download_dir: PathBuf,
    pub max_results: usize,
    pub yt_dlp_path: PathBuf,
    pub ffmpeg_location: Option<PathBuf>,
    pub audio: AudioFormat,
}

/// Values given on the command line. They win over the environment, which
/// wins over the `.env` file.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub download_dir: Option<PathBuf>,
    pub max_results: Option<usize>,
    pub yt_dlp_path: Option<PathBuf>,
    pub ffmpeg_location: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_runtime_settings_with_overrides(
        &file_vars,
        env_var_string,
        overrides,
    ))
}

#[cfg(test)]
fn build_runtime_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> RuntimeSettings {
    build_runtime_settings_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_runtime_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeSettings {
    let download_dir = overrides
        .download_dir
        .or_else(|| lookup_value("DOWNLOAD_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR));
    let max_results = overrides
        .max_results
        .filter(|value| *value > 0)
        .or_else(|| {
            lookup_value("MAX_RESULTS", file_vars, &env_lookup)
                .and_then(|value| value.parse::<usize>().ok())
                .filter(|value| *value > 0)
        })
        .unwrap_or(DEFAULT_MAX_RESULTS);
    let yt_dlp_path = overrides
        .yt_dlp_path
        .or_else(|| lookup_value("YT_DLP_PATH", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP_PATH));
    let ffmpeg_location = overrides
        .ffmpeg_location
        .or_else(|| lookup_value("FFMPEG_LOCATION", file_vars, &env_lookup).map(PathBuf::from));
    let codec = lookup_value("AUDIO_CODEC", file_vars, &env_lookup)
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_AUDIO_CODEC.to_string());
    let bitrate_kbps = lookup_value("AUDIO_BITRATE", file_vars, &env_lookup)
        .and_then(|value| value.trim_end_matches(['k', 'K']).parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_AUDIO_BITRATE);

    RuntimeSettings {
        download_dir,
        max_results,
        yt_dlp_path,
        ffmpeg_location,
        audio: AudioFormat {
            codec,
            bitrate_kbps,
        },
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn settings_from(contents: &str) -> RuntimeSettings {
        let cfg = make_config(contents);
        let vars = read_env_file(cfg.path()).unwrap();
        build_runtime_settings(&vars, |_| None)
    }

    #[test]
    fn defaults_apply_without_configuration() {
        let settings = settings_from("");
        assert_eq!(settings.download_dir, PathBuf::from(DEFAULT_DOWNLOAD_DIR));
        assert_eq!(settings.max_results, DEFAULT_MAX_RESULTS);
        assert_eq!(settings.yt_dlp_path, PathBuf::from(DEFAULT_YT_DLP_PATH));
        assert_eq!(settings.ffmpeg_location, None);
        assert_eq!(settings.audio, AudioFormat::default());
    }

    #[test]
    fn reads_values_from_env_file() {
        let settings = settings_from(
            "DOWNLOAD_DIR=\"/music\"\nMAX_RESULTS=\"10\"\nFFMPEG_LOCATION=\"/opt/ffmpeg/bin\"\nAUDIO_CODEC=\"M4A\"\nAUDIO_BITRATE=\"128K\"\n",
        );
        assert_eq!(settings.download_dir, PathBuf::from("/music"));
        assert_eq!(settings.max_results, 10);
        assert_eq!(
            settings.ffmpeg_location,
            Some(PathBuf::from("/opt/ffmpeg/bin"))
        );
        assert_eq!(settings.audio.codec, "m4a");
        assert_eq!(settings.audio.bitrate_kbps, 128);
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let settings = settings_from("MAX_RESULTS=\"0\"\nAUDIO_BITRATE=\"loud\"\n");
        assert_eq!(settings.max_results, DEFAULT_MAX_RESULTS);
        assert_eq!(settings.audio.bitrate_kbps, DEFAULT_AUDIO_BITRATE);

        let settings = settings_from("MAX_RESULTS=\"many\"\n");
        assert_eq!(settings.max_results, DEFAULT_MAX_RESULTS);
    }

    #[test]
    fn env_wins_over_file() {
        let vars = read_env_file(make_config("DOWNLOAD_DIR=\"/file\"\n").path()).unwrap();
        let settings = build_runtime_settings(&vars, |key| {
            if key == "DOWNLOAD_DIR" {
                Some("/env".to_string())
            } else {
                None
            }
        });
        assert_eq!(settings.download_dir, PathBuf::from("/env"));
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let cfg = make_config(
            r#"
            export DOWNLOAD_DIR="/media"
            YT_DLP_PATH='/usr/local/bin/yt-dlp'
            MAX_RESULTS =  "5"
            AUDIO_CODEC=opus
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get("DOWNLOAD_DIR").unwrap(), "/media");
        assert_eq!(vars.get("YT_DLP_PATH").unwrap(), "/usr/local/bin/yt-dlp");
        assert_eq!(vars.get("MAX_RESULTS").unwrap(), "5");
        assert_eq!(vars.get("AUDIO_CODEC").unwrap(), "opus");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn overrides_take_precedence() {
        let mut vars = HashMap::new();
        vars.insert("DOWNLOAD_DIR".to_string(), "/file-dir".to_string());
        vars.insert("MAX_RESULTS".to_string(), "7".to_string());
        vars.insert("YT_DLP_PATH".to_string(), "/file/yt-dlp".to_string());

        let overrides = RuntimeOverrides {
            download_dir: Some(PathBuf::from("/override-dir")),
            max_results: Some(3),
            yt_dlp_path: None,
            ffmpeg_location: Some(PathBuf::from("/override/ffmpeg")),
            env_path: None,
        };

        let settings = build_runtime_settings_with_overrides(
            &vars,
            |key| {
                if key == "YT_DLP_PATH" {
                    Some("/env/yt-dlp".to_string())
                } else if key == "FFMPEG_LOCATION" {
                    Some("/env/ffmpeg".to_string())
                } else {
                    None
                }
            },
            overrides,
        );

        assert_eq!(settings.download_dir, PathBuf::from("/override-dir"));
        assert_eq!(settings.max_results, 3);
        assert_eq!(settings.yt_dlp_path, PathBuf::from("/env/yt-dlp"));
        assert_eq!(
            settings.ffmpeg_location,
            Some(PathBuf::from("/override/ffmpeg"))
        );
    }

    #[test]
    fn zero_max_results_override_is_ignored() {
        let settings = build_runtime_settings_with_overrides(
            &HashMap::new(),
            |_| None,
            RuntimeOverrides {
                max_results: Some(0),
                ..RuntimeOverrides::default()
            },
        );
        assert_eq!(settings.max_results, DEFAULT_MAX_RESULTS);
    }

    #[test]
    fn resolve_runtime_settings_reads_given_env_path() -> Result<()> {
        let cfg = make_config("DOWNLOAD_DIR=\"/from-file\"\nMAX_RESULTS=\"4\"\n");
        let settings = resolve_runtime_settings(RuntimeOverrides {
            env_path: Some(cfg.path().to_path_buf()),
            download_dir: Some(PathBuf::from("/flag")),
            ..RuntimeOverrides::default()
        })?;
        assert_eq!(settings.download_dir, PathBuf::from("/flag"));
        Ok(())
    }
}
