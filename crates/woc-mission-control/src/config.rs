use clap::Parser;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use woc_control_api::DEFAULT_REQUEST_TIMEOUT_MS;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

#[derive(Parser, Debug, Default)]
#[command(name = "woc-mission-control", about = "Live operator console for world fleets")]
pub struct Args {
    /// Control API base URL (WOC_API_URL).
    #[arg(long, default_value = "")]
    pub api_url: String,
    /// Bearer token for the control API (WOC_API_TOKEN).
    #[arg(long, default_value = "")]
    pub token: String,
    #[arg(long, default_value = "")]
    pub session: String,
    #[arg(long, default_value = "")]
    pub state_dir: String,
    #[arg(long, default_value_t = 0)]
    pub request_timeout_ms: u64,
    #[arg(long, default_value = "")]
    pub log_file: String,
    /// Skip the yes/no prompt for non-dangerous commands.
    #[arg(long, default_value_t = false)]
    pub no_confirm: bool,
    /// Show summaries only, for terminals without braille glyphs (WOC_NO_CHARTS).
    #[arg(long, default_value_t = false)]
    pub no_charts: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub api_token: Option<String>,
    pub session_id: String,
    pub state_dir: PathBuf,
    pub request_timeout_ms: u64,
    pub log_file: Option<PathBuf>,
    pub confirm_simple: bool,
    pub charts_enabled: bool,
}

pub fn load_config(args: &Args) -> Config {
    let api_url = first_non_blank([Some(args.api_url.clone()), env_value("WOC_API_URL")])
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let api_token = first_non_blank([Some(args.token.clone()), env_value("WOC_API_TOKEN")]);
    let session_id = resolve_session_id(&args.session);
    let state_dir = resolve_state_dir(&args.state_dir);
    let request_timeout_ms = resolve_request_timeout_ms(args.request_timeout_ms);
    let log_file = first_non_blank([Some(args.log_file.clone()), env_value("WOC_LOG_FILE")])
        .map(PathBuf::from);
    let no_confirm = args.no_confirm || env_flag("WOC_NO_CONFIRM");
    let no_charts = args.no_charts || env_flag("WOC_NO_CHARTS");
    Config {
        api_url,
        api_token,
        session_id,
        state_dir,
        request_timeout_ms,
        log_file,
        confirm_simple: !no_confirm,
        charts_enabled: !no_charts,
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_flag(key: &str) -> bool {
    env_value(key)
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false)
}

/// First candidate with non-whitespace content.
pub fn first_non_blank<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .map(|value| value.trim().to_string())
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn resolve_session_id(flag: &str) -> String {
    first_non_blank([Some(flag.to_string()), env_value("WOC_SESSION_ID")])
        .unwrap_or_else(|| format!("pid-{}", std::process::id()))
}

fn resolve_request_timeout_ms(flag: u64) -> u64 {
    if flag > 0 {
        return flag;
    }
    env_value("WOC_REQUEST_TIMEOUT_MS")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS)
}

fn resolve_state_dir(flag: &str) -> PathBuf {
    state_dir_from(
        first_non_blank([Some(flag.to_string()), env_value("WOC_STATE_DIR")]),
        env_value("XDG_STATE_HOME"),
        env_value("HOME"),
    )
}

pub fn state_dir_from(
    explicit: Option<String>,
    xdg_state_home: Option<String>,
    home: Option<String>,
) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }
    if let Some(value) = xdg_state_home.filter(|value| !value.trim().is_empty()) {
        return PathBuf::from(value).join("woc");
    }
    if let Some(value) = home.filter(|value| !value.trim().is_empty()) {
        return PathBuf::from(value)
            .join(".local")
            .join("state")
            .join("woc");
    }
    PathBuf::from(".woc/state")
}

/// The terminal owns stdout, so logs go to a file or nowhere.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_flag("WOC_LOG_STDOUT") {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        return;
    }
    if let Some(path) = config.log_file.as_ref() {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            let _ = std::fs::create_dir_all(parent);
        }
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                return;
            }
            Err(err) => {
                eprintln!("log_file_error: {err}");
            }
        }
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::sink)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_candidates_are_skipped() {
        assert_eq!(
            first_non_blank([Some("  ".to_string()), Some(" http://ops ".to_string())]),
            Some("http://ops".to_string())
        );
        assert_eq!(first_non_blank([None, Some(String::new())]), None);
    }

    #[test]
    fn state_dir_fallback_chain() {
        assert_eq!(
            state_dir_from(Some("/srv/woc".into()), Some("/xdg".into()), None),
            PathBuf::from("/srv/woc")
        );
        assert_eq!(
            state_dir_from(None, Some("/xdg".into()), Some("/home/op".into())),
            PathBuf::from("/xdg/woc")
        );
        assert_eq!(
            state_dir_from(None, Some(" ".into()), Some("/home/op".into())),
            PathBuf::from("/home/op/.local/state/woc")
        );
        assert_eq!(state_dir_from(None, None, None), PathBuf::from(".woc/state"));
    }

    #[test]
    fn bool_flags_parse_common_spellings() {
        assert_eq!(parse_bool_flag("YES"), Some(true));
        assert_eq!(parse_bool_flag("off"), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }

    #[test]
    fn explicit_flags_win() {
        let args = Args {
            api_url: "http://fleet.example:9000/".to_string(),
            token: "abc".to_string(),
            session: "night-ops".to_string(),
            state_dir: "/tmp/woc-test".to_string(),
            request_timeout_ms: 2_500,
            log_file: String::new(),
            no_confirm: true,
            no_charts: true,
        };
        let config = load_config(&args);
        assert_eq!(config.api_url, "http://fleet.example:9000/");
        assert_eq!(config.api_token.as_deref(), Some("abc"));
        assert_eq!(config.session_id, "night-ops");
        assert_eq!(config.state_dir, PathBuf::from("/tmp/woc-test"));
        assert_eq!(config.request_timeout_ms, 2_500);
        assert!(!config.confirm_simple);
        assert!(!config.charts_enabled);
    }
}
