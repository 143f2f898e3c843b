use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::PathBuf,
    time::Duration,
};

use directories::BaseDirs;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        // Read .vizchatrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                let text: Vec<String> = reader.lines().map_while(Result::ok).collect();
                merge_rc(&mut map, &text.join("\n"));
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    /// Defaults plus the given rc-file text, without touching the environment.
    pub fn from_rc_str(text: &str) -> Self {
        let mut map = default_map();
        merge_rc(&mut map, text);
        Self { inner: map, config_path: default_config_path() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).filter(|v| !v.is_empty()).cloned()
    }

    /// CLI flags land here so every later lookup sees them.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    /// `None` when the value is missing or zero.
    pub fn get_secs(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).filter(|s| *s > 0).map(Duration::from_secs)
    }

    pub fn roles_path(&self) -> PathBuf {
        self.get_path("ROLE_STORAGE_PATH")
            .unwrap_or_else(|| app_config_dir().join("roles"))
    }

    pub fn chart_output_path(&self) -> PathBuf {
        self.get_path("CHART_OUTPUT_PATH")
            .unwrap_or_else(|| app_temp_dir().join("charts"))
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.get_path("LOG_FILE")
            .unwrap_or_else(|| app_temp_dir().join("vizchat.log"))
    }
}

fn merge_rc(map: &mut HashMap<String, String>, text: &str) {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
}

fn is_config_key(k: &str) -> bool {
    // Accept known keys or VIZCHAT_* for forward-compat
    const KEYS: &[&str] = &[
        "OPENAI_API_KEY",
        "API_BASE_URL",
        "REQUEST_TIMEOUT",
        "DEFAULT_MODEL",
        "MAX_TOKENS",
        "SYSTEM_PROMPT",
        "ROLE_STORAGE_PATH",
        "CHART_OUTPUT_PATH",
        "PYTHON_PATH",
        "EXEC_TIMEOUT",
        "EXEC_CPU_SECONDS",
        "EXEC_MEMORY_MB",
        "EXEC_WRAPPER",
        "HIDE_DATA_DUMP",
        "SEND_CHART_IMAGES",
        "PRETTIFY_MARKDOWN",
        "LOG_LEVEL",
        "LOG_FILE",
    ];

    KEYS.contains(&k) || k.starts_with("VIZCHAT_")
}

fn app_config_dir() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("vizchat")
}

fn app_temp_dir() -> PathBuf {
    env::temp_dir().join("vizchat")
}

fn default_config_path() -> PathBuf {
    app_config_dir().join(".vizchatrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    // Paths
    let temp = app_temp_dir();
    m.insert(
        "ROLE_STORAGE_PATH".into(),
        app_config_dir().join("roles").to_string_lossy().into_owned(),
    );
    m.insert(
        "CHART_OUTPUT_PATH".into(),
        temp.join("charts").to_string_lossy().into_owned(),
    );
    m.insert(
        "LOG_FILE".into(),
        temp.join("vizchat.log").to_string_lossy().into_owned(),
    );

    // Numbers
    m.insert("REQUEST_TIMEOUT".into(), "0".into());
    m.insert("EXEC_TIMEOUT".into(), "30".into());
    m.insert("EXEC_CPU_SECONDS".into(), "20".into());
    m.insert("EXEC_MEMORY_MB".into(), "1024".into());

    // Strings
    m.insert("API_BASE_URL".into(), "http://localhost:11434".into());
    m.insert("DEFAULT_MODEL".into(), "llama3.2:1b".into());
    m.insert("PYTHON_PATH".into(), "auto".into());
    m.insert("LOG_LEVEL".into(), "warn".into());

    // Bools as strings
    m.insert("HIDE_DATA_DUMP".into(), "true".into());
    m.insert("SEND_CHART_IMAGES".into(), "false".into());
    m.insert("PRETTIFY_MARKDOWN".into(), "true".into());

    m
}
