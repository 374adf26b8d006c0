use std::env;

pub const ROOT_TYPE_ENV: &str = "CONDUCT_ROOT_TYPE";
pub const LOG_ENV: &str = "CONDUCT_LOG";

/// Runtime settings. Everything has a default; `from_env` overrides from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Type constructed by [`Manager::init_root`](crate::manager::Manager::init_root).
    pub root_type: String,
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            root_type: "Scene".into(),
            log_filter: "info".into(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::default().merge_vars(|key| env::var(key).ok())
    }

    pub fn with_root_type(mut self, root_type: impl Into<String>) -> Self {
        self.root_type = root_type.into();
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    fn merge_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(root) = var(ROOT_TYPE_ENV).filter(|v| !v.trim().is_empty()) {
            self.root_type = root.trim().to_string();
        }
        if let Some(filter) = var(LOG_ENV).filter(|v| !v.trim().is_empty()) {
            self.log_filter = filter;
        }
        self
    }
}
