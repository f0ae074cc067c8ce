pub mod domain;
pub mod edge;
pub mod embedding;
pub mod movers;
pub mod error;
pub mod pipeline;
pub mod pricing;
pub mod sensing;
pub mod storage;
pub mod synthesis;

#[cfg(test)]
pub(crate) mod testing;

pub mod config {
    use crate::error::ConfigurationError;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub supabase_url: Option<String>,
        pub supabase_service_role_key: Option<String>,
        pub openai_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub analysis_backend: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: non_empty_var("DATABASE_URL"),
                supabase_url: non_empty_var("SUPABASE_URL"),
                supabase_service_role_key: non_empty_var("SUPABASE_SERVICE_ROLE_KEY"),
                openai_api_key: non_empty_var("OPENAI_API_KEY"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                analysis_backend: non_empty_var("ANALYSIS_BACKEND"),
            })
        }

        pub fn require_database_url(&self) -> Result<&str, ConfigurationError> {
            require(&self.database_url, "DATABASE_URL")
        }

        pub fn require_supabase_url(&self) -> Result<&str, ConfigurationError> {
            require(&self.supabase_url, "SUPABASE_URL")
        }

        pub fn require_supabase_service_role_key(&self) -> Result<&str, ConfigurationError> {
            require(&self.supabase_service_role_key, "SUPABASE_SERVICE_ROLE_KEY")
        }

        pub fn require_openai_api_key(&self) -> Result<&str, ConfigurationError> {
            require(&self.openai_api_key, "OPENAI_API_KEY")
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    fn require<'a>(
        value: &'a Option<String>,
        variable: &'static str,
    ) -> Result<&'a str, ConfigurationError> {
        value.as_deref().ok_or(ConfigurationError { variable })
    }

    /// Reads a numeric knob from the environment, falling back to `default` when unset or
    /// unparsable.
    pub fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
        std::env::var(key)
            .ok()
            .and_then(|s| s.trim().parse::<T>().ok())
            .unwrap_or(default)
    }

}
