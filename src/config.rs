use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub log_dir: PathBuf,
    pub ipinfo_base_url: String,
    pub nominatim_base_url: String,
    pub geocoder_user_agent: String,
    pub ip_lookup_timeout_secs: u64,
    pub reverse_geocode_timeout_secs: u64,
    pub template_glob: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:visitor_logs.db".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            log_dir: PathBuf::from(env::var("LOG_DIR").unwrap_or_else(|_| ".".to_string())),
            ipinfo_base_url: env::var("IPINFO_BASE_URL")
                .unwrap_or_else(|_| "https://ipinfo.io".to_string()),
            nominatim_base_url: env::var("NOMINATIM_BASE_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),
            geocoder_user_agent: env::var("GEOCODER_USER_AGENT")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "VisitorLog".to_string()),
            ip_lookup_timeout_secs: env::var("IP_LOOKUP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            reverse_geocode_timeout_secs: env::var("REVERSE_GEOCODE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            template_glob: env::var("TEMPLATE_GLOB")
                .unwrap_or_else(|_| "src/templates/**/*.html".to_string()),
        }
    }

    pub fn ip_lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.ip_lookup_timeout_secs)
    }

    pub fn reverse_geocode_timeout(&self) -> Duration {
        Duration::from_secs(self.reverse_geocode_timeout_secs)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
