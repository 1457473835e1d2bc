//! Default values and functions for configuration

// Default constants
pub(crate) const DEFAULT_DECLARED_CONFIGURATION_PATH: &str = "sourcegraph.yaml";
pub(crate) const DEFAULT_POSTGRES_HOST: &str = "localhost";
pub(crate) const DEFAULT_POSTGRES_DATABASE: &str = "autoindex";
pub(crate) const DEFAULT_POSTGRES_USER: &str = "autoindex";
pub(crate) const DEFAULT_POSTGRES_PASSWORD: &str = "autoindex";
pub(crate) const DEFAULT_CLONE_URL_PREFIX: &str = "https://";

pub(crate) fn default_max_repositories_inspected_per_second() -> Option<f64> {
    Some(10.0)
}

pub(crate) fn default_max_index_jobs_per_inferred_configuration() -> usize {
    25
}

pub(crate) fn default_declared_configuration_path() -> String {
    DEFAULT_DECLARED_CONFIGURATION_PATH.to_string()
}

pub(crate) fn default_postgres_host() -> String {
    DEFAULT_POSTGRES_HOST.to_string()
}

pub(crate) fn default_postgres_port() -> u16 {
    5432
}

pub(crate) fn default_postgres_database() -> String {
    DEFAULT_POSTGRES_DATABASE.to_string()
}

pub(crate) fn default_postgres_user() -> String {
    DEFAULT_POSTGRES_USER.to_string()
}

pub(crate) fn default_postgres_password() -> String {
    DEFAULT_POSTGRES_PASSWORD.to_string()
}

pub(crate) fn default_postgres_pool_size() -> u32 {
    10
}

pub(crate) fn default_repos_dir() -> String {
    dirs::data_dir()
        .map(|dir| dir.join("autoindex").join("repos"))
        .unwrap_or_else(|| std::path::PathBuf::from("repos"))
        .to_string_lossy()
        .into_owned()
}

pub(crate) fn default_clone_url_prefix() -> String {
    DEFAULT_CLONE_URL_PREFIX.to_string()
}
