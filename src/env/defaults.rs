// src/env/defaults.rs

//! Baseline configuration of the deployed services.
//!
//! Defaults are geared towards a development environment; `install` and the
//! lifecycle commands flip the mode-dependent keys afterwards.

use crate::env::EnvValue;
use crate::env::passwords::generate_password;
use crate::types::Mode;

pub const ALLOWED_HOSTS: &str = "django_allowed_hosts";
pub const TRUSTED_ORIGINS: &str = "django_csrf_trusted_origins";
pub const SSL_REDIRECT: &str = "django_secure_ssl_redirect";
pub const DEBUG_CONSOLE: &str = "hasura_graphql_dev_mode";
pub const SETTINGS_MODULE: &str = "django_settings_module";
pub const SUPERUSER_NAME: &str = "django_superuser_username";
pub const SUPERUSER_PASSWORD: &str = "django_superuser_password";
pub const ACTION_SECRET: &str = "hasura_graphql_action_secret";

/// Friendly names accepted wherever a key is.
pub const ALIASES: &[(&str, &str)] = &[
    ("date_format", "django_date_format"),
    ("admin_password", SUPERUSER_PASSWORD),
    ("hasura_password", "hasura_graphql_admin_secret"),
];

/// Keys overwritten when switching modes, with their per-mode values.
pub fn mode_preset(mode: Mode) -> [(&'static str, EnvValue); 3] {
    match mode {
        Mode::Production => [
            (DEBUG_CONSOLE, EnvValue::Bool(false)),
            (SSL_REDIRECT, EnvValue::Bool(true)),
            (SETTINGS_MODULE, EnvValue::text("config.settings.production")),
        ],
        Mode::Development => [
            (DEBUG_CONSOLE, EnvValue::Bool(true)),
            (SSL_REDIRECT, EnvValue::Bool(false)),
            (SETTINGS_MODULE, EnvValue::text("config.settings.local")),
        ],
    }
}

/// Full default set. Secrets are freshly generated on every call; only the
/// ones missing from the persisted file are ever used.
pub fn default_values() -> Vec<(&'static str, EnvValue)> {
    use EnvValue::Bool;
    let text = EnvValue::text;
    let secret = |safe| EnvValue::Text(generate_password(32, safe));

    vec![
        // Project
        ("use_docker", text("yes")),
        ("ipythondir", text("/app/.ipython")),
        // Django
        ("django_account_allow_registration", Bool(false)),
        ("django_account_email_verification", text("none")),
        ("django_admin_url", text("admin/")),
        (
            ALLOWED_HOSTS,
            text("localhost 127.0.0.1 django nginx host.docker.internal ghostwriter.local"),
        ),
        ("django_compress_enabled", Bool(true)),
        (TRUSTED_ORIGINS, text("")),
        ("django_date_format", text("d M Y")),
        ("django_host", text("django")),
        ("django_jwt_secret_key", secret(false)),
        ("django_mailgun_api_key", text("")),
        ("django_mailgun_domain", text("")),
        ("django_port", text("8000")),
        ("django_qcluster_name", text("soar")),
        ("django_secret_key", secret(false)),
        (SSL_REDIRECT, Bool(false)),
        (SETTINGS_MODULE, text("config.settings.local")),
        ("django_social_account_allow_registration", Bool(false)),
        ("django_superuser_email", text("admin@ghostwriter.local")),
        (SUPERUSER_PASSWORD, secret(true)),
        (SUPERUSER_NAME, text("admin")),
        ("django_web_concurrency", text("4")),
        // PostgreSQL
        ("postgres_host", text("postgres")),
        ("postgres_port", text("5432")),
        ("postgres_db", text("ghostwriter")),
        ("postgres_user", text("postgres")),
        ("postgres_password", secret(true)),
        // Redis
        ("redis_host", text("redis")),
        ("redis_port", text("6379")),
        // Nginx
        ("nginx_host", text("nginx")),
        ("nginx_port", text("443")),
        // Hasura
        (ACTION_SECRET, secret(true)),
        ("hasura_graphql_admin_secret", secret(true)),
        (DEBUG_CONSOLE, Bool(true)),
        ("hasura_graphql_enable_console", Bool(false)),
        (
            "hasura_graphql_enabled_log_types",
            text("startup, http-log, webhook-log, websocket-log, query-log"),
        ),
        ("hasura_graphql_enable_telemetry", Bool(false)),
        ("hasura_graphql_server_host", text("graphql_engine")),
        ("hasura_graphql_insecure_skip_tls_verify", Bool(true)),
        ("hasura_graphql_log_level", text("warn")),
        ("hasura_graphql_metadata_dir", text("/metadata")),
        ("hasura_graphql_migrations_dir", text("/migrations")),
        ("hasura_graphql_server_port", text("8080")),
        // Container health checks
        ("healthcheck_disk_usage_max", text("3")),
        ("healthcheck_interval", text("300s")),
        ("healthcheck_mem_min", text("100")),
        ("healthcheck_retries", text("3")),
        ("healthcheck_start", text("60s")),
        ("healthcheck_timeout", text("30s")),
    ]
}
