use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_positive, parse_u16, parse_u32, parse_u64,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, ExamSettings, RedisSettings,
    RuntimeSettings, SecuritySettings, ServerHost, ServerPort, ServerSettings, Settings,
    TelemetrySettings, WorkerSettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMS_HOST", "0.0.0.0");
        let port = env_or_default("EXAMS_PORT", "8000");

        let environment =
            parse_environment(env_optional("EXAMS_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("EXAMS_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Exam Attempts API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let (secret_key, secret_key_generated) = match env_optional("SECRET_KEY") {
            Some(value) => (value, false),
            None => (load_or_create_secret_key(), true),
        };
        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "1440"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "exams");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "exam_attempts");
        let database_url = env_optional("DATABASE_URL");
        let max_connections = parse_u32(
            "DATABASE_MAX_CONNECTIONS",
            env_or_default("DATABASE_MAX_CONNECTIONS", "30"),
        )?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let violation_threshold =
            parse_positive("VIOLATION_THRESHOLD", env_or_default("VIOLATION_THRESHOLD", "3"))?;
        let violation_threshold = u32::try_from(violation_threshold).map_err(|_| {
            ConfigError::InvalidValue {
                field: "VIOLATION_THRESHOLD",
                value: violation_threshold.to_string(),
            }
        })?;
        let auto_save_rate_limit =
            parse_positive("AUTO_SAVE_RATE_LIMIT", env_or_default("AUTO_SAVE_RATE_LIMIT", "30"))?;
        let auto_save_window_seconds = parse_positive(
            "AUTO_SAVE_WINDOW_SECONDS",
            env_or_default("AUTO_SAVE_WINDOW_SECONDS", "10"),
        )?;
        let max_answer_bytes =
            parse_positive("MAX_ANSWER_BYTES", env_or_default("MAX_ANSWER_BYTES", "65536"))?
                as usize;

        let expiry_sweep_interval_seconds = parse_positive(
            "EXPIRY_SWEEP_INTERVAL_SECONDS",
            env_or_default("EXPIRY_SWEEP_INTERVAL_SECONDS", "60"),
        )?;
        let expiry_sweep_batch =
            parse_positive("EXPIRY_SWEEP_BATCH", env_or_default("EXPIRY_SWEEP_BATCH", "200"))?
                as i64;
        let marking_poll_interval_seconds = parse_positive(
            "MARKING_POLL_INTERVAL_SECONDS",
            env_or_default("MARKING_POLL_INTERVAL_SECONDS", "2"),
        )?;
        let marking_worker_concurrency = parse_positive(
            "MARKING_WORKER_CONCURRENCY",
            env_or_default("MARKING_WORKER_CONCURRENCY", "2"),
        )? as usize;
        let marking_max_retries =
            parse_u32("MARKING_MAX_RETRIES", env_or_default("MARKING_MAX_RETRIES", "5"))?;

        let log_level = env_or_default("EXAMS_LOG_LEVEL", "info");
        let json = env_optional("EXAMS_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings {
                secret_key,
                secret_key_generated,
                access_token_expire_minutes,
                algorithm,
            },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            exam: ExamSettings {
                violation_threshold,
                auto_save_rate_limit,
                auto_save_window_seconds,
                max_answer_bytes,
            },
            worker: WorkerSettings {
                expiry_sweep_interval_seconds,
                expiry_sweep_batch,
                marking_poll_interval_seconds,
                marking_worker_concurrency,
                marking_max_retries: marking_max_retries.min(i32::MAX as u32) as i32,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn worker(&self) -> &WorkerSettings {
        &self.worker
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.security.algorithm != "HS256" {
            return Err(ConfigError::InvalidValue {
                field: "ALGORITHM",
                value: self.security.algorithm.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        if self.security.secret_key_generated {
            return Err(ConfigError::MissingSecret("SECRET_KEY"));
        }

        Ok(())
    }
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}

impl RedisSettings {
    pub(crate) fn redis_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!("redis://:{}@{}:{}/{}", self.password, self.host, self.port, self.db)
        }
    }
}

impl ServerHost {
    fn parse(value: String) -> Result<Self, ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidHost(value));
        }
        Ok(Self(value))
    }
}

impl ServerPort {
    fn parse(value: String) -> Result<Self, ConfigError> {
        let parsed: u16 = value.parse().map_err(|_| ConfigError::InvalidPort(value.clone()))?;
        if parsed == 0 {
            return Err(ConfigError::InvalidPort(value));
        }
        Ok(Self(parsed))
    }
}
