use crate::config::config::{AppConfig, DataMode};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml, Yaml},
};
use std::path::Path;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "TUTORHUB_";

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 合并顺序（后者覆盖前者）：
    /// 1. 开发环境默认值
    /// 2. ./tutorhub.toml
    /// 3. ./tutorhub.yaml
    /// 4. 环境变量 `TUTORHUB_*`，嵌套字段用 `__` 分隔
    pub fn load() -> Result<AppConfig, figment::Error> {
        Self::figment()
            .merge(Toml::file("tutorhub.toml"))
            .merge(Yaml::file("tutorhub.yaml"))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// 从指定路径加载配置
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig, figment::Error> {
        let path = path.as_ref();
        let figment = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::figment().merge(Yaml::file(path)),
            _ => Self::figment().merge(Toml::file(path)),
        };

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::development()))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.mode == DataMode::Live && !config.remote.is_configured() {
            return Err(ConfigValidationError::MissingRemote);
        }

        let tiers = &config.rewards.tiers;
        if !(tiers.high_threshold >= tiers.mid_threshold
            && tiers.mid_threshold >= tiers.low_threshold
            && tiers.low_threshold > 0.0)
        {
            return Err(ConfigValidationError::TiersOutOfOrder);
        }

        if config.rewards.streak_milestones.iter().any(|m| m.days == 0) {
            return Err(ConfigValidationError::InvalidMilestone);
        }

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigValidationError {
    #[error("live mode requires remote.url and remote.anon_key")]
    MissingRemote,

    #[error("assessment tiers must satisfy high >= mid >= low > 0")]
    TiersOutOfOrder,

    #[error("streak milestones must be at least one day")]
    InvalidMilestone,
}

impl From<ConfigValidationError> for crate::error::AppError {
    fn from(e: ConfigValidationError) -> Self {
        crate::error::AppError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_files() {
        Jail::expect_with(|_jail| {
            let config = ConfigLoader::load()?;
            assert_eq!(config.mode, DataMode::Demo);
            assert_eq!(config.rewards.session_points, 10);
            assert_eq!(config.rewards.tiers.mid_threshold, 85.0);
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "tutorhub.toml",
                r#"
                    mode = "live"

                    [remote]
                    url = "https://example.test"
                    anon_key = "file-key"

                    [rewards]
                    session_points = 12
                "#,
            )?;
            jail.set_env("TUTORHUB_REMOTE__ANON_KEY", "env-key");

            let config = ConfigLoader::load()?;
            assert_eq!(config.mode, DataMode::Live);
            assert_eq!(config.remote.url, "https://example.test");
            assert_eq!(config.remote.anon_key, "env-key");
            assert_eq!(config.rewards.session_points, 12);
            assert_eq!(config.rewards.streak_milestones.len(), 2);
            assert!(ConfigLoader::validate(&config).is_ok());
            Ok(())
        });
    }

    #[test]
    fn test_validate_live_without_remote() {
        let mut config = AppConfig::development();
        config.mode = DataMode::Live;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::MissingRemote)
        );
    }

    #[test]
    fn test_validate_tiers_order() {
        let mut config = AppConfig::development();
        config.rewards.tiers.mid_threshold = 99.0;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::TiersOutOfOrder)
        );
    }
}
