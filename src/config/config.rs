use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 数据源模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    /// 内存中的演示数据集，无持久化
    #[default]
    Demo,
    /// 远端存储与认证服务
    Live,
}

/// 远端存储配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RemoteConfig {
    /// 服务地址，例如 https://project.example.co
    pub url: String,
    /// 匿名访问密钥
    pub anon_key: String,
    /// 请求超时（秒）
    pub request_timeout: u64,
}

impl RemoteConfig {
    /// 是否已配置远端
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.anon_key.is_empty()
    }
}

/// 本地持久化状态配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LocalStateConfig {
    /// 数据目录；为空时仅保存在内存中
    pub data_dir: Option<PathBuf>,
}

/// 测验得分奖励档位
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssessmentTiers {
    /// 最高档门槛（百分比）
    pub high_threshold: f64,
    /// 最高档积分
    pub high_points: u32,
    /// 中档门槛
    pub mid_threshold: f64,
    /// 中档积分
    pub mid_points: u32,
    /// 低档门槛
    pub low_threshold: f64,
    /// 低档积分
    pub low_points: u32,
}

impl Default for AssessmentTiers {
    fn default() -> Self {
        Self {
            high_threshold: 95.0,
            high_points: 50,
            mid_threshold: 85.0,
            mid_points: 30,
            low_threshold: 70.0,
            low_points: 15,
        }
    }
}

/// 连续上课里程碑
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreakMilestone {
    /// 连续天数
    pub days: u32,
    /// 额外奖励积分
    pub bonus: u32,
}

/// 积分规则配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RewardConfig {
    /// 测验奖励档位
    pub tiers: AssessmentTiers,
    /// 完成一次课程的基础积分
    pub session_points: u32,
    /// 连续里程碑
    pub streak_milestones: Vec<StreakMilestone>,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            tiers: AssessmentTiers::default(),
            session_points: 10,
            streak_milestones: vec![
                StreakMilestone { days: 7, bonus: 25 },
                StreakMilestone {
                    days: 30,
                    bonus: 100,
                },
            ],
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录
    pub log_dir: Option<PathBuf>,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 应用名称
    pub app_name: String,
    /// 启动时的数据源模式
    pub mode: DataMode,
    /// 远端存储配置
    pub remote: RemoteConfig,
    /// 本地状态配置
    pub local_state: LocalStateConfig,
    /// 积分规则
    pub rewards: RewardConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 创建开发环境配置（演示模式）
    pub fn development() -> Self {
        Self {
            app_name: "tutorhub".into(),
            mode: DataMode::Demo,
            remote: RemoteConfig {
                url: String::new(),
                anon_key: String::new(),
                request_timeout: 15,
            },
            local_state: LocalStateConfig {
                data_dir: Some(PathBuf::from("./data")),
            },
            rewards: RewardConfig::default(),
            logging: LoggingConfig {
                level: "debug".into(),
                structured: false,
                log_dir: None,
            },
        }
    }

    /// 创建生产环境配置（远端模式）
    pub fn production(url: &str, anon_key: &str) -> Self {
        let mut config = Self::development();
        config.mode = DataMode::Live;
        config.remote.url = url.into();
        config.remote.anon_key = anon_key.into();
        config.logging.level = "info".into();
        config.logging.structured = true;
        config
    }
}
