//! 管理器配置
//!
//! 定义模块管理器的配置结构和加载逻辑。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::{CoreError, Result};

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否使用 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志文件输出目录（None 表示只输出到控制台）
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 轮转策略（never / hourly / daily）
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

impl LogConfig {
    /// 转换为日志系统配置
    pub fn to_logger_config(&self) -> crate::utils::logger::LoggerConfig {
        let mut builder = crate::utils::logger::LoggerConfig::builder()
            .level(&self.level)
            .json_format(self.json_format)
            .rotation(crate::utils::logger::RotationStrategy::parse(&self.rotation));

        if let Some(ref dir) = self.log_dir {
            builder = builder.file_output(dir.clone());
        }

        builder.build()
    }
}

/// 模块管理器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// 包名发现使用的搜索路径（目录或归档）
    #[serde(default = "default_search_paths")]
    pub search_paths: Vec<PathBuf>,

    /// 模块单元文件后缀
    #[serde(default = "default_unit_suffix")]
    pub unit_suffix: String,

    /// 是否允许普通模块占用管理器自身的契约
    #[serde(default)]
    pub allow_manager_contract: bool,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

fn default_search_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("./modules")]
}

fn default_unit_suffix() -> String {
    ".module".to_string()
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            search_paths: default_search_paths(),
            unit_suffix: default_unit_suffix(),
            allow_manager_contract: false,
            log: LogConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// 创建配置构建器
    pub fn builder() -> ManagerConfigBuilder {
        ManagerConfigBuilder::new()
    }

    /// 从 YAML 字符串解析配置
    pub fn from_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| CoreError::ConfigLoadFailed(format!("YAML 解析失败: {}", e)))
    }

    /// 从 YAML 文件加载配置
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CoreError::ConfigLoadFailed(format!("无法读取配置文件 {:?}: {}", path, e))
        })?;
        Self::from_str(&content)
    }
}

/// 管理器配置构建器
#[derive(Debug, Default)]
pub struct ManagerConfigBuilder {
    config: ManagerConfig,
}

impl ManagerConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: ManagerConfig::default(),
        }
    }

    /// 设置搜索路径（替换默认值）
    pub fn search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.config.search_paths = paths;
        self
    }

    /// 追加一条搜索路径
    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.search_paths.push(path.into());
        self
    }

    /// 设置模块单元文件后缀
    pub fn unit_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.unit_suffix = suffix.into();
        self
    }

    /// 允许普通模块占用管理器契约
    pub fn allow_manager_contract(mut self, allow: bool) -> Self {
        self.config.allow_manager_contract = allow;
        self
    }

    /// 设置日志配置
    pub fn log(mut self, log: LogConfig) -> Self {
        self.config.log = log;
        self
    }

    /// 构建配置
    pub fn build(self) -> ManagerConfig {
        self.config
    }
}
