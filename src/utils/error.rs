//! 积木内核错误类型定义
//!
//! 本模块定义了模块运行时中使用的所有错误类型。

use std::path::PathBuf;

use thiserror::Error;

/// 积木内核核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 元数据错误 ====================

    /// 模块元数据未注册
    #[error("模块元数据未注册: '{0}'")]
    MetadataNotFound(String),

    /// 无效的模块元数据
    #[error("无效的模块元数据: {0}")]
    InvalidMetadata(String),

    // ==================== 注册表错误 ====================

    /// 契约类型已被其他模块占用
    #[error("契约类型已被注册: '{0}'")]
    DuplicateContract(String),

    /// 模块未找到
    #[error("模块未找到: '{0}'")]
    ModuleNotFound(String),

    // ==================== 加载与注入错误 ====================

    /// 依赖未满足
    #[error("模块 '{module}' 的依赖 '{dependency}' 未满足")]
    MissingDependency {
        /// 依赖方模块
        module: String,
        /// 缺失的契约类型名
        dependency: String,
    },

    /// 检测到循环依赖
    #[error("检测到循环依赖: {0}")]
    CircularDependency(String),

    /// 模块实例化失败
    #[error("模块实例化失败: '{module}' - {reason}")]
    InstantiationFailed {
        /// 目标模块
        module: String,
        /// 失败原因
        reason: String,
    },

    /// 初始化钩子调用失败
    #[error("初始化钩子调用失败: '{module}' - {reason}")]
    InitHookFailed {
        /// 目标模块
        module: String,
        /// 失败原因
        reason: String,
    },

    /// 关闭钩子调用失败
    #[error("关闭钩子调用失败: '{module}' - {reason}")]
    ShutdownHookFailed {
        /// 目标模块
        module: String,
        /// 失败原因
        reason: String,
    },

    /// 类型降转失败
    #[error("类型降转失败: 期望类型 '{expected}'")]
    DowncastFailed {
        /// 期望的具体类型名
        expected: String,
    },

    // ==================== 扫描错误 ====================

    /// 归档文件读取失败（对当前扫描调用是致命错误）
    #[error("归档读取失败: {origin:?} - {reason}")]
    ArchiveRead {
        /// 归档文件路径
        origin: PathBuf,
        /// 失败原因
        reason: String,
    },

    // ==================== 命名空间错误 ====================

    /// 命名空间名称冲突（内部不变量被破坏）
    #[error("命名空间名称冲突: '{0}'")]
    RealmCollision(String),

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 版本解析错误
    #[error("版本解析错误: {0}")]
    VersionParse(#[from] semver::Error),

    // ==================== 通用错误 ====================

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 内核操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 错误码常量
pub mod error_code {
    // 元数据错误 (META-xxx)
    /// 元数据未注册
    pub const META_NOT_FOUND: &str = "META-001";
    /// 元数据无效
    pub const META_INVALID: &str = "META-002";

    // 注册表错误 (REGISTRY-xxx)
    /// 契约冲突
    pub const REGISTRY_DUPLICATE_CONTRACT: &str = "REGISTRY-001";
    /// 模块未找到
    pub const REGISTRY_MODULE_NOT_FOUND: &str = "REGISTRY-002";

    // 加载错误 (LOAD-xxx)
    /// 依赖缺失
    pub const LOAD_MISSING_DEPENDENCY: &str = "LOAD-001";
    /// 循环依赖
    pub const LOAD_CIRCULAR_DEPENDENCY: &str = "LOAD-002";
    /// 实例化失败
    pub const LOAD_INSTANTIATION_FAILED: &str = "LOAD-003";
    /// 钩子调用失败
    pub const LOAD_HOOK_FAILED: &str = "LOAD-004";

    // 扫描错误 (SCAN-xxx)
    /// 归档读取失败
    pub const SCAN_ARCHIVE_READ: &str = "SCAN-001";

    // 命名空间错误 (REALM-xxx)
    /// 命名空间冲突
    pub const REALM_COLLISION: &str = "REALM-001";

    // 配置错误 (CONFIG-xxx)
    /// 配置加载失败
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::MetadataNotFound(_) => error_code::META_NOT_FOUND,
            CoreError::InvalidMetadata(_) => error_code::META_INVALID,
            CoreError::DuplicateContract(_) => error_code::REGISTRY_DUPLICATE_CONTRACT,
            CoreError::ModuleNotFound(_) => error_code::REGISTRY_MODULE_NOT_FOUND,
            CoreError::MissingDependency { .. } => error_code::LOAD_MISSING_DEPENDENCY,
            CoreError::CircularDependency(_) => error_code::LOAD_CIRCULAR_DEPENDENCY,
            CoreError::InstantiationFailed { .. } => error_code::LOAD_INSTANTIATION_FAILED,
            CoreError::InitHookFailed { .. } | CoreError::ShutdownHookFailed { .. } => {
                error_code::LOAD_HOOK_FAILED
            }
            CoreError::ArchiveRead { .. } => error_code::SCAN_ARCHIVE_READ,
            CoreError::RealmCollision(_) => error_code::REALM_COLLISION,
            CoreError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            _ => "UNKNOWN",
        }
    }

    /// 该错误在批量加载中是否只影响单个候选模块
    ///
    /// 除循环依赖与实例化失败外的加载错误都按"跳过并继续"处理。
    pub fn is_per_candidate(&self) -> bool {
        matches!(
            self,
            CoreError::MetadataNotFound(_)
                | CoreError::InvalidMetadata(_)
                | CoreError::DuplicateContract(_)
                | CoreError::MissingDependency { .. }
                | CoreError::InitHookFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::MissingDependency {
            module: "demo.Car".to_string(),
            dependency: "demo.Engine".to_string(),
        };
        assert!(err.to_string().contains("demo.Car"));
        assert!(err.to_string().contains("demo.Engine"));
    }

    #[test]
    fn test_error_code() {
        let err = CoreError::CircularDependency("a -> b -> a".to_string());
        assert_eq!(err.error_code(), error_code::LOAD_CIRCULAR_DEPENDENCY);

        let err = CoreError::DuplicateContract("demo.Engine".to_string());
        assert_eq!(err.error_code(), error_code::REGISTRY_DUPLICATE_CONTRACT);
    }

    #[test]
    fn test_is_per_candidate() {
        let skip = CoreError::MissingDependency {
            module: "a".to_string(),
            dependency: "b".to_string(),
        };
        assert!(skip.is_per_candidate());

        let fatal = CoreError::InstantiationFailed {
            module: "a".to_string(),
            reason: "boom".to_string(),
        };
        assert!(!fatal.is_per_candidate());

        assert!(!CoreError::CircularDependency("a".to_string()).is_per_candidate());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
    }
}
