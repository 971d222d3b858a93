//! # Jimu Core - 积木模块运行时
//!
//! 积木（Jimu）是一个模块/插件运行时内核：给定一组代码位置
//! （目录、归档或显式类型），它发现候选模块实现、把声明的
//! 模块间依赖解析成合法的加载顺序、实例化并完成装配，并把
//! 生命周期一直管理到统一关闭。核心能力：
//!
//! - **模块发现**: 扫描目录和归档中的模块单元，扫描结果带缓存
//! - **依赖排序**: 由声明依赖构建依赖图，拓扑排序并检测循环
//! - **依赖注入**: 新建实例的依赖槽位按契约类型自动绑定
//! - **生命周期管理**: 注册 → 初始化 → 关闭的单调状态机
//! - **命名空间隔离**: 每个管理器独占一个可见性作用域
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use jimu_core::{ManagerConfig, Module, ModuleCatalog, ModuleManager, ModuleMetadata};
//!
//! #[derive(Default)]
//! struct Engine;
//!
//! #[async_trait::async_trait]
//! impl Module for Engine {}
//!
//! #[tokio::main]
//! async fn main() -> jimu_core::Result<()> {
//!     // 声明模块元数据
//!     let catalog = Arc::new(ModuleCatalog::new());
//!     catalog.register(
//!         ModuleMetadata::builder::<Engine>("demo.engine.Engine")
//!             .constructor_default()
//!             .build()?,
//!     )?;
//!
//!     // 创建管理器并从目录批量加载
//!     let manager = ModuleManager::new(ManagerConfig::default(), catalog).await?;
//!     let modules = manager.load_modules("./modules", &[]).await?;
//!     println!("加载了 {} 个模块", modules.len());
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 模块契约、元数据、注册表、注入器、加载器和管理器
//! - `location` - 代码位置与扫描器
//! - `realm` - 隔离命名空间
//! - `core` - 配置
//! - `utils` - 错误类型、ID 生成和日志系统

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod core;
pub mod location;
pub mod module;
pub mod realm;
pub mod utils;

// 重导出常用类型，方便使用
pub use self::core::config::{LogConfig, ManagerConfig, ManagerConfigBuilder};

pub use module::{
    ContractId, CycleError, DependencyGraph, Destroyable, Filter, Injector, Introspector,
    Module, ModuleAnnotation, ModuleCatalog, ModuleInformation, ModuleLoader, ModuleManager,
    ModuleMetadata, ModuleMetadataBuilder, ModuleRegistry, ModuleState, NodeId, RegistryEntry,
};

pub use location::{CodeLocation, LocationKind, LocationScanner, ScanCache, ScanOutcome};

pub use realm::Realm;

pub use utils::logger::{LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};
pub use utils::{error_code, generate_id, CoreError, Result};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
