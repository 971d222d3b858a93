//! 模块管理模块
//!
//! 包含模块运行时的核心组件：
//! - 模块契约与元数据定义
//! - 能力内省目录
//! - 依赖图与拓扑排序
//! - 模块注册表
//! - 依赖注入器与模块加载器
//! - 模块管理器（编排器）

use async_trait::async_trait;
use downcast_rs::{impl_downcast, DowncastSync};

use crate::utils::Result;

pub mod catalog;
pub mod graph;
pub mod injector;
pub mod loader;
pub mod manager;
pub mod metadata;
pub mod registry;

// 重导出常用类型
pub use catalog::{Introspector, ModuleCatalog};
pub use graph::{CycleError, DependencyGraph, NodeId};
pub use injector::Injector;
pub use loader::ModuleLoader;
pub use manager::{Filter, ModuleManager};
pub use metadata::{
    ContractId, DependencySlot, ModuleAnnotation, ModuleInformation, ModuleMetadata,
    ModuleMetadataBuilder, ModuleState,
};
pub use registry::{ModuleRegistry, RegistryEntry};

/// 模块基础 trait
///
/// 所有可被运行时管理的模块都实现此 trait。生命周期钩子都有
/// 默认空实现，模块只需覆盖自己关心的钩子；编排器在调用钩子时
/// 会把自身作为参数传入，供模块反查其他模块或注册表。
///
/// # 示例
///
/// ```rust
/// use jimu_core::module::{Module, ModuleManager};
/// use jimu_core::Result;
///
/// #[derive(Default)]
/// struct Engine;
///
/// #[async_trait::async_trait]
/// impl Module for Engine {
///     async fn initialize(&self, _manager: &ModuleManager) -> Result<()> {
///         tracing::info!("引擎初始化完成");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Module: DowncastSync {
    /// 初始化钩子
    ///
    /// 在依赖绑定完成、实例进入注册表之后调用。
    async fn initialize(&self, _manager: &ModuleManager) -> Result<()> {
        Ok(())
    }

    /// 关闭钩子
    ///
    /// 在编排器统一关闭时调用，每个模块至多调用一次。
    async fn shutdown(&self, _manager: &ModuleManager) -> Result<()> {
        Ok(())
    }
}

impl_downcast!(sync Module);

/// 可销毁资源契约
///
/// 注册表、注入器、加载器和命名空间在编排器关闭时按固定顺序
/// 销毁。`destroy` 必须是幂等的。
#[async_trait]
pub trait Destroyable: Send + Sync {
    /// 释放持有的资源
    async fn destroy(&self);
}
