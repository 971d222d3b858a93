//! 能力内省目录
//!
//! 运行时并不反射扫描二进制：模块通过显式注册把自己的元数据
//! 放进目录，扫描器发现的单元名再由目录解析成元数据。编排器
//! 只依赖 [`Introspector`] 接口，不关心元数据的来源。

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::metadata::{ContractId, ModuleMetadata};
use crate::utils::{CoreError, Result};

/// 能力内省接口
///
/// 给定一个类型引用（单元名、实现类型或契约类型），
/// 返回它解析出的模块元数据。
pub trait Introspector: Send + Sync {
    /// 按全限定单元名解析
    fn resolve_name(&self, type_name: &str) -> Option<Arc<ModuleMetadata>>;

    /// 按实现类型解析
    fn resolve_impl(&self, implementation: TypeId) -> Option<Arc<ModuleMetadata>>;

    /// 按契约类型解析
    fn resolve_contract(&self, contract: ContractId) -> Option<Arc<ModuleMetadata>>;
}

/// 模块目录
///
/// [`Introspector`] 的默认实现：一个三索引的注册表
/// （单元名 / 实现类型 / 契约类型）。同一个目录可以被多个
/// 管理器共享。
///
/// # 示例
///
/// ```rust
/// use jimu_core::module::{Module, ModuleCatalog, ModuleMetadata};
///
/// #[derive(Default)]
/// struct Engine;
///
/// #[async_trait::async_trait]
/// impl Module for Engine {}
///
/// let catalog = ModuleCatalog::new();
/// catalog
///     .register(
///         ModuleMetadata::builder::<Engine>("demo.engine.Engine")
///             .constructor_default()
///             .build()
///             .unwrap(),
///     )
///     .unwrap();
///
/// assert_eq!(catalog.len(), 1);
/// ```
#[derive(Default)]
pub struct ModuleCatalog {
    by_name: RwLock<HashMap<String, Arc<ModuleMetadata>>>,
    by_impl: RwLock<HashMap<TypeId, Arc<ModuleMetadata>>>,
    by_contract: RwLock<HashMap<ContractId, Arc<ModuleMetadata>>>,
}

impl ModuleCatalog {
    /// 创建空目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一条模块元数据
    ///
    /// # 错误
    ///
    /// - 单元名已被占用时返回 `InvalidMetadata`
    /// - 实现类型已注册时返回 `InvalidMetadata`
    /// - 契约类型已被其他实现占用时返回 `DuplicateContract`
    pub fn register(&self, metadata: ModuleMetadata) -> Result<Arc<ModuleMetadata>> {
        let metadata = Arc::new(metadata);

        let mut by_name = self.by_name.write().expect("目录锁中毒");
        let mut by_impl = self.by_impl.write().expect("目录锁中毒");
        let mut by_contract = self.by_contract.write().expect("目录锁中毒");

        if by_name.contains_key(metadata.type_name()) {
            return Err(CoreError::InvalidMetadata(format!(
                "单元名 '{}' 已被注册",
                metadata.type_name()
            )));
        }
        if by_impl.contains_key(&metadata.implementation()) {
            return Err(CoreError::InvalidMetadata(format!(
                "实现类型 '{}' 已被注册",
                metadata.impl_type_name()
            )));
        }
        if by_contract.contains_key(&metadata.contract()) {
            return Err(CoreError::DuplicateContract(
                metadata.contract().name().to_string(),
            ));
        }

        by_name.insert(metadata.type_name().to_string(), Arc::clone(&metadata));
        by_impl.insert(metadata.implementation(), Arc::clone(&metadata));
        by_contract.insert(metadata.contract(), Arc::clone(&metadata));

        debug!(type_name = %metadata.type_name(), "目录注册元数据");
        Ok(metadata)
    }

    /// 批量注册
    ///
    /// 遇到第一条失败立即返回，之前成功的保持注册状态。
    pub fn register_all(
        &self,
        entries: impl IntoIterator<Item = ModuleMetadata>,
    ) -> Result<()> {
        for metadata in entries {
            self.register(metadata)?;
        }
        Ok(())
    }

    /// 已注册的元数据数量
    pub fn len(&self) -> usize {
        self.by_name.read().expect("目录锁中毒").len()
    }

    /// 目录是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 所有已注册的单元名
    pub fn type_names(&self) -> Vec<String> {
        self.by_name
            .read()
            .expect("目录锁中毒")
            .keys()
            .cloned()
            .collect()
    }
}

impl Introspector for ModuleCatalog {
    fn resolve_name(&self, type_name: &str) -> Option<Arc<ModuleMetadata>> {
        self.by_name
            .read()
            .expect("目录锁中毒")
            .get(type_name)
            .cloned()
    }

    fn resolve_impl(&self, implementation: TypeId) -> Option<Arc<ModuleMetadata>> {
        self.by_impl
            .read()
            .expect("目录锁中毒")
            .get(&implementation)
            .cloned()
    }

    fn resolve_contract(&self, contract: ContractId) -> Option<Arc<ModuleMetadata>> {
        self.by_contract
            .read()
            .expect("目录锁中毒")
            .get(&contract)
            .cloned()
    }
}
