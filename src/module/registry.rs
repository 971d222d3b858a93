//! 模块注册表
//!
//! 契约类型到存活实例的唯一事实来源。每个契约类型同一时刻
//! 至多对应一个注册条目；重复注册会被显式拒绝。

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::metadata::{ContractId, ModuleInformation, ModuleState};
use super::{Destroyable, Module};
use crate::utils::{CoreError, Result};

/// 注册表条目
///
/// 将存活的模块实例与其运行时信息配对。条目在注册时创建一次，
/// 之后实例引用不再被替换，只有在注册表销毁时才会被移除。
pub struct RegistryEntry {
    contract: ContractId,
    implementation: TypeId,
    instance: RwLock<Option<Arc<dyn Module>>>,
    information: RwLock<ModuleInformation>,
}

impl RegistryEntry {
    fn new(contract: ContractId, implementation: TypeId, information: ModuleInformation) -> Self {
        Self {
            contract,
            implementation,
            instance: RwLock::new(None),
            information: RwLock::new(information),
        }
    }

    /// 条目对应的契约类型
    pub fn contract(&self) -> ContractId {
        self.contract
    }

    /// 条目对应的实现类型
    pub fn implementation(&self) -> TypeId {
        self.implementation
    }

    /// 存活实例（注册完成前为 `None`）
    pub async fn instance(&self) -> Option<Arc<dyn Module>> {
        self.instance.read().await.clone()
    }

    /// 运行时信息快照
    pub async fn information(&self) -> ModuleInformation {
        self.information.read().await.clone()
    }

    /// 写入实例引用并推进到 Registered 状态
    pub(crate) async fn attach_instance(&self, instance: Arc<dyn Module>) -> Result<()> {
        {
            let mut slot = self.instance.write().await;
            if slot.is_some() {
                return Err(CoreError::Internal(format!(
                    "条目 '{}' 的实例已设置，不允许替换",
                    self.contract
                )));
            }
            *slot = Some(instance);
        }
        self.advance_state(ModuleState::Registered).await
    }

    /// 推进生命周期状态
    pub(crate) async fn advance_state(&self, next: ModuleState) -> Result<()> {
        let mut information = self.information.write().await;
        information.advance(next)?;
        debug!(contract = %self.contract, state = %next, "模块状态已更新");
        Ok(())
    }

    /// 记录错误信息
    pub(crate) async fn record_error(&self, error: impl Into<String>) {
        let mut information = self.information.write().await;
        information.record_error(error);
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("contract", &self.contract.name())
            .finish()
    }
}

/// 模块注册表
///
/// 管理所有已注册的模块条目，提供按契约类型和按实现类型的查询。
/// 克隆注册表得到共享同一份数据的新句柄。
///
/// 注册表本身不调用模块的关闭钩子，那是编排器的职责；
/// 销毁时只清空条目。
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    /// 契约类型 -> 注册条目
    entries: Arc<RwLock<HashMap<ContractId, Arc<RegistryEntry>>>>,
    /// 实现类型 -> 契约类型（反向索引）
    by_impl: Arc<RwLock<HashMap<TypeId, ContractId>>>,
}

impl ModuleRegistry {
    /// 创建新的模块注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建注册条目
    ///
    /// # Arguments
    ///
    /// * `contract` - 条目占用的契约类型
    /// * `implementation` - 实现类型
    /// * `information` - 初始运行时信息
    ///
    /// # Errors
    ///
    /// 契约类型已被占用时返回 `DuplicateContract`。
    pub async fn create_entry(
        &self,
        contract: ContractId,
        implementation: TypeId,
        information: ModuleInformation,
    ) -> Result<Arc<RegistryEntry>> {
        let mut entries = self.entries.write().await;
        let mut by_impl = self.by_impl.write().await;

        if entries.contains_key(&contract) {
            warn!(contract = %contract, "契约类型已被占用，拒绝注册");
            return Err(CoreError::DuplicateContract(contract.name().to_string()));
        }

        let entry = Arc::new(RegistryEntry::new(contract, implementation, information));
        entries.insert(contract, Arc::clone(&entry));
        by_impl.insert(implementation, contract);

        debug!(contract = %contract, "注册表条目已创建");
        Ok(entry)
    }

    /// 注册幽灵模块
    ///
    /// 幽灵模块是未经过发现/实例化流程、由外部直接提供的单例
    /// （典型例子是编排器把自己注册进来）。条目直接进入
    /// Registered 状态，不执行注入和初始化。
    pub async fn add_ghost_module(
        &self,
        contract: ContractId,
        instance: Arc<dyn Module>,
        information: ModuleInformation,
    ) -> Result<Arc<RegistryEntry>> {
        let implementation = instance.as_any().type_id();
        let entry = self
            .create_entry(contract, implementation, information)
            .await?;
        entry.attach_instance(instance).await?;

        debug!(contract = %contract, "幽灵模块已注册");
        Ok(entry)
    }

    /// 按契约类型获取模块实例
    pub async fn get_module(&self, contract: ContractId) -> Option<Arc<dyn Module>> {
        let entry = {
            let entries = self.entries.read().await;
            entries.get(&contract).cloned()
        };
        match entry {
            Some(entry) => entry.instance().await,
            None => None,
        }
    }

    /// 按契约类型获取具体类型的模块实例
    ///
    /// 要求该契约的实现类型恰好是 `M`。
    pub async fn get_module_as<M: Module>(&self) -> Option<Arc<M>> {
        let instance = self.get_module(ContractId::of::<M>()).await?;
        instance.downcast_arc::<M>().ok()
    }

    /// 按契约类型获取运行时信息
    pub async fn get_information(&self, contract: ContractId) -> Option<ModuleInformation> {
        let entry = {
            let entries = self.entries.read().await;
            entries.get(&contract).cloned()
        };
        match entry {
            Some(entry) => Some(entry.information().await),
            None => None,
        }
    }

    /// 按契约类型获取条目
    pub async fn get_entry(&self, contract: ContractId) -> Option<Arc<RegistryEntry>> {
        let entries = self.entries.read().await;
        entries.get(&contract).cloned()
    }

    /// 按实现类型获取条目
    pub async fn get_entry_by_impl(&self, implementation: TypeId) -> Option<Arc<RegistryEntry>> {
        let contract = {
            let by_impl = self.by_impl.read().await;
            by_impl.get(&implementation).copied()
        };
        match contract {
            Some(contract) => self.get_entry(contract).await,
            None => None,
        }
    }

    /// 契约类型是否已注册
    pub async fn contains(&self, contract: ContractId) -> bool {
        let entries = self.entries.read().await;
        entries.contains_key(&contract)
    }

    /// 所有存活实例的快照
    pub async fn module_collection(&self) -> Vec<Arc<dyn Module>> {
        let entries: Vec<_> = {
            let entries = self.entries.read().await;
            entries.values().cloned().collect()
        };

        futures::future::join_all(entries.iter().map(|entry| entry.instance()))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// 所有条目的快照
    ///
    /// 关闭流程在快照上迭代，因此关闭钩子中对注册表的修改
    /// 不会影响本轮遍历。
    pub async fn entry_collection(&self) -> Vec<Arc<RegistryEntry>> {
        let entries = self.entries.read().await;
        entries.values().cloned().collect()
    }

    /// 已注册条目数量
    pub async fn count(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }
}

impl Clone for ModuleRegistry {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            by_impl: Arc::clone(&self.by_impl),
        }
    }
}

#[async_trait]
impl Destroyable for ModuleRegistry {
    async fn destroy(&self) {
        let mut entries = self.entries.write().await;
        let mut by_impl = self.by_impl.write().await;

        if !entries.is_empty() {
            debug!(count = entries.len(), "注册表销毁，清空所有条目");
        }
        entries.clear();
        by_impl.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::ModuleAnnotation;

    #[derive(Default)]
    struct Engine;

    #[async_trait::async_trait]
    impl Module for Engine {}

    #[derive(Default)]
    struct BackupEngine;

    #[async_trait::async_trait]
    impl Module for BackupEngine {}

    fn engine_info() -> ModuleInformation {
        ModuleInformation::new(ModuleAnnotation::new("engine", "1.0.0"))
    }

    #[tokio::test]
    async fn test_registry_creation() {
        let registry = ModuleRegistry::new();
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_create_entry_and_attach() {
        let registry = ModuleRegistry::new();
        let contract = ContractId::of::<Engine>();

        let entry = registry
            .create_entry(contract, TypeId::of::<Engine>(), engine_info())
            .await
            .unwrap();

        assert!(entry.instance().await.is_none());
        assert_eq!(entry.information().await.state(), ModuleState::Created);

        entry.attach_instance(Arc::new(Engine)).await.unwrap();
        assert!(entry.instance().await.is_some());
        assert_eq!(entry.information().await.state(), ModuleState::Registered);
        assert!(entry.information().await.registered_at().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_contract_rejected() {
        let registry = ModuleRegistry::new();
        let contract = ContractId::of::<Engine>();

        registry
            .create_entry(contract, TypeId::of::<Engine>(), engine_info())
            .await
            .unwrap();

        // 不同实现类型占用同一契约也必须被拒绝
        let result = registry
            .create_entry(contract, TypeId::of::<BackupEngine>(), engine_info())
            .await;
        assert!(matches!(result, Err(CoreError::DuplicateContract(_))));
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_attach_instance_twice() {
        let registry = ModuleRegistry::new();
        let entry = registry
            .create_entry(ContractId::of::<Engine>(), TypeId::of::<Engine>(), engine_info())
            .await
            .unwrap();

        entry.attach_instance(Arc::new(Engine)).await.unwrap();
        let result = entry.attach_instance(Arc::new(Engine)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ghost_module() {
        let registry = ModuleRegistry::new();
        let engine: Arc<dyn Module> = Arc::new(Engine);

        registry
            .add_ghost_module(ContractId::of::<Engine>(), engine, engine_info())
            .await
            .unwrap();

        let instance = registry.get_module(ContractId::of::<Engine>()).await;
        assert!(instance.is_some());

        let info = registry
            .get_information(ContractId::of::<Engine>())
            .await
            .unwrap();
        assert_eq!(info.state(), ModuleState::Registered);
    }

    #[tokio::test]
    async fn test_get_module_as() {
        let registry = ModuleRegistry::new();
        registry
            .add_ghost_module(ContractId::of::<Engine>(), Arc::new(Engine), engine_info())
            .await
            .unwrap();

        let typed: Option<Arc<Engine>> = registry.get_module_as::<Engine>().await;
        assert!(typed.is_some());

        let missing: Option<Arc<BackupEngine>> = registry.get_module_as::<BackupEngine>().await;
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_get_entry_by_impl() {
        let registry = ModuleRegistry::new();
        registry
            .add_ghost_module(ContractId::of::<Engine>(), Arc::new(Engine), engine_info())
            .await
            .unwrap();

        let entry = registry.get_entry_by_impl(TypeId::of::<Engine>()).await;
        assert!(entry.is_some());
        assert_eq!(entry.unwrap().contract(), ContractId::of::<Engine>());

        assert!(registry
            .get_entry_by_impl(TypeId::of::<BackupEngine>())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_module_collection_snapshot() {
        let registry = ModuleRegistry::new();
        registry
            .add_ghost_module(ContractId::of::<Engine>(), Arc::new(Engine), engine_info())
            .await
            .unwrap();
        registry
            .add_ghost_module(
                ContractId::of::<BackupEngine>(),
                Arc::new(BackupEngine),
                engine_info(),
            )
            .await
            .unwrap();

        let modules = registry.module_collection().await;
        assert_eq!(modules.len(), 2);
    }

    #[tokio::test]
    async fn test_destroy_idempotent() {
        let registry = ModuleRegistry::new();
        registry
            .add_ghost_module(ContractId::of::<Engine>(), Arc::new(Engine), engine_info())
            .await
            .unwrap();
        assert_eq!(registry.count().await, 1);

        registry.destroy().await;
        assert_eq!(registry.count().await, 0);
        assert!(registry.get_module(ContractId::of::<Engine>()).await.is_none());

        // 再次销毁是无操作
        registry.destroy().await;
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_registry_clone_shares_state() {
        let registry = ModuleRegistry::new();
        let cloned = registry.clone();

        registry
            .add_ghost_module(ContractId::of::<Engine>(), Arc::new(Engine), engine_info())
            .await
            .unwrap();

        assert!(cloned.contains(ContractId::of::<Engine>()).await);
        assert_eq!(cloned.count().await, 1);
    }
}
