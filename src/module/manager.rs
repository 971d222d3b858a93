//! 模块管理器
//!
//! 整合模块运行时的所有组件，提供统一的门面：提供现成实例、
//! 按类型/名称/位置加载模块、查询注册表、统一关闭。
//!
//! 批量加载的控制流：扫描位置 → 解析候选 → 调用方过滤 →
//! 构建依赖图 → 拓扑排序 → 按序逐个加载。

use std::any::TypeId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::catalog::Introspector;
use super::graph::{DependencyGraph, NodeId};
use super::injector::Injector;
use super::loader::ModuleLoader;
use super::metadata::{
    ContractId, ModuleAnnotation, ModuleInformation, ModuleMetadata, ModuleState,
};
use super::registry::ModuleRegistry;
use super::{Destroyable, Module};
use crate::core::config::ManagerConfig;
use crate::location::{CodeLocation, LocationScanner, ScanCache};
use crate::realm::Realm;
use crate::utils::{CoreError, Result};

/// 候选过滤器
///
/// 在依赖图构建之前应用于候选集，按给定顺序依次执行；
/// 任何一个过滤器不保留的候选都会被移出本批次。
///
/// 闭包可以直接作为过滤器使用：
///
/// ```rust
/// use jimu_core::module::{Filter, ModuleMetadata};
///
/// let only_demo = |candidate: &ModuleMetadata| candidate.type_name().starts_with("demo.");
/// fn assert_filter(_: &impl Filter) {}
/// assert_filter(&only_demo);
/// ```
pub trait Filter: Send + Sync {
    /// 是否保留该候选
    fn retain(&self, candidate: &ModuleMetadata) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&ModuleMetadata) -> bool + Send + Sync,
{
    fn retain(&self, candidate: &ModuleMetadata) -> bool {
        self(candidate)
    }
}

/// 模块管理器
///
/// 独占持有一个命名空间、注册表、注入器、加载器和扫描器。
/// 构造时把自己作为幽灵模块注册进注册表，模块因此可以把
/// 管理器声明为注入依赖。
///
/// # 示例
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use jimu_core::core::config::ManagerConfig;
/// use jimu_core::module::{ModuleCatalog, ModuleManager};
///
/// #[tokio::main]
/// async fn main() -> jimu_core::Result<()> {
///     let catalog = Arc::new(ModuleCatalog::new());
///     let manager = ModuleManager::new(ManagerConfig::default(), catalog).await?;
///
///     let modules = manager.load_modules("./modules", &[]).await?;
///     println!("加载了 {} 个模块", modules.len());
///
///     manager.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ModuleManager {
    config: ManagerConfig,
    realm: Arc<Realm>,
    registry: ModuleRegistry,
    injector: Injector,
    loader: ModuleLoader,
    scanner: LocationScanner,
}

impl ModuleManager {
    /// 创建模块管理器
    ///
    /// 使用独立的扫描缓存；多个管理器需要共享缓存时使用
    /// [`ModuleManager::with_cache`]。
    pub async fn new(
        config: ManagerConfig,
        introspector: Arc<dyn Introspector>,
    ) -> Result<Arc<Self>> {
        Self::with_cache(config, introspector, Arc::new(ScanCache::new())).await
    }

    /// 使用共享扫描缓存创建模块管理器
    pub async fn with_cache(
        config: ManagerConfig,
        introspector: Arc<dyn Introspector>,
        cache: Arc<ScanCache>,
    ) -> Result<Arc<Self>> {
        Self::build(config, introspector, cache, Realm::new_root()).await
    }

    /// 在父命名空间下创建模块管理器
    ///
    /// 新管理器的命名空间是 `parent` 的子空间，能看见父链上
    /// 登记的位置。
    pub async fn with_parent_realm(
        config: ManagerConfig,
        introspector: Arc<dyn Introspector>,
        cache: Arc<ScanCache>,
        parent: &Arc<Realm>,
    ) -> Result<Arc<Self>> {
        let realm = parent.new_child()?;
        Self::build(config, introspector, cache, realm).await
    }

    async fn build(
        config: ManagerConfig,
        introspector: Arc<dyn Introspector>,
        cache: Arc<ScanCache>,
        realm: Arc<Realm>,
    ) -> Result<Arc<Self>> {
        let registry = ModuleRegistry::new();
        let injector = Injector::new(registry.clone());
        let loader = ModuleLoader::new(
            Arc::clone(&realm),
            registry.clone(),
            injector.clone(),
            introspector,
            config.allow_manager_contract,
        );
        let scanner = LocationScanner::new(cache, &config.unit_suffix);

        let manager = Arc::new(Self {
            config,
            realm,
            registry,
            injector,
            loader,
            scanner,
        });

        // 把自己注册为幽灵模块，供其他模块按契约注入
        let annotation =
            ModuleAnnotation::new("module-manager", env!("CARGO_PKG_VERSION"));
        manager
            .registry
            .add_ghost_module(
                ContractId::of::<ModuleManager>(),
                Arc::clone(&manager) as Arc<dyn Module>,
                ModuleInformation::new(annotation),
            )
            .await?;

        info!(realm = %manager.realm.name(), "模块管理器已创建");
        Ok(manager)
    }

    // ==================== 基础访问器 ====================

    /// 管理器配置
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// 所属命名空间
    pub fn realm(&self) -> &Arc<Realm> {
        &self.realm
    }

    /// 模块注册表
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// 模块加载器
    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    /// 依赖注入器
    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    // ==================== 提供现成实例 ====================

    /// 注册外部构造的实例并完成注入与初始化
    ///
    /// 驱动 Created → Registered → Initialized 的完整序列。
    /// 实例的实现类型必须能解析到元数据，否则拒绝注册。
    pub async fn provide<M: Module>(&self, module: M) -> Result<Arc<M>> {
        self.provide_internal(module, true).await
    }

    /// 只注册外部构造的实例，不注入、不初始化
    ///
    /// 适用于自行完成装配的实例：依赖槽位保持未绑定，
    /// 初始化钩子不会被调用，状态停在 Registered。
    pub async fn provide_simple<M: Module>(&self, module: M) -> Result<Arc<M>> {
        self.provide_internal(module, false).await
    }

    async fn provide_internal<M: Module>(&self, mut module: M, inject: bool) -> Result<Arc<M>> {
        let Some(metadata) = self.loader.resolve_by_impl(TypeId::of::<M>()) else {
            warn!(
                impl_type = std::any::type_name::<M>(),
                "提供的实例无法解析为模块元数据，不予注册"
            );
            return Err(CoreError::MetadataNotFound(
                std::any::type_name::<M>().to_string(),
            ));
        };

        if self.registry.contains(metadata.contract()).await {
            return Err(CoreError::DuplicateContract(
                metadata.contract().name().to_string(),
            ));
        }

        if inject {
            self.injector.inject(&mut module, &metadata).await?;
        }

        let instance = Arc::new(module);
        let entry = self
            .registry
            .create_entry(
                metadata.contract(),
                metadata.implementation(),
                ModuleInformation::from_metadata(Arc::clone(&metadata)),
            )
            .await?;
        entry
            .attach_instance(Arc::clone(&instance) as Arc<dyn Module>)
            .await?;

        if inject {
            let dyn_instance = Arc::clone(&instance) as Arc<dyn Module>;
            if let Err(e) = self
                .injector
                .initialize(self, &dyn_instance, &metadata, &entry)
                .await
            {
                warn!(module = %metadata.type_name(), error = %e, "初始化钩子失败，模块保持已注册状态");
            }
        }

        debug!(module = %metadata.type_name(), inject, "实例已提供");
        Ok(instance)
    }

    // ==================== 加载模块 ====================

    /// 按实现类型或契约类型直接加载单个模块
    ///
    /// 不走批量/图阶段；缺失的依赖会被惰性加载。
    #[instrument(skip(self), fields(impl_type = std::any::type_name::<M>()))]
    pub async fn load_module<M: Module>(&self) -> Result<Arc<M>> {
        let metadata = self
            .loader
            .resolve_by_impl(TypeId::of::<M>())
            .or_else(|| self.loader.resolve_by_contract(ContractId::of::<M>()))
            .ok_or_else(|| {
                CoreError::MetadataNotFound(std::any::type_name::<M>().to_string())
            })?;

        let instance = self.loader.load_direct(self, metadata).await?;
        instance
            .downcast_arc::<M>()
            .map_err(|_| CoreError::DowncastFailed {
                expected: std::any::type_name::<M>().to_string(),
            })
    }

    /// 按全限定单元名直接加载单个模块
    pub async fn load_module_by_name(&self, type_name: &str) -> Result<Arc<dyn Module>> {
        let metadata = self
            .loader
            .resolve_by_name(type_name)
            .ok_or_else(|| CoreError::MetadataNotFound(type_name.to_string()))?;

        self.loader.load_direct(self, metadata).await
    }

    /// 从目录或归档路径批量加载模块
    ///
    /// 完整的发现流水线；返回按依赖顺序成功加载的模块集合。
    /// 候选集中存在依赖循环时返回空集合（记录警告）；某个模块
    /// 实例化失败时停止后续加载，返回已加载的部分。
    pub async fn load_modules(
        &self,
        path: impl AsRef<Path>,
        filters: &[&dyn Filter],
    ) -> Result<Vec<Arc<dyn Module>>> {
        let location = CodeLocation::from_path(path.as_ref(), self.realm.name());
        self.load_modules_from_locations(vec![location], None, filters)
            .await
    }

    /// 按点分包名批量加载模块
    ///
    /// 包名先尝试作为已知单元名解析（命中则直接加载该模块），
    /// 否则在配置的搜索路径上按包名前缀做发现。
    pub async fn load_modules_from_package(
        &self,
        package: &str,
        filters: &[&dyn Filter],
    ) -> Result<Vec<Arc<dyn Module>>> {
        // 先检查包名是否就是一个已知单元名
        if let Some(metadata) = self.loader.resolve_by_name(package) {
            if self.loader.is_valid_module_type(&metadata) {
                let instance = self.loader.load_direct(self, metadata).await?;
                return Ok(vec![instance]);
            }
        }

        let locations: Vec<CodeLocation> = self
            .config
            .search_paths
            .iter()
            .map(|path| CodeLocation::from_path(path, self.realm.name()))
            .collect();

        self.load_modules_from_locations(locations, Some(package), filters)
            .await
    }

    /// 从一组代码位置批量加载模块
    ///
    /// # 流程
    /// 1. 扫描位置，产出候选单元名
    /// 2. 解析成元数据并应用调用方过滤器
    /// 3. 由声明的依赖和 requirement 构建依赖图
    /// 4. 拓扑排序（发现循环则整批放弃）
    /// 5. 按序逐个加载
    #[instrument(skip_all, fields(realm = %self.realm.name(), locations = locations.len()))]
    pub async fn load_modules_from_locations(
        &self,
        locations: Vec<CodeLocation>,
        package: Option<&str>,
        filters: &[&dyn Filter],
    ) -> Result<Vec<Arc<dyn Module>>> {
        // 1. 扫描（归档不可读会使整个调用失败）
        let outcome = self.scanner.scan(&self.realm, &locations, package)?;

        // 2. 解析并过滤候选
        let mut candidates = self.loader.filter_candidates(&outcome.matched);
        for filter in filters {
            candidates.retain(|candidate| filter.retain(candidate));
        }
        debug!(candidates = candidates.len(), "过滤后的候选集");

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // 3. 构建依赖图
        let graph = self.build_graph(&candidates).await;

        // 4. 排序；存在循环时整批放弃
        let ordered: Vec<Arc<ModuleMetadata>> = match graph.sort() {
            Ok(sorted) => sorted.into_iter().map(Arc::clone).collect(),
            Err(e) => {
                warn!(error = %e, "模块加载顺序排序失败，放弃本批次");
                return Ok(Vec::new());
            }
        };

        // 5. 按序加载
        let mut modules: Vec<Arc<dyn Module>> = Vec::new();
        for metadata in &ordered {
            match self.loader.load_module(self, metadata).await {
                Ok(instance) => modules.push(instance),
                Err(e) if e.is_per_candidate() => {
                    warn!(module = %metadata.type_name(), error = %e, "候选模块加载失败，跳过");
                }
                Err(e) => {
                    warn!(
                        module = %metadata.type_name(),
                        error = %e,
                        "模块加载失败，中止本批次剩余加载"
                    );
                    break;
                }
            }
        }

        info!(loaded = modules.len(), total = ordered.len(), "批量加载完成");
        Ok(modules)
    }

    /// 由候选集构建依赖图
    ///
    /// 依赖边只在本批次候选之间建立：已注册的契约不需要顺序
    /// 约束，既不在批次中也未注册的依赖留给注入阶段报错。
    /// 指向自身契约的声明被忽略。
    async fn build_graph(
        &self,
        candidates: &[Arc<ModuleMetadata>],
    ) -> DependencyGraph<Arc<ModuleMetadata>> {
        let mut graph = DependencyGraph::new();
        let mut node_by_impl: HashMap<TypeId, NodeId> = HashMap::new();
        let mut node_by_contract: HashMap<ContractId, NodeId> = HashMap::new();

        for candidate in candidates {
            let node = graph.add_node(Arc::clone(candidate));
            node_by_impl.insert(candidate.implementation(), node);
            node_by_contract.insert(candidate.contract(), node);
        }

        for candidate in candidates {
            let node = node_by_impl[&candidate.implementation()];

            let constraints = candidate
                .dependencies()
                .iter()
                .map(|slot| slot.contract())
                .chain(candidate.requirements().iter().copied());

            for contract in constraints {
                // 自依赖忽略
                if contract == candidate.contract() {
                    continue;
                }

                if let Some(&dep_node) = node_by_contract.get(&contract) {
                    graph.require_before(dep_node, node);
                } else if self.registry.contains(contract).await {
                    // 已注册的依赖天然先于本批次，无需约束
                } else {
                    debug!(
                        module = %candidate.type_name(),
                        dependency = %contract,
                        "依赖既不在候选集中也未注册，注入阶段处理"
                    );
                }
            }
        }

        graph
    }

    // ==================== 查询 ====================

    /// 按契约类型获取模块实例
    pub async fn get_module<M: Module>(&self) -> Option<Arc<M>> {
        self.registry.get_module_as::<M>().await
    }

    /// 按契约类型获取模块实例（动态形式）
    pub async fn get_module_dyn(&self, contract: ContractId) -> Option<Arc<dyn Module>> {
        self.registry.get_module(contract).await
    }

    /// 按契约类型获取模块运行时信息
    pub async fn get_information<C: ?Sized + 'static>(&self) -> Option<ModuleInformation> {
        self.registry.get_information(ContractId::of::<C>()).await
    }

    /// 已注册模块数量
    pub async fn module_count(&self) -> usize {
        self.registry.count().await
    }

    // ==================== 黑名单 ====================

    /// 把名称加入扫描黑名单
    ///
    /// 黑名单归共享扫描缓存所有：与同一缓存共享的其他管理器
    /// 同样受影响。
    pub fn blacklist_name(&self, name: impl Into<String>) {
        self.scanner.cache().blacklist_name(name);
    }

    /// 把来源路径加入扫描黑名单并使其缓存失效
    pub fn blacklist_origin(&self, origin: impl Into<PathBuf>) {
        self.scanner.cache().blacklist_origin(origin);
    }

    // ==================== 关闭 ====================

    /// 关闭管理器
    ///
    /// 在注册表快照上遍历所有模块：已处于 Shutdown 状态的跳过，
    /// 其余逐个调用关闭钩子（失败只记录，不阻断其他模块），然后
    /// 把状态推进到 Shutdown。最后按构造顺序销毁持有的资源
    /// （命名空间、注册表、注入器、加载器）。
    ///
    /// 重复调用是无操作：快照为空，钩子不会被再次触发。
    #[instrument(skip(self), fields(realm = %self.realm.name()))]
    pub async fn shutdown(&self) {
        info!("开始关闭模块管理器");

        // 快照遍历：关闭钩子内部对注册表的修改不影响本轮
        let entries = self.registry.entry_collection().await;

        for entry in entries {
            let information = entry.information().await;
            if information.state().is_shutdown() {
                continue;
            }

            if let Some(instance) = entry.instance().await {
                debug!(contract = %entry.contract(), "调用关闭钩子");
                if let Err(e) = instance.shutdown(self).await {
                    warn!(contract = %entry.contract(), error = %e, "关闭钩子失败");
                    entry.record_error(e.to_string()).await;
                }
            }

            // 无论钩子结果如何都进入终态，保证至多调用一次
            if let Err(e) = entry.advance_state(ModuleState::Shutdown).await {
                warn!(contract = %entry.contract(), error = %e, "无法推进到关闭状态");
            }
        }

        // 按构造顺序销毁
        self.realm.destroy().await;
        self.registry.destroy().await;
        self.injector.destroy().await;
        self.loader.destroy().await;

        info!("模块管理器已关闭");
    }
}

#[async_trait]
impl Module for ModuleManager {}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleManager")
            .field("realm", &self.realm.name())
            .finish()
    }
}
