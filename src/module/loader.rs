//! 模块加载器
//!
//! 把类型引用解析成经过校验的模块元数据，并驱动单个模块的
//! 实例化 → 注入 → 注册 → 初始化序列。元数据解析结果按实现
//! 类型缓存。

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock as StdRwLock};

use async_trait::async_trait;
use tracing::{debug, info, trace, warn};

use super::catalog::Introspector;
use super::injector::Injector;
use super::manager::ModuleManager;
use super::metadata::{ContractId, ModuleInformation, ModuleMetadata};
use super::registry::ModuleRegistry;
use super::{Destroyable, Module};
use crate::realm::Realm;
use crate::utils::{CoreError, Result};

/// 元数据解析缓存项
///
/// `None` 表示该类型已确认不可用，避免重复校验。
type ResolvedEntry = Option<Arc<ModuleMetadata>>;

/// 模块加载器
///
/// 加载发生在所属命名空间的作用域内；加载器自身不做发现，
/// 只消费内省接口给出的元数据。
pub struct ModuleLoader {
    realm: Arc<Realm>,
    registry: ModuleRegistry,
    injector: Injector,
    introspector: Arc<dyn Introspector>,
    allow_manager_contract: bool,
    resolved: StdRwLock<HashMap<TypeId, ResolvedEntry>>,
}

impl ModuleLoader {
    /// 创建加载器
    pub fn new(
        realm: Arc<Realm>,
        registry: ModuleRegistry,
        injector: Injector,
        introspector: Arc<dyn Introspector>,
        allow_manager_contract: bool,
    ) -> Self {
        Self {
            realm,
            registry,
            injector,
            introspector,
            allow_manager_contract,
            resolved: StdRwLock::new(HashMap::new()),
        }
    }

    /// 所属命名空间
    pub fn realm(&self) -> &Arc<Realm> {
        &self.realm
    }

    /// 按实现类型解析元数据
    ///
    /// 未注册、或契约是编排器自身契约（且未显式允许）时返回
    /// `None`。结果（包括否定结果）按实现类型缓存。
    pub fn resolve_by_impl(&self, implementation: TypeId) -> Option<Arc<ModuleMetadata>> {
        {
            let resolved = self.resolved.read().expect("加载器缓存锁中毒");
            if let Some(cached) = resolved.get(&implementation) {
                return cached.clone();
            }
        }

        let metadata = self
            .introspector
            .resolve_impl(implementation)
            .filter(|m| self.contract_permitted(m));

        self.resolved
            .write()
            .expect("加载器缓存锁中毒")
            .insert(implementation, metadata.clone());
        metadata
    }

    /// 按全限定单元名解析元数据
    pub fn resolve_by_name(&self, type_name: &str) -> Option<Arc<ModuleMetadata>> {
        let metadata = self.introspector.resolve_name(type_name)?;
        self.resolve_by_impl(metadata.implementation())
    }

    /// 按契约类型解析元数据
    pub fn resolve_by_contract(&self, contract: ContractId) -> Option<Arc<ModuleMetadata>> {
        let metadata = self.introspector.resolve_contract(contract)?;
        self.resolve_by_impl(metadata.implementation())
    }

    /// 元数据是否可通过发现流程加载
    ///
    /// 没有构造函数的元数据是纯声明（只能 `provide` 现成实例），
    /// 发现阶段会静默丢弃它。
    pub fn is_valid_module_type(&self, metadata: &ModuleMetadata) -> bool {
        metadata.has_constructor() && self.contract_permitted(metadata)
    }

    /// 契约是否允许被普通模块占用
    fn contract_permitted(&self, metadata: &ModuleMetadata) -> bool {
        self.allow_manager_contract
            || metadata.contract() != ContractId::of::<ModuleManager>()
    }

    /// 把发现到的单元名映射为候选元数据集合
    ///
    /// 无法解析或不可加载的名字被静默丢弃（记录 trace 日志），
    /// 结果按实现类型去重并保持发现顺序。
    pub fn filter_candidates(&self, type_names: &[String]) -> Vec<Arc<ModuleMetadata>> {
        let mut seen: HashSet<TypeId> = HashSet::new();
        let mut candidates = Vec::new();

        for name in type_names {
            let Some(metadata) = self.resolve_by_name(name) else {
                trace!(type_name = %name, "单元名无法解析为模块元数据，丢弃");
                continue;
            };

            if !self.is_valid_module_type(&metadata) {
                trace!(type_name = %name, "元数据不可加载，丢弃");
                continue;
            }

            if seen.insert(metadata.implementation()) {
                candidates.push(metadata);
            }
        }

        debug!(
            discovered = type_names.len(),
            candidates = candidates.len(),
            "候选集过滤完成"
        );
        candidates
    }

    /// 加载单个模块（不处理未注册的依赖）
    ///
    /// # 加载流程
    /// 1. 检查契约是否已被占用
    /// 2. 实例化实现类型
    /// 3. 绑定声明的依赖
    /// 4. 创建注册表条目并写入实例（状态推进到 Registered）
    /// 5. 调用初始化钩子（成功则推进到 Initialized）
    ///
    /// 初始化钩子失败不会使本次加载失败：模块保持已注册状态，
    /// 错误记录在条目信息中。
    pub async fn load_module(
        &self,
        manager: &ModuleManager,
        metadata: &Arc<ModuleMetadata>,
    ) -> Result<Arc<dyn Module>> {
        debug!(
            module = %metadata.type_name(),
            realm = %self.realm.name(),
            "开始加载模块"
        );

        if self.registry.contains(metadata.contract()).await {
            return Err(CoreError::DuplicateContract(
                metadata.contract().name().to_string(),
            ));
        }

        let mut instance = metadata.instantiate()?;

        self.injector.inject(instance.as_mut(), metadata).await?;

        let entry = self
            .registry
            .create_entry(
                metadata.contract(),
                metadata.implementation(),
                ModuleInformation::from_metadata(Arc::clone(metadata)),
            )
            .await?;

        let instance: Arc<dyn Module> = Arc::from(instance);
        entry.attach_instance(Arc::clone(&instance)).await?;

        if let Err(e) = self
            .injector
            .initialize(manager, &instance, metadata, &entry)
            .await
        {
            warn!(
                module = %metadata.type_name(),
                error = %e,
                "初始化钩子失败，模块保持已注册状态"
            );
        }

        info!(module = %metadata.type_name(), "模块加载完成");
        Ok(instance)
    }

    /// 直接加载模块，缺失的依赖先行加载
    ///
    /// 与批量加载不同：目标模块的依赖链在这里被惰性解析。
    /// 对每个未注册的依赖契约，通过内省接口找到它的实现元数据
    /// 并递归纳入加载序列；无法解析的依赖是显式错误。
    ///
    /// # Errors
    ///
    /// - 依赖链中存在循环时返回 `CircularDependency`
    /// - 某个依赖无法解析或不可加载时返回 `MissingDependency`
    pub async fn load_direct(
        &self,
        manager: &ModuleManager,
        metadata: Arc<ModuleMetadata>,
    ) -> Result<Arc<dyn Module>> {
        // 已注册则直接返回现有实例
        if let Some(existing) = self.registry.get_module(metadata.contract()).await {
            debug!(module = %metadata.type_name(), "契约已注册，复用现有实例");
            return Ok(existing);
        }

        let order = self.resolve_load_order(&metadata).await?;

        let mut target = None;
        for meta in order {
            // 依赖可能在前一次调用中已被注册
            if self.registry.contains(meta.contract()).await {
                continue;
            }
            let instance = self.load_module(manager, &meta).await?;
            target = Some(instance);
        }

        target.ok_or_else(|| CoreError::Internal("直接加载序列为空".to_string()))
    }

    /// 迭代式后序遍历依赖链，产出依赖在前的加载序列
    async fn resolve_load_order(
        &self,
        root: &Arc<ModuleMetadata>,
    ) -> Result<Vec<Arc<ModuleMetadata>>> {
        enum Frame {
            Enter(Arc<ModuleMetadata>),
            Exit(Arc<ModuleMetadata>),
        }

        let mut order = Vec::new();
        let mut done: HashSet<TypeId> = HashSet::new();
        let mut on_path: HashSet<TypeId> = HashSet::new();
        let mut path_names: Vec<String> = Vec::new();
        let mut stack = vec![Frame::Enter(Arc::clone(root))];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(meta) => {
                    let id = meta.implementation();
                    if done.contains(&id) {
                        continue;
                    }
                    if on_path.contains(&id) {
                        path_names.push(meta.type_name().to_string());
                        return Err(CoreError::CircularDependency(path_names.join(" -> ")));
                    }

                    on_path.insert(id);
                    path_names.push(meta.type_name().to_string());
                    stack.push(Frame::Exit(Arc::clone(&meta)));

                    for slot in meta.dependencies() {
                        let contract = slot.contract();
                        if contract == meta.contract() {
                            continue;
                        }
                        if self.registry.contains(contract).await {
                            continue;
                        }

                        match self.resolve_by_contract(contract) {
                            Some(dep_meta) if self.is_valid_module_type(&dep_meta) => {
                                stack.push(Frame::Enter(dep_meta));
                            }
                            _ => {
                                return Err(CoreError::MissingDependency {
                                    module: meta.type_name().to_string(),
                                    dependency: contract.name().to_string(),
                                });
                            }
                        }
                    }
                }
                Frame::Exit(meta) => {
                    on_path.remove(&meta.implementation());
                    path_names.pop();
                    done.insert(meta.implementation());
                    order.push(meta);
                }
            }
        }

        Ok(order)
    }
}

#[async_trait]
impl Destroyable for ModuleLoader {
    async fn destroy(&self) {
        self.resolved.write().expect("加载器缓存锁中毒").clear();
        debug!("加载器元数据缓存已清空");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::catalog::ModuleCatalog;

    #[derive(Default)]
    struct Engine;

    #[async_trait::async_trait]
    impl Module for Engine {}

    #[derive(Default)]
    struct Car {
        engine: Option<Arc<Engine>>,
    }

    #[async_trait::async_trait]
    impl Module for Car {}

    fn catalog() -> Arc<ModuleCatalog> {
        let catalog = ModuleCatalog::new();
        catalog
            .register(
                ModuleMetadata::builder::<Engine>("demo.engine.Engine")
                    .constructor_default()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
            .register(
                ModuleMetadata::builder::<Car>("demo.car.Car")
                    .constructor_default()
                    .dependency::<Engine>(|car, engine| car.engine = Some(engine))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        Arc::new(catalog)
    }

    fn loader_with(catalog: Arc<ModuleCatalog>) -> ModuleLoader {
        let registry = ModuleRegistry::new();
        let injector = Injector::new(registry.clone());
        ModuleLoader::new(Realm::new_root(), registry, injector, catalog, false)
    }

    #[test]
    fn test_resolve_by_name_and_impl() {
        let loader = loader_with(catalog());

        let by_name = loader.resolve_by_name("demo.engine.Engine").unwrap();
        assert_eq!(by_name.type_name(), "demo.engine.Engine");

        let by_impl = loader.resolve_by_impl(TypeId::of::<Engine>()).unwrap();
        assert_eq!(by_impl.type_name(), "demo.engine.Engine");

        assert!(loader.resolve_by_name("unknown.Type").is_none());
    }

    #[test]
    fn test_resolution_cached_negative() {
        let loader = loader_with(Arc::new(ModuleCatalog::new()));

        assert!(loader.resolve_by_impl(TypeId::of::<Engine>()).is_none());
        // 第二次命中否定缓存
        assert!(loader.resolve_by_impl(TypeId::of::<Engine>()).is_none());
    }

    #[test]
    fn test_filter_candidates() {
        let loader = loader_with(catalog());

        let names = vec![
            "demo.engine.Engine".to_string(),
            "unknown.Type".to_string(),
            "demo.car.Car".to_string(),
            // 重复的名字按实现类型去重
            "demo.engine.Engine".to_string(),
        ];

        let candidates = loader.filter_candidates(&names);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].type_name(), "demo.engine.Engine");
        assert_eq!(candidates[1].type_name(), "demo.car.Car");
    }

    #[test]
    fn test_constructor_less_metadata_not_loadable() {
        let catalog = ModuleCatalog::new();
        catalog
            .register(
                ModuleMetadata::builder::<Engine>("demo.AbstractEngine")
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let loader = loader_with(Arc::new(catalog));
        let metadata = loader.resolve_by_name("demo.AbstractEngine").unwrap();
        assert!(!loader.is_valid_module_type(&metadata));

        let candidates = loader.filter_candidates(&["demo.AbstractEngine".to_string()]);
        assert!(candidates.is_empty());
    }
}
