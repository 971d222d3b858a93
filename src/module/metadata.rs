//! 模块元数据定义
//!
//! 定义模块身份（契约类型）、声明注解、生命周期状态、
//! 依赖槽位以及注册表条目所携带的运行时信息。

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

use super::Module;
use crate::utils::{CoreError, Result};

// ============================================================================
// 契约类型标识
// ============================================================================

/// 契约类型标识
///
/// 模块的身份由其履行的契约类型决定：注册表以契约为键，
/// 其他模块也以契约声明依赖。相等性只比较底层 `TypeId`，
/// 类型名仅用于日志和错误信息展示。
#[derive(Debug, Clone, Copy)]
pub struct ContractId {
    type_id: TypeId,
    type_name: &'static str,
}

impl ContractId {
    /// 由类型参数构造契约标识
    ///
    /// # 示例
    ///
    /// ```rust
    /// use jimu_core::module::ContractId;
    ///
    /// struct Engine;
    /// let id = ContractId::of::<Engine>();
    /// assert!(id.name().contains("Engine"));
    /// ```
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            type_name: std::any::type_name::<C>(),
        }
    }

    /// 契约类型名（仅用于展示）
    pub fn name(&self) -> &'static str {
        self.type_name
    }

    /// 底层类型标识
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}

impl PartialEq for ContractId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ContractId {}

impl std::hash::Hash for ContractId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name)
    }
}

// ============================================================================
// 声明注解
// ============================================================================

/// 模块声明注解
///
/// 纯展示性元数据（名称、版本、作者等），对加载行为没有影响。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleAnnotation {
    /// 模块显示名称
    pub name: String,

    /// 模块版本（semver 格式，仅用于展示）
    #[serde(default)]
    pub version: String,

    /// 作者列表
    #[serde(default)]
    pub authors: Vec<String>,

    /// 模块描述
    #[serde(default)]
    pub description: String,

    /// 自定义字段
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ModuleAnnotation {
    /// 创建新的注解
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// 添加作者
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    /// 设置描述
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// 解析版本号
    pub fn parsed_version(&self) -> Option<Version> {
        Version::parse(&self.version).ok()
    }
}

// ============================================================================
// 生命周期状态
// ============================================================================

/// 模块生命周期状态
///
/// 状态严格向前推进，允许跳过中间状态（例如未初始化的模块
/// 直接从 Registered 进入 Shutdown），但绝不允许回退。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// 实例已创建，尚未进入注册表
    Created,
    /// 已进入注册表
    Registered,
    /// 依赖已绑定且初始化钩子执行成功
    Initialized,
    /// 终态：关闭钩子已执行
    Shutdown,
}

impl Default for ModuleState {
    fn default() -> Self {
        ModuleState::Created
    }
}

impl ModuleState {
    /// 状态序号，用于单调性检查
    fn rank(self) -> u8 {
        match self {
            ModuleState::Created => 0,
            ModuleState::Registered => 1,
            ModuleState::Initialized => 2,
            ModuleState::Shutdown => 3,
        }
    }

    /// 是否允许推进到目标状态
    pub fn can_advance_to(self, next: ModuleState) -> bool {
        next.rank() > self.rank()
    }

    /// 是否处于终态
    pub fn is_shutdown(self) -> bool {
        matches!(self, ModuleState::Shutdown)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleState::Created => "created",
            ModuleState::Registered => "registered",
            ModuleState::Initialized => "initialized",
            ModuleState::Shutdown => "shutdown",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// 依赖槽位
// ============================================================================

/// 依赖绑定函数
///
/// 将注册表中查到的依赖实例写入目标实例的对应槽位。
pub(crate) type Binder =
    Arc<dyn Fn(&mut dyn Module, Arc<dyn Module>) -> Result<()> + Send + Sync>;

/// 构造函数
pub(crate) type Constructor = Arc<dyn Fn() -> Result<Box<dyn Module>> + Send + Sync>;

/// 依赖槽位
///
/// 一个声明的注入点：需要的契约类型加上执行实际赋值的绑定函数。
#[derive(Clone)]
pub struct DependencySlot {
    contract: ContractId,
    bind: Binder,
}

impl DependencySlot {
    /// 该槽位需要的契约类型
    pub fn contract(&self) -> ContractId {
        self.contract
    }

    /// 将依赖实例绑定到目标实例
    pub(crate) fn bind(&self, target: &mut dyn Module, dep: Arc<dyn Module>) -> Result<()> {
        (self.bind)(target, dep)
    }
}

impl fmt::Debug for DependencySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencySlot")
            .field("contract", &self.contract.name())
            .finish()
    }
}

// ============================================================================
// 模块元数据
// ============================================================================

/// 模块元数据
///
/// 每个实现类型解析一次，之后不可变：包含实现类型、履行的契约、
/// 声明的依赖槽位、仅约束加载顺序的 requirement 契约、展示性注解
/// 以及可选的构造函数。没有构造函数的元数据表示一个不可实例化的
/// 声明（只能通过 `provide` 提供现成实例）。
pub struct ModuleMetadata {
    type_name: String,
    implementation: TypeId,
    impl_type_name: &'static str,
    contract: ContractId,
    annotation: ModuleAnnotation,
    dependencies: Vec<DependencySlot>,
    requirements: Vec<ContractId>,
    constructor: Option<Constructor>,
}

impl ModuleMetadata {
    /// 创建元数据构建器
    ///
    /// # 参数
    ///
    /// * `type_name` - 全限定单元名（点分格式，例如 `demo.engine.Engine`），
    ///   扫描器在代码位置中发现的名字必须与它一致才能解析到此元数据
    ///
    /// # 示例
    ///
    /// ```rust
    /// use jimu_core::module::{Module, ModuleMetadata};
    ///
    /// #[derive(Default)]
    /// struct Engine;
    ///
    /// #[async_trait::async_trait]
    /// impl Module for Engine {}
    ///
    /// let metadata = ModuleMetadata::builder::<Engine>("demo.engine.Engine")
    ///     .constructor_default()
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(metadata.type_name(), "demo.engine.Engine");
    /// ```
    pub fn builder<M: Module>(type_name: impl Into<String>) -> ModuleMetadataBuilder<M> {
        ModuleMetadataBuilder::new(type_name)
    }

    /// 全限定单元名
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// 实现类型标识
    pub fn implementation(&self) -> TypeId {
        self.implementation
    }

    /// 实现类型名（仅用于展示）
    pub fn impl_type_name(&self) -> &'static str {
        self.impl_type_name
    }

    /// 履行的契约类型
    pub fn contract(&self) -> ContractId {
        self.contract
    }

    /// 声明注解
    pub fn annotation(&self) -> &ModuleAnnotation {
        &self.annotation
    }

    /// 声明的依赖槽位（按声明顺序）
    pub fn dependencies(&self) -> &[DependencySlot] {
        &self.dependencies
    }

    /// 仅约束加载顺序的 requirement 契约
    pub fn requirements(&self) -> &[ContractId] {
        &self.requirements
    }

    /// 是否可实例化
    pub fn has_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    /// 实例化实现类型
    ///
    /// # 错误
    ///
    /// - 元数据未声明构造函数
    /// - 构造函数自身返回错误
    pub fn instantiate(&self) -> Result<Box<dyn Module>> {
        let ctor = self.constructor.as_ref().ok_or_else(|| {
            CoreError::InstantiationFailed {
                module: self.type_name.clone(),
                reason: "未声明构造函数".to_string(),
            }
        })?;

        ctor().map_err(|e| CoreError::InstantiationFailed {
            module: self.type_name.clone(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Debug for ModuleMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleMetadata")
            .field("type_name", &self.type_name)
            .field("impl_type", &self.impl_type_name)
            .field("contract", &self.contract.name())
            .field(
                "dependencies",
                &self
                    .dependencies
                    .iter()
                    .map(|d| d.contract().name())
                    .collect::<Vec<_>>(),
            )
            .field(
                "requirements",
                &self.requirements.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .field("has_constructor", &self.constructor.is_some())
            .finish()
    }
}

impl fmt::Display for ModuleMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name)
    }
}

/// 检查单元名格式是否有效
///
/// 点分段，每段以字母开头，只包含字母、数字、下划线和连字符。
fn is_valid_type_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    name.split('.').all(|segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() => {}
            _ => return false,
        }
        segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    })
}

// ============================================================================
// 元数据构建器
// ============================================================================

/// 模块元数据构建器
///
/// 针对具体实现类型 `M` 的类型安全构建入口；
/// 依赖绑定函数在这里完成类型擦除。
pub struct ModuleMetadataBuilder<M: Module> {
    type_name: String,
    annotation: ModuleAnnotation,
    contract: ContractId,
    dependencies: Vec<DependencySlot>,
    requirements: Vec<ContractId>,
    constructor: Option<Constructor>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Module> ModuleMetadataBuilder<M> {
    fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            annotation: ModuleAnnotation::default(),
            contract: ContractId::of::<M>(),
            dependencies: Vec::new(),
            requirements: Vec::new(),
            constructor: None,
            _marker: PhantomData,
        }
    }

    /// 设置声明注解
    pub fn annotation(mut self, annotation: ModuleAnnotation) -> Self {
        self.annotation = annotation;
        self
    }

    /// 指定履行的契约类型（默认为实现类型自身）
    pub fn contract<C: ?Sized + 'static>(mut self) -> Self {
        self.contract = ContractId::of::<C>();
        self
    }

    /// 设置构造函数
    pub fn constructor<F>(mut self, ctor: F) -> Self
    where
        F: Fn() -> Result<M> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(move || {
            ctor().map(|m| Box::new(m) as Box<dyn Module>)
        }));
        self
    }

    /// 使用 `Default` 实现作为构造函数
    pub fn constructor_default(self) -> Self
    where
        M: Default,
    {
        self.constructor(|| Ok(M::default()))
    }

    /// 声明一个注入依赖
    ///
    /// # 参数
    ///
    /// * `bind` - 绑定函数，将解析出的依赖实例写入目标实例的槽位
    ///
    /// # 示例
    ///
    /// ```rust,ignore
    /// ModuleMetadata::builder::<Car>("demo.car.Car")
    ///     .dependency::<Engine>(|car, engine| car.engine = Some(engine))
    /// ```
    pub fn dependency<D: Module>(
        mut self,
        bind: impl Fn(&mut M, Arc<D>) + Send + Sync + 'static,
    ) -> Self {
        let erased: Binder = Arc::new(move |target: &mut dyn Module, dep: Arc<dyn Module>| {
            let target = target
                .downcast_mut::<M>()
                .ok_or_else(|| CoreError::DowncastFailed {
                    expected: std::any::type_name::<M>().to_string(),
                })?;
            let dep = dep.downcast_arc::<D>().map_err(|_| CoreError::DowncastFailed {
                expected: std::any::type_name::<D>().to_string(),
            })?;
            bind(target, dep);
            Ok(())
        });

        self.dependencies.push(DependencySlot {
            contract: ContractId::of::<D>(),
            bind: erased,
        });
        self
    }

    /// 声明一个仅约束加载顺序的 requirement（不注入）
    pub fn requires<C: ?Sized + 'static>(mut self) -> Self {
        self.requirements.push(ContractId::of::<C>());
        self
    }

    /// 构建元数据
    ///
    /// # 错误
    ///
    /// - 单元名格式无效
    /// - 注解版本号非空且不是合法 semver
    pub fn build(self) -> Result<ModuleMetadata> {
        let mut errors: Vec<String> = Vec::new();

        if !is_valid_type_name(&self.type_name) {
            errors.push(format!(
                "单元名 '{}' 格式无效，要求点分段且每段以字母开头",
                self.type_name
            ));
        }

        if !self.annotation.version.is_empty()
            && Version::parse(&self.annotation.version).is_err()
        {
            errors.push(format!(
                "无效的版本号格式 '{}', 请使用 semver 格式 (如 1.0.0)",
                self.annotation.version
            ));
        }

        if !errors.is_empty() {
            return Err(CoreError::InvalidMetadata(errors.join("; ")));
        }

        Ok(ModuleMetadata {
            type_name: self.type_name,
            implementation: TypeId::of::<M>(),
            impl_type_name: std::any::type_name::<M>(),
            contract: self.contract,
            annotation: self.annotation,
            dependencies: self.dependencies,
            requirements: self.requirements,
            constructor: self.constructor,
        })
    }
}

// ============================================================================
// 模块运行时信息
// ============================================================================

/// 模块运行时信息
///
/// 附着在注册表条目上的可变记录：当前生命周期状态、声明元数据
/// 和诊断字段。只有编排器在生命周期转换时才会修改它。
#[derive(Debug, Clone)]
pub struct ModuleInformation {
    annotation: ModuleAnnotation,
    metadata: Option<Arc<ModuleMetadata>>,
    state: ModuleState,
    registered_at: Option<DateTime<Utc>>,
    initialized_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl ModuleInformation {
    /// 创建信息记录（无元数据，用于幽灵模块）
    pub fn new(annotation: ModuleAnnotation) -> Self {
        Self {
            annotation,
            metadata: None,
            state: ModuleState::Created,
            registered_at: None,
            initialized_at: None,
            last_error: None,
        }
    }

    /// 由元数据创建信息记录
    pub fn from_metadata(metadata: Arc<ModuleMetadata>) -> Self {
        Self {
            annotation: metadata.annotation().clone(),
            metadata: Some(metadata),
            state: ModuleState::Created,
            registered_at: None,
            initialized_at: None,
            last_error: None,
        }
    }

    /// 当前生命周期状态
    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// 声明注解
    pub fn annotation(&self) -> &ModuleAnnotation {
        &self.annotation
    }

    /// 声明元数据（幽灵模块没有）
    pub fn metadata(&self) -> Option<&Arc<ModuleMetadata>> {
        self.metadata.as_ref()
    }

    /// 注册时间
    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    /// 初始化完成时间
    pub fn initialized_at(&self) -> Option<DateTime<Utc>> {
        self.initialized_at
    }

    /// 最后一次错误信息
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// 推进生命周期状态
    ///
    /// 状态只能向前推进，回退或原地踏步都是内部错误。
    ///
    /// # 错误
    ///
    /// 目标状态不在当前状态之后时返回 `Internal` 错误。
    pub fn advance(&mut self, next: ModuleState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(CoreError::Internal(format!(
                "模块状态不允许从 {} 回退到 {}",
                self.state, next
            )));
        }

        self.state = next;
        match next {
            ModuleState::Registered => self.registered_at = Some(Utc::now()),
            ModuleState::Initialized => self.initialized_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// 记录错误信息
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}
