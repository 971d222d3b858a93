//! 依赖注入器
//!
//! 对新构造的模块实例解析并绑定其声明的依赖（按契约类型从
//! 注册表查找），随后调用初始化钩子。依赖缺失是显式错误，
//! 不会被静默吞掉。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use super::manager::ModuleManager;
use super::metadata::{ModuleMetadata, ModuleState};
use super::registry::{ModuleRegistry, RegistryEntry};
use super::{Destroyable, Module};
use crate::utils::{CoreError, Result};

/// 依赖注入器
///
/// 绑定发生在实例被共享之前（`&mut` 独占访问），初始化钩子
/// 则在实例进入注册表之后调用。
#[derive(Clone)]
pub struct Injector {
    registry: ModuleRegistry,
}

impl Injector {
    /// 创建注入器
    pub fn new(registry: ModuleRegistry) -> Self {
        Self { registry }
    }

    /// 解析并绑定声明的依赖
    ///
    /// 按声明顺序处理每个依赖槽位：从注册表按契约查找实例，
    /// 交给槽位的绑定函数写入目标实例。指向自身契约的槽位
    /// 是无操作。
    ///
    /// # Errors
    ///
    /// - 某个契约在注册表中不存在时返回 `MissingDependency`
    /// - 绑定函数降转失败时返回 `DowncastFailed`
    pub async fn inject(
        &self,
        instance: &mut dyn Module,
        metadata: &ModuleMetadata,
    ) -> Result<()> {
        for slot in metadata.dependencies() {
            let contract = slot.contract();

            // 自依赖不做任何事
            if contract == metadata.contract() {
                trace!(module = %metadata.type_name(), "跳过自依赖槽位");
                continue;
            }

            let dependency = self.registry.get_module(contract).await.ok_or_else(|| {
                CoreError::MissingDependency {
                    module: metadata.type_name().to_string(),
                    dependency: contract.name().to_string(),
                }
            })?;

            slot.bind(instance, dependency)?;
            trace!(
                module = %metadata.type_name(),
                dependency = %contract,
                "依赖已绑定"
            );
        }

        debug!(
            module = %metadata.type_name(),
            count = metadata.dependencies().len(),
            "依赖绑定完成"
        );
        Ok(())
    }

    /// 调用初始化钩子并推进生命周期状态
    ///
    /// 钩子成功后状态才推进到 Initialized；钩子失败时模块保持
    /// 已注册状态，错误被记录到条目信息里并向调用方返回。
    pub async fn initialize(
        &self,
        manager: &ModuleManager,
        instance: &Arc<dyn Module>,
        metadata: &ModuleMetadata,
        entry: &RegistryEntry,
    ) -> Result<()> {
        debug!(module = %metadata.type_name(), "调用初始化钩子");

        if let Err(e) = instance.initialize(manager).await {
            warn!(module = %metadata.type_name(), error = %e, "初始化钩子返回错误");
            entry.record_error(e.to_string()).await;
            return Err(CoreError::InitHookFailed {
                module: metadata.type_name().to_string(),
                reason: e.to_string(),
            });
        }

        entry.advance_state(ModuleState::Initialized).await?;
        debug!(module = %metadata.type_name(), "模块初始化完成");
        Ok(())
    }
}

#[async_trait]
impl Destroyable for Injector {
    async fn destroy(&self) {
        // 注入器不持有额外资源
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::{ContractId, ModuleAnnotation, ModuleInformation};
    use crate::module::ModuleMetadata;

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

    fn car_metadata() -> ModuleMetadata {
        ModuleMetadata::builder::<Car>("demo.car.Car")
            .constructor_default()
            .dependency::<Engine>(|car, engine| car.engine = Some(engine))
            .build()
            .unwrap()
    }

    async fn registry_with_engine() -> ModuleRegistry {
        let registry = ModuleRegistry::new();
        registry
            .add_ghost_module(
                ContractId::of::<Engine>(),
                Arc::new(Engine),
                ModuleInformation::new(ModuleAnnotation::new("engine", "1.0.0")),
            )
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_inject_binds_dependency() {
        let registry = registry_with_engine().await;
        let injector = Injector::new(registry);

        let metadata = car_metadata();
        let mut instance = metadata.instantiate().unwrap();

        injector.inject(instance.as_mut(), &metadata).await.unwrap();

        let car = instance.downcast_ref::<Car>().unwrap();
        assert!(car.engine.is_some());
    }

    #[tokio::test]
    async fn test_inject_missing_dependency() {
        let registry = ModuleRegistry::new();
        let injector = Injector::new(registry);

        let metadata = car_metadata();
        let mut instance = metadata.instantiate().unwrap();

        let result = injector.inject(instance.as_mut(), &metadata).await;
        assert!(matches!(result, Err(CoreError::MissingDependency { .. })));
    }

    #[tokio::test]
    async fn test_inject_skips_self_dependency() {
        let registry = ModuleRegistry::new();
        let injector = Injector::new(registry);

        // 模块声明依赖自己的契约：无操作，不报依赖缺失
        let metadata = ModuleMetadata::builder::<Engine>("demo.Engine")
            .constructor_default()
            .dependency::<Engine>(|_, _| {})
            .build()
            .unwrap();

        let mut instance = metadata.instantiate().unwrap();
        let result = injector.inject(instance.as_mut(), &metadata).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_inject_no_dependencies() {
        let registry = ModuleRegistry::new();
        let injector = Injector::new(registry);

        let metadata = ModuleMetadata::builder::<Engine>("demo.Engine")
            .constructor_default()
            .build()
            .unwrap();

        let mut instance = metadata.instantiate().unwrap();
        assert!(injector.inject(instance.as_mut(), &metadata).await.is_ok());
    }
}
