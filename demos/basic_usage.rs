//! 基本使用示例
//!
//! 本示例展示了积木模块运行时的基本使用方法，包括：
//!
//! - 声明模块与依赖
//! - 创建模块管理器
//! - 从目录批量加载模块
//! - 查询模块状态
//! - 统一关闭
//!
//! # 运行示例
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::path::Path;
use std::sync::Arc;

use jimu_core::{
    Logger, LoggerConfig, ManagerConfig, Module, ModuleCatalog, ModuleManager, ModuleMetadata,
};

/// 引擎模块：没有依赖
#[derive(Default)]
struct Engine;

#[async_trait::async_trait]
impl Module for Engine {
    async fn initialize(&self, _manager: &ModuleManager) -> jimu_core::Result<()> {
        println!("   [engine] 引擎点火");
        Ok(())
    }

    async fn shutdown(&self, _manager: &ModuleManager) -> jimu_core::Result<()> {
        println!("   [engine] 引擎熄火");
        Ok(())
    }
}

/// 整车模块：依赖引擎
#[derive(Default)]
struct Car {
    engine: Option<Arc<Engine>>,
}

#[async_trait::async_trait]
impl Module for Car {
    async fn initialize(&self, _manager: &ModuleManager) -> jimu_core::Result<()> {
        println!(
            "   [car] 整车组装完成（引擎已装配: {}）",
            self.engine.is_some()
        );
        Ok(())
    }
}

/// 主函数
///
/// 演示发现 → 排序 → 注入 → 初始化 → 关闭的完整流程。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = Logger::try_init(LoggerConfig::builder().level("warn").build());

    println!("=== 积木模块运行时基本使用示例 ===\n");

    // -------------------------------------------------------------------------
    // 1. 声明模块元数据
    // -------------------------------------------------------------------------
    println!("1. 注册模块元数据...");

    let catalog = Arc::new(ModuleCatalog::new());
    catalog.register(
        ModuleMetadata::builder::<Engine>("demo.engine.Engine")
            .constructor_default()
            .build()?,
    )?;
    catalog.register(
        ModuleMetadata::builder::<Car>("demo.car.Car")
            .constructor_default()
            .dependency::<Engine>(|car, engine| car.engine = Some(engine))
            .build()?,
    )?;
    println!("   ✅ 目录中有 {} 条元数据\n", catalog.len());

    // -------------------------------------------------------------------------
    // 2. 准备一个模块目录
    // -------------------------------------------------------------------------
    println!("2. 准备模块目录...");

    let dir = tempfile::TempDir::new()?;
    create_unit(dir.path(), "demo/engine/Engine.module");
    create_unit(dir.path(), "demo/car/Car.module");
    println!("   模块目录: {:?}\n", dir.path());

    // -------------------------------------------------------------------------
    // 3. 创建管理器并批量加载
    // -------------------------------------------------------------------------
    println!("3. 批量加载模块...");

    let manager = ModuleManager::new(ManagerConfig::default(), catalog).await?;
    let modules = manager.load_modules(dir.path(), &[]).await?;
    println!("   ✅ 按依赖顺序加载了 {} 个模块\n", modules.len());

    // -------------------------------------------------------------------------
    // 4. 查询模块
    // -------------------------------------------------------------------------
    println!("4. 查询模块状态...");

    let info = manager
        .get_information::<Car>()
        .await
        .expect("Car 应该已注册");
    println!("   car 状态: {}", info.state());

    let car = manager.get_module::<Car>().await.expect("Car 应该可获取");
    println!("   car 的引擎已绑定: {}\n", car.engine.is_some());

    // -------------------------------------------------------------------------
    // 5. 统一关闭
    // -------------------------------------------------------------------------
    println!("5. 关闭管理器...");
    manager.shutdown().await;
    println!("   ✅ 所有模块已关闭\n");

    println!("=== 示例结束 ===");
    Ok(())
}

/// 在目录下创建单元文件
fn create_unit(root: &Path, relative: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::File::create(&path).unwrap();
}
