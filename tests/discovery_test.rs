//! # 发现流水线集成测试
//!
//! 测试代码位置扫描与缓存行为，包括：
//! - 归档缓存（重复扫描不触发 IO）
//! - 目录中的嵌套归档
//! - 名称/来源黑名单
//! - 不可读归档与缺失目录的错误语义
//! - 共享缓存下的多管理器行为

use std::path::Path;
use std::sync::Arc;

use jimu_core::{
    ManagerConfig, Module, ModuleCatalog, ModuleManager, ModuleMetadata, ScanCache,
};
use tempfile::TempDir;

// ============================================================================
// 测试模块类型
// ============================================================================

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

// ============================================================================
// 测试辅助
// ============================================================================

fn create_unit(root: &Path, relative: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::File::create(&path).unwrap();
}

/// 打包一个 tar.gz 归档
fn create_archive(path: &Path, entries: &[&str]) {
    let file = std::fs::File::create(path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, entry, std::io::empty()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

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

// ============================================================================
// 归档加载与缓存
// ============================================================================

#[tokio::test]
async fn test_load_modules_from_archive() {
    let dir = TempDir::new().unwrap();
    let archive_path = dir.path().join("mods.tar.gz");
    create_archive(
        &archive_path,
        &["demo/engine/Engine.module", "demo/car/Car.module"],
    );

    let manager = ModuleManager::new(ManagerConfig::default(), catalog())
        .await
        .unwrap();

    let modules = manager.load_modules(&archive_path, &[]).await.unwrap();
    assert_eq!(modules.len(), 2);

    let car = manager.get_module::<Car>().await.unwrap();
    assert!(car.engine.is_some());
}

#[tokio::test]
async fn test_archive_scanned_once_across_managers() {
    let dir = TempDir::new().unwrap();
    let archive_path = dir.path().join("mods.tar.gz");
    create_archive(&archive_path, &["demo/engine/Engine.module"]);

    let cache = Arc::new(ScanCache::new());

    // 第一个管理器扫描并加载
    let first = ModuleManager::with_cache(
        ManagerConfig::default(),
        catalog(),
        Arc::clone(&cache),
    )
    .await
    .unwrap();
    let loaded = first.load_modules(&archive_path, &[]).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(cache.archive_read_count(), 1);

    // 共享缓存的第二个管理器不再读取归档
    let second = ModuleManager::with_cache(
        ManagerConfig::default(),
        catalog(),
        Arc::clone(&cache),
    )
    .await
    .unwrap();
    let loaded = second.load_modules(&archive_path, &[]).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(cache.archive_read_count(), 1);
}

#[tokio::test]
async fn test_nested_archive_discovered() {
    let dir = TempDir::new().unwrap();
    create_unit(dir.path(), "demo/engine/Engine.module");
    create_archive(
        &dir.path().join("extra.tar.gz"),
        &["demo/car/Car.module"],
    );

    let manager = ModuleManager::new(ManagerConfig::default(), catalog())
        .await
        .unwrap();

    // 目录扫描深入嵌套归档：两个模块都被发现
    let modules = manager.load_modules(dir.path(), &[]).await.unwrap();
    assert_eq!(modules.len(), 2);
}

#[tokio::test]
async fn test_unreadable_archive_aborts_call() {
    let dir = TempDir::new().unwrap();
    let archive_path = dir.path().join("broken.tar.gz");
    std::fs::write(&archive_path, b"definitely not an archive").unwrap();

    let manager = ModuleManager::new(ManagerConfig::default(), catalog())
        .await
        .unwrap();

    let result = manager.load_modules(&archive_path, &[]).await;
    assert!(result.is_err());
    // 失败的调用没有注册任何模块
    assert!(manager.get_module::<Engine>().await.is_none());
}

#[tokio::test]
async fn test_missing_directory_yields_empty() {
    let manager = ModuleManager::new(ManagerConfig::default(), catalog())
        .await
        .unwrap();

    // 不存在的目录不是错误，返回空集合
    let modules = manager
        .load_modules("/nonexistent/modules", &[])
        .await
        .unwrap();
    assert!(modules.is_empty());
}

// ============================================================================
// 黑名单
// ============================================================================

#[tokio::test]
async fn test_blacklisted_name_excluded_from_discovery() {
    let dir = TempDir::new().unwrap();
    create_unit(dir.path(), "demo/engine/Engine.module");
    create_unit(dir.path(), "legacy/demo/car/Car.module");

    let manager = ModuleManager::new(ManagerConfig::default(), catalog())
        .await
        .unwrap();
    manager.blacklist_name("legacy");

    let modules = manager.load_modules(dir.path(), &[]).await.unwrap();
    assert_eq!(modules.len(), 1);
    assert!(manager.get_module::<Engine>().await.is_some());
    assert!(manager.get_module::<Car>().await.is_none());
}

#[tokio::test]
async fn test_blacklisted_origin_excluded_from_discovery() {
    let dir = TempDir::new().unwrap();
    create_unit(dir.path(), "demo/engine/Engine.module");

    let manager = ModuleManager::new(ManagerConfig::default(), catalog())
        .await
        .unwrap();
    manager.blacklist_origin(dir.path());

    let modules = manager.load_modules(dir.path(), &[]).await.unwrap();
    assert!(modules.is_empty());
}

#[tokio::test]
async fn test_version_control_directories_skipped_by_default() {
    let dir = TempDir::new().unwrap();
    create_unit(dir.path(), "demo/engine/Engine.module");
    create_unit(dir.path(), ".git/objects/demo/car/Car.module");

    let manager = ModuleManager::new(ManagerConfig::default(), catalog())
        .await
        .unwrap();

    let modules = manager.load_modules(dir.path(), &[]).await.unwrap();
    assert_eq!(modules.len(), 1);
    assert!(manager.get_module::<Car>().await.is_none());
}

// ============================================================================
// 自定义单元后缀
// ============================================================================

#[tokio::test]
async fn test_custom_unit_suffix() {
    let dir = TempDir::new().unwrap();
    create_unit(dir.path(), "demo/engine/Engine.plug");
    // 默认后缀的文件不应命中
    create_unit(dir.path(), "demo/car/Car.module");

    let config = ManagerConfig::builder().unit_suffix(".plug").build();
    let manager = ModuleManager::new(config, catalog()).await.unwrap();

    let modules = manager.load_modules(dir.path(), &[]).await.unwrap();
    assert_eq!(modules.len(), 1);
    assert!(manager.get_module::<Engine>().await.is_some());
}
