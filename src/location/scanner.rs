//! 位置扫描器
//!
//! 遍历一组代码位置（目录递归进嵌套归档），产出
//! "根位置 -> 单元名集合" 的映射和一份扁平的命中列表。
//!
//! 扫描器持有一个共享的 [`ScanCache`]：归档内容缓存、名称黑名单
//! 和来源黑名单都集中在这个对象里，由宿主进程创建并注入，多个
//! 管理器并发使用时锁也在这里统一加。
//! 扫描与命名空间登记是耦合的：每个被访问的位置根都会登记进
//! 所属 Realm；被黑名单命中的位置整体跳过、不登记。

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};

use super::{CodeLocation, LocationKind};
use crate::realm::Realm;
use crate::utils::Result;

/// 默认名称黑名单
const DEFAULT_NAME_BLACKLIST: &[&str] = &[".git", ".idea"];

/// 扫描缓存
///
/// 进程级共享对象：
/// - 归档内容缓存：按来源路径缓存归档的**完整**单元名列表，
///   后续扫描直接在缓存上过滤，不再读取归档
/// - 名称黑名单：目录遍历时命中即跳过的目录/文件名
/// - 来源黑名单：整体排除的位置来源；拉黑同时使对应缓存失效
/// - 归档读取计数：测试和诊断用
#[derive(Debug)]
pub struct ScanCache {
    archives: Mutex<HashMap<PathBuf, Arc<Vec<String>>>>,
    name_blacklist: Mutex<HashSet<String>>,
    origin_blacklist: Mutex<HashSet<PathBuf>>,
    archive_reads: AtomicU64,
}

impl Default for ScanCache {
    fn default() -> Self {
        Self {
            archives: Mutex::new(HashMap::new()),
            name_blacklist: Mutex::new(
                DEFAULT_NAME_BLACKLIST.iter().map(|s| s.to_string()).collect(),
            ),
            origin_blacklist: Mutex::new(HashSet::new()),
            archive_reads: AtomicU64::new(0),
        }
    }
}

impl ScanCache {
    /// 创建带默认黑名单的缓存
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入名称黑名单
    pub fn blacklist_name(&self, name: impl Into<String>) {
        let name = name.into();
        debug!(name = %name, "名称加入黑名单");
        self.name_blacklist.lock().expect("缓存锁中毒").insert(name);
    }

    /// 加入来源黑名单
    ///
    /// 同时丢弃该来源的归档缓存，这是缓存唯一的失效途径。
    pub fn blacklist_origin(&self, origin: impl Into<PathBuf>) {
        let origin = origin.into();
        debug!(origin = ?origin, "来源加入黑名单");
        self.archives.lock().expect("缓存锁中毒").remove(&origin);
        self.origin_blacklist
            .lock()
            .expect("缓存锁中毒")
            .insert(origin);
    }

    /// 来源是否被拉黑
    pub fn is_origin_blacklisted(&self, origin: &Path) -> bool {
        self.origin_blacklist
            .lock()
            .expect("缓存锁中毒")
            .contains(origin)
    }

    /// 名称黑名单快照
    pub fn name_blacklist(&self) -> HashSet<String> {
        self.name_blacklist.lock().expect("缓存锁中毒").clone()
    }

    /// 读取归档缓存
    pub fn cached_archive(&self, origin: &Path) -> Option<Arc<Vec<String>>> {
        self.archives.lock().expect("缓存锁中毒").get(origin).cloned()
    }

    /// 写入归档缓存（完整内容，未过滤）
    fn store_archive(&self, origin: PathBuf, names: Vec<String>) -> Arc<Vec<String>> {
        let names = Arc::new(names);
        self.archives
            .lock()
            .expect("缓存锁中毒")
            .insert(origin, Arc::clone(&names));
        names
    }

    /// 实际读取过的归档次数
    ///
    /// 命中缓存的扫描不计数，可用来验证缓存是否生效。
    pub fn archive_read_count(&self) -> u64 {
        self.archive_reads.load(Ordering::SeqCst)
    }
}

/// 扫描结果
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// 根位置 -> 该位置下命中的单元名
    pub by_root: HashMap<CodeLocation, Vec<String>>,
    /// 扁平化的命中列表（按发现顺序）
    pub matched: Vec<String>,
}

/// 位置扫描器
///
/// # 示例
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use jimu_core::location::{CodeLocation, LocationScanner, ScanCache};
/// use jimu_core::realm::Realm;
///
/// let cache = Arc::new(ScanCache::new());
/// let scanner = LocationScanner::new(cache, ".module");
/// let realm = Realm::new_root();
///
/// let locations = vec![CodeLocation::directory("./modules", realm.name())];
/// let outcome = scanner.scan(&realm, &locations, None).unwrap();
/// println!("发现 {} 个单元", outcome.matched.len());
/// ```
pub struct LocationScanner {
    cache: Arc<ScanCache>,
    unit_suffix: String,
}

impl LocationScanner {
    /// 创建扫描器
    ///
    /// # Arguments
    ///
    /// * `cache` - 共享扫描缓存
    /// * `unit_suffix` - 模块单元文件后缀（例如 `.module`）
    pub fn new(cache: Arc<ScanCache>, unit_suffix: impl Into<String>) -> Self {
        Self {
            cache,
            unit_suffix: unit_suffix.into(),
        }
    }

    /// 共享缓存句柄
    pub fn cache(&self) -> &Arc<ScanCache> {
        &self.cache
    }

    /// 扫描一组代码位置
    ///
    /// # 参数
    ///
    /// * `realm` - 扫描所属命名空间，访问过的根会登记进来
    /// * `locations` - 待扫描的位置
    /// * `package` - 可选的点分包名过滤（`demo.engine` 只命中该包下的单元）
    ///
    /// # 错误
    ///
    /// 任何一个归档不可读都会使本次调用整体失败；
    /// 目录不可读只是静默跳过。
    pub fn scan(
        &self,
        realm: &Realm,
        locations: &[CodeLocation],
        package: Option<&str>,
    ) -> Result<ScanOutcome> {
        let mut outcome = ScanOutcome::default();

        for location in locations {
            if self.cache.is_origin_blacklisted(location.origin()) {
                trace!(location = %location, "位置已被拉黑，跳过");
                continue;
            }

            match location.kind() {
                LocationKind::Directory => {
                    self.scan_directory(realm, location, package, &mut outcome)?
                }
                LocationKind::Archive => {
                    self.scan_archive(realm, location, package, &mut outcome)?
                }
            }
        }

        Ok(outcome)
    }

    /// 扫描目录位置
    ///
    /// 目录内容不做缓存（文件系统可能随时变化），
    /// 发现的嵌套归档走归档扫描路径。
    fn scan_directory(
        &self,
        realm: &Realm,
        location: &CodeLocation,
        package: Option<&str>,
        outcome: &mut ScanOutcome,
    ) -> Result<()> {
        let blacklist = self.cache.name_blacklist();
        let contents = location.enumerate(&self.unit_suffix, &blacklist)?;

        realm.add_location(location.clone());

        let matched: Vec<String> = contents
            .type_names
            .into_iter()
            .filter(|name| matches_package(name, package))
            .collect();

        debug!(
            location = %location,
            found = matched.len(),
            "目录扫描完成"
        );

        outcome.matched.extend(matched.iter().cloned());
        outcome.by_root.insert(location.clone(), matched);

        // 深入嵌套归档
        for archive_path in contents.nested_archives {
            if self.cache.is_origin_blacklisted(&archive_path) {
                trace!(origin = ?archive_path, "嵌套归档已被拉黑，跳过");
                continue;
            }
            let archive = CodeLocation::archive(archive_path, location.realm());
            self.scan_archive(realm, &archive, package, outcome)?;
        }

        Ok(())
    }

    /// 扫描归档位置
    ///
    /// 首次读取时把**完整**内容写入缓存；之后的扫描在缓存上
    /// 过滤，不再触发归档 IO。
    fn scan_archive(
        &self,
        realm: &Realm,
        location: &CodeLocation,
        package: Option<&str>,
        outcome: &mut ScanOutcome,
    ) -> Result<()> {
        let all_names = match self.cache.cached_archive(location.origin()) {
            Some(cached) => {
                trace!(location = %location, "归档命中缓存");
                cached
            }
            None => {
                let blacklist = self.cache.name_blacklist();
                let contents = location.enumerate(&self.unit_suffix, &blacklist)?;
                self.cache.archive_reads.fetch_add(1, Ordering::SeqCst);
                self.cache
                    .store_archive(location.origin().to_path_buf(), contents.type_names)
            }
        };

        realm.add_location(location.clone());

        let matched: Vec<String> = all_names
            .iter()
            .filter(|name| matches_package(name, package))
            .cloned()
            .collect();

        debug!(
            location = %location,
            total = all_names.len(),
            found = matched.len(),
            "归档扫描完成"
        );

        outcome.matched.extend(matched.iter().cloned());

        // 同一归档可能经由多条路径到达（例如目录嵌套又被显式指定）
        if outcome.by_root.insert(location.clone(), matched).is_some() {
            warn!(location = %location, "归档在本次扫描中出现多次，结果已覆盖");
        }

        Ok(())
    }
}

/// 单元名是否命中包名过滤
///
/// `None` 或空串命中全部；否则要求名称等于包名，
/// 或以 `包名.` 为前缀。
fn matches_package(name: &str, package: Option<&str>) -> bool {
    match package {
        None | Some("") => true,
        Some(package) => {
            name == package || name.starts_with(&format!("{}.", package))
        }
    }
}
