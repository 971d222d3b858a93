//! 隔离命名空间（Realm）
//!
//! Realm 限定一个管理器能看见哪些代码位置：扫描器每访问一个
//! 位置根就把它登记进 Realm，加载在这个作用域内进行。子 Realm
//! 通过父链共享可见性。这里是一张作用域登记表，不涉及任何
//! 动态加载机制。

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::location::CodeLocation;
use crate::module::Destroyable;
use crate::utils::{generate_id, CoreError, Result};

/// 隔离命名空间
///
/// 由一个管理器独占持有，在管理器构造时创建、关闭时销毁。
/// 名称随机生成（10 位 base62），子命名空间名称冲突属于内部
/// 不变量被破坏，正常情况下不会发生。
#[derive(Debug)]
pub struct Realm {
    name: String,
    parent: Option<Arc<Realm>>,
    locations: RwLock<HashSet<CodeLocation>>,
    children: RwLock<HashSet<String>>,
    destroyed: AtomicBool,
}

impl Realm {
    /// 创建根命名空间
    pub fn new_root() -> Arc<Self> {
        let name = generate_id();
        debug!(realm = %name, "创建根命名空间");
        Arc::new(Self {
            name,
            parent: None,
            locations: RwLock::new(HashSet::new()),
            children: RwLock::new(HashSet::new()),
            destroyed: AtomicBool::new(false),
        })
    }

    /// 创建子命名空间
    ///
    /// 子命名空间能看见父链上登记的所有位置，自己登记的位置
    /// 则不会反向污染父命名空间。
    ///
    /// # Errors
    ///
    /// 随机名称与已有子命名空间冲突时返回 `RealmCollision`
    /// （使用随机名称时理论上不会发生）。
    pub fn new_child(self: &Arc<Self>) -> Result<Arc<Self>> {
        let name = generate_id();

        {
            let mut children = self.children.write().expect("命名空间锁中毒");
            if !children.insert(name.clone()) {
                return Err(CoreError::RealmCollision(name));
            }
        }

        debug!(realm = %name, parent = %self.name, "创建子命名空间");
        Ok(Arc::new(Self {
            name,
            parent: Some(Arc::clone(self)),
            locations: RwLock::new(HashSet::new()),
            children: RwLock::new(HashSet::new()),
            destroyed: AtomicBool::new(false),
        }))
    }

    /// 命名空间名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 父命名空间
    pub fn parent(&self) -> Option<&Arc<Realm>> {
        self.parent.as_ref()
    }

    /// 登记一个代码位置
    ///
    /// # Returns
    ///
    /// 位置是首次登记时返回 `true`，已存在时返回 `false`
    pub fn add_location(&self, location: CodeLocation) -> bool {
        let mut locations = self.locations.write().expect("命名空间锁中毒");
        let added = locations.insert(location);
        if added {
            debug!(realm = %self.name, "命名空间登记新位置");
        }
        added
    }

    /// 位置是否可见（含父链）
    pub fn contains_location(&self, location: &CodeLocation) -> bool {
        {
            let locations = self.locations.read().expect("命名空间锁中毒");
            if locations.contains(location) {
                return true;
            }
        }
        match &self.parent {
            Some(parent) => parent.contains_location(location),
            None => false,
        }
    }

    /// 本命名空间直接登记的位置快照（不含父链）
    pub fn locations(&self) -> Vec<CodeLocation> {
        let locations = self.locations.read().expect("命名空间锁中毒");
        locations.iter().cloned().collect()
    }

    /// 是否已销毁
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Destroyable for Realm {
    async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.locations.write().expect("命名空间锁中毒").clear();
        self.children.write().expect("命名空间锁中毒").clear();
        debug!(realm = %self.name, "命名空间已销毁");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn location(realm: &Realm, path: &str) -> CodeLocation {
        CodeLocation::directory(PathBuf::from(path), realm.name())
    }

    #[test]
    fn test_root_realm_name() {
        let realm = Realm::new_root();
        assert_eq!(realm.name().len(), 10);
        assert!(realm.parent().is_none());
    }

    #[test]
    fn test_unique_names() {
        let a = Realm::new_root();
        let b = Realm::new_root();
        assert_ne!(a.name(), b.name());
    }

    #[test]
    fn test_add_and_contains_location() {
        let realm = Realm::new_root();
        let loc = location(&realm, "/modules");

        assert!(!realm.contains_location(&loc));
        assert!(realm.add_location(loc.clone()));
        assert!(realm.contains_location(&loc));

        // 重复登记返回 false
        assert!(!realm.add_location(loc));
    }

    #[test]
    fn test_child_sees_parent_locations() {
        let parent = Realm::new_root();
        let child = parent.new_child().unwrap();

        let loc = location(&parent, "/shared");
        parent.add_location(loc.clone());

        assert!(child.contains_location(&loc));
    }

    #[test]
    fn test_parent_does_not_see_child_locations() {
        let parent = Realm::new_root();
        let child = parent.new_child().unwrap();

        let loc = location(&child, "/private");
        child.add_location(loc.clone());

        assert!(!parent.contains_location(&loc));
    }

    #[tokio::test]
    async fn test_destroy_idempotent() {
        let realm = Realm::new_root();
        realm.add_location(location(&realm, "/modules"));

        realm.destroy().await;
        assert!(realm.is_destroyed());
        assert!(realm.locations().is_empty());

        // 再次销毁是无操作
        realm.destroy().await;
        assert!(realm.is_destroyed());
    }
}
