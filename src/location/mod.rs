//! 代码位置
//!
//! 一个代码位置是一个可扫描的来源：文件系统目录或归档文件
//! （tar / tar.gz）。位置枚举自身包含的模块单元名；名称由
//! 文件路径翻译而来（去掉单元后缀，路径分隔符转为点号）。

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::debug;
use walkdir::WalkDir;

use crate::utils::{CoreError, Result};

pub mod scanner;

pub use scanner::{LocationScanner, ScanCache, ScanOutcome};

/// 位置类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationKind {
    /// 文件系统目录
    Directory,
    /// 归档文件（tar / tar.gz）
    Archive,
}

/// 原始枚举结果
///
/// 目录扫描时除了单元名还会报告遇到的嵌套归档，
/// 由扫描器决定是否继续深入。
#[derive(Debug, Default)]
pub struct LocationContents {
    /// 发现的全限定单元名
    pub type_names: Vec<String>,
    /// 目录中发现的嵌套归档路径
    pub nested_archives: Vec<PathBuf>,
}

/// 代码位置
///
/// 相等性由来源路径和所属命名空间标签共同决定：同一路径在
/// 不同命名空间中是两个不同的位置。
#[derive(Debug, Clone)]
pub struct CodeLocation {
    origin: PathBuf,
    kind: LocationKind,
    realm: String,
}

impl CodeLocation {
    /// 创建目录位置
    pub fn directory(origin: impl Into<PathBuf>, realm: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            kind: LocationKind::Directory,
            realm: realm.into(),
        }
    }

    /// 创建归档位置
    pub fn archive(origin: impl Into<PathBuf>, realm: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            kind: LocationKind::Archive,
            realm: realm.into(),
        }
    }

    /// 按路径特征推断位置类型
    ///
    /// 以 `.tar` / `.tar.gz` / `.tgz` 结尾的路径视为归档，
    /// 其余一律按目录处理。
    pub fn from_path(origin: impl Into<PathBuf>, realm: impl Into<String>) -> Self {
        let origin = origin.into();
        if is_archive_path(&origin) {
            Self::archive(origin, realm)
        } else {
            Self::directory(origin, realm)
        }
    }

    /// 来源路径
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// 位置类型
    pub fn kind(&self) -> LocationKind {
        self.kind
    }

    /// 所属命名空间标签
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// 枚举位置中的模块单元名
    ///
    /// # 参数
    ///
    /// * `suffix` - 单元文件后缀（例如 `.module`）
    /// * `name_blacklist` - 命中即跳过的目录/文件名集合
    ///
    /// # 错误
    ///
    /// - 归档不可读时返回 `ArchiveRead`（对本次扫描是致命错误）
    /// - 目录不存在或不可读时**不是**错误，返回空结果
    pub fn enumerate(
        &self,
        suffix: &str,
        name_blacklist: &HashSet<String>,
    ) -> Result<LocationContents> {
        match self.kind {
            LocationKind::Directory => Ok(self.enumerate_directory(suffix, name_blacklist)),
            LocationKind::Archive => self.enumerate_archive(suffix),
        }
    }

    /// 遍历目录收集单元名和嵌套归档
    fn enumerate_directory(
        &self,
        suffix: &str,
        name_blacklist: &HashSet<String>,
    ) -> LocationContents {
        let mut contents = LocationContents::default();

        if !self.origin.is_dir() {
            debug!(origin = ?self.origin, "目录不存在或不可读，跳过");
            return contents;
        }

        let walker = WalkDir::new(&self.origin).into_iter().filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !name_blacklist
                .iter()
                .any(|blacklisted| name.eq_ignore_ascii_case(blacklisted))
        });

        for entry in walker {
            // 单个条目读取失败按不可读处理，静默跳过
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(origin = ?self.origin, error = %e, "目录条目不可读，跳过");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let name = entry.file_name().to_string_lossy();

            if is_archive_path(path) {
                contents.nested_archives.push(path.to_path_buf());
                continue;
            }

            if name.ends_with(suffix) {
                if let Ok(relative) = path.strip_prefix(&self.origin) {
                    if let Some(type_name) = path_to_type_name(relative, suffix) {
                        contents.type_names.push(type_name);
                    }
                }
            }
        }

        contents
    }

    /// 枚举归档内容
    fn enumerate_archive(&self, suffix: &str) -> Result<LocationContents> {
        let file = File::open(&self.origin).map_err(|e| CoreError::ArchiveRead {
            origin: self.origin.clone(),
            reason: e.to_string(),
        })?;

        let mut contents = LocationContents::default();
        let plain_tar = self.origin.to_string_lossy().to_lowercase().ends_with(".tar");

        if !plain_tar {
            let mut archive = tar::Archive::new(GzDecoder::new(file));
            Self::read_entries(&mut archive, &self.origin, suffix, &mut contents)?;
        } else {
            let mut archive = tar::Archive::new(file);
            Self::read_entries(&mut archive, &self.origin, suffix, &mut contents)?;
        }

        Ok(contents)
    }

    /// 读取归档条目并翻译单元名
    fn read_entries<R: std::io::Read>(
        archive: &mut tar::Archive<R>,
        origin: &Path,
        suffix: &str,
        contents: &mut LocationContents,
    ) -> Result<()> {
        let entries = archive.entries().map_err(|e| CoreError::ArchiveRead {
            origin: origin.to_path_buf(),
            reason: e.to_string(),
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| CoreError::ArchiveRead {
                origin: origin.to_path_buf(),
                reason: e.to_string(),
            })?;

            if entry.header().entry_type().is_dir() {
                continue;
            }

            let path = entry.path().map_err(|e| CoreError::ArchiveRead {
                origin: origin.to_path_buf(),
                reason: e.to_string(),
            })?;

            if path.to_string_lossy().ends_with(suffix) {
                if let Some(type_name) = path_to_type_name(&path, suffix) {
                    contents.type_names.push(type_name);
                }
            }
        }

        Ok(())
    }
}

impl PartialEq for CodeLocation {
    fn eq(&self, other: &Self) -> bool {
        self.origin == other.origin && self.realm == other.realm
    }
}

impl Eq for CodeLocation {}

impl Hash for CodeLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.origin.hash(state);
        self.realm.hash(state);
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.origin.display(), self.realm)
    }
}

/// 路径是否是受支持的归档
fn is_archive_path(path: &Path) -> bool {
    let name = path.to_string_lossy().to_lowercase();
    name.ends_with(".tar") || name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// 相对路径翻译为点分单元名
///
/// 去掉单元后缀，把路径分隔符换成点号。
fn path_to_type_name(relative: &Path, suffix: &str) -> Option<String> {
    let raw = relative.to_string_lossy().replace('\\', "/");
    let stripped = raw.strip_suffix(suffix)?;
    if stripped.is_empty() {
        return None;
    }
    Some(stripped.replace('/', "."))
}
