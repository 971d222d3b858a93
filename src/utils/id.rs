//! 十位 62 进制 ID 生成器
//!
//! 用于生成命名空间（Realm）等内部对象的随机名称。
//! ID 格式：10 位 62 进制字符串（0-9, a-z, A-Z）。

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

/// 62 进制字符集
const BASE62_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// ID 长度
const ID_LENGTH: usize = 10;

/// 生成 10 位 62 进制 ID
///
/// 使用时间戳 + 随机数组合，确保唯一性。
///
/// # Returns
///
/// 返回 10 位 62 进制字符串
///
/// # Example
///
/// ```
/// use jimu_core::utils::id::generate_id;
///
/// let id = generate_id();
/// assert_eq!(id.len(), 10);
/// ```
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();

    // 获取当前时间戳（毫秒）
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    // 组合时间戳和随机数
    let random: u64 = rng.gen();
    let mut value = timestamp ^ random;

    // 转换为 62 进制
    let mut result = Vec::with_capacity(ID_LENGTH);
    for _ in 0..ID_LENGTH {
        let index = (value % 62) as usize;
        result.push(BASE62_CHARS[index]);
        value /= 62;

        // 高位耗尽后补充随机数
        if value == 0 {
            value = rng.gen();
        }
    }

    String::from_utf8(result).expect("base62 字符集始终是合法 UTF-8")
}
