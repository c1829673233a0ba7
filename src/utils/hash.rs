//! 哈希工具
//!
//! 缓存键、内容哈希和回答 uid 都基于 SHA-256 十六进制串。

use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

/// 进程内单调递增的序号，保证同一毫秒内生成的 uid 也互不相同
static UID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// 计算字符串的 SHA-256 十六进制哈希
pub fn generate_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    format!("{:x}", digest)
}

/// 为一条回答生成 uid
///
/// 由幻灯片 id、当前时间和进程内序号共同决定。学生文档通常复制自同一模板，
/// 幻灯片 id 会重复，所以不能只依赖 id 和时间戳。
pub fn generate_uid(slide_id: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let sequence = UID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    generate_hash(&format!("{}-{}-{}", slide_id, timestamp, sequence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_hash_is_stable_sha256() {
        assert_eq!(
            generate_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_uids_never_collide_for_same_slide() {
        let uids: HashSet<String> = (0..1000).map(|_| generate_uid("g1_template")).collect();
        assert_eq!(uids.len(), 1000);
    }
}
