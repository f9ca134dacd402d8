//! Lua scripts for atomic lock operations.
//!
//! Each script compares the stored value with the caller's token and acts in
//! the same server-side step, so no other client can slip in between the
//! check and the write.

/// Lua script to extend a lock held by the caller.
///
/// Arguments:
/// - KEYS[1]: Lock key
/// - ARGV[1]: Expected token
/// - ARGV[2]: New TTL in milliseconds
///
/// Returns:
/// - 1: TTL reset
/// - 0: Key missing or owned by another token
pub const REFRESH: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

/// Lua script to release a lock held by the caller.
///
/// Arguments:
/// - KEYS[1]: Lock key
/// - ARGV[1]: Expected token
///
/// Returns:
/// - 1: Key deleted
/// - 0: Key missing or owned by another token
pub const RELEASE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;
