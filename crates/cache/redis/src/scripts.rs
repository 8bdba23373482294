/// Lua script for atomic create-if-absent with an optional expiry.
///
/// KEYS\[1\] = the data key
/// ARGV\[1\] = value to set
/// ARGV\[2\] = TTL in milliseconds (0 means no expiry)
///
/// Returns 1 if the key was newly set, 0 if it already existed.
pub const ADD: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
local ttl = tonumber(ARGV[2])
if ttl > 0 then
    redis.call('SET', KEYS[1], ARGV[1], 'PX', ttl)
else
    redis.call('SET', KEYS[1], ARGV[1])
end
return 1
";

/// Lua script for releasing a lock only if it is still held by the caller.
///
/// KEYS\[1\] = lock key
/// ARGV\[1\] = owner token
///
/// Returns 1 if released, 0 if not held by this owner.
pub const LOCK_RELEASE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";
