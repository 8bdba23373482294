use keylock_cache::error::StoreError;

/// Map a Redis client error, separating transport failures from command
/// failures.
pub(crate) fn map_redis_error(e: &redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}
