/// Returns the cached value for `$key`, or awaits `$block`, caches its
/// result in the background for `$ttl` seconds and returns it.
///
/// Errors from the cache read and from `$block` are propagated with `?`.
///
/// ```rust,ignore
/// // tail expression of a fn returning AppResult<Vec<String>>
/// cached!(cache, key, 3600, self.request_tags(prior, text))
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        if let Some(cached) = $cache.get_from_cache(&$key).await? {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set_in_background(&$key, &value, $ttl);
            Ok(value)
        }
    }};
}
