use crate::config::{SlruCacheConfig, SlruCacheDynamicConfig};

pub(crate) fn ensure_config_or_panic(config: &SlruCacheConfig) {
    if let Err(e) = config.validate() {
        panic!("Invalid cache configuration: {e}");
    }
}

pub(crate) fn ensure_dynamic_config_or_panic(config: &SlruCacheDynamicConfig) {
    if let Err(e) = config.validate() {
        panic!("Invalid dynamic cache configuration: {e}");
    }
}
