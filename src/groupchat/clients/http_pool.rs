//! Pool of persistent HTTP clients, one per base URL.
//!
//! Reusing a `reqwest::Client` keeps connections alive across turns, so every agent and the
//! selector talking to the same endpoint share DNS lookups, TLS sessions and idle sockets.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    static ref HTTP_CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> =
        Mutex::new(HashMap::new());
}

/// Get or create the shared client for `base_url`.
pub fn get_http_client(base_url: &str) -> Result<reqwest::Client, reqwest::Error> {
    let mut pool = match HTTP_CLIENT_POOL.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(client) = pool.get(base_url) {
        return Ok(client.clone());
    }

    let client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(300))
        .build()?;

    pool.insert(base_url.to_string(), client.clone());
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_base_url_reuses_entry() {
        get_http_client("https://pool-test.invalid/v1").unwrap();
        get_http_client("https://pool-test.invalid/v1").unwrap();
        let pool = HTTP_CLIENT_POOL.lock().unwrap();
        assert_eq!(
            pool.keys().filter(|k| k.as_str() == "https://pool-test.invalid/v1").count(),
            1
        );
    }
}
