//! Coordination-store key builders. All key strings live here so the wire
//! shape in spec §6.4 stays bit-stable across the codebase.

pub fn req(reqid: &str) -> String {
    format!("req:{reqid}")
}

pub fn reqp(reqid: &str) -> String {
    format!("reqp:{reqid}")
}

pub fn user_params(ip: &str) -> String {
    format!("up:{ip}")
}

pub fn pool_running(pool: &str) -> String {
    format!("p:{pool}:f")
}

pub fn pool_wait_sentinel(pool: &str, reqid: &str) -> String {
    format!("p:{pool}:rq:{reqid}")
}

pub fn pool_info(pool: &str) -> String {
    format!("p:{pool}:i")
}

/// Fixed-size pool's priority queue (sorted set keyed by admission counter).
pub fn fixed_queue(pool: &str) -> String {
    format!("p:{pool}:q")
}

/// Fixed-size pool's short-TTL liveness ping for a queued reqid.
pub fn fixed_ping(pool: &str, reqid: &str) -> String {
    format!("p:{pool}:r:{reqid}")
}

/// Persistent pool's FIFO wait list.
pub fn persist_wait_queue(pool: &str) -> String {
    format!("p:{pool}:wq")
}

/// Persistent pool's wait-queue membership mirror set.
pub fn persist_wait_set(pool: &str) -> String {
    format!("p:{pool}:ws")
}

/// Persistent pool's set of all persistently owned reqids.
pub fn persist_all(pool: &str) -> String {
    format!("p:{pool}:a")
}

/// Cached network pool's set of recycled network names.
pub fn cached_network_pool(pool: &str) -> String {
    format!("n:{pool}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_match_documented_shape() {
        assert_eq!(req("abc"), "req:abc");
        assert_eq!(pool_running("fixed"), "p:fixed:f");
        assert_eq!(fixed_queue("fixed"), "p:fixed:q");
        assert_eq!(persist_wait_queue("persist"), "p:persist:wq");
        assert_eq!(cached_network_pool("net"), "n:net");
    }
}
