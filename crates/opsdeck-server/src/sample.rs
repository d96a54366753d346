//! Canned node telemetry served when `relay.sample_fallback` is enabled.

use chrono::Utc;
use serde_json::{json, Value};

pub fn telemetry() -> Value {
    json!({
        "hash_rate": 1_250_000.0,
        "total_hashes": 12_480_000u64,
        "best_height": 128,
        "mempool_depth": 32,
        "difficulty_bits": 50_331_670u64,
        "stale_share_rate": 0.012,
    })
}

pub fn note_status() -> Value {
    json!({
        "leaf_count": 2048,
        "depth": 32,
        "root": 8_731_462_512u64,
        "next_index": 2050,
    })
}

/// The `index`-th event of a repeating telemetry/block/transaction cycle.
pub fn event(index: usize) -> Value {
    let timestamp = Utc::now().to_rfc3339();
    match index % 3 {
        0 => json!({
            "type": "telemetry",
            "hash_rate": 1_200_000.0,
            "best_height": 127,
            "mempool_depth": 28,
            "difficulty_bits": 50_331_670u64,
            "stale_share_rate": 0.01,
            "timestamp": timestamp,
        }),
        1 => json!({
            "type": "block",
            "height": 128,
            "hash": "sample-block-0128",
            "timestamp": timestamp,
        }),
        _ => json!({
            "type": "transaction",
            "tx_id": "sample-tx-9c7a",
            "timestamp": timestamp,
        }),
    }
}
