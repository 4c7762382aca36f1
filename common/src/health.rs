//! `GET /health` response shape shared by all four services (spec section
//! 6.2): `{"status":"ok", ...per-service counters}`.

use serde_json::{Map, Value};

pub fn health_body(counters: Vec<(&str, Value)>) -> Value {
    let mut map = Map::new();
    map.insert("status".to_string(), Value::String("ok".to_string()));
    for (key, value) in counters {
        map.insert(key.to_string(), value);
    }
    Value::Object(map)
}
