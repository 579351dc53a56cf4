//! 半结构化载荷：任务元数据、专家结果、缓存数据共用同一种有序字符串键映射

use serde_json::{Map, Value};

/// 有序的字符串键 → JSON 值映射（字符串 / 数字 / 布尔 / 嵌套对象）
pub type Payload = Map<String, Value>;

/// 浅合并：patch 中的键覆盖 target 中的同名键，其余保持不变
pub fn merge_shallow(target: &mut Payload, patch: Payload) {
    for (key, value) in patch {
        target.insert(key, value);
    }
}

/// 从 JSON 值构造 Payload；非对象值包一层 `{"value": ...}`
pub fn payload_from_value(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
