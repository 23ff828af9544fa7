use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const MESSAGE_ID_SUFFIX_LEN: usize = 9;

#[must_use]
pub fn hash64<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[must_use]
pub fn base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Ids for business-authored messages: `msg_<unix_ms>_<9 base36 chars>`.
#[must_use]
pub fn generated_message_id(unix_ms: u64, seed: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    let suffix = base36(hash64(&(unix_ms, nanos, seed)));
    let suffix = format!("{suffix:0>width$}", width = MESSAGE_ID_SUFFIX_LEN);
    format!("msg_{unix_ms}_{}", &suffix[suffix.len() - MESSAGE_ID_SUFFIX_LEN..])
}
