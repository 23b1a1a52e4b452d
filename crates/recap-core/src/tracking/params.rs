use crate::errors::TrackingError;
use std::collections::BTreeMap;

/// Flatten nested JSON into dotted keys. Objects recurse; every other value is
/// stringified (strings without quotes, arrays as JSON). A nested object under
/// an empty key is merged into its parent instead of adding a `.` segment.
pub fn flatten_params(value: &serde_json::Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into("", value, &mut out);
    out
}

fn flatten_into(prefix: &str, value: &serde_json::Value, out: &mut BTreeMap<String, String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let key = match (prefix.is_empty(), k.is_empty()) {
                    (_, true) => prefix.to_string(),
                    (true, false) => k.clone(),
                    (false, false) => format!("{prefix}.{k}"),
                };
                flatten_into(&key, v, out);
            }
        }
        serde_json::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

/// Merge several param maps. A key may repeat only with the same value.
pub fn merge_params<I>(maps: I) -> Result<BTreeMap<String, String>, TrackingError>
where
    I: IntoIterator<Item = BTreeMap<String, String>>,
{
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for map in maps {
        for (k, v) in map {
            match out.get(&k) {
                Some(existing) if *existing != v => {
                    return Err(TrackingError::DuplicateParam {
                        key: k,
                        first: existing.clone(),
                        second: v,
                    });
                }
                Some(_) => {}
                None => {
                    out.insert(k, v);
                }
            }
        }
    }
    Ok(out)
}
