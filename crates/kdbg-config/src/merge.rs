use crate::config::Config;
use crate::error::ConfigError;

/// Merge an overlay TOML fragment on top of a base [`Config`].
///
/// Values present in `overlay_toml` override those in `base`; missing keys
/// keep their `base` values.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    let parse = |e: &dyn std::fmt::Display| ConfigError::Parse(e.to_string());

    let base_str = toml::to_string(base).map_err(|e| parse(&e))?;
    let mut base_val: toml::Value = toml::from_str(&base_str).map_err(|e| parse(&e))?;
    let overlay_val: toml::Value = toml::from_str(overlay_toml).map_err(|e| parse(&e))?;

    merge_values(&mut base_val, &overlay_val);

    base_val
        .try_into()
        .map_err(|e: toml::de::Error| parse(&e))
}

/// Tables merge key by key, everything else is replaced.
fn merge_values(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, val) in overlay_table {
                match base_table.get_mut(key) {
                    Some(base_val) => merge_values(base_val, val),
                    None => {
                        base_table.insert(key.clone(), val.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}
