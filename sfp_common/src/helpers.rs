/// Interpret a configuration flag. Recognised truthy values are `1`, `true`, `yes` and `on`; falsy values are `0`,
/// `false`, `no` and `off` (case-insensitive). Anything else, including an absent value, yields `default`.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let Some(value) = value else {
        return default;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}
