//! Attribute checks for values that end up inside remote shell commands.
//!
//! Each check returns a human-readable reason on failure; callers wrap it in
//! the error variant that fits (config vs. resource attributes).

/// Plain identifier: pool, image, VM name, user.
pub fn token(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(format!(
            "{} '{}' may only contain letters, digits, '.', '_' and '-'",
            field, value
        ));
    }
    if value.starts_with('-') {
        return Err(format!("{} '{}' must not start with '-'", field, value));
    }
    Ok(())
}

/// Host name or address (IPv4, IPv6, DNS name).
pub fn host(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("host must not be empty".to_string());
    }
    if value.starts_with('-')
        || !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']' | '_'))
    {
        return Err(format!("invalid host '{}'", value));
    }
    Ok(())
}

/// rbd/qemu-img size: digits with an optional K, M, G or T suffix.
pub fn size(value: &str) -> Result<(), String> {
    let digits = value.trim_end_matches(|c: char| matches!(c.to_ascii_uppercase(), 'K' | 'M' | 'G' | 'T'));
    let suffix_len = value.len() - digits.len();
    if digits.is_empty() || suffix_len > 1 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("invalid size '{}', expected e.g. \"6M\" or \"20G\"", value));
    }
    if digits.chars().all(|c| c == '0') {
        return Err(format!("size '{}' must be greater than zero", value));
    }
    Ok(())
}

/// Colon-separated MAC address, e.g. `de:ad:be:ef:ca:fe`.
pub fn mac(value: &str) -> Result<(), String> {
    let octets: Vec<&str> = value.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return Err(format!("invalid MAC address '{}'", value));
    }
    Ok(())
}

/// VNC display, `:N` or `host:N`.
pub fn vnc(value: &str) -> Result<(), String> {
    let invalid = || format!("invalid VNC display '{}', expected e.g. \":10\"", value);
    let (addr, display) = value.rsplit_once(':').ok_or_else(invalid)?;
    if display.is_empty() || !display.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if !addr.is_empty() {
        host(addr).map_err(|_| invalid())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token() {
        assert!(token("img_name", "helloImg").is_ok());
        assert!(token("img_name", "vm-100_disk.0").is_ok());
        assert!(token("img_name", "").is_err());
        assert!(token("img_name", "a b").is_err());
        assert!(token("img_name", "x;rm").is_err());
        assert!(token("img_name", "-name").is_err());
        assert!(token("img_name", "$(id)").is_err());
    }

    #[test]
    fn test_host() {
        assert!(host("192.168.3.100").is_ok());
        assert!(host("hv1.example.com").is_ok());
        assert!(host("fe80::1").is_ok());
        assert!(host("host name").is_err());
        assert!(host("-oProxyCommand=x").is_err());
    }

    #[test]
    fn test_size() {
        assert!(size("6M").is_ok());
        assert!(size("20G").is_ok());
        assert!(size("1024").is_ok());
        assert!(size("6m").is_ok());
        assert!(size("0M").is_err());
        assert!(size("M").is_err());
        assert!(size("6MB").is_err());
        assert!(size("6 M").is_err());
        assert!(size("1T").is_ok());
        assert!(size("1P").is_err());
    }

    #[test]
    fn test_mac() {
        assert!(mac("de:ad:be:ef:ca:fe").is_ok());
        assert!(mac("DE:AD:BE:EF:CA:FE").is_ok());
        assert!(mac("de:ad:be:ef:ca").is_err());
        assert!(mac("de-ad-be-ef-ca-fe").is_err());
        assert!(mac("zz:ad:be:ef:ca:fe").is_err());
    }

    #[test]
    fn test_vnc() {
        assert!(vnc(":10").is_ok());
        assert!(vnc("0.0.0.0:3").is_ok());
        assert!(vnc("10").is_err());
        assert!(vnc(":").is_err());
        assert!(vnc(":1,password").is_err());
    }
}
