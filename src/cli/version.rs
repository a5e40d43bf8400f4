pub fn version_string() -> String {
    format!("Syscoin Sentinel v{}", env!("CARGO_PKG_VERSION"))
}

/// Display version information
pub fn execute() {
    println!("{}", version_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string() {
        assert_eq!(
            version_string(),
            format!("Syscoin Sentinel v{}", env!("CARGO_PKG_VERSION"))
        );
        assert!(version_string().starts_with("Syscoin Sentinel v1."));
    }

    #[test]
    fn test_version_execute() {
        execute();
    }
}
