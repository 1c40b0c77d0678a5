//! Configurable remote-IP rewrite applied by the packager before an
//! envelope is published.

use std::collections::HashMap;

/// Rewrite rule: a single override for all remote IPs, or an exact-match
/// table, or identity (the default).
#[derive(Debug, Clone, Default)]
pub struct IpMap {
    map_all: Option<String>,
    table: HashMap<String, String>,
}

impl IpMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_map_all(mut self, ip: impl Into<String>) -> Self {
        self.map_all = Some(ip.into());
        self
    }

    #[must_use]
    pub fn with_entry(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.table.insert(from.into(), to.into());
        self
    }

    /// Rewrite `ip` per precedence: `mapAll` > exact match > identity.
    #[must_use]
    pub fn rewrite<'a>(&'a self, ip: &'a str) -> &'a str {
        if let Some(all) = &self.map_all {
            return all;
        }
        if let Some(mapped) = self.table.get(ip) {
            return mapped;
        }
        ip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_all_overrides_everything() {
        let map = IpMap::new().with_map_all("10.0.0.1").with_entry("1.2.3.4", "5.6.7.8");
        assert_eq!(map.rewrite("1.2.3.4"), "10.0.0.1");
        assert_eq!(map.rewrite("9.9.9.9"), "10.0.0.1");
    }

    #[test]
    fn exact_match_table_rewrites_listed_ips() {
        let map = IpMap::new().with_entry("1.2.3.4", "5.6.7.8");
        assert_eq!(map.rewrite("1.2.3.4"), "5.6.7.8");
    }

    #[test]
    fn unmatched_ip_is_pass_through() {
        let map = IpMap::new().with_entry("1.2.3.4", "5.6.7.8");
        assert_eq!(map.rewrite("9.9.9.9"), "9.9.9.9");
    }

    #[test]
    fn identity_when_unconfigured() {
        let map = IpMap::new();
        assert_eq!(map.rewrite("1.2.3.4"), "1.2.3.4");
    }
}
