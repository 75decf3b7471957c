//! Backend address merging for scaled endpoints

use std::collections::BTreeSet;
use std::net::IpAddr;
use tracing::warn;

/// One address reported by a workload replica
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendAddress {
    pub ip: Option<String>,
}

impl BackendAddress {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
        }
    }
}

/// A group of addresses, one per subset of the underlying service
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendGroup {
    pub addresses: Vec<BackendAddress>,
}

impl BackendGroup {
    pub fn new<I, S>(ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: ips.into_iter().map(BackendAddress::new).collect(),
        }
    }
}

/// Result of merging backend groups
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendMerge {
    pub backends: BTreeSet<String>,
    /// Indexes of groups dropped because an address was malformed
    pub skipped: Vec<usize>,
}

/// Union every address of every well-formed group.
///
/// A group with any missing or unparsable address is dropped whole.
pub fn merge_backend_groups(groups: &[BackendGroup]) -> BackendMerge {
    let mut merge = BackendMerge::default();

    for (index, group) in groups.iter().enumerate() {
        let parsed: Option<Vec<String>> = group
            .addresses
            .iter()
            .map(|addr| {
                addr.ip
                    .as_deref()
                    .map(str::trim)
                    .filter(|ip| ip.parse::<IpAddr>().is_ok())
                    .map(str::to_string)
            })
            .collect();

        match parsed {
            Some(ips) => merge.backends.extend(ips),
            None => {
                warn!("Skipping backend group {}: malformed address", index);
                merge.skipped.push(index);
            }
        }
    }

    merge
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_collapses_duplicates_across_groups() {
        let groups = vec![
            BackendGroup::new(["10.0.0.1"]),
            BackendGroup::new(["10.0.0.1", "10.0.0.2"]),
        ];
        let merge = merge_backend_groups(&groups);
        assert_eq!(
            merge.backends.into_iter().collect::<Vec<_>>(),
            vec!["10.0.0.1", "10.0.0.2"]
        );
        assert!(merge.skipped.is_empty());
    }

    #[test]
    fn test_merge_skips_malformed_group() {
        let groups = vec![
            BackendGroup::new(["10.0.0.1"]),
            BackendGroup {
                addresses: vec![BackendAddress::new("10.0.0.9"), BackendAddress { ip: None }],
            },
            BackendGroup::new(["not-an-ip"]),
            BackendGroup::new(["fd00::3"]),
        ];
        let merge = merge_backend_groups(&groups);
        assert_eq!(
            merge.backends.into_iter().collect::<Vec<_>>(),
            vec!["10.0.0.1", "fd00::3"]
        );
        assert_eq!(merge.skipped, vec![1, 2]);
    }

    #[test]
    fn test_merge_of_empty_groups_is_empty() {
        let merge = merge_backend_groups(&[BackendGroup::default()]);
        assert!(merge.backends.is_empty());
        assert!(merge.skipped.is_empty());
    }
}
