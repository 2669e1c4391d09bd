//! The instance-type → resources lookup table (spec.md §4.4, §9 "Fixed
//! tables"). Unknown types return `None` without failing, rather than a
//! full vendored instance-type catalog — see `SPEC_FULL.md` §4.4.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::types::NodeResources;

fn table() -> &'static HashMap<&'static str, NodeResources> {
    static TABLE: OnceLock<HashMap<&'static str, NodeResources>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            ("t3.micro", NodeResources::new(2, 1)),
            ("t3.small", NodeResources::new(2, 2)),
            ("t3.medium", NodeResources::new(2, 4)),
            ("t3.large", NodeResources::new(2, 8)),
            ("m5.large", NodeResources::new(2, 8)),
            ("m5.xlarge", NodeResources::new(4, 16)),
            ("m5.2xlarge", NodeResources::new(8, 32)),
            ("c5.large", NodeResources::new(2, 4)),
            ("c5.xlarge", NodeResources::new(4, 8)),
            ("c5.2xlarge", NodeResources::new(8, 16)),
            ("r5.large", NodeResources::new(2, 16)),
            ("r5.xlarge", NodeResources::new(4, 32)),
        ])
    })
}

/// Looks up the allocatable resources for an EC2 instance type. Returns
/// `None` for unrecognized types; callers translate that into a null
/// resource record rather than an error (spec.md §4.4).
pub fn node_resources_for_instance_type(instance_type: &str) -> Option<NodeResources> {
    table().get(instance_type).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_type_resolves() {
        let r = node_resources_for_instance_type("m5.large").unwrap();
        assert_eq!(r.milli_cpu, 2000);
        assert_eq!(r.memory_bytes, 8 * (1 << 30));
    }

    #[test]
    fn unknown_type_is_none() {
        assert!(node_resources_for_instance_type("quantum.huge").is_none());
    }
}
