//! The fixed device-letter table and the in-guest device translation
//! (spec.md §3, §4.5, §6).

/// The ordered, fixed set of device names candidates are assigned from.
/// A program constant (spec.md §9 "Fixed tables").
pub const DEVICE_NAMES: &[&str] = &[
    "/dev/sdf", "/dev/sdg", "/dev/sdh", "/dev/sdi", "/dev/sdj", "/dev/sdk", "/dev/sdl",
    "/dev/sdm", "/dev/sdn", "/dev/sdo", "/dev/sdp",
];

/// Translates a host device name to the name the guest kernel actually
/// exposes: a leading `/dev/sd` becomes `/dev/xvd` (spec.md §4.5 step 5).
pub fn to_guest_device_name(device_name: &str) -> String {
    match device_name.strip_prefix("/dev/sd") {
        Some(suffix) => format!("/dev/xvd{suffix}"),
        None => device_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_known_devices() {
        assert_eq!(to_guest_device_name("/dev/sdf"), "/dev/xvdf");
        assert_eq!(to_guest_device_name("/dev/sdp"), "/dev/xvdp");
    }

    #[test]
    fn leaves_unrecognized_devices_alone() {
        assert_eq!(to_guest_device_name("/dev/nvme1n1"), "/dev/nvme1n1");
    }

    #[test]
    fn device_table_has_eleven_entries() {
        assert_eq!(DEVICE_NAMES.len(), 11);
    }
}
