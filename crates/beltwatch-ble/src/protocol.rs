//! GATT layout of the belt-stop sensor and device matching rules

use beltwatch_core::DeviceSelector;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// BLE Service and Characteristic UUIDs
// ----------------------------------------------------------------------------

/// UART-style service exposed by the sensor
pub const SENSOR_SERVICE_UUID: Uuid = Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E);

/// Characteristic the client writes command lines to
pub const SENSOR_WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6E400002_B5A3_F393_E0A9_E50E24DCCA9E);

/// Characteristic the sensor streams protocol lines on
pub const SENSOR_NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E);

// ----------------------------------------------------------------------------
// Device Matching
// ----------------------------------------------------------------------------

/// Whether an advertised name looks like one of our sensors
pub fn is_sensor_name(name: &str, prefix: &str) -> bool {
    !prefix.is_empty() && name.starts_with(prefix)
}

/// Check a discovered peripheral against the operator's selection
///
/// Addresses compare case-insensitively against both the MAC address and
/// the platform identifier, since some platforms hide the MAC and only expose
/// an opaque id.
pub fn matches_selector(
    selector: &DeviceSelector,
    local_name: Option<&str>,
    address: &str,
    platform_id: &str,
) -> bool {
    match selector {
        DeviceSelector::NamePrefix(prefix) => {
            local_name.is_some_and(|name| is_sensor_name(name, prefix))
        }
        DeviceSelector::Address(wanted) => {
            let wanted = wanted.trim();
            address.eq_ignore_ascii_case(wanted) || platform_id.eq_ignore_ascii_case(wanted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuids_share_the_uart_base() {
        let base = |uuid: Uuid| uuid.as_u128() & 0x0000_FFFF_FFFF_FFFF_FFFF_FFFF_FFFF_FFFF;
        assert_eq!(base(SENSOR_SERVICE_UUID), base(SENSOR_WRITE_CHARACTERISTIC_UUID));
        assert_eq!(base(SENSOR_SERVICE_UUID), base(SENSOR_NOTIFY_CHARACTERISTIC_UUID));
        assert_ne!(SENSOR_WRITE_CHARACTERISTIC_UUID, SENSOR_NOTIFY_CHARACTERISTIC_UUID);
    }

    #[test]
    fn test_name_prefix_selection() {
        let selector = DeviceSelector::NamePrefix("BeltStop".to_string());
        assert!(matches_selector(&selector, Some("BeltStop-0042"), "", ""));
        assert!(!matches_selector(&selector, Some("Headset"), "", ""));
        assert!(!matches_selector(&selector, None, "", ""));
    }

    #[test]
    fn test_empty_prefix_matches_nothing() {
        assert!(!is_sensor_name("BeltStop-1", ""));
    }

    #[test]
    fn test_address_selection_ignores_case() {
        let selector = DeviceSelector::Address("aa:bb:cc:dd:ee:ff".to_string());
        assert!(matches_selector(&selector, None, "AA:BB:CC:DD:EE:FF", "hci0/dev_x"));
        assert!(!matches_selector(&selector, Some("BeltStop"), "11:22:33:44:55:66", "other"));
    }

    #[test]
    fn test_address_selection_accepts_platform_id() {
        let selector = DeviceSelector::Address("4C3A1F0E-0000-1111-2222-333344445555".to_string());
        assert!(matches_selector(
            &selector,
            None,
            "00:00:00:00:00:00",
            "4c3a1f0e-0000-1111-2222-333344445555"
        ));
    }
}
