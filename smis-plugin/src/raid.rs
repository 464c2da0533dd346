//! RAID layout detection from composite extent redundancy properties.

use cim_core::CimInstance;

use crate::types::RaidType;

/// Properties of `CIM_CompositeExtent` the decision table reads.
pub const RAID_PROPERTIES: &[&str] = &[
    "DataRedundancy",
    "PackageRedundancy",
    "NoSinglePointOfFailure",
    "ExtentStripeLength",
];

/// RAID layout of one composite extent.
///
/// Only the top level of nested layouts is recognised; RAID 50 and friends
/// are indistinguishable from their members here and report UNKNOWN.
pub fn raid_type_of(extent: &CimInstance) -> RaidType {
    let (Some(data), Some(package), Some(no_spof), Some(stripe)) = (
        extent.u64_prop("DataRedundancy"),
        extent.u64_prop("PackageRedundancy"),
        extent.bool_prop("NoSinglePointOfFailure"),
        extent.u64_prop("ExtentStripeLength"),
    ) else {
        return RaidType::Unknown;
    };

    match (data, package, no_spof, stripe) {
        (1, 0, false, 1) => RaidType::Jbod,
        (1, 0, false, s) if s >= 1 => RaidType::Raid0,
        (2, 1, true, 1) => RaidType::Raid1,
        (1, 1, true, s) if s >= 1 => RaidType::Raid5,
        (1, 2, true, s) if s >= 1 => RaidType::Raid6,
        (2, 1, true, s) if s >= 1 => RaidType::Raid10,
        _ => RaidType::Unknown,
    }
}

/// Layout of a pool built from extents of the given layouts.
///
/// Extents whose layout could not be told apart do not make a pool MIXED.
pub fn combine(types: impl IntoIterator<Item = RaidType>) -> RaidType {
    let mut result = RaidType::Unknown;
    for t in types {
        if t == RaidType::Unknown {
            continue;
        }
        if result == RaidType::Unknown {
            result = t;
        } else if result != t {
            return RaidType::Mixed;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use cim_core::CimInstanceName;

    fn extent(data: u64, package: u64, no_spof: bool, stripe: u64) -> CimInstance {
        CimInstance::new(CimInstanceName::new("CIM_CompositeExtent"))
            .with("DataRedundancy", data)
            .with("PackageRedundancy", package)
            .with("NoSinglePointOfFailure", no_spof)
            .with("ExtentStripeLength", stripe)
    }

    #[test]
    fn test_decision_table() {
        let cases = [
            (extent(1, 0, false, 1), RaidType::Jbod),
            (extent(1, 0, false, 4), RaidType::Raid0),
            (extent(2, 1, true, 1), RaidType::Raid1),
            (extent(1, 1, true, 5), RaidType::Raid5),
            (extent(1, 2, true, 8), RaidType::Raid6),
            (extent(2, 1, true, 4), RaidType::Raid10),
            (extent(3, 1, true, 4), RaidType::Unknown),
            (extent(1, 0, false, 0), RaidType::Unknown),
        ];
        for (ext, expected) in cases {
            assert_eq!(raid_type_of(&ext), expected, "{:?}", ext.properties);
        }
    }

    #[test]
    fn test_missing_property_is_unknown() {
        let mut ext = extent(1, 1, true, 5);
        ext.properties.remove("ExtentStripeLength");
        assert_eq!(raid_type_of(&ext), RaidType::Unknown);
    }

    #[test]
    fn test_combine() {
        assert_eq!(combine([]), RaidType::Unknown);
        assert_eq!(combine([RaidType::Raid5, RaidType::Raid5]), RaidType::Raid5);
        assert_eq!(combine([RaidType::Raid5, RaidType::Raid6]), RaidType::Mixed);
        assert_eq!(combine([RaidType::Unknown, RaidType::Raid1]), RaidType::Raid1);
    }
}
