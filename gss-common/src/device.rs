//! Device classification from the User-Agent header

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Desktop => "desktop",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TABLET_MARKERS: [&str; 4] = ["ipad", "tablet", "playbook", "silk"];
const MOBILE_MARKERS: [&str; 7] = [
    "mobile",
    "iphone",
    "ipod",
    "android",
    "blackberry",
    "opera mini",
    "iemobile",
];

/// Classify a User-Agent string.
///
/// Tablets are checked first since some tablet agents also say "mobile".
/// Android without "mobile" is a tablet.
pub fn detect_device(user_agent: &str) -> DeviceType {
    let ua = user_agent.to_lowercase();

    if TABLET_MARKERS.iter().any(|m| ua.contains(m))
        || (ua.contains("android") && !ua.contains("mobile"))
    {
        return DeviceType::Tablet;
    }

    if MOBILE_MARKERS.iter().any(|m| ua.contains(m)) {
        return DeviceType::Mobile;
    }

    DeviceType::Desktop
}
