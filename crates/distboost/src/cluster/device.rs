//! Compute device a worker is bound to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::ConfigError;

/// Device a worker (or a regressor) targets.
///
/// Parses from the same strings XGBoost accepts for its `device` parameter:
/// `"cpu"`, `"cuda"`, `"cuda:N"`, with `"gpu"` / `"gpu:N"` as aliases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Host CPU.
    #[default]
    Cpu,
    /// Accelerator with the given ordinal.
    Cuda { ordinal: u32 },
}

impl Device {
    /// Accelerator with ordinal 0.
    pub const fn cuda() -> Self {
        Device::Cuda { ordinal: 0 }
    }

    /// Returns `true` for accelerator devices.
    #[inline]
    pub fn is_accelerator(self) -> bool {
        matches!(self, Device::Cuda { .. })
    }

    /// Whether a worker bound to `self` can serve work targeted at `requested`.
    ///
    /// Ordinals are not compared: in a distributed fit every worker uses the
    /// accelerator it is bound to.
    #[inline]
    pub fn satisfies(self, requested: Device) -> bool {
        match requested {
            Device::Cpu => true,
            Device::Cuda { .. } => self.is_accelerator(),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda { ordinal } => write!(f, "cuda:{ordinal}"),
        }
    }
}

impl FromStr for Device {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidValue {
            key: "device".to_string(),
            value: s.to_string(),
        };

        let lowered = s.trim().to_ascii_lowercase();
        let (kind, ordinal) = match lowered.split_once(':') {
            Some((kind, ordinal)) => (kind, Some(ordinal)),
            None => (lowered.as_str(), None),
        };

        match (kind, ordinal) {
            ("cpu", None) => Ok(Device::Cpu),
            ("cuda" | "gpu", None) => Ok(Device::cuda()),
            ("cuda" | "gpu", Some(ordinal)) => ordinal
                .parse::<u32>()
                .map(|ordinal| Device::Cuda { ordinal })
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("cpu", Device::Cpu)]
    #[case("CPU", Device::Cpu)]
    #[case("cuda", Device::Cuda { ordinal: 0 })]
    #[case("gpu", Device::Cuda { ordinal: 0 })]
    #[case("cuda:3", Device::Cuda { ordinal: 3 })]
    #[case(" gpu:1 ", Device::Cuda { ordinal: 1 })]
    fn parses_device_strings(#[case] input: &str, #[case] expected: Device) {
        assert_eq!(input.parse::<Device>().unwrap(), expected);
    }

    #[rstest]
    #[case("tpu")]
    #[case("cuda:")]
    #[case("cuda:x")]
    #[case("cpu:0")]
    fn rejects_unknown_devices(#[case] input: &str) {
        assert!(matches!(
            input.parse::<Device>(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn display_round_trips() {
        for device in [Device::Cpu, Device::Cuda { ordinal: 2 }] {
            assert_eq!(device.to_string().parse::<Device>().unwrap(), device);
        }
    }

    #[test]
    fn accelerator_requests_need_accelerator_workers() {
        assert!(Device::cuda().satisfies(Device::Cuda { ordinal: 5 }));
        assert!(Device::cuda().satisfies(Device::Cpu));
        assert!(!Device::Cpu.satisfies(Device::cuda()));
        assert!(Device::Cpu.satisfies(Device::Cpu));
    }
}
