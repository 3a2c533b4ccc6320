//! Deferred-construction directives
//!
//! Configuration files describe objects to build later as
//! `{_target_: <name>, _args_: [...]}`. Those are resolved at load time into
//! [`ConstructTarget`], so an unknown target or a bad argument is a load error
//! rather than a failure deep inside training.

use crate::error::ConfigError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const TORCH_DEVICE_TARGET: &str = "torch.device";

/// Compute device a model is placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    /// CUDA device, optionally pinned to an ordinal
    Cuda(Option<u32>),
    Mps,
}

impl Default for Device {
    fn default() -> Self {
        Device::Cuda(None)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(None) => write!(f, "cuda"),
            Device::Cuda(Some(index)) => write!(f, "cuda:{}", index),
            Device::Mps => write!(f, "mps"),
        }
    }
}

impl FromStr for Device {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(None)),
            "mps" => Ok(Device::Mps),
            other => {
                let index = other
                    .strip_prefix("cuda:")
                    .and_then(|i| i.parse::<u32>().ok())
                    .ok_or_else(|| ConfigError::InvalidDevice(s.to_string()))?;
                Ok(Device::Cuda(Some(index)))
            }
        }
    }
}

impl Serialize for Device {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Device {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Directive exactly as written in the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDirective {
    #[serde(rename = "_target_")]
    pub target: String,
    #[serde(rename = "_args_", default)]
    pub args: Vec<serde_yaml::Value>,
}

/// Every object a configuration file is allowed to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructTarget {
    TorchDevice(Device),
}

impl ConstructTarget {
    pub fn device(&self) -> Device {
        match self {
            ConstructTarget::TorchDevice(device) => *device,
        }
    }

    pub fn target_name(&self) -> &'static str {
        match self {
            ConstructTarget::TorchDevice(_) => TORCH_DEVICE_TARGET,
        }
    }
}

impl From<Device> for ConstructTarget {
    fn from(device: Device) -> Self {
        ConstructTarget::TorchDevice(device)
    }
}

impl TryFrom<RawDirective> for ConstructTarget {
    type Error = ConfigError;

    fn try_from(raw: RawDirective) -> Result<Self, Self::Error> {
        if raw.target != TORCH_DEVICE_TARGET {
            return Err(ConfigError::UnknownTarget(raw.target));
        }
        if raw.args.len() != 1 {
            return Err(ConfigError::TargetArity {
                target: raw.target,
                expected: 1,
                got: raw.args.len(),
            });
        }
        let arg = raw.args[0]
            .as_str()
            .ok_or_else(|| ConfigError::InvalidDevice(format!("{:?}", raw.args[0])))?;
        Ok(ConstructTarget::TorchDevice(arg.parse()?))
    }
}

impl From<ConstructTarget> for RawDirective {
    fn from(target: ConstructTarget) -> Self {
        match target {
            ConstructTarget::TorchDevice(device) => RawDirective {
                target: TORCH_DEVICE_TARGET.to_string(),
                args: vec![serde_yaml::Value::String(device.to_string())],
            },
        }
    }
}

impl Serialize for ConstructTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawDirective::from(*self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConstructTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawDirective::deserialize(deserializer)?;
        ConstructTarget::try_from(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Cuda(None));
        assert_eq!("cuda:3".parse::<Device>().unwrap(), Device::Cuda(Some(3)));
        assert_eq!("mps".parse::<Device>().unwrap(), Device::Mps);
        assert!("cuda:x".parse::<Device>().is_err());
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn test_device_display_matches_parse() {
        for device in [Device::Cpu, Device::Cuda(None), Device::Cuda(Some(1)), Device::Mps] {
            assert_eq!(device.to_string().parse::<Device>().unwrap(), device);
        }
    }

    #[test]
    fn test_resolve_torch_device() {
        let target: ConstructTarget =
            serde_yaml::from_str("_target_: torch.device\n_args_: ['cuda:0']\n").unwrap();
        assert_eq!(target, ConstructTarget::TorchDevice(Device::Cuda(Some(0))));
        assert_eq!(target.target_name(), "torch.device");
    }

    #[test]
    fn test_unknown_target_rejected() {
        let err = serde_yaml::from_str::<ConstructTarget>("_target_: os.system\n_args_: ['ls']\n")
            .unwrap_err();
        assert!(err.to_string().contains("unknown construction target"));
    }

    #[test]
    fn test_wrong_arity_rejected() {
        let err = serde_yaml::from_str::<ConstructTarget>(
            "_target_: torch.device\n_args_: ['cuda', 0]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("positional argument"));
    }

    #[test]
    fn test_serializes_as_directive() {
        let yaml = serde_yaml::to_string(&ConstructTarget::TorchDevice(Device::Cpu)).unwrap();
        assert!(yaml.contains("_target_: torch.device"));
        assert!(yaml.contains("cpu"));
    }
}
