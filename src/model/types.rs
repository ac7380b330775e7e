use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification network families the asset store knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Architecture {
    #[default]
    #[serde(rename = "resnet18")]
    ResNet18,
    #[serde(rename = "mobilenet_v2")]
    MobileNetV2,
    #[serde(rename = "shufflenet_v2_x1_0")]
    ShuffleNetV2X10,
    #[serde(rename = "shufflenet_v2_x0_5")]
    ShuffleNetV2X05,
}

impl Architecture {
    /// Every known architecture, default first.
    pub const ALL: [Architecture; 4] = [
        Architecture::ResNet18,
        Architecture::MobileNetV2,
        Architecture::ShuffleNetV2X10,
        Architecture::ShuffleNetV2X05,
    ];

    /// Canonical name, also the stem of the asset file.
    pub fn name(self) -> &'static str {
        match self {
            Self::ResNet18 => "resnet18",
            Self::MobileNetV2 => "mobilenet_v2",
            Self::ShuffleNetV2X10 => "shufflenet_v2_x1_0",
            Self::ShuffleNetV2X05 => "shufflenet_v2_x0_5",
        }
    }

    /// Short operator-facing code.
    pub fn short_code(self) -> &'static str {
        match self {
            Self::ResNet18 => "R18",
            Self::MobileNetV2 => "MV2",
            Self::ShuffleNetV2X10 => "SNV2_1.0",
            Self::ShuffleNetV2X05 => "SNV2_0.5",
        }
    }

    /// Parse a name, falling back to the default architecture when it is not
    /// recognised. The fallback is logged.
    pub fn parse_or_default(name: &str) -> Self {
        match name.parse() {
            Ok(arch) => arch,
            Err(_) => {
                let fallback = Self::default();
                tracing::warn!(
                    "Unrecognised architecture '{name}', falling back to {}",
                    fallback.name()
                );
                fallback
            }
        }
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|a| {
                a.name().eq_ignore_ascii_case(trimmed)
                    || a.short_code().eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| format!("unknown architecture: '{trimmed}'"))
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operator-chosen model variant: architecture and precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ModelSelection {
    pub architecture: Architecture,
    pub quantized: bool,
}

impl ModelSelection {
    pub fn new(architecture: Architecture, quantized: bool) -> Self {
        Self {
            architecture,
            quantized,
        }
    }

    /// Precision suffix used in asset names.
    pub fn precision(&self) -> &'static str {
        if self.quantized {
            "int8"
        } else {
            "float"
        }
    }

    /// File name of the model asset, e.g. `mobilenet_v2_int8.ort`.
    pub fn asset_key(&self) -> String {
        format!("{}_{}.ort", self.architecture.name(), self.precision())
    }

    /// Same precision, default architecture.
    pub fn with_default_architecture(&self) -> Self {
        Self::new(Architecture::default(), self.quantized)
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.architecture, self.precision())
    }
}
