use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Embedding width of the tabular transformer
pub const DEFAULT_DIM: usize = 512;
pub const DEFAULT_LAYERS: usize = 12;
pub const DEFAULT_HEADS: usize = 4;
/// Output width used for every classification problem
pub const DEFAULT_CLASSES: usize = 10;

/// Model architecture selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelName {
    #[serde(rename = "TAB2D")]
    Tab2D,
    /// Column/row attention variant
    #[serde(rename = "TAB2D_COL_ROW")]
    Tab2DColRow,
}

impl Default for ModelName {
    fn default() -> Self {
        ModelName::Tab2D
    }
}

impl ModelName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelName::Tab2D => "TAB2D",
            ModelName::Tab2DColRow => "TAB2D_COL_ROW",
        }
    }

    pub fn architecture(&self) -> &'static Architecture {
        // Every variant is registered below
        &ARCHITECTURES[self]
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TAB2D" => Ok(ModelName::Tab2D),
            "TAB2D_COL_ROW" => Ok(ModelName::Tab2DColRow),
            _ => anyhow::bail!("Unknown model: {}. Available: TAB2D, TAB2D_COL_ROW", s),
        }
    }
}

/// Fixed network shape for a model family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub dim: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub description: String,
}

pub static ARCHITECTURES: Lazy<HashMap<ModelName, Architecture>> = Lazy::new(|| {
    let mut archs = HashMap::new();

    archs.insert(
        ModelName::Tab2D,
        Architecture {
            dim: DEFAULT_DIM,
            n_layers: DEFAULT_LAYERS,
            n_heads: DEFAULT_HEADS,
            description: "Tabular in-context transformer with 2D attention".to_string(),
        },
    );

    archs.insert(
        ModelName::Tab2DColRow,
        Architecture {
            dim: DEFAULT_DIM,
            n_layers: DEFAULT_LAYERS,
            n_heads: DEFAULT_HEADS,
            description: "Tab2D with separate column and row attention blocks".to_string(),
        },
    );

    archs
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name_serde() {
        let yaml = serde_yaml::to_string(&ModelName::Tab2D).unwrap();
        assert_eq!(yaml.trim(), "TAB2D");
        let parsed: ModelName = serde_yaml::from_str("TAB2D_COL_ROW").unwrap();
        assert_eq!(parsed, ModelName::Tab2DColRow);
    }

    #[test]
    fn test_architecture_heads_divide_dim() {
        for name in [ModelName::Tab2D, ModelName::Tab2DColRow] {
            let arch = name.architecture();
            assert_eq!(arch.dim % arch.n_heads, 0);
        }
    }

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!("tab2d".parse::<ModelName>().unwrap(), ModelName::Tab2D);
        assert!("tab3d".parse::<ModelName>().is_err());
    }
}
