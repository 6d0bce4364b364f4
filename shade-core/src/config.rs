//! Build-time configuration (spec §6, ambient stack).
//!
//! Mirrors the profile/settings split codedefender's config crate uses:
//! a top-level `ObfuscationProfile` loaded from YAML, with nested settings
//! structs per subsystem so new knobs can be added without touching
//! unrelated ones. Every field has a sensible default so a profile file
//! only needs to mention what it overrides.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObfuscationProfile {
    pub seed: Option<String>,
    pub nonce: Option<String>,
    pub literals: LiteralSettings,
    pub control_flow: ControlFlowSettings,
    pub cache: CacheSettings,
    pub tiny: bool,
    pub debug: DebugSettings,
    pub passes: Vec<ObfuscationPass>,
}

impl Default for ObfuscationProfile {
    fn default() -> Self {
        Self {
            seed: None,
            nonce: None,
            literals: LiteralSettings::default(),
            control_flow: ControlFlowSettings::default(),
            cache: CacheSettings::default(),
            tiny: false,
            debug: DebugSettings::default(),
            passes: vec![
                ObfuscationPass::Literals,
                ObfuscationPass::ConstDemote,
                ObfuscationPass::ControlFlow,
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LiteralSettings {
    pub enabled: bool,
    pub spn_rounds_min: usize,
    pub spn_rounds_max: usize,
}

impl Default for LiteralSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            spn_rounds_min: 4,
            spn_rounds_max: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlFlowSettings {
    pub mode: String,
    pub max_block_len: usize,
}

impl Default for ControlFlowSettings {
    fn default() -> Self {
        Self {
            mode: "auto".to_string(),
            max_block_len: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub encrypt: bool,
    pub dir: Option<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            encrypt: true,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DebugSettings {
    pub control_flow: bool,
    pub out_dir: Option<String>,
}

/// Tagged-variant pass selector, mirroring the `ObfuscationPass`-style enum
/// codedefender's config crate uses for selecting which transform stages
/// run. An explicit `passes` list lets a profile skip a stage entirely
/// (e.g. literal-only obfuscation for a size-sensitive build).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObfuscationPass {
    Literals,
    ConstDemote,
    ControlFlow,
    RuntimePatch,
    LinkerPatch,
}

impl ObfuscationProfile {
    pub fn from_yaml(text: &str) -> crate::error::Result<Self> {
        serde_yaml::from_str(text).map_err(|e| crate::error::ShadeError::Config(e.to_string()))
    }

    pub fn to_yaml(&self) -> crate::error::Result<String> {
        serde_yaml::to_string(self).map_err(|e| crate::error::ShadeError::Config(e.to_string()))
    }

    pub fn has_pass(&self, pass: &ObfuscationPass) -> bool {
        self.passes.contains(pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_enables_all_passes() {
        let profile = ObfuscationProfile::default();
        assert!(profile.has_pass(&ObfuscationPass::Literals));
        assert!(profile.has_pass(&ObfuscationPass::ControlFlow));
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let yaml = "tiny: true\n";
        let profile = ObfuscationProfile::from_yaml(yaml).unwrap();
        assert!(profile.tiny);
        assert!(profile.literals.enabled);
        assert_eq!(profile.control_flow.max_block_len, 6);
    }

    #[test]
    fn roundtrips_through_yaml() {
        let mut profile = ObfuscationProfile::default();
        profile.seed = Some("abc".to_string());
        profile.passes = vec![ObfuscationPass::Literals];
        let yaml = profile.to_yaml().unwrap();
        let parsed = ObfuscationProfile::from_yaml(&yaml).unwrap();
        assert_eq!(profile, parsed);
    }
}
